//! End-to-end run: split → discover → classify → aggregate → snapshot
//!
//! CPU-bound stages run on the blocking pool (they fan out with rayon);
//! classification runs on the async runtime. One cancellation token covers
//! the whole run: once it fires no later stage starts and the snapshot is
//! returned with `complete: false`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use trellis_classify::{
    ClassificationRequest, ClassificationRunner, Classifier, FALLBACK_LEVEL, RuleCatalog, create_classifier,
};
use trellis_core::{
    AggregateReport, AnalysisSnapshot, ClassificationNote, ComponentTable, DependencyGraph, Unit, WarningKind, Warnings, aggregate,
    cache_key, content_hash, load_snapshot, save_snapshot,
};
use trellis_indexer::{PlatformSchema, SchemaParser, SplitOutcome, UnitParser, discover, split};

use crate::config::RunConfig;

/// What a run handed back.
#[derive(Debug)]
pub struct RunOutput {
    pub snapshot: AnalysisSnapshot,
    /// Served from the snapshot cache without re-running any stage.
    pub from_cache: bool,
    /// Where the snapshot was cached, if it was.
    pub cache_path: Option<PathBuf>,
}

pub struct Pipeline {
    config: RunConfig,
    schema: Arc<PlatformSchema>,
    catalog: Arc<RuleCatalog>,
    parser: Arc<dyn UnitParser>,
    runner: ClassificationRunner,
}

impl Pipeline {
    /// Build every collaborator named by the configuration.
    pub fn from_config(config: RunConfig) -> Result<Self> {
        let schema = config.load_schema()?;
        let catalog = config.load_catalog()?;
        let parser = SchemaParser::new(&schema).context("Platform schema has an invalid pattern")?;
        let classifier = create_classifier(
            &config.classifier.provider,
            config.classifier.endpoint.clone(),
            config.classifier.api_key.clone(),
        )?;
        Ok(Self::new(config, schema, catalog, Arc::new(parser), Arc::from(classifier)))
    }

    pub fn new(
        config: RunConfig,
        schema: PlatformSchema,
        catalog: RuleCatalog,
        parser: Arc<dyn UnitParser>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let runner = ClassificationRunner::new(classifier, config.limits());
        Self {
            config,
            schema: Arc::new(schema),
            catalog: Arc::new(catalog),
            parser,
            runner,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn schema(&self) -> &PlatformSchema {
        &self.schema
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub async fn analyze_file(&self, path: &Path, cancel: &CancellationToken) -> Result<RunOutput> {
        let document = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tracing::info!("Analyzing {} ({} bytes)", path.display(), document.len());
        self.analyze(document, cancel).await
    }

    /// Settings besides the document, schema and catalog that change what a run produces.
    fn run_settings(&self) -> String {
        let split = self.config.split_config();
        format!(
            "budget={};depth={};classifier={};endpoint={}",
            split.size_budget,
            split.max_depth,
            self.runner.classifier_name(),
            self.config.classifier.endpoint.as_deref().unwrap_or("")
        )
    }

    /// Split only; no discovery or classification.
    pub async fn split(&self, document: Vec<u8>) -> Result<SplitOutcome> {
        let split_config = self.config.split_config();
        let outcome = tokio::task::spawn_blocking(move || split(&document, &split_config))
            .await
            .context("Splitter task panicked")??;
        Ok(outcome)
    }

    pub async fn analyze(&self, document: Vec<u8>, cancel: &CancellationToken) -> Result<RunOutput> {
        let document_hash = content_hash(&document);
        let key = cache_key(
            &document_hash,
            &self.schema.platform,
            &self.schema.version,
            &self.catalog.version,
            &self.run_settings(),
        );
        let cache_root = self
            .config
            .cache
            .enabled
            .then(|| self.config.cache.root.clone())
            .flatten();

        if let Some(root) = &cache_root {
            match load_snapshot(root, &key) {
                Ok(Some(snapshot)) => {
                    tracing::info!("Using cached analysis for document {}", &document_hash[..12]);
                    return Ok(RunOutput {
                        snapshot,
                        from_cache: true,
                        cache_path: None,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Snapshot cache unreadable, re-running: {:#}", e),
            }
        }

        let mut warnings = Warnings::new();

        // 1. Split
        let SplitOutcome {
            units,
            warnings: split_warnings,
        } = self.split(document).await?;
        warnings.extend(split_warnings);
        tracing::info!("Split into {} units", units.len());

        let mut run = Run {
            units,
            table: ComponentTable::new(),
            graph: DependencyGraph::new(),
            warnings,
        };
        if cancel.is_cancelled() {
            return Ok(self.finish(run, document_hash, None, &key, cache_root.as_deref()));
        }

        // 2. Discover
        let units = std::mem::take(&mut run.units);
        let schema = Arc::clone(&self.schema);
        let parser = Arc::clone(&self.parser);
        let token = cancel.clone();
        let (units, discovery) = tokio::task::spawn_blocking(move || {
            let discovery = discover(&units, &schema, parser.as_ref(), &token);
            (units, discovery)
        })
        .await
        .context("Discovery task panicked")?;
        run.units = units;
        run.table = discovery.table;
        run.graph = discovery.graph;
        run.warnings.extend(discovery.warnings);
        if discovery.cancelled || cancel.is_cancelled() {
            return Ok(self.finish(run, document_hash, None, &key, cache_root.as_deref()));
        }

        // 3. Classify
        let requests: Vec<ClassificationRequest> = run.table.iter().map(ClassificationRequest::from_component).collect();
        let outcome = self
            .runner
            .classify_all(requests, Arc::clone(&self.catalog), cancel)
            .await;
        run.warnings.extend(outcome.warnings);
        for result in outcome.results {
            run.table
                .set_own_complexity(&result.component_id, result.level, Some(result.note))?;
        }
        if outcome.cancelled > 0 || cancel.is_cancelled() {
            return Ok(self.finish(run, document_hash, None, &key, cache_root.as_deref()));
        }
        let missing: Vec<String> = run.table.unclassified().map(str::to_string).collect();
        for id in missing {
            let note = ClassificationNote {
                reasoning: format!("classification task did not finish; defaulting to {}", FALLBACK_LEVEL),
                matched_rule: None,
                source: "default".to_string(),
            };
            run.warnings
                .record(WarningKind::ClassificationError, id.as_str(), note.reasoning.as_str());
            run.table.set_own_complexity(&id, FALLBACK_LEVEL, Some(note))?;
        }

        // 4. Aggregate
        let Run {
            units,
            table,
            graph,
            warnings,
        } = run;
        let (table, graph, report) = tokio::task::spawn_blocking(move || {
            let report = aggregate(&table, &graph);
            (table, graph, report)
        })
        .await
        .context("Aggregation task panicked")?;
        let report = report.context("Aggregation failed")?;
        if !report.cycles.is_empty() {
            tracing::info!("{} dependency cycle(s) collapsed", report.cycles.len());
        }

        let run = Run {
            units,
            table,
            graph,
            warnings,
        };
        Ok(self.finish(run, document_hash, Some(report), &key, cache_root.as_deref()))
    }

    fn finish(
        &self,
        mut run: Run,
        document_hash: String,
        report: Option<AggregateReport>,
        key: &str,
        cache_root: Option<&Path>,
    ) -> RunOutput {
        if report.is_none() && run.warnings.of_kind(WarningKind::Cancelled).next().is_none() {
            run.warnings
                .record(WarningKind::Cancelled, "run", "cancelled before aggregation; results are partial");
        }

        let snapshot = AnalysisSnapshot::assemble(
            &self.schema.platform,
            &self.schema.version,
            &self.catalog.version,
            document_hash,
            run.units,
            run.table,
            &run.graph,
            report,
            run.warnings.into_vec(),
        );

        let cache_path = match cache_root {
            Some(root) => match save_snapshot(&snapshot, root, key) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Failed to cache snapshot: {:#}", e);
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            components = snapshot.components.len(),
            edges = snapshot.edges.len(),
            warnings = snapshot.warnings.len(),
            complete = snapshot.complete,
            "Analysis finished"
        );
        RunOutput {
            snapshot,
            from_cache: false,
            cache_path,
        }
    }
}

/// Intermediate state carried between stages.
struct Run {
    units: Vec<Unit>,
    table: ComponentTable,
    graph: DependencyGraph,
    warnings: Warnings,
}
