//! CLI command implementations

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use trellis_core::{ComplexityLevel, UnitStatus};
use trellis_indexer::SplitConfig;
use trellis_runner::Pipeline;

pub struct AnalyzeOptions {
    pub output: Option<PathBuf>,
    pub no_cache: bool,
    pub classifier: Option<String>,
}

pub async fn analyze(root: PathBuf, file: PathBuf, options: AnalyzeOptions) -> anyhow::Result<()> {
    let mut config = trellis_runner::load(&root)?;
    if options.no_cache {
        config.cache.enabled = false;
    }
    if let Some(provider) = options.classifier {
        config.classifier.provider = provider;
    }
    let pipeline = Pipeline::from_config(config)?;

    // Ctrl-C cancels the run; whatever finished is still reported
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with partial results");
            token.cancel();
        }
    });

    let output = pipeline.analyze_file(&file, &cancel).await?;
    let snapshot = &output.snapshot;

    let mut containers: Vec<_> = snapshot
        .aggregates
        .iter()
        .filter(|r| r.component_type.is_container())
        .collect();
    containers.sort_by(|a, b| {
        b.effective_complexity
            .cmp(&a.effective_complexity)
            .then_with(|| a.component_id.cmp(&b.component_id))
    });
    for result in &containers {
        tracing::info!(
            "{} {} (own {}, driven by {})",
            result.component_id,
            result.effective_complexity,
            result.own_complexity,
            result.decisive_id
        );
    }
    let critical = snapshot
        .aggregates
        .iter()
        .filter(|r| r.effective_complexity == ComplexityLevel::Critical)
        .count();
    tracing::info!(
        "{} components, {} edges, {} container(s), {} critical, {} warning(s){}",
        snapshot.components.len(),
        snapshot.edges.len(),
        containers.len(),
        critical,
        snapshot.warnings.len(),
        if output.from_cache { " (cached)" } else { "" }
    );
    if !snapshot.complete {
        tracing::warn!("Run was cancelled; the snapshot is partial");
    }

    let json = snapshot.to_json_pretty()?;
    match options.output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Snapshot written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub async fn split(
    root: PathBuf,
    file: PathBuf,
    budget: Option<usize>,
    max_depth: Option<usize>,
) -> anyhow::Result<()> {
    let config = trellis_runner::load(&root)?;
    let split_config = SplitConfig {
        size_budget: budget.unwrap_or(config.split.size_budget),
        max_depth: max_depth.unwrap_or(config.split.max_depth),
    };
    let document = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let outcome = tokio::task::spawn_blocking(move || trellis_indexer::split(&document, &split_config))
        .await
        .context("Splitter task panicked")??;

    for unit in &outcome.units {
        let status = match unit.status {
            UnitStatus::Ok => "ok",
            UnitStatus::Oversized => "oversized",
            UnitStatus::DepthLimited => "depth_limited",
            UnitStatus::UnsplitMalformed => "unsplit_malformed",
        };
        println!(
            "{:>4}  {:<18} {:>10}  {}  {}",
            unit.index, status, unit.size_bytes, unit.label, unit.path
        );
    }
    tracing::info!(
        "{} units, {} warning(s)",
        outcome.units.len(),
        outcome.warnings.len()
    );
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let config = trellis_runner::load(&root)?;
    let cache_root = config.cache.root.unwrap_or(root);
    tracing::info!("Clearing cache for: {}", cache_root.display());

    trellis_core::clear_cache(&cache_root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
