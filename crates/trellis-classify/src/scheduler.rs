//! Bounded, cancellable fan-out of classification calls
//!
//! One task per uncached request, at most `max_concurrency` in flight. Each
//! call is retried with exponential backoff and bounded by a timeout; a
//! component whose classifier never answers gets `medium` plus a warning so
//! aggregation can still run. Firing the token stops queued and in-flight
//! calls alike.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trellis_core::{ClassificationNote, ComplexityLevel, WarningKind, Warnings};

use crate::bridge::{Classification, ClassificationRequest, Classifier};
use crate::cache::ClassificationCache;
use crate::rules::RuleCatalog;

/// Level assigned when a classifier times out or keeps failing.
pub const FALLBACK_LEVEL: ComplexityLevel = ComplexityLevel::Medium;

#[derive(Debug, Clone)]
pub struct ClassifyLimits {
    pub max_concurrency: usize,
    /// Per attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ClassifyLimits {
    fn default() -> Self {
        ClassifyLimits {
            max_concurrency: 8,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedComponent {
    pub component_id: String,
    pub level: ComplexityLevel,
    pub note: ClassificationNote,
}

#[derive(Debug, Default)]
pub struct ClassificationOutcome {
    /// Sorted by component id.
    pub results: Vec<ClassifiedComponent>,
    pub warnings: Warnings,
    /// Requests left unanswered because the token fired.
    pub cancelled: usize,
    pub cache_hits: usize,
}

impl ClassificationOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}

enum Attempt {
    Done(Classification),
    TimedOut,
    Failed(String),
    Cancelled,
}

pub struct ClassificationRunner {
    classifier: Arc<dyn Classifier>,
    cache: Arc<ClassificationCache>,
    limits: ClassifyLimits,
}

impl ClassificationRunner {
    pub fn new(classifier: Arc<dyn Classifier>, limits: ClassifyLimits) -> Self {
        Self {
            classifier,
            cache: Arc::new(ClassificationCache::new()),
            limits,
        }
    }

    /// Share a cache across runs.
    pub fn with_cache(mut self, cache: Arc<ClassificationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub async fn classify_all(
        &self,
        requests: Vec<ClassificationRequest>,
        catalog: Arc<RuleCatalog>,
        cancel: &CancellationToken,
    ) -> ClassificationOutcome {
        let mut outcome = ClassificationOutcome::default();
        let source = self.classifier.name().to_string();
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        tracing::info!(
            components = total,
            classifier = %source,
            catalog = %catalog.identity(),
            max_concurrency = self.limits.max_concurrency,
            "Classifying components"
        );

        for request in requests {
            let key = request.content_hash(&catalog);
            if let Some(hit) = self.cache.get(&key) {
                outcome.cache_hits += 1;
                outcome.results.push(answered(&request, hit, &source));
                continue;
            }

            let classifier = Arc::clone(&self.classifier);
            let catalog = Arc::clone(&catalog);
            let semaphore = Arc::clone(&semaphore);
            let limits = self.limits.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                // Cancellation is polled first so a freed permit never starts a call.
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (request, key, Attempt::Cancelled);
                };
                if cancel.is_cancelled() {
                    return (request, key, Attempt::Cancelled);
                }
                let attempt = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Attempt::Cancelled,
                    attempt = classify_with_retry(classifier.as_ref(), &request, &catalog, &limits) => attempt,
                };
                (request, key, attempt)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (request, key, attempt) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // The component stays unclassified; callers fill the gap.
                    tracing::error!("Classification task failed: {}", e);
                    continue;
                }
            };
            match attempt {
                Attempt::Done(classification) => {
                    self.cache.insert(key, classification.clone());
                    outcome.results.push(answered(&request, classification, &source));
                }
                Attempt::TimedOut => {
                    let message = format!(
                        "no answer within {:?} after {} attempt(s); defaulting to {}",
                        self.limits.timeout,
                        self.limits.max_retries + 1,
                        FALLBACK_LEVEL
                    );
                    outcome.results.push(fallback(&request, &message));
                    outcome
                        .warnings
                        .record(WarningKind::ClassificationTimeout, request.component_id, message);
                }
                Attempt::Failed(error) => {
                    let message = format!("{}; defaulting to {}", error, FALLBACK_LEVEL);
                    outcome.results.push(fallback(&request, &message));
                    outcome
                        .warnings
                        .record(WarningKind::ClassificationError, request.component_id, message);
                }
                Attempt::Cancelled => outcome.cancelled += 1,
            }
        }

        if outcome.cancelled > 0 {
            outcome.warnings.record(
                WarningKind::Cancelled,
                "classification",
                format!("{} of {} components were not classified", outcome.cancelled, total),
            );
        }

        outcome.results.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        tracing::info!(
            classified = outcome.results.len(),
            cache_hits = outcome.cache_hits,
            cancelled = outcome.cancelled,
            warnings = outcome.warnings.len(),
            "Classification complete"
        );
        outcome
    }
}

async fn classify_with_retry(
    classifier: &dyn Classifier,
    request: &ClassificationRequest,
    catalog: &RuleCatalog,
    limits: &ClassifyLimits,
) -> Attempt {
    let mut backoff = limits.initial_backoff;
    let mut attempt = 0;
    loop {
        let last = attempt >= limits.max_retries;
        match tokio::time::timeout(limits.timeout, classifier.classify(request, catalog)).await {
            Ok(Ok(classification)) => return Attempt::Done(classification),
            Ok(Err(e)) if last => return Attempt::Failed(format!("{:#}", e)),
            Err(_) if last => return Attempt::TimedOut,
            Ok(Err(e)) => tracing::debug!(component = %request.component_id, attempt, "Classifier failed, retrying: {:#}", e),
            Err(_) => tracing::debug!(component = %request.component_id, attempt, "Classifier timed out, retrying"),
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(limits.max_backoff);
        attempt += 1;
    }
}

fn answered(request: &ClassificationRequest, classification: Classification, source: &str) -> ClassifiedComponent {
    ClassifiedComponent {
        component_id: request.component_id.clone(),
        level: classification.level,
        note: ClassificationNote {
            reasoning: classification.reasoning,
            matched_rule: classification.matched_rule,
            source: source.to_string(),
        },
    }
}

fn fallback(request: &ClassificationRequest, reasoning: &str) -> ClassifiedComponent {
    ClassifiedComponent {
        component_id: request.component_id.clone(),
        level: FALLBACK_LEVEL,
        note: ClassificationNote {
            reasoning: reasoning.to_string(),
            matched_rule: None,
            source: "default".to_string(),
        },
    }
}
