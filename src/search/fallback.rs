/// Fallback controller
///
/// Runs the primary adapter for the resolved route against every selected
/// corpus, decides whether the pooled results are good enough, and if not
/// runs the opposite adapter exactly once and concatenates its results.
/// Adapter failures are recorded and treated as empty outcomes; only
/// configuration errors and cancellation propagate.
use super::{AdapterQuery, SearchAdapter, Strategy};
use crate::config::SearchConfig;
use crate::error::{RouterError, RouterResult};
use crate::types::{Corpus, Route, SearchFilters, SearchResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// States visited by one controller run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackState {
    Classified,
    PrimaryExecuted,
    Accepted,
    FallbackTriggered,
    FallbackExecuted,
    Merged,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyRole {
    Primary,
    Fallback,
}

/// Result count (or failure) of one adapter call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusOutcome {
    pub corpus: Corpus,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diagnostics for one strategy stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDiagnostics {
    pub strategy: Strategy,
    pub role: StrategyRole,
    pub corpora: Vec<CorpusOutcome>,
    pub duration_ms: f64,
}

impl StrategyDiagnostics {
    pub fn result_count(&self) -> usize {
        self.corpora.iter().map(|c| c.result_count).sum()
    }

    /// True when at least one call ran and every call failed
    pub fn all_failed(&self) -> bool {
        !self.corpora.is_empty() && self.corpora.iter().all(|c| c.error.is_some())
    }
}

/// Everything the controller needs for one request
#[derive(Debug, Clone)]
pub struct SearchPlan<'a> {
    pub query: &'a str,
    pub route: Route,
    pub top_k: usize,
    pub filters: Option<&'a SearchFilters>,
    pub corpora: Vec<Corpus>,
    /// Bound on each adapter call
    pub call_timeout: Duration,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackOutcome {
    /// Primary results followed by fallback results, not yet deduplicated
    pub results: Vec<SearchResult>,
    pub fallback_applied: bool,
    pub fallback_attempts: u32,
    pub states: Vec<FallbackState>,
    pub strategies: Vec<StrategyDiagnostics>,
    pub errors: Vec<String>,
    /// Every call of every executed stage failed
    pub total_failure: bool,
}

struct StageOutcome {
    results: Vec<SearchResult>,
    diagnostics: StrategyDiagnostics,
    errors: Vec<String>,
}

pub struct FallbackController {
    config: Arc<SearchConfig>,
    exact: Arc<dyn SearchAdapter>,
    vector: Arc<dyn SearchAdapter>,
}

impl FallbackController {
    pub fn new(
        config: Arc<SearchConfig>,
        exact: Arc<dyn SearchAdapter>,
        vector: Arc<dyn SearchAdapter>,
    ) -> Self {
        Self {
            config,
            exact,
            vector,
        }
    }

    /// (primary, fallback) adapters for a resolved route
    fn adapters_for(&self, route: Route) -> (&Arc<dyn SearchAdapter>, &Arc<dyn SearchAdapter>) {
        match route {
            Route::Exact => (&self.exact, &self.vector),
            Route::Semantic | Route::Hybrid => (&self.vector, &self.exact),
        }
    }

    /// Whether pooled primary results call for the opposite strategy
    pub fn should_fallback(&self, route: Route, results: &[SearchResult]) -> bool {
        match route {
            Route::Exact => {
                self.config.enable_exact_fallback && results.len() < self.config.min_exact_results
            }
            Route::Semantic | Route::Hybrid => {
                if !self.config.enable_semantic_fallback {
                    return false;
                }
                if results.is_empty() {
                    return true;
                }
                let avg = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
                avg < self.config.min_semantic_score
            }
        }
    }

    pub async fn execute(&self, plan: &SearchPlan<'_>) -> RouterResult<FallbackOutcome> {
        let mut outcome = FallbackOutcome {
            states: vec![FallbackState::Classified],
            ..Default::default()
        };

        if plan.corpora.is_empty() {
            debug!("No corpora selected, nothing to search");
            outcome.states.push(FallbackState::Done);
            return Ok(outcome);
        }

        let (primary, fallback) = self.adapters_for(plan.route);

        let stage = self.run_stage(primary.as_ref(), StrategyRole::Primary, plan).await?;
        outcome.states.push(FallbackState::PrimaryExecuted);
        let primary_failed = stage.diagnostics.all_failed();
        outcome.results = stage.results;
        outcome.errors.extend(stage.errors);
        outcome.strategies.push(stage.diagnostics);

        let mut fallback_failed = false;
        if outcome.fallback_attempts < self.config.max_fallback_attempts
            && self.should_fallback(plan.route, &outcome.results)
        {
            outcome.states.push(FallbackState::FallbackTriggered);
            info!(
                "Primary {} search returned {} results for route {}, trying {}",
                primary.strategy(),
                outcome.results.len(),
                plan.route,
                fallback.strategy()
            );

            let stage = self.run_stage(fallback.as_ref(), StrategyRole::Fallback, plan).await?;
            outcome.states.push(FallbackState::FallbackExecuted);
            fallback_failed = stage.diagnostics.all_failed();

            outcome.results.extend(stage.results);
            outcome.errors.extend(stage.errors);
            outcome.strategies.push(stage.diagnostics);
            outcome.fallback_applied = true;
            outcome.fallback_attempts += 1;
            outcome.states.push(FallbackState::Merged);
        } else {
            outcome.states.push(FallbackState::Accepted);
        }

        outcome.states.push(FallbackState::Done);
        outcome.total_failure = primary_failed && fallback_failed;
        Ok(outcome)
    }

    /// Run one adapter against every corpus concurrently
    async fn run_stage(
        &self,
        adapter: &dyn SearchAdapter,
        role: StrategyRole,
        plan: &SearchPlan<'_>,
    ) -> RouterResult<StageOutcome> {
        let start = Instant::now();
        let strategy = adapter.strategy();

        let calls = plan.corpora.iter().map(move |&corpus| {
            let query = AdapterQuery {
                query: plan.query,
                corpus,
                top_k: plan.top_k,
                filters: plan.filters,
                route: plan.route,
            };
            async move { (corpus, call_adapter(adapter, query, plan).await) }
        });
        let settled = join_all(calls).await;

        let mut results = Vec::new();
        let mut corpora = Vec::with_capacity(settled.len());
        let mut errors = Vec::new();

        for (corpus, result) in settled {
            match result {
                Ok(hits) => {
                    debug!("{} search on {} returned {} results", strategy, corpus, hits.len());
                    corpora.push(CorpusOutcome {
                        corpus,
                        result_count: hits.len(),
                        error: None,
                    });
                    results.extend(hits);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{} search on {} failed: {}", strategy, corpus, e);
                    errors.push(format!("{} search on {} failed: {}", strategy, corpus, e));
                    corpora.push(CorpusOutcome {
                        corpus,
                        result_count: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(StageOutcome {
            results,
            diagnostics: StrategyDiagnostics {
                strategy,
                role,
                corpora,
                duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
            errors,
        })
    }
}

/// One adapter call bounded by the plan's timeout and cancellation token
async fn call_adapter(
    adapter: &dyn SearchAdapter,
    query: AdapterQuery<'_>,
    plan: &SearchPlan<'_>,
) -> RouterResult<Vec<SearchResult>> {
    tokio::select! {
        biased;
        _ = plan.cancel.cancelled() => Err(RouterError::Cancelled),
        result = timeout(plan.call_timeout, adapter.search(&query)) => match result {
            Ok(result) => result,
            Err(_) => Err(RouterError::Timeout(plan.call_timeout.as_millis() as u64)),
        },
    }
}
