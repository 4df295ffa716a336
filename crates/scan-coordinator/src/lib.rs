pub mod config;
pub mod export;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use enrichment::{EnhancedDataCollector, LlmEnrichmentOrchestrator, MarketContext};
use notifications::NotificationManager;
use options_analyzer::OptionsAnalyzer;
use pmcc_core::{
    EnhancedStockData, OptionChain, PMCCCandidate, RankedOpportunity, ScanErrorRecord, ScanPhase, ScanResults, Symbol,
};
use provider_registry::ProviderRegistry;
use screener::{ScreenedCandidate, StockScreener};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use config::{ConfigError, ScanConfig};
pub use export::ExportError;

#[derive(Default)]
struct AnalysisPhaseOutcome {
    candidates: Vec<PMCCCandidate>,
    chains: HashMap<Symbol, OptionChain>,
    chains_analyzed: usize,
    invariant_violations: usize,
    errors: Vec<ScanErrorRecord>,
    warnings: Vec<String>,
}

/// C10: the single entry point, `run_scan`. Sequences screen -> analyze ->
/// score -> (optional) enhance + AI-enrich -> export -> notify, all under
/// one wall-clock deadline.
pub struct ScanCoordinator {
    registry: Arc<ProviderRegistry>,
    notifier: Arc<NotificationManager>,
}

impl ScanCoordinator {
    pub fn new(registry: Arc<ProviderRegistry>, notifier: Arc<NotificationManager>) -> Self {
        Self { registry, notifier }
    }

    pub async fn run_scan(&self, config: &ScanConfig, external_cancellation: CancellationToken) -> ScanResults {
        let config_snapshot = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        let mut results = ScanResults::new(config_snapshot);

        let deadline = tokio::time::sleep(Duration::from_secs(config.scan_wall_clock_deadline_secs));
        tokio::pin!(deadline);
        let mut deadline_fired = false;

        {
            let pipeline = self.run_pipeline(config, &external_cancellation, &mut results);
            tokio::pin!(pipeline);
            loop {
                tokio::select! {
                    _ = &mut deadline, if !deadline_fired => {
                        deadline_fired = true;
                        tracing::warn!("scan wall-clock deadline reached; cancelling in-flight work");
                        external_cancellation.cancel();
                    }
                    _ = &mut pipeline => break,
                }
            }
        }

        if deadline_fired {
            results.warnings.push("scan wall-clock deadline reached; partial results exported".to_string());
        }

        results.completed_at = Some(Utc::now());

        if let Err(e) = export::write_artifacts(&results, &config.artifact_json_path, &config.artifact_csv_path) {
            tracing::error!(error = %e, "failed to export scan artifacts");
        }

        let notify_outcome = self.notifier.notify(&results).await;
        if !notify_outcome.success {
            results.errors.push(ScanErrorRecord {
                phase: ScanPhase::Notification,
                symbol: None,
                kind: "NotificationFailure".to_string(),
                message: "all configured notification channels failed".to_string(),
                provider_id: None,
                retryable: false,
                at: Utc::now(),
            });
        }

        results
    }

    async fn run_pipeline(&self, config: &ScanConfig, cancellation: &CancellationToken, results: &mut ScanResults) {
        let screener = StockScreener::new(Arc::clone(&self.registry));
        let screening = screener.screen(&config.screening).await;
        results.stats.screened = screening.screened;
        results.stats.passed_screening = screening.candidates.len();
        results.errors.extend(screening.errors);

        if cancellation.is_cancelled() {
            results.warnings.push("scan cancelled during screening".to_string());
            return;
        }

        let phase = self.analyze_candidates(screening.candidates, config, cancellation).await;
        results.stats.chains_analyzed = phase.chains_analyzed;
        results.stats.invariant_violations = phase.invariant_violations;
        results.stats.candidates_found = phase.candidates.len();
        results.errors.extend(phase.errors);
        results.warnings.extend(phase.warnings);

        if config.include_full_chain_in_artifact {
            if let Some(path) = &config.artifact_chain_path {
                if let Err(e) = export::write_chains_artifact(&phase.chains, path) {
                    tracing::warn!(error = %e, "failed to write option chain artifact");
                }
            }
        }

        let mut ranked = phase.candidates;
        ranked.sort_by(|a, b| b.traditional_score.cmp(&a.traditional_score));

        let pool_size = config.enrichment_pool_size.min(ranked.len());
        let enrichment_pool: Vec<PMCCCandidate> = ranked.drain(..pool_size).collect();
        let remainder = ranked;

        let mut opportunities: Vec<RankedOpportunity> =
            remainder.into_iter().map(|c| RankedOpportunity::new(c, None, None)).collect();

        if enrichment_pool.is_empty() || cancellation.is_cancelled() {
            opportunities.extend(enrichment_pool.into_iter().map(|c| RankedOpportunity::new(c, None, None)));
        } else {
            let symbols: Vec<Symbol> = enrichment_pool.iter().map(|c| c.symbol.clone()).collect();
            let collector = EnhancedDataCollector::new(Arc::clone(&self.registry));
            let collection = collector.collect_many(&symbols, &config.collector, cancellation).await;
            results.errors.extend(collection.errors);
            results.warnings.extend(collection.warnings);

            let with_enhanced: Vec<(PMCCCandidate, Option<EnhancedStockData>)> = enrichment_pool
                .into_iter()
                .map(|c| {
                    let enhanced = collection.data.get(&c.symbol).cloned();
                    (c, enhanced)
                })
                .collect();

            let mut eligible_for_ai = Vec::new();
            let mut enhanced_only = Vec::new();
            for (candidate, enhanced) in with_enhanced {
                let qualifies = eligible_for_ai.len() < config.top_k_ai
                    && enhanced
                        .as_ref()
                        .map(|e| e.completeness_score >= config.collector.min_completeness_for_ai)
                        .unwrap_or(false);
                if qualifies {
                    eligible_for_ai.push((candidate, enhanced));
                } else {
                    enhanced_only.push((candidate, enhanced));
                }
            }

            opportunities.extend(enhanced_only.into_iter().map(|(c, e)| RankedOpportunity::new(c, e, None)));

            if eligible_for_ai.is_empty() || cancellation.is_cancelled() {
                opportunities.extend(eligible_for_ai.into_iter().map(|(c, e)| RankedOpportunity::new(c, e, None)));
            } else {
                let orchestrator = LlmEnrichmentOrchestrator::new(Arc::clone(&self.registry));
                let market = MarketContext { scan_id: results.scan_id, as_of: Utc::now() };
                let enrichment_outcome = orchestrator
                    .enrich(eligible_for_ai, &config.orchestrator, &market, cancellation)
                    .await;
                results.stats.ai_analyzed = enrichment_outcome.ai_analyzed;
                results.errors.extend(enrichment_outcome.errors);
                opportunities.extend(enrichment_outcome.opportunities);
            }
        }

        results.opportunities = opportunities;
        results.finalize_opportunities(config.top_k);

        for (provider_id, usage) in self.registry.usage_snapshot().await {
            results.provider_usage.insert(provider_id, usage);
        }
    }

    /// Bounded worker pool (C5/C6 combined) sized to `config.analysis_workers`.
    /// Each worker fetches one symbol's chain, pairs candidates, and scores
    /// them; results are drained via `JoinSet` rather than a channel since
    /// every task's single output fits naturally into `join_next`.
    async fn analyze_candidates(
        &self,
        candidates: Vec<ScreenedCandidate>,
        config: &ScanConfig,
        cancellation: &CancellationToken,
    ) -> AnalysisPhaseOutcome {
        let analyzer = Arc::new(OptionsAnalyzer::new(Arc::clone(&self.registry)));
        let semaphore = Arc::new(Semaphore::new(config.analysis_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending: std::collections::HashSet<Symbol> = std::collections::HashSet::new();

        for candidate in candidates {
            let analyzer = Arc::clone(&analyzer);
            let semaphore = Arc::clone(&semaphore);
            let analyzer_config = config.analyzer.clone();
            let retain_chain = config.include_full_chain_in_artifact;
            pending.insert(candidate.symbol.clone());
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = analyzer
                    .analyze(&candidate.symbol, &candidate.quote, &analyzer_config, None, retain_chain)
                    .await;
                (candidate.symbol, outcome)
            });
        }

        let mut phase = AnalysisPhaseOutcome::default();
        loop {
            if tasks.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tasks.abort_all();
                    for symbol in pending.drain() {
                        phase.errors.push(ScanErrorRecord {
                            phase: ScanPhase::Analysis,
                            symbol: Some(symbol),
                            kind: "Cancelled".to_string(),
                            message: "option chain analysis cancelled before completion".to_string(),
                            provider_id: None,
                            retryable: false,
                            at: Utc::now(),
                        });
                    }
                    break;
                }
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((symbol, outcome))) => {
                            pending.remove(&symbol);
                            if outcome.chain_fetched {
                                phase.chains_analyzed += 1;
                            }
                            phase.invariant_violations += outcome.invariant_violations;
                            phase.errors.extend(outcome.errors);
                            phase.warnings.extend(outcome.warnings);
                            if let Some(chain) = outcome.chain {
                                phase.chains.insert(symbol, chain);
                            }
                            phase.candidates.extend(outcome.candidates);
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(error = %join_err, "option analysis task panicked");
                        }
                    }
                }
            }
        }

        phase
    }
}
