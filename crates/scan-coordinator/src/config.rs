use std::path::PathBuf;

use enrichment::{CollectorConfig, OrchestratorConfig};
use options_analyzer::AnalyzerConfig;
use screener::ScreeningCriteria;
use serde::{Deserialize, Serialize};

/// Everything `ScanCoordinator::run_scan` needs, embedded verbatim as
/// `ScanResults.config_snapshot` so an exported artifact is self-describing.
/// Mirrors every tunable named across C1-C9 rather than passing an opaque
/// blob through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub screening: ScreeningCriteria,
    pub analyzer: AnalyzerConfig,
    pub collector: CollectorConfig,
    pub orchestrator: OrchestratorConfig,

    /// Bounded worker pool size for the per-symbol analyze+score stage
    /// (4.5-4.6). §4.10: min(O's concurrency budget, this, 10 by default).
    pub analysis_workers: usize,
    /// How many top-`traditional_score` candidates get fundamentals/
    /// calendar/technicals enhancement (C7) before the AI stage narrows
    /// further.
    pub enrichment_pool_size: usize,
    /// How many of those get sent to the LLM (C8); the rest are exported
    /// with `ai: None`.
    pub top_k_ai: usize,
    /// Final size of `ScanResults.opportunities` after the combined-score
    /// sort.
    pub top_k: usize,
    /// Open Question resolution: attach the raw fetched option chains to a
    /// sibling artifact. Default false — `ScanResults` itself never carries
    /// raw chains.
    pub include_full_chain_in_artifact: bool,
    /// Wall-clock budget for the whole scan; on expiry in-flight workers
    /// are cancelled and partial results are exported.
    pub scan_wall_clock_deadline_secs: u64,

    pub artifact_json_path: PathBuf,
    pub artifact_csv_path: PathBuf,
    pub artifact_chain_path: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            screening: ScreeningCriteria::default(),
            analyzer: AnalyzerConfig::default(),
            collector: CollectorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            analysis_workers: 10,
            enrichment_pool_size: 20,
            top_k_ai: 10,
            top_k: 10,
            include_full_chain_in_artifact: false,
            scan_wall_clock_deadline_secs: 1800,
            artifact_json_path: PathBuf::from("scan_results.json"),
            artifact_csv_path: PathBuf::from("scan_results.csv"),
            artifact_chain_path: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid scan config: {0}")]
    Invalid(String),
}

impl ScanConfig {
    /// Fatal validation: called once at startup (and by the CLI's
    /// `validate-config` subcommand) so a misconfigured deployment fails
    /// before it ever reaches a provider call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_workers == 0 {
            return Err(ConfigError::Invalid("analysis_workers must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be > 0".into()));
        }
        if self.top_k_ai > self.enrichment_pool_size {
            return Err(ConfigError::Invalid("top_k_ai cannot exceed enrichment_pool_size".into()));
        }
        if self.scan_wall_clock_deadline_secs == 0 {
            return Err(ConfigError::Invalid("scan_wall_clock_deadline_secs must be > 0".into()));
        }
        if self.orchestrator.daily_cost_limit_usd < rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Invalid("daily_cost_limit_usd cannot be negative".into()));
        }
        Ok(())
    }
}
