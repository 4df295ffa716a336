use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fundamentals_client::FundamentalsClient;
use llm_client::LlmClient;
use market_data_provider::Operation;
use notifications::NotificationConfig;
use options_client::OptionsClient;
use provider_registry::{ProviderRegistration, ProviderRegistry, RegistryConfig};
use rust_decimal::Decimal;
use scan_coordinator::ScanConfig;

/// Everything the binary needs beyond what `ScanConfig` itself already
/// covers: provider credentials, registry tuning, the daemon's cadence, and
/// the HTTP health port. Mirrors `AgentConfig::from_env` in shape — every
/// field either has a documented default or a `.context(...)`-annotated
/// required var.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub fundamentals_api_key: String,
    pub fundamentals_base_url: String,
    pub options_bearer_token: String,
    pub options_base_url: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model_id: String,
    pub llm_price_per_1k_prompt_usd: Decimal,
    pub llm_price_per_1k_completion_usd: Decimal,

    pub analysis_workers: usize,
    pub enrichment_pool_size: usize,
    pub top_k_ai: usize,
    pub top_k: usize,
    pub max_concurrent_analyses: usize,
    pub daily_cost_limit_usd: Decimal,

    pub scan_interval_secs: u64,
    pub scan_wall_clock_deadline_secs: u64,
    pub market_hours_only: bool,
    pub extended_hours: bool,

    pub artifact_json_path: PathBuf,
    pub artifact_csv_path: PathBuf,
    pub artifact_chain_path: Option<PathBuf>,
    pub include_full_chain_in_artifact: bool,

    pub health_port: u16,

    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            fundamentals_api_key: env::var("FUNDAMENTALS_API_KEY").context("FUNDAMENTALS_API_KEY not set")?,
            fundamentals_base_url: env::var("FUNDAMENTALS_BASE_URL")
                .unwrap_or_else(|_| "https://api.fundamentals.example".to_string()),
            options_bearer_token: env::var("OPTIONS_API_KEY").context("OPTIONS_API_KEY not set")?,
            options_base_url: env::var("OPTIONS_BASE_URL").unwrap_or_else(|_| "https://api.options.example".to_string()),
            llm_api_key: env::var("LLM_API_KEY").context("LLM_API_KEY not set")?,
            llm_base_url: env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model_id: env::var("LLM_MODEL_ID").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_price_per_1k_prompt_usd: env::var("LLM_PRICE_PER_1K_PROMPT_USD")
                .unwrap_or_else(|_| "0.15".to_string())
                .parse()
                .context("LLM_PRICE_PER_1K_PROMPT_USD must be a decimal")?,
            llm_price_per_1k_completion_usd: env::var("LLM_PRICE_PER_1K_COMPLETION_USD")
                .unwrap_or_else(|_| "0.60".to_string())
                .parse()
                .context("LLM_PRICE_PER_1K_COMPLETION_USD must be a decimal")?,

            analysis_workers: env::var("ANALYSIS_WORKERS").unwrap_or_else(|_| "10".to_string()).parse()?,
            enrichment_pool_size: env::var("ENRICHMENT_POOL_SIZE").unwrap_or_else(|_| "20".to_string()).parse()?,
            top_k_ai: env::var("TOP_K_AI").unwrap_or_else(|_| "10".to_string()).parse()?,
            top_k: env::var("TOP_K").unwrap_or_else(|_| "10".to_string()).parse()?,
            max_concurrent_analyses: env::var("MAX_CONCURRENT_ANALYSES").unwrap_or_else(|_| "3".to_string()).parse()?,
            daily_cost_limit_usd: env::var("DAILY_COST_LIMIT_USD")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("DAILY_COST_LIMIT_USD must be a decimal")?,

            scan_interval_secs: env::var("SCAN_INTERVAL_SECS").unwrap_or_else(|_| "3600".to_string()).parse()?,
            scan_wall_clock_deadline_secs: env::var("SCAN_WALL_CLOCK_DEADLINE_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()?,
            market_hours_only: env::var("MARKET_HOURS_ONLY").unwrap_or_else(|_| "true".to_string()).parse()?,
            extended_hours: env::var("EXTENDED_HOURS").unwrap_or_else(|_| "false".to_string()).parse()?,

            artifact_json_path: PathBuf::from(
                env::var("ARTIFACT_JSON_PATH").unwrap_or_else(|_| "scan_results.json".to_string()),
            ),
            artifact_csv_path: PathBuf::from(
                env::var("ARTIFACT_CSV_PATH").unwrap_or_else(|_| "scan_results.csv".to_string()),
            ),
            artifact_chain_path: env::var("ARTIFACT_CHAIN_PATH").ok().map(PathBuf::from),
            include_full_chain_in_artifact: env::var("INCLUDE_FULL_CHAIN_IN_ARTIFACT")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            health_port: env::var("HEALTH_PORT").unwrap_or_else(|_| "8080".to_string()).parse()?,

            notifications: NotificationConfig::from_env(),
        })
    }

    /// Fatal validation, run at startup and by `validate-config`.
    pub fn validate(&self) -> Result<()> {
        if self.fundamentals_api_key.trim().is_empty() {
            bail!("FUNDAMENTALS_API_KEY must not be empty");
        }
        if self.options_bearer_token.trim().is_empty() {
            bail!("OPTIONS_API_KEY must not be empty");
        }
        if self.llm_api_key.trim().is_empty() {
            bail!("LLM_API_KEY must not be empty");
        }
        if self.analysis_workers == 0 {
            bail!("ANALYSIS_WORKERS must be > 0");
        }
        if self.top_k == 0 {
            bail!("TOP_K must be > 0");
        }
        if self.top_k_ai > self.enrichment_pool_size {
            bail!("TOP_K_AI cannot exceed ENRICHMENT_POOL_SIZE");
        }
        if self.daily_cost_limit_usd < Decimal::ZERO {
            bail!("DAILY_COST_LIMIT_USD cannot be negative");
        }
        if self.scan_wall_clock_deadline_secs == 0 {
            bail!("SCAN_WALL_CLOCK_DEADLINE_SECS must be > 0");
        }
        if self.scan_interval_secs == 0 {
            bail!("SCAN_INTERVAL_SECS must be > 0");
        }
        self.build_scan_config().validate()?;
        Ok(())
    }

    pub fn build_scan_config(&self) -> ScanConfig {
        let mut config = ScanConfig::default();
        config.analysis_workers = self.analysis_workers;
        config.enrichment_pool_size = self.enrichment_pool_size;
        config.top_k_ai = self.top_k_ai;
        config.top_k = self.top_k;
        config.include_full_chain_in_artifact = self.include_full_chain_in_artifact;
        config.scan_wall_clock_deadline_secs = self.scan_wall_clock_deadline_secs;
        config.artifact_json_path = self.artifact_json_path.clone();
        config.artifact_csv_path = self.artifact_csv_path.clone();
        config.artifact_chain_path = self.artifact_chain_path.clone();
        config.orchestrator.max_concurrent_analyses = self.max_concurrent_analyses;
        config.orchestrator.daily_cost_limit_usd = self.daily_cost_limit_usd;
        config
    }

    /// Wires the three concrete adapters (F, O, L) into a `ProviderRegistry`
    /// with a fixed preference list — each operation has exactly one
    /// declared owner in this deployment, so "preference" is really just
    /// routing, with the registry's retry/breaker machinery still applying.
    pub fn build_registry(&self) -> Arc<ProviderRegistry> {
        let fundamentals = Arc::new(FundamentalsClient::new(
            "fundamentals",
            self.fundamentals_api_key.clone(),
            self.fundamentals_base_url.clone(),
        ));
        let options = Arc::new(OptionsClient::new(
            "options",
            self.options_bearer_token.clone(),
            self.options_base_url.clone(),
        ));
        let llm = Arc::new(LlmClient::new(
            "llm",
            self.llm_api_key.clone(),
            self.llm_base_url.clone(),
            self.llm_model_id.clone(),
            self.llm_price_per_1k_prompt_usd,
            self.llm_price_per_1k_completion_usd,
        ));

        let mut preference = HashMap::new();
        for op in [
            Operation::ScreenStocks,
            Operation::GetQuote,
            Operation::GetQuotesBatch,
            Operation::GetFundamentals,
            Operation::GetCalendarEvents,
            Operation::GetTechnicals,
        ] {
            preference.insert(op, vec!["fundamentals".to_string()]);
        }
        for op in [Operation::GetOptionChain, Operation::GetExpirations, Operation::GetStrikes] {
            preference.insert(op, vec!["options".to_string()]);
        }
        preference.insert(Operation::AnalyzePmccOpportunity, vec!["llm".to_string()]);

        let registry_config = RegistryConfig {
            preference,
            ..RegistryConfig::default()
        };

        let in_flight = self.analysis_workers.max(self.max_concurrent_analyses).max(1);

        let registrations = vec![
            ProviderRegistration {
                provider: fundamentals,
                enabled: true,
                refill_rate_per_sec: 5.0,
                bucket_capacity: 20.0,
                max_in_flight: in_flight,
                daily_capacity: None,
                daily_reset_tz: chrono_tz::US::Eastern,
            },
            ProviderRegistration {
                provider: options,
                enabled: true,
                refill_rate_per_sec: 2.0,
                bucket_capacity: 10.0,
                max_in_flight: in_flight,
                daily_capacity: None,
                daily_reset_tz: chrono_tz::US::Eastern,
            },
            ProviderRegistration {
                provider: llm,
                enabled: true,
                refill_rate_per_sec: 1.0,
                bucket_capacity: 5.0,
                max_in_flight: self.max_concurrent_analyses.max(1),
                daily_capacity: None,
                daily_reset_tz: chrono_tz::US::Eastern,
            },
        ];

        Arc::new(ProviderRegistry::new(registry_config, registrations))
    }
}
