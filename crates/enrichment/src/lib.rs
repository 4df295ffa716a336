pub mod collector;
pub mod orchestrator;

pub use collector::{CollectionOutcome, CollectorConfig, EnhancedDataCollector};
pub use orchestrator::{CostTracker, EnrichmentOutcome, LlmEnrichmentOrchestrator, MarketContext, OrchestratorConfig};
