//! Usage evaluation over indexed activity.
//!
//! Wires campaigns, metrics providers and the output cache around the pure
//! evaluator in `indexflow-core`.

pub mod cache;
pub mod campaigns;
pub mod metrics;
pub mod service;

pub use cache::TtlCache;
pub use campaigns::{Campaign, CampaignRegistry, CampaignTarget};
pub use metrics::{
    CachedMetricsProvider, FallbackMetricsProvider, IndexerDbMetricsProvider, MetricsError,
    MetricsProvider, MetricsQuery, RpcScanMetricsProvider,
};
pub use service::{
    CampaignRunItem, CampaignRunRequest, CampaignRunResult, CampaignRunSummary, EvaluateRequest,
    EvaluationError, EvaluationMeta, EvaluationResult, EvaluationService,
};
