pub mod config;
pub mod copilot;
pub mod core;
pub mod detection;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod server;

pub use config::Config;
pub use detection::{Analysis, AnalyzerSettings, DocumentAnalyzer};
pub use models::{
    BatchReport, Classification, DocumentReport, ExtractedEntities, FraudResult, KycValidation,
    SuspiciousRegion, TextRegion,
};
pub use pipeline::{DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep};
