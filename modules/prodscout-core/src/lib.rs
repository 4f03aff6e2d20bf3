pub mod config;
pub mod error;
pub mod errlog;
pub mod types;

pub use config::{Config, EnricherConfig, FetcherConfig, LlmConfig, OrganizerConfig, XScraperConfig};
pub use error::{ConfigError, ErrorKind};
pub use errlog::ErrorLog;
pub use types::{
    BatchManifest, Bucket, Entity, LatestBatch, OrganizedFields, Post, RunSummary, SourceSpec,
    SourceType,
};
