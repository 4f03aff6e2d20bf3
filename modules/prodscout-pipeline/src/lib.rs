//! The four-stage streaming pipeline: Fetch → Enrich → Organize → Write.
//!
//! Stages are independent concurrent units joined by bounded queues;
//! shutdown cascades through sentinel slots, so every in-flight post is
//! processed before a stage exits.

pub mod adapters;
pub mod coordinator;
pub mod feeds;
pub mod links;
pub mod queue;
pub mod stages;
pub mod traits;

pub use coordinator::{Pipeline, PipelineDeps};
pub use traits::{FeedItem, FeedParser, VideoTranscriber, WebRenderer};
