pub mod enricher;
pub mod fetcher;
pub mod organizer;
pub mod writer;

pub use enricher::EnricherStage;
pub use fetcher::FetcherStage;
pub use organizer::OrganizerStage;
pub use writer::{WriterReport, WriterStage};
