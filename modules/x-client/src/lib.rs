//! Direct client for the microblog platform's internal GraphQL API.
//!
//! Fetches user timelines without the generic RSS bridge: credential
//! rotation with cooldowns, browser TLS impersonation, retry-after
//! handling, circuit breaking, and cursor pagination.

pub mod client;
pub mod error;
pub mod models;
pub mod parser;
pub mod pool;
pub mod scraper;
pub mod transport;

pub use client::{XClient, XClientOptions};
pub use error::XClientError;
pub use models::{MediaKind, Tweet, TweetMedia};
pub use parser::TimelineParser;
pub use pool::{Credential, CredentialPool, CredentialStatus};
pub use scraper::{XScraper, XScraperOptions};
pub use transport::{ImpersonatedTransport, WireResponse, XTransport};
