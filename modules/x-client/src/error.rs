use thiserror::Error;

pub type Result<T> = std::result::Result<T, XClientError>;

#[derive(Debug, Error)]
pub enum XClientError {
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("auth failure: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("credential loading failed: {0}")]
    Credentials(String),

    /// Every credential in the pool is permanently disabled.
    #[error("all credentials disabled")]
    PoolExhausted,

    /// Too many consecutive failures across all credentials.
    #[error("circuit breaker open")]
    CircuitOpen,
}
