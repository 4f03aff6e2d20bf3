//! HTTP transport for the GraphQL endpoints.
//!
//! The platform's edge fingerprints TLS; requests from stock HTTP stacks
//! are blocked before any application response. The real transport rides
//! an impersonation client whose JA3 matches a current desktop Chrome,
//! with the user-agent always drawn from the same profile as the
//! fingerprint. Tests substitute the trait with canned responses.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rquest::Impersonate;

use crate::error::{Result, XClientError};

#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait XTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        cookie: &str,
    ) -> Result<WireResponse>;
}

struct ClientProfile {
    user_agent: &'static str,
    impersonate: Impersonate,
}

/// UA and TLS fingerprint are chosen together so the two never disagree.
const PROFILES: [ClientProfile; 3] = [
    ClientProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        impersonate: Impersonate::Chrome131,
    },
    ClientProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        impersonate: Impersonate::Chrome131,
    },
    ClientProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        impersonate: Impersonate::Chrome131,
    },
];

pub struct ImpersonatedTransport {
    clients: Vec<rquest::Client>,
}

impl ImpersonatedTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let clients = PROFILES
            .iter()
            .map(|profile| {
                rquest::Client::builder()
                    .impersonate(profile.impersonate)
                    .timeout(timeout)
                    .build()
                    .map_err(|e| XClientError::Network(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clients })
    }
}

#[async_trait]
impl XTransport for ImpersonatedTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        cookie: &str,
    ) -> Result<WireResponse> {
        let pick = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..self.clients.len())
        };
        let mut request = self.clients[pick]
            .get(url)
            .query(query)
            .header("user-agent", PROFILES[pick].user_agent)
            .header("cookie", cookie);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| XClientError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| XClientError::Network(e.to_string()))?;

        Ok(WireResponse {
            status,
            retry_after,
            body,
        })
    }
}
