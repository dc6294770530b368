use crate::ad::vast::{self, AdDecision};
use crate::error::{PrerollError, Result};
use crate::metrics;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{error, info, warn};

/// Source of ad decisions
///
/// `Ok(None)` means the server answered without a decision; every other
/// failure is an error. The session treats both as a cancelled ad break.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Fetch and parse the decision behind a fully resolved request URL
    async fn fetch(&self, url: &str) -> Result<Option<AdDecision>>;
}

/// Decision client fetching VAST documents over HTTP
///
/// Cookies are kept across requests so ad-server credentials ride along.
#[derive(Clone, Debug)]
pub struct HttpDecisionClient {
    http_client: Client,
    timeout: Duration,
    max_attempts: u32,
}

impl HttpDecisionClient {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            timeout: Duration::from_millis(2000),
            max_attempts: 2,
        }
    }

    /// Build a client with its own cookie-enabled connection pool
    pub fn with_defaults() -> Result<Self> {
        let http_client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self::new(http_client))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the raw document, with one retry and 500ms backoff
    async fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        let mut last_error = PrerollError::Internal("no request attempted".to_string());

        for attempt in 1..=self.max_attempts {
            match self
                .http_client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
            {
                Ok(resp) if resp.status() == StatusCode::NO_CONTENT => return Ok(None),
                Ok(resp) if resp.status().is_success() => return Ok(Some(resp.text().await?)),
                Ok(resp) => {
                    error!(
                        "Ad decision endpoint returned status {} (attempt {}/{})",
                        resp.status(),
                        attempt,
                        self.max_attempts
                    );
                    last_error = PrerollError::DecisionStatus(resp.status().as_u16());
                }
                Err(e) => {
                    error!(
                        "Ad decision request failed: {} (attempt {}/{})",
                        e, attempt, self.max_attempts
                    );
                    last_error = e.into();
                }
            }

            // Retry backoff (skip on last attempt)
            if attempt < self.max_attempts {
                warn!("Retrying ad decision request in 500ms...");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn fetch(&self, url: &str) -> Result<Option<AdDecision>> {
        info!("Fetching ad decision from {}", url);

        let xml = match self.fetch_text(url).await {
            Ok(Some(xml)) => xml,
            Ok(None) => {
                metrics::record_decision_request("empty");
                return Ok(None);
            }
            Err(e) => {
                metrics::record_decision_request("error");
                return Err(e);
            }
        };

        match vast::parse_vast(&xml) {
            Ok(decision) => {
                metrics::record_decision_request("success");
                Ok(Some(decision))
            }
            Err(e) => {
                metrics::record_decision_request("error");
                Err(e)
            }
        }
    }
}

/// Decision client that always answers with the same decision
///
/// Stands in for an ad server in the demo binary and in tests.
#[derive(Clone, Debug, Default)]
pub struct StaticDecisionClient {
    decision: Option<AdDecision>,
}

impl StaticDecisionClient {
    pub fn new(decision: AdDecision) -> Self {
        Self {
            decision: Some(decision),
        }
    }

    /// Client that answers without a decision
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(Self::new(vast::parse_vast(xml)?))
    }
}

#[async_trait]
impl DecisionClient for StaticDecisionClient {
    async fn fetch(&self, url: &str) -> Result<Option<AdDecision>> {
        info!("StaticDecisionClient: answering {} from memory", url);
        Ok(self.decision.clone())
    }
}
