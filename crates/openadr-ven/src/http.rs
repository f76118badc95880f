//! reqwest implementations of the outbound ports.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use openadr_contract::Transaction;
use openadr_types::{OutpointKey, Txid};

use crate::error::TransportError;
use crate::ports::{Ledger, LookupResolver, SuccessorSpend, Vtn};
use crate::wire::{
    ActionInput, ActionOutput, CreateAction, CreateActionResult, LookupAnswer, LookupRequest,
    VenRegistration, VtnReport,
};

/// Exponential backoff applied to retryable transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds the shared HTTP client with a per-request timeout.
///
/// # Errors
///
/// Returns `TransportError::Request` if the TLS backend cannot be set up.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// VTN over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVtn {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpVtn {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry,
        }
    }

    async fn post_json<T: serde::Serialize + Sync>(
        &self,
        operation: &str,
        path: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let url = join(&self.base_url, path);
        self.retry
            .run(operation, || async {
                let response = self.client.post(&url).json(body).send().await?;
                check_status(response).await.map(|_| ())
            })
            .await
    }
}

#[async_trait]
impl Vtn for HttpVtn {
    async fn register(&self, registration: &VenRegistration) -> Result<(), TransportError> {
        self.post_json("register", "vens", registration).await
    }

    async fn submit_report(&self, report: &VtnReport) -> Result<(), TransportError> {
        self.post_json("submit_report", "reports", report).await
    }
}

/// Overlay lookup over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLookupResolver {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpLookupResolver {
    /// `overlay_url` is the overlay host base; queries go to `/lookup`.
    pub fn new(client: reqwest::Client, overlay_url: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: join(overlay_url, "lookup"),
            retry,
        }
    }
}

#[async_trait]
impl LookupResolver for HttpLookupResolver {
    async fn query(&self, request: &LookupRequest) -> Result<Vec<OutpointKey>, TransportError> {
        self.retry
            .run("lookup", || async {
                let response = self.client.post(&self.url).json(request).send().await?;
                let answer: LookupAnswer = check_status(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                Ok(answer.into_keys())
            })
            .await
    }
}

/// Ledger node and wallet over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    node_url: String,
    wallet_url: String,
    retry: RetryPolicy,
}

impl HttpLedger {
    pub fn new(
        client: reqwest::Client,
        node_url: impl Into<String>,
        wallet_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            node_url: node_url.into(),
            wallet_url: wallet_url.into(),
            retry,
        }
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction, TransportError> {
        let url = join(&self.node_url, &format!("tx/{txid}/hex"));
        let raw_hex = self
            .retry
            .run("fetch_transaction", || async {
                let response = self.client.get(&url).send().await?;
                Ok(check_status(response).await?.text().await?)
            })
            .await?;

        let tx = Transaction::from_hex(raw_hex.trim())
            .map_err(|e| TransportError::Decode(format!("transaction {txid}: {e}")))?;
        if tx.txid() != *txid {
            return Err(TransportError::Decode(format!(
                "node returned transaction {} for {txid}",
                tx.txid()
            )));
        }
        Ok(tx)
    }

    /// Not retried: a lost response may mean the action was created, and the
    /// caller's reconciliation decides whether to try again.
    async fn publish_successor(&self, spend: &SuccessorSpend) -> Result<Txid, TransportError> {
        let body = CreateAction {
            description: spend.description.clone(),
            inputs: vec![ActionInput {
                outpoint: spend.spends.to_string(),
                input_description: "OpenADR event output".to_string(),
            }],
            outputs: vec![ActionOutput {
                locking_script: hex::encode(&spend.locking_script),
                satoshis: spend.satoshis,
                output_description: "OpenADR event with report".to_string(),
            }],
        };

        let url = join(&self.wallet_url, "createAction");
        let response = self.client.post(&url).json(&body).send().await?;
        let result: CreateActionResult = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        result
            .txid
            .parse()
            .map_err(|e| TransportError::Decode(format!("wallet returned invalid txid: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn server_error() -> TransportError {
        TransportError::Status {
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
        assert_eq!(policy.backoff(40), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let result = fast_policy()
            .run("test", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(server_error())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
            .await;

        assert!(matches!(result, Err(TransportError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Status {
                    status: 404,
                    body: "not found".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_normalises_slashes() {
        assert_eq!(join("http://vtn/", "/vens"), "http://vtn/vens");
        assert_eq!(join("http://vtn", "reports"), "http://vtn/reports");
    }
}
