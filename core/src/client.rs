//! Request dispatch for the CRM API.
//!
//! # Design
//! `CrmClient` holds configuration that is fixed after construction (base
//! URL, credentials, rate and retry policy) plus a shared [`Transport`].
//! A call is split the same way every time:
//!
//! 1. [`CrmClient::build_http_request`] turns a logical [`Request`] into a
//!    wire request. Pure, no I/O.
//! 2. [`CrmClient::execute`] sends it, waiting on the rate limiter and
//!    retrying transient failures when configured, and returns the raw 2xx
//!    response or a [`ServerError`](crate::ServerError) built from the body.
//! 3. The `send*` helpers decode the success body for the resource handles.
//!
//! Cloning a client is cheap and clones share the limiter and the transport's
//! connection pool.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::batch::BatchResult;
use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::envelope;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpRequest, HttpResponse, Request};
use crate::ratelimit::RateLimiter;
use crate::resources::{Associations, Lists, Objects, Schemas};
use crate::retry::{is_transient_status, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct CrmClient {
    base_url: String,
    access_token: Option<String>,
    user_agent: String,
    transport: Arc<dyn Transport>,
    limiter: Option<Arc<RateLimiter>>,
    retry: Option<RetryPolicy>,
}

impl fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.access_token.is_some())
            .field("rate_limited", &self.limiter.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CrmClient {
    /// Build a client that talks HTTP through `reqwest`.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| ApiError::Config(format!("base url {:?}: {e}", config.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "base url {:?} must use http or https",
                config.base_url
            )));
        }

        let limiter = match config.rate_limit {
            Some(limit) if limit.max_requests == 0 || limit.per.is_zero() => {
                return Err(ApiError::Config(
                    "rate limit needs a non-zero request count and window".to_string(),
                ));
            }
            Some(limit) => Some(Arc::new(RateLimiter::new(limit))),
            None => None,
        };

        Ok(Self {
            base_url,
            access_token: config.access_token,
            user_agent: config.user_agent,
            transport,
            limiter,
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Objects of any type (`contacts`, `tickets`, custom object ids, ...).
    pub fn objects(&self, object_type: impl Into<String>) -> Objects<'_> {
        Objects::new(self, object_type.into())
    }

    pub fn companies(&self) -> Objects<'_> {
        self.objects("companies")
    }

    pub fn deals(&self) -> Objects<'_> {
        self.objects("deals")
    }

    pub fn associations(&self) -> Associations<'_> {
        Associations::new(self)
    }

    pub fn lists(&self) -> Lists<'_> {
        Lists::new(self)
    }

    pub fn schemas(&self) -> Schemas<'_> {
        Schemas::new(self)
    }

    /// Resolve the URL, serialize the body and attach headers.
    pub fn build_http_request(&self, request: &Request) -> Result<HttpRequest, ApiError> {
        let raw = format!("{}/{}", self.base_url, request.path().trim_start_matches('/'));
        let mut url =
            Url::parse(&raw).map_err(|e| ApiError::Config(format!("request url {raw:?}: {e}")))?;
        if !request.query().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, values) in request.query() {
                for value in values {
                    pairs.append_pair(name, value);
                }
            }
        }

        let mut headers = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), self.user_agent.clone()),
        ];
        if let Some(token) = &self.access_token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }

        let body = match request.body() {
            Some(value) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(serde_json::to_vec(value).map_err(ApiError::Serialization)?)
            }
            None => None,
        };

        Ok(HttpRequest {
            method: request.method(),
            url: url.into(),
            headers,
            body,
        })
    }

    /// Send `request` and return the raw 2xx response.
    ///
    /// A non-2xx status becomes [`ApiError::Server`] carrying the decoded
    /// error body; an unreachable server becomes [`ApiError::Transport`].
    /// Every wait honours `ctx`.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        request: Request,
    ) -> Result<HttpResponse, ApiError> {
        let http = self.build_http_request(&request)?;
        let retry = self.retry.as_ref().filter(|_| request.is_retryable());
        let resource = request.resource_type().unwrap_or("-");
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                method = %http.method,
                path = request.path(),
                resource,
                attempt,
                "dispatching request"
            );

            let outcome = ctx
                .guard(async {
                    if let Some(limiter) = &self.limiter {
                        limiter.acquire().await;
                    }
                    Ok(self.transport.execute(http.clone()).await)
                })
                .await?;

            let delay = match &outcome {
                Ok(response) if response.is_success() => None,
                Ok(response) => {
                    let transient = is_transient_status(response.status);
                    retry
                        .filter(|_| retry_delay(retry, attempt, transient).is_some())
                        .map(|policy| policy.backoff_for(attempt, response))
                }
                Err(err) => retry_delay(retry, attempt, err.is_transient()),
            };
            if let Some(delay) = delay {
                tracing::warn!(
                    method = %http.method,
                    path = request.path(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %describe_outcome(&outcome),
                    "transient failure, retrying"
                );
                ctx.sleep(delay).await?;
                continue;
            }

            let response = outcome?;
            tracing::debug!(status = response.status, resource, "response received");
            if response.is_success() {
                return Ok(response);
            }
            let err = envelope::server_error(&response);
            tracing::debug!(
                status = err.status,
                category = %err.category,
                correlation_id = err.correlation_id.as_deref().unwrap_or("-"),
                "server rejected request"
            );
            return Err(ApiError::Server(err));
        }
    }

    /// Send `request` and decode the JSON body as `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: Request,
        call: &'static str,
    ) -> Result<T, ApiError> {
        let response = self.execute(ctx, request).await?;
        envelope::decode(call, &response)
    }

    /// Send a batch request; item failures come back as
    /// [`ApiError::BatchPartial`].
    pub async fn send_batch<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: Request,
        call: &'static str,
    ) -> Result<BatchResult<T>, ApiError> {
        let response = self.execute(ctx, request).await?;
        envelope::decode_batch(call, &response)
    }

    /// Send a request whose success body is ignored.
    pub async fn send_empty(&self, ctx: &CallContext, request: Request) -> Result<(), ApiError> {
        self.execute(ctx, request).await.map(|_| ())
    }
}

/// Backoff for a failed attempt, or `None` when it must not be retried.
fn retry_delay(policy: Option<&RetryPolicy>, attempt: u32, transient: bool) -> Option<Duration> {
    let policy = policy?;
    if !transient || attempt > policy.max_retries {
        return None;
    }
    Some(policy.backoff(attempt))
}

fn describe_outcome(outcome: &Result<HttpResponse, TransportError>) -> String {
    match outcome {
        Ok(response) => format!("status {}", response.status),
        Err(err) => err.to_string(),
    }
}
