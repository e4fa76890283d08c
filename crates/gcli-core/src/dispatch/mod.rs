//! Retry loop across pooled credentials.
//!
//! Each physical attempt: acquire → refresh → (discover project) → call → classify.
//! Rate-limited and auth-failed credentials are excluded for the rest of the
//! logical request; transient failures back off exponentially. Only `Fatal`,
//! `PoolExhausted` and `RetriesExhausted` leave [`Dispatcher::execute`].

mod backoff;
mod outcome;
#[cfg(test)]
mod tests;

pub use backoff::{apply_retry_strategy, backoff_delay, determine_retry_strategy, RetryStrategy};
pub use outcome::{classify_error, classify_status, error_for_status, upstream_message, AttemptOutcome};

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use gcli_types::models::config::RetryConfig;
use gcli_types::{CredentialRecord, GatewayError, OwnerScope};

use crate::pool::CredentialPool;
use crate::refresh::TokenRefresher;
use crate::upstream::retry_hint::retry_hint;
use crate::upstream::{Backend, BackendBody, BackendCall, BackendResponse};
use crate::usage::{ErrorLog, UsageEvent, UsageSink};

/// A translated request ready for the backend.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub scope: OwnerScope,
    /// Effective backend model
    pub model: String,
    /// Gemini `GenerateContentRequest`
    pub body: Value,
    pub stream: bool,
}

pub struct DispatchResponse {
    pub credential_id: String,
    pub status: u16,
    pub body: BackendBody,
}

impl std::fmt::Debug for DispatchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            BackendBody::Full(bytes) => format!("Full({} bytes)", bytes.len()),
            BackendBody::Stream(_) => "Stream".to_string(),
        };
        f.debug_struct("DispatchResponse")
            .field("credential_id", &self.credential_id)
            .field("status", &self.status)
            .field("body", &body)
            .finish()
    }
}

pub struct Dispatcher {
    pool: Arc<CredentialPool>,
    refresher: Arc<TokenRefresher>,
    backend: Arc<dyn Backend>,
    usage: Arc<dyn UsageSink>,
    errors: Arc<ErrorLog>,
    retry: RetryConfig,
}

/// Result of one attempt as seen by the loop.
enum Step {
    Done(DispatchResponse),
    Retry { outcome: AttemptOutcome, error: GatewayError },
    Abort(GatewayError),
}

impl Dispatcher {
    pub fn new(
        pool: Arc<CredentialPool>,
        refresher: Arc<TokenRefresher>,
        backend: Arc<dyn Backend>,
        usage: Arc<dyn UsageSink>,
        errors: Arc<ErrorLog>,
        retry: RetryConfig,
    ) -> Self {
        Self { pool, refresher, backend, usage, errors, retry }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn errors(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    /// Run `request` to a terminal result.
    ///
    /// At most `retry.max_attempts` credentials are tried, and at most that many
    /// backend calls are made.
    pub async fn execute(&self, request: &DispatchRequest) -> Result<DispatchResponse, GatewayError> {
        let trace_id = uuid::Uuid::new_v4().simple().to_string();
        let trace_id = &trace_id[..8];
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts: u32 = 0;
        let mut excluded: HashSet<String> = HashSet::new();
        let mut last_error: Option<GatewayError> = None;

        while attempts < max_attempts {
            let record = match self.pool.acquire(&request.scope, &excluded) {
                Ok(record) => record,
                Err(exhausted) => {
                    return Err(match last_error {
                        None => {
                            warn!("[Dispatch] [{}] No credential available in {}", trace_id, request.scope);
                            exhausted
                        },
                        Some(last) => GatewayError::RetriesExhausted { attempts, last: Box::new(last) },
                    });
                },
            };
            attempts += 1;

            match self.attempt(trace_id, request, record, &mut excluded).await {
                Step::Done(response) => {
                    if attempts > 1 {
                        info!(
                            "[Dispatch] [{}] Succeeded with {} on attempt {}/{}",
                            trace_id, response.credential_id, attempts, max_attempts
                        );
                    }
                    return Ok(response);
                },
                Step::Abort(error) => return Err(error),
                Step::Retry { outcome, error } => {
                    last_error = Some(error);
                    if attempts >= max_attempts {
                        break;
                    }
                    let strategy = determine_retry_strategy(outcome, &self.retry);
                    if !apply_retry_strategy(&strategy, attempts - 1, max_attempts, trace_id).await {
                        break;
                    }
                },
            }
        }

        let last = last_error.unwrap_or(GatewayError::Transient {
            status: None,
            message: "no attempt was made".to_string(),
        });
        warn!("[Dispatch] [{}] Retries exhausted after {} attempts: {}", trace_id, attempts, last);
        Err(GatewayError::RetriesExhausted { attempts, last: Box::new(last) })
    }

    async fn attempt(
        &self,
        trace_id: &str,
        request: &DispatchRequest,
        record: CredentialRecord,
        excluded: &mut HashSet<String>,
    ) -> Step {
        let credential_id = record.id.clone();
        let started = Instant::now();

        let (outcome, status, error) = match self.call_with(request, record).await {
            Ok(response) if response.is_success() => {
                let (prompt_tokens, completion_tokens) = token_counts(&response.body);
                self.pool.record_success(&credential_id).await;
                self.emit(
                    request,
                    &credential_id,
                    AttemptOutcome::Success,
                    Some(response.status),
                    started,
                    prompt_tokens,
                    completion_tokens,
                );
                return Step::Done(DispatchResponse {
                    credential_id,
                    status: response.status,
                    body: response.body,
                });
            },
            Ok(response) => {
                let status = response.status;
                let header = response.retry_after.clone();
                let text = response.into_text().await;
                let hint = retry_hint(header.as_deref(), &text);
                let error =
                    error_for_status(&credential_id, status, hint.map(|d| d.as_secs()), &text);
                (classify_status(status), Some(status), error)
            },
            Err(error) => {
                let status = match &error {
                    GatewayError::Transient { status, .. } => *status,
                    GatewayError::Fatal { status, .. } => Some(*status),
                    _ => None,
                };
                (classify_error(&error), status, error)
            },
        };

        self.emit(request, &credential_id, outcome, status, started, None, None);
        self.errors.push(Some(&credential_id), &request.model, status, &error.to_string());
        warn!(
            "[Dispatch] [{}] {} failed with {:?} (status {:?})",
            trace_id, credential_id, outcome, status
        );

        match outcome {
            AttemptOutcome::RateLimited => {
                let hint = match &error {
                    GatewayError::RateLimited { retry_after_secs, .. } => {
                        retry_after_secs.map(std::time::Duration::from_secs)
                    },
                    _ => None,
                };
                self.pool.record_rate_limited(&credential_id, hint).await;
                excluded.insert(credential_id);
            },
            AttemptOutcome::AuthError => {
                self.pool.record_failure(&credential_id, &error.to_string()).await;
                excluded.insert(credential_id);
            },
            AttemptOutcome::Transient => {
                self.pool.record_failure(&credential_id, &error.to_string()).await;
            },
            AttemptOutcome::Fatal | AttemptOutcome::Success => return Step::Abort(error),
        }
        Step::Retry { outcome, error }
    }

    /// Refresh, resolve the project and make the backend call.
    async fn call_with(
        &self,
        request: &DispatchRequest,
        record: CredentialRecord,
    ) -> Result<BackendResponse, GatewayError> {
        let record = self.refresher.ensure_fresh(record).await?;
        let Some(token) = record.access_token.as_ref() else {
            return Err(GatewayError::AuthInvalid {
                credential_id: record.id.clone(),
                message: "no access token after refresh".to_string(),
            });
        };

        let project_id = match &record.project_id {
            Some(project) => project.clone(),
            None => {
                let project = self
                    .backend
                    .discover_project(token.expose())
                    .await
                    .map_err(|e| discovery_error(e, &record.id))?;
                self.pool.store_project(&record.id, &project).await;
                project
            },
        };

        self.backend
            .call(BackendCall {
                access_token: token.expose(),
                project_id: &project_id,
                model: &request.model,
                request: &request.body,
                stream: request.stream,
            })
            .await
    }

    #[allow(clippy::too_many_arguments, reason = "flat event fields")]
    fn emit(
        &self,
        request: &DispatchRequest,
        credential_id: &str,
        outcome: AttemptOutcome,
        status: Option<u16>,
        started: Instant,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    ) {
        self.usage.record(&UsageEvent {
            credential_id: credential_id.to_string(),
            scope: request.scope.clone(),
            model: request.model.clone(),
            outcome,
            status,
            latency: started.elapsed(),
            prompt_tokens,
            completion_tokens,
        });
    }
}

/// A credential without a resolvable project cannot serve any request, so
/// non-transient discovery failures count against the credential.
fn discovery_error(error: GatewayError, id: &str) -> GatewayError {
    match error {
        GatewayError::Transient { .. } | GatewayError::RateLimited { .. } => error,
        GatewayError::AuthInvalid { message, .. } => {
            GatewayError::AuthInvalid { credential_id: id.to_string(), message }
        },
        other => GatewayError::AuthInvalid {
            credential_id: id.to_string(),
            message: format!("project discovery failed: {}", other),
        },
    }
}

/// Token counts from a complete (non-streamed) response body.
fn token_counts(body: &BackendBody) -> (Option<u32>, Option<u32>) {
    let BackendBody::Full(bytes) = body else {
        return (None, None);
    };
    let Ok(json) = serde_json::from_slice::<Value>(bytes) else {
        return (None, None);
    };
    let usage = json.get("response").unwrap_or(&json).get("usageMetadata");
    let count = |key: &str| {
        usage.and_then(|u| u.get(key)).and_then(Value::as_u64).map(|n| n as u32)
    };
    (count("promptTokenCount"), count("candidatesTokenCount"))
}
