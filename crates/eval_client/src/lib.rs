//! HTTP client for the evaluation platform: session start/play/end with
//! the API-KEY and SESSION-ID headers, status-code taxonomy, and an
//! explicit retry loop (exponential backoff with jitter) for transport
//! failures. Protocol rejections are never retried.

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

use core_types::{ApiError, EvalService, GameHour, HourOutcome, RoundDecision};
use wire::{HourResponseDto, PlayRoundRequest};

const API_KEY_HEADER: &str = "API-KEY";
const SESSION_ID_HEADER: &str = "SESSION-ID";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    /// Relative jitter, e.g. 0.2 for plus/minus 20 percent.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based; no delay before the
    /// first). `roll` is uniform in [-1, 1].
    fn delay_before(&self, attempt: u32, roll: f64) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = self.factor.powi(attempt as i32 - 2);
        let base = self.base_delay.as_secs_f64() * exp;
        Duration::from_secs_f64(base * (1.0 + self.jitter * roll.clamp(-1.0, 1.0)))
    }
}

#[derive(Debug, Clone)]
pub struct EvalClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl EvalClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_retry(base_url, api_key, RetryPolicy::default())
    }

    pub fn with_retry(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
            retry,
        }
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        session_id: Option<&str>,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key);
        if let Some(id) = session_id {
            request = request.header(SESSION_ID_HEADER, id);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        classify_status(path, response).await
    }

    /// Retry transport failures with exponential backoff; surface
    /// everything else immediately.
    async fn with_retry_loop<B, T, F>(&self, path: &str, session_id: Option<&str>, body: Option<&B>, parse: F) -> Result<T, ApiError>
    where
        B: Serialize,
        F: Fn(String) -> Result<T, ApiError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let roll = rand::thread_rng().gen_range(-1.0..=1.0);
            let delay = self.retry.delay_before(attempt, roll);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.post(path, session_id, body).await {
                Ok(response) => {
                    let text = response
                        .text()
                        .await
                        .map_err(|err| ApiError::Transport(err.to_string()))?;
                    return parse(text);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(%path, attempt, %err, "transport failure, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn classify_status(path: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{path}: {status} {body}");
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(ApiError::Protocol(detail)),
        StatusCode::NOT_FOUND => Err(ApiError::SessionLost(detail)),
        StatusCode::CONFLICT => Err(ApiError::Conflict(detail)),
        s if s.is_server_error() => Err(ApiError::Transport(detail)),
        _ => Err(ApiError::Protocol(detail)),
    }
}

/// The platform answers the start call with the bare session id; some
/// deployments wrap it as `{"session_id": ...}`. Accept both.
fn parse_session_id(body: String) -> Result<String, ApiError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|err| ApiError::Protocol(format!("session start body: {err}")))?;
        if let Some(id) = value.get("session_id").and_then(|v| v.as_str()) {
            return Ok(id.to_string());
        }
        return Err(ApiError::Protocol(format!(
            "session start body without session_id: {trimmed}"
        )));
    }
    let id = trimmed.trim_matches('"');
    if id.is_empty() {
        return Err(ApiError::Protocol("empty session id".to_string()));
    }
    Ok(id.to_string())
}

fn parse_hour_response(body: String) -> Result<HourOutcome, ApiError> {
    let dto: HourResponseDto = serde_json::from_str(&body)
        .map_err(|err| ApiError::Protocol(format!("hour response: {err}")))?;
    let at = GameHour::from_day_hour(dto.day, dto.hour);
    let mut events = Vec::with_capacity(dto.flight_updates.len());
    for update in dto.flight_updates {
        let event_type = update.event_type.clone();
        match update.into_domain() {
            Some(event) => events.push(event),
            None => tracing::warn!(%event_type, "ignoring unknown flight event type"),
        }
    }
    Ok(HourOutcome {
        at,
        events,
        penalties: dto.penalties.into_iter().map(Into::into).collect(),
        total_cost: dto.total_cost,
    })
}

#[async_trait]
impl EvalService for EvalClient {
    async fn start_session(&self) -> Result<String, ApiError> {
        let result = self
            .with_retry_loop::<(), _, _>("/api/v1/session/start", None, None, parse_session_id)
            .await;
        match result {
            Err(ApiError::Conflict(detail)) => {
                // A stale session is still active for this key: end it once
                // and start again.
                tracing::warn!(%detail, "active session found, ending it first");
                self.end_session("").await?;
                self.with_retry_loop::<(), _, _>(
                    "/api/v1/session/start",
                    None,
                    None,
                    parse_session_id,
                )
                .await
            }
            other => other,
        }
    }

    async fn play_round(
        &self,
        session_id: &str,
        at: GameHour,
        decision: &RoundDecision,
    ) -> Result<HourOutcome, ApiError> {
        let request = PlayRoundRequest::from_decision(at, decision);
        self.with_retry_loop(
            "/api/v1/play/round",
            Some(session_id),
            Some(&request),
            parse_hour_response,
        )
        .await
    }

    async fn end_session(&self, session_id: &str) -> Result<HourOutcome, ApiError> {
        let session = (!session_id.is_empty()).then_some(session_id);
        self.with_retry_loop::<(), _, _>("/api/v1/session/end", session, None, parse_hour_response)
            .await
    }
}
