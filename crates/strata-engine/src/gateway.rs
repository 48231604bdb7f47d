use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{json, Value};
use strata_contracts::payload::{map_object, strip_nulls};
use strata_contracts::predictions::PredictionResource;

use crate::error::GatewayError;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/v1";
const DETECTION_PATH: &str = "person_detection";
const DEFAULT_TIMEOUT_S: f64 = 120.0;
const ERROR_BODY_MAX_CHARS: usize = 512;

/// One call to the remote inference service per invocation. Implementations
/// never retry, batch, cache or poll.
pub trait InferenceGateway: Send + Sync {
    fn detect(&self, image_ref: &str) -> Result<PredictionResource, GatewayError>;
    fn fetch_result(&self, id: &str) -> Result<PredictionResource, GatewayError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
        }
    }
}

impl GatewayConfig {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: normalize_api_base(api_base).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            ..Self::default()
        }
    }

    /// `STRATA_INFERENCE_BASE` and `STRATA_HTTP_TIMEOUT_S`, defaults otherwise.
    pub fn from_env() -> Self {
        let api_base = env::var("STRATA_INFERENCE_BASE")
            .ok()
            .and_then(|value| normalize_api_base(&value))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout_s = env::var("STRATA_HTTP_TIMEOUT_S")
            .ok()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_TIMEOUT_S)
            .clamp(1.0, 600.0);
        Self {
            api_base,
            timeout: Duration::from_secs_f64(timeout_s),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_loopback(&self) -> bool {
        Url::parse(&self.api_base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .map(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1"))
            .unwrap_or(false)
    }
}

fn normalize_api_base(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// [`InferenceGateway`] over JSON/HTTP.
pub struct HttpInferenceGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl HttpInferenceGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut builder = HttpClient::builder().timeout(config.timeout);
        if config.is_loopback() {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .context("failed to build inference HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn detection_endpoint(&self) -> String {
        format!("{}/{DETECTION_PATH}", self.config.api_base)
    }

    fn prediction_endpoint(&self, id: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.detection_endpoint()).map_err(|err| {
            GatewayError::Transport(format!(
                "invalid inference endpoint {}: {err}",
                self.detection_endpoint()
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Transport(format!(
                    "inference endpoint {} cannot take a path",
                    self.config.api_base
                ))
            })?
            .push(id);
        Ok(url)
    }
}

impl InferenceGateway for HttpInferenceGateway {
    fn detect(&self, image_ref: &str) -> Result<PredictionResource, GatewayError> {
        let endpoint = self.detection_endpoint();
        let body = strip_nulls(map_object(json!({ "image": image_ref })));
        let response = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&Value::Object(body))
            .send()
            .map_err(|err| transport_error(&format!("POST {endpoint}"), &err))?;
        resource_or_error(response)
    }

    fn fetch_result(&self, id: &str) -> Result<PredictionResource, GatewayError> {
        let url = self.prediction_endpoint(id)?;
        let response = self
            .http
            .get(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .map_err(|err| transport_error(&format!("GET {url}"), &err))?;
        resource_or_error(response)
    }
}

fn resource_or_error(response: HttpResponse) -> Result<PredictionResource, GatewayError> {
    let code = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| transport_error("reading inference response body", &err))?;
    if code != 200 {
        return Err(GatewayError::Inference {
            status: code,
            detail: error_detail(code, &body),
        });
    }
    let parsed: Value = serde_json::from_str(&body)
        .map_err(|err| GatewayError::Decode(format!("{err}: {}", truncate_text(&body, 128))))?;
    if !parsed.is_object() {
        return Err(GatewayError::Decode(format!(
            "expected a JSON object, got {}",
            truncate_text(&body, 128)
        )));
    }
    PredictionResource::from_value(parsed).map_err(|err| GatewayError::Decode(err.to_string()))
}

/// `detail` from an error body `{ "detail": ... }`, or the raw body when the
/// service did not send JSON.
fn error_detail(code: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| parsed.get("detail").cloned());
    match detail {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {code}")
            } else {
                truncate_text(trimmed, ERROR_BODY_MAX_CHARS)
            }
        }
        Some(other) => truncate_text(&other.to_string(), ERROR_BODY_MAX_CHARS),
    }
}

fn transport_error(context: &str, err: &reqwest::Error) -> GatewayError {
    let mut parts = vec![context.to_string()];
    let mut cause: Option<&dyn std::error::Error> = Some(err);
    while let Some(current) = cause {
        let text = current.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        cause = current.source();
    }
    GatewayError::Transport(truncate_text(&parts.join(" | caused by: "), ERROR_BODY_MAX_CHARS))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
