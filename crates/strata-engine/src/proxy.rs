//! Handlers for the hosting layer's local endpoints.
//!
//! `submit` takes `{ image, mask }` and `lookup` takes an id; both forward to
//! the inference service one to one and hand its JSON object back unchanged.
//! Any upstream failure is answered with status 500 and the upstream
//! `detail` passed through unchanged.
//!
//! A request with no `image` (or a blank id) never reaches the service: it is
//! rejected up front with status 400 and a local `detail`. Status 500 is
//! reserved for failures the service or the transport reported.

use serde_json::{json, Value};
use strata_contracts::payload::{map_object, strip_nulls};
use strata_contracts::predictions::PredictionResource;

use crate::error::GatewayError;
use crate::gateway::InferenceGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyReply {
    pub status: u16,
    pub body: Value,
}

impl ProxyReply {
    fn ok(resource: PredictionResource) -> Self {
        Self {
            status: 200,
            body: resource.into_value(),
        }
    }

    fn error(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "detail": detail.into() }),
        }
    }

    fn upstream_failure(err: &GatewayError) -> Self {
        Self::error(500, err.detail())
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub fn submit(gateway: &dyn InferenceGateway, body: Value) -> ProxyReply {
    let body = strip_nulls(map_object(body));
    let Some(image) = body
        .get("image")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|image| !image.is_empty())
    else {
        return ProxyReply::error(400, "image is required");
    };
    match gateway.detect(image) {
        Ok(resource) => ProxyReply::ok(resource),
        Err(err) => ProxyReply::upstream_failure(&err),
    }
}

pub fn lookup(gateway: &dyn InferenceGateway, id: &str) -> ProxyReply {
    let id = id.trim();
    if id.is_empty() {
        return ProxyReply::error(400, "id is required");
    }
    match gateway.fetch_result(id) {
        Ok(resource) => ProxyReply::ok(resource),
        Err(err) => ProxyReply::upstream_failure(&err),
    }
}
