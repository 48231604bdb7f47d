mod store;

pub use store::PredictionStore;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Starting | Self::Processing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// What was sent for one edit: the base image reference and the optional mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub image: String,
    pub mask: Option<String>,
}

/// One completed edit in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub input: PredictionInput,
    pub output: Option<String>,
    pub status: PredictionStatus,
    pub error: Option<String>,
    pub created_at: String,
}

impl Prediction {
    pub fn succeeded(id: impl Into<String>, input: PredictionInput, output: String) -> Self {
        Self {
            id: id.into(),
            input,
            output: Some(output),
            status: PredictionStatus::Succeeded,
            error: None,
            created_at: now_utc_iso(),
        }
    }
}

/// Prediction-shaped resource as returned by the inference service.
///
/// The decoded JSON object is kept as-is so it can be handed on unchanged;
/// the accessors read `id`, `status`, `output` and `error` out of it. Every
/// key is optional on the wire. The person detection backend answers
/// `{status, output}` without an id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResource {
    body: Map<String, Value>,
}

impl PredictionResource {
    /// Fails unless `value` is a JSON object.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    /// Service id; numeric ids are read as their decimal text.
    pub fn id(&self) -> Option<String> {
        match self.body.get("id")? {
            Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Service id, or a generated `local-<uuid>` when the service sent none.
    pub fn id_or_local(&self) -> String {
        self.id()
            .unwrap_or_else(|| format!("local-{}", Uuid::new_v4()))
    }

    pub fn status(&self) -> PredictionStatus {
        let raw = self
            .body
            .get("status")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        match PredictionStatus::parse(raw) {
            Some(status) => status,
            None if raw.is_empty() => {
                if self.output_ref().is_some() {
                    PredictionStatus::Succeeded
                } else {
                    PredictionStatus::Failed
                }
            }
            None => PredictionStatus::Processing,
        }
    }

    /// First image reference found in `output` (string, list, or `{url}` object).
    pub fn output_ref(&self) -> Option<String> {
        let mut refs = Vec::new();
        if let Some(output) = self.body.get("output") {
            collect_refs(output, &mut refs);
        }
        refs.into_iter().next()
    }

    /// `error`, falling back to `detail`.
    pub fn error_text(&self) -> Option<String> {
        ["error", "detail"]
            .into_iter()
            .filter_map(|key| self.body.get(key))
            .find_map(|value| match value {
                Value::Null => None,
                Value::String(text) if text.trim().is_empty() => None,
                Value::String(text) => Some(text.trim().to_string()),
                other => Some(other.to_string()),
            })
    }
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                collect_refs(row, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                collect_refs(url, out);
            }
        }
        _ => {}
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PredictionResource, PredictionStatus};

    #[test]
    fn resource_without_id_or_status_reads_as_succeeded() -> anyhow::Result<()> {
        let resource = PredictionResource::from_value(json!({
            "output": "data:image/jpeg;base64,AAAA",
        }))?;
        assert_eq!(resource.status(), PredictionStatus::Succeeded);
        assert!(resource.id_or_local().starts_with("local-"));
        assert_eq!(
            resource.output_ref().as_deref(),
            Some("data:image/jpeg;base64,AAAA")
        );
        Ok(())
    }

    #[test]
    fn resource_keeps_service_id_and_pending_status() -> anyhow::Result<()> {
        let resource = PredictionResource::from_value(json!({
            "id": "p-42",
            "status": "processing",
            "output": null,
        }))?;
        assert_eq!(resource.id_or_local(), "p-42");
        assert!(resource.status().is_pending());
        assert_eq!(resource.output_ref(), None);
        Ok(())
    }

    #[test]
    fn output_ref_takes_first_entry_of_list_or_url_object() -> anyhow::Result<()> {
        let listed = PredictionResource::from_value(json!({
            "status": "succeeded",
            "output": ["https://cdn.example/a.png", "https://cdn.example/b.png"],
        }))?;
        assert_eq!(
            listed.output_ref().as_deref(),
            Some("https://cdn.example/a.png")
        );

        let object = PredictionResource::from_value(json!({
            "status": "succeeded",
            "output": {"url": "https://cdn.example/c.png"},
        }))?;
        assert_eq!(
            object.output_ref().as_deref(),
            Some("https://cdn.example/c.png")
        );
        Ok(())
    }

    #[test]
    fn unknown_status_string_is_treated_as_pending() -> anyhow::Result<()> {
        let resource = PredictionResource::from_value(json!({"status": "queued"}))?;
        assert_eq!(resource.status(), PredictionStatus::Processing);

        let bare = PredictionResource::from_value(json!({}))?;
        assert_eq!(bare.status(), PredictionStatus::Failed);
        Ok(())
    }

    #[test]
    fn resource_keeps_unknown_keys_and_numeric_ids() -> anyhow::Result<()> {
        let body = json!({
            "id": 42,
            "status": "failed",
            "error": null,
            "detail": "no person detected",
            "urls": {"get": "http://localhost:8000/v1/person_detection/42"},
        });
        let resource = PredictionResource::from_value(body.clone())?;
        assert_eq!(resource.id().as_deref(), Some("42"));
        assert_eq!(resource.error_text().as_deref(), Some("no person detected"));
        assert_eq!(serde_json::to_value(&resource)?, body);
        assert_eq!(resource.into_value(), body);

        assert!(PredictionResource::from_value(json!(["not", "an", "object"])).is_err());
        Ok(())
    }

    #[test]
    fn status_parse_accepts_both_cancel_spellings() {
        assert_eq!(
            PredictionStatus::parse("Cancelled"),
            Some(PredictionStatus::Canceled)
        );
        assert_eq!(
            PredictionStatus::parse("canceled"),
            Some(PredictionStatus::Canceled)
        );
        assert!(PredictionStatus::Canceled.is_terminal());
    }
}
