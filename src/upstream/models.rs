//! Upstream data types and their wire representations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::UpstreamError;

/// `owner/name` or `owner/name:version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl ModelRef {
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let invalid = || UpstreamError::InvalidModel(raw.to_string());

        let (owner, rest) = raw.split_once('/').ok_or_else(invalid)?;
        let (name, version) = match rest.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (rest, None),
        };

        let segment_ok = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        };
        if !segment_ok(owner) || !segment_ok(name) {
            return Err(invalid());
        }
        if let Some(version) = version {
            if version.is_empty() || !version.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid());
            }
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// `owner/name` without the version
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}:{}", self.owner, self.name, version),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}

/// A search hit with its input schema when it could be fetched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub run_count: u64,
    pub input_schema: Option<Value>,
}

impl ModelSummary {
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prediction normalized from the upstream representation
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    /// Output URLs
    pub output: Vec<String>,
    pub error: Option<String>,
    /// Seconds of model time reported by `metrics.predict_time`
    pub predict_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPrediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    metrics: Option<RawMetrics>,
}

#[derive(Debug, Deserialize)]
struct RawMetrics {
    #[serde(default)]
    predict_time: Option<f64>,
}

impl From<RawPrediction> for Prediction {
    fn from(raw: RawPrediction) -> Self {
        let error = match raw.error {
            Value::Null => None,
            Value::String(message) => Some(message),
            other => Some(other.to_string()),
        };

        Self {
            id: raw.id,
            status: raw.status,
            output: output_urls(&raw.output),
            error,
            predict_time: raw.metrics.and_then(|metrics| metrics.predict_time),
        }
    }
}

/// Output is a single string or a (possibly nested) array of strings
fn output_urls(output: &Value) -> Vec<String> {
    match output {
        Value::String(url) => vec![url.clone()],
        Value::Array(items) => items.iter().flat_map(output_urls).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawModel {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub latest_version: Option<RawVersion>,
}

impl RawModel {
    /// `latest_version.openapi_schema.components.schemas.Input`
    pub fn input_schema(&self) -> Option<Value> {
        self.latest_version
            .as_ref()?
            .openapi_schema
            .as_ref()?
            .pointer("/components/schemas/Input")
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawVersion {
    #[serde(default)]
    pub openapi_schema: Option<Value>,
}

/// Search hits come either wrapped (`{"model": {...}}`) or bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SearchHit {
    Wrapped { model: RawModel },
    Bare(RawModel),
}

impl SearchHit {
    pub fn into_model(self) -> RawModel {
        match self {
            SearchHit::Wrapped { model } | SearchHit::Bare(model) => model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub models: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_ref_parse() {
        let model = ModelRef::parse("black-forest-labs/flux-schnell").unwrap();
        assert_eq!(model.owner, "black-forest-labs");
        assert_eq!(model.name, "flux-schnell");
        assert_eq!(model.version, None);
        assert_eq!(model.to_string(), "black-forest-labs/flux-schnell");

        let versioned = ModelRef::parse("stability-ai/sdxl:39ed52f2").unwrap();
        assert_eq!(versioned.version.as_deref(), Some("39ed52f2"));
        assert_eq!(versioned.slug(), "stability-ai/sdxl");
    }

    #[test]
    fn test_model_ref_rejects_bad_ids() {
        for raw in ["", "noslash", "/name", "owner/", "a/b/c", "a/..", "a/b:", "a/b:v-1", "a b/c"] {
            assert!(ModelRef::parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_prediction_from_array_output() {
        let raw: RawPrediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://x/y.png", "https://x/z.png"],
            "error": null,
            "metrics": {"predict_time": 2.1}
        }))
        .unwrap();
        let prediction = Prediction::from(raw);

        assert_eq!(prediction.status, PredictionStatus::Succeeded);
        assert_eq!(prediction.output, vec!["https://x/y.png", "https://x/z.png"]);
        assert_eq!(prediction.predict_time, Some(2.1));
        assert_eq!(prediction.error, None);
    }

    #[test]
    fn test_prediction_from_string_output_and_missing_fields() {
        let raw: RawPrediction =
            serde_json::from_value(json!({"id": "p2", "status": "processing", "output": "https://x/a.webp"}))
                .unwrap();
        let prediction = Prediction::from(raw);
        assert_eq!(prediction.output, vec!["https://x/a.webp"]);
        assert_eq!(prediction.predict_time, None);
        assert!(!prediction.status.is_terminal());
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let raw: RawPrediction = serde_json::from_value(json!({"id": "p3", "status": "queued"})).unwrap();
        assert_eq!(Prediction::from(raw).status, PredictionStatus::Unknown);
    }

    #[test]
    fn test_structured_error_kept_as_text() {
        let raw: RawPrediction =
            serde_json::from_value(json!({"id": "p4", "status": "failed", "error": {"code": "E1"}})).unwrap();
        assert_eq!(Prediction::from(raw).error.as_deref(), Some(r#"{"code":"E1"}"#));
    }

    #[test]
    fn test_search_hits_wrapped_or_bare() {
        let response: SearchResponse = serde_json::from_value(json!({
            "models": [
                {"model": {"owner": "a", "name": "b", "run_count": 5}},
                {"owner": "c", "name": "d"}
            ]
        }))
        .unwrap();
        let models: Vec<RawModel> = response.models.into_iter().map(SearchHit::into_model).collect();
        assert_eq!(models[0].owner, "a");
        assert_eq!(models[0].run_count, 5);
        assert_eq!(models[1].name, "d");
    }

    #[test]
    fn test_input_schema_pointer() {
        let model: RawModel = serde_json::from_value(json!({
            "owner": "a",
            "name": "b",
            "latest_version": {"openapi_schema": {"components": {"schemas": {"Input": {"type": "object"}}}}}
        }))
        .unwrap();
        assert_eq!(model.input_schema(), Some(json!({"type": "object"})));
    }
}
