use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Opaque per-request context forwarded to the scorer untouched.
pub type RequestContext = BTreeMap<String, serde_json::Value>;

/// Catalog metadata attached to a ranked item.
pub type ItemMetadata = BTreeMap<String, serde_json::Value>;

/// Request body as received on the wire.
///
/// Field aliases keep older clients (`user_id`, `top_k`, `exclude_ids`) working.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecommendationRequest {
    #[serde(default, alias = "user_id")]
    pub subject_id: Option<String>,

    #[serde(default, alias = "top_k", deserialize_with = "deserialize_limit")]
    pub result_limit: Option<i64>,

    #[serde(default, alias = "exclude_ids")]
    pub exclusions: Option<Vec<String>>,

    #[serde(default)]
    pub context: Option<RequestContext>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub subject_id: String,
    pub result_limit: usize,
    pub exclusions: HashSet<String>,
    pub context: RequestContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    CollaborativeFiltering,
    ItemSimilarity,
    Popularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item_id: String,
    pub score: f32,
    pub reason_code: ReasonCode,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub subject_id: String,
    pub items: Vec<RankedItem>,
    pub count: usize,
    pub model_version: String,
}

impl RecommendationResponse {
    pub fn new(subject_id: String, items: Vec<RankedItem>, model_version: String) -> Self {
        let count = items.len();
        Self {
            subject_id,
            items,
            count,
            model_version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarItemsResponse {
    pub item_id: String,
    pub items: Vec<RankedItem>,
    pub count: usize,
    pub model_version: String,
}

/// Query string shared by the GET convenience endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default, alias = "top_k", deserialize_with = "deserialize_limit")]
    pub result_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBatchRequest {
    #[serde(default, alias = "user_ids")]
    pub subject_ids: Option<Vec<String>>,

    #[serde(default, alias = "top_k", deserialize_with = "deserialize_limit")]
    pub result_limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntryError {
    pub kind: String,
    pub message: String,
}

/// One subject's outcome inside a batch; entries succeed or fail independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Ok {
        subject_id: String,
        items: Vec<RankedItem>,
        count: usize,
        model_version: String,
    },
    Error {
        subject_id: String,
        error: BatchEntryError,
    },
}

impl BatchEntry {
    pub fn subject_id(&self) -> &str {
        match self {
            BatchEntry::Ok { subject_id, .. } | BatchEntry::Error { subject_id, .. } => {
                subject_id
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BatchEntry::Ok { .. })
    }
}

impl From<RecommendationResponse> for BatchEntry {
    fn from(response: RecommendationResponse) -> Self {
        BatchEntry::Ok {
            subject_id: response.subject_id,
            items: response.items,
            count: response.count,
            model_version: response.model_version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecommendationResponse {
    pub total_subjects: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchEntry>,
}

impl BatchRecommendationResponse {
    pub fn new(results: Vec<BatchEntry>) -> Self {
        let succeeded = results.iter().filter(|entry| entry.is_ok()).count();
        Self {
            total_subjects: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub model_loaded: bool,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    LoadFailed,
}

/// Snapshot of the model lifecycle, served by the model info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub status: ModelStatus,
    pub ready: bool,
    pub version: Option<String>,
    pub path: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub path: Option<String>,
}

/// Accepts any integer for a result limit, saturating values outside `i64`.
///
/// Huge positive limits must still clamp to the ceiling instead of failing to parse.
/// Query strings arrive as text, so numeric strings are accepted as well.
fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<SaturatingLimit>::deserialize(deserializer).map(|limit| limit.map(|l| l.0))
}

struct SaturatingLimit(i64);

impl<'de> Deserialize<'de> for SaturatingLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SaturatingLimitVisitor)
    }
}

struct SaturatingLimitVisitor;

impl<'de> Visitor<'de> for SaturatingLimitVisitor {
    type Value = SaturatingLimit;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer result_limit")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(SaturatingLimit(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(SaturatingLimit(i64::try_from(v).unwrap_or(i64::MAX)))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Self::Value, E> {
        Ok(SaturatingLimit(
            i64::try_from(v).unwrap_or(if v > 0 { i64::MAX } else { i64::MIN }),
        ))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(SaturatingLimit(i64::try_from(v).unwrap_or(i64::MAX)))
    }

    // serde_json hands integers beyond u64 over as floats
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() || v.fract() != 0.0 {
            return Err(E::invalid_value(de::Unexpected::Float(v), &self));
        }
        // `as` saturates at the i64 bounds
        Ok(SaturatingLimit(v as i64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(SaturatingLimit(n));
        }

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Ok(SaturatingLimit(if negative { i64::MIN } else { i64::MAX }))
        } else {
            Err(E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_field_aliases() {
        let raw: RawRecommendationRequest = serde_json::from_str(
            r#"{"user_id": "u1", "top_k": 5, "exclude_ids": ["item_1"]}"#,
        )
        .unwrap();

        assert_eq!(raw.subject_id.as_deref(), Some("u1"));
        assert_eq!(raw.result_limit, Some(5));
        assert_eq!(raw.exclusions, Some(vec!["item_1".to_string()]));
    }

    #[test]
    fn test_batch_entry_serialization() {
        let entry = BatchEntry::Error {
            subject_id: "u2".to_string(),
            error: BatchEntryError {
                kind: "internal_error".to_string(),
                message: "Internal server error".to_string(),
            },
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["subject_id"], "u2");
        assert_eq!(json["error"]["kind"], "internal_error");
    }

    #[test]
    fn test_batch_response_counts() {
        let ok = BatchEntry::from(RecommendationResponse::new(
            "u1".to_string(),
            vec![],
            "v1.0".to_string(),
        ));
        let failed = BatchEntry::Error {
            subject_id: "u2".to_string(),
            error: BatchEntryError {
                kind: "timeout".to_string(),
                message: "Inference request timed out".to_string(),
            },
        };

        let response = BatchRecommendationResponse::new(vec![ok, failed]);
        assert_eq!(response.total_subjects, 2);
        assert_eq!(response.succeeded, 1);
        assert_eq!(response.failed, 1);
    }

    #[test]
    fn test_oversized_limits_saturate() {
        let raw: RawRecommendationRequest = serde_json::from_str(
            r#"{"subject_id": "u1", "result_limit": 18446744073709551615}"#,
        )
        .unwrap();
        assert_eq!(raw.result_limit, Some(i64::MAX));

        let raw: RawRecommendationRequest = serde_json::from_str(
            r#"{"subject_id": "u1", "result_limit": 99999999999999999999999}"#,
        )
        .unwrap();
        assert_eq!(raw.result_limit, Some(i64::MAX));

        let raw: RawRecommendationRequest = serde_json::from_str(
            r#"{"subject_id": "u1", "result_limit": -99999999999999999999999}"#,
        )
        .unwrap();
        assert_eq!(raw.result_limit, Some(i64::MIN));
    }

    #[test]
    fn test_limit_rejects_non_integers() {
        assert!(serde_json::from_str::<RawRecommendationRequest>(
            r#"{"subject_id": "u1", "result_limit": 2.5}"#
        )
        .is_err());
        assert!(serde_json::from_str::<RawRecommendationRequest>(
            r#"{"subject_id": "u1", "result_limit": "lots"}"#
        )
        .is_err());
    }

    #[test]
    fn test_null_limit_means_default() {
        let raw: RawBatchRequest =
            serde_json::from_str(r#"{"subject_ids": ["u1"], "result_limit": null}"#).unwrap();
        assert_eq!(raw.result_limit, None);
    }
}
