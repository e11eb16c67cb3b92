use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every backend response is wrapped in `{success, message, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(data: T, message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            data: None,
        }
    }

    /// Server message, ignoring blanks
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Opaque handle the backend returns for an enrollment run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        TaskId(value)
    }
}

/// Data of a successful apply call. Passenger runs answer with `apply_id`,
/// truck runs with `task_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReceipt {
    #[serde(default, deserialize_with = "opaque_id")]
    pub apply_id: Option<String>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: Option<u8>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub sign_order_id: Option<String>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub verify_code_no: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of the verification-code confirmation. Missing identifiers go out as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub verify_code: String,
    pub order_id: Option<String>,
    pub sign_order_id: Option<String>,
    pub verify_code_no: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvinceList {
    #[serde(default)]
    pub all_provinces: Option<Vec<String>>,
    #[serde(default)]
    pub hot_provinces: Option<Vec<String>>,
}

/// Vehicle colors arrive either as plain names or as a `{name: code}` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VehicleColors {
    Names(Vec<String>),
    Codes(BTreeMap<String, i64>),
}

impl VehicleColors {
    /// Names in display order; coded tables are ordered by code.
    pub fn into_names(self) -> Vec<String> {
        match self {
            VehicleColors::Names(names) => names,
            VehicleColors::Codes(codes) => {
                let mut pairs: Vec<(String, i64)> = codes.into_iter().collect();
                pairs.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                pairs.into_iter().map(|(name, _)| name).collect()
            }
        }
    }
}

/// Data of the default-data lookup. Sections are optional so that a partial
/// answer only touches what it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultDataPayload {
    #[serde(default, alias = "all_provinces")]
    pub provinces: Option<Vec<String>>,
    #[serde(default, alias = "hotProvinces")]
    pub hot_provinces: Option<Vec<String>>,
    #[serde(default, rename = "vehicleColors", alias = "vehicle_colors")]
    pub vehicle_colors: Option<VehicleColors>,
    /// `default_province`, `default_vehicle_color`, truck dimension defaults, ...
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DefaultDataPayload {
    /// Scalar `default_*` entries rendered as strings
    pub fn default_values(&self) -> BTreeMap<String, String> {
        self.extra
            .iter()
            .filter(|(key, _)| key.starts_with("default_"))
            .filter_map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), rendered))
            })
            .collect()
    }
}

fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}

fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("progress out of range"))?,
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("progress is not numeric: {s}")))?,
        Some(other) => {
            return Err(de::Error::custom(format!(
                "expected numeric progress, got {other}"
            )))
        }
    };
    Ok(Some(raw.clamp(0.0, 100.0).round() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_without_data() {
        let envelope: Envelope<ApplyReceipt> =
            serde_json::from_value(json!({"success": false, "message": "duplicate VIN"})).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message(), Some("duplicate VIN"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_blank_message_is_ignored() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_value(json!({"success": true, "message": "  "})).unwrap();
        assert_eq!(envelope.message(), None);
    }

    #[test]
    fn test_apply_receipt_accepts_numeric_ids() {
        let receipt: ApplyReceipt = serde_json::from_value(json!({
            "apply_id": "T1",
            "order_id": 9001,
            "sign_order_id": "S-1",
            "verify_code_no": "",
            "progress": 10
        }))
        .unwrap();

        assert_eq!(receipt.apply_id.as_deref(), Some("T1"));
        assert_eq!(receipt.order_id.as_deref(), Some("9001"));
        assert_eq!(receipt.verify_code_no, None);
        assert_eq!(receipt.progress, Some(10));
    }

    #[test]
    fn test_progress_is_lenient() {
        let report: ProgressReport =
            serde_json::from_value(json!({"progress": "55", "status": "processing"})).unwrap();
        assert_eq!(report.progress, Some(55));

        let report: ProgressReport = serde_json::from_value(json!({"progress": 140.2})).unwrap();
        assert_eq!(report.progress, Some(100));

        let report: ProgressReport =
            serde_json::from_value(json!({"message": "排队中"})).unwrap();
        assert_eq!(report.progress, None);
    }

    #[test]
    fn test_progress_rejects_garbage() {
        let result: Result<ProgressReport, _> =
            serde_json::from_value(json!({"progress": {"value": 1}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_confirm_request_serializes_missing_ids_as_null() {
        let request = ConfirmRequest {
            verify_code: "0000".to_string(),
            order_id: Some("O1".to_string()),
            sign_order_id: None,
            verify_code_no: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "verifyCode": "0000",
                "orderId": "O1",
                "signOrderId": null,
                "verifyCodeNo": null
            })
        );
    }

    #[test]
    fn test_vehicle_colors_from_code_table() {
        let payload: DefaultDataPayload = serde_json::from_value(json!({
            "vehicleColors": {"黄色": 1, "蓝色": 0, "黑色": 2},
            "hot_provinces": ["苏", "桂"],
            "default_province": "苏",
            "default_axle_count": 3
        }))
        .unwrap();

        assert_eq!(
            payload.vehicle_colors.clone().unwrap().into_names(),
            vec!["蓝色", "黄色", "黑色"]
        );
        assert_eq!(payload.hot_provinces, Some(vec!["苏".to_string(), "桂".to_string()]));

        let defaults = payload.default_values();
        assert_eq!(defaults.get("default_province").map(String::as_str), Some("苏"));
        assert_eq!(defaults.get("default_axle_count").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_vehicle_colors_from_names() {
        let payload: DefaultDataPayload =
            serde_json::from_value(json!({"vehicleColors": ["蓝色", "黄色"]})).unwrap();
        assert_eq!(
            payload.vehicle_colors.unwrap().into_names(),
            vec!["蓝色".to_string(), "黄色".to_string()]
        );
        assert!(payload.provinces.is_none());
    }
}
