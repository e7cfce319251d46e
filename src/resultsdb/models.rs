// ABOUTME: Wire types for the ResultsDB v2.0 REST API
// ABOUTME: Results, paginated result pages, and result creation requests

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Extra key/value data attached to a result. ResultsDB stores every value as a list.
pub type ResultData = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Testcase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_url: Option<String>,
}

/// A result as returned by `GET /v2.0/results`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResultsDbResult {
    pub id: u64,
    pub outcome: String,
    pub testcase: Testcase,
    #[serde(default)]
    pub groups: Vec<String>,
    pub submit_time: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub ref_url: Option<String>,
    #[serde(default, deserialize_with = "flexible_data")]
    pub data: ResultData,
}

impl ResultsDbResult {
    /// First value stored under `key`, if any.
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// One page of `GET /v2.0/results`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsPage {
    #[serde(default)]
    pub data: Vec<ResultsDbResult>,
    #[serde(default)]
    pub prev: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Body of `POST /v2.0/results`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateResult {
    pub outcome: String,
    pub testcase: Testcase,
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_url: Option<String>,
    pub data: ResultData,
}

/// `CreateResult` with the optional auth token ResultsDB expects inline.
#[derive(Debug, Serialize)]
pub(crate) struct AuthenticatedCreate<'a> {
    #[serde(flatten)]
    pub result: &'a CreateResult,
    #[serde(rename = "_auth_token", skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<&'a str>,
}

/// ResultsDB accepts scalars or lists for data values; normalize everything to lists of strings.
fn flexible_data<'de, D>(deserializer: D) -> Result<ResultData, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut data = ResultData::new();
    for (key, value) in raw.unwrap_or_default() {
        let values = match value {
            serde_json::Value::Array(items) => items.into_iter().filter_map(scalar_string).collect(),
            other => scalar_string(other).into_iter().collect(),
        };
        data.insert(key, values);
    }
    Ok(data)
}

fn scalar_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_deserialization() {
        let raw = json!({
            "id": 42,
            "outcome": "PASSED",
            "testcase": {"name": "org.centos.prod.ci.pipeline.complete", "ref_url": null, "href": "x"},
            "groups": ["27f94e36-62ec-11e6-83fd-525400d7d6a4"],
            "submit_time": "2018-01-10T12:00:00.000000",
            "note": "",
            "ref_url": "https://jenkins.example/job/1",
            "href": "https://resultsdb.example/api/v2.0/results/42",
            "data": {
                "msg_id": ["ID:abc-1"],
                "item": "libfoo-1.0-1.fc28",
                "retries": 3,
                "empty": null
            }
        });

        let result: ResultsDbResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.id, 42);
        assert_eq!(result.testcase.name, "org.centos.prod.ci.pipeline.complete");
        assert_eq!(result.data_value("msg_id"), Some("ID:abc-1"));
        assert_eq!(result.data["item"], vec!["libfoo-1.0-1.fc28".to_string()]);
        assert_eq!(result.data["retries"], vec!["3".to_string()]);
        assert!(result.data["empty"].is_empty());
        assert_eq!(result.data_value("missing"), None);
    }

    #[test]
    fn test_page_without_data_or_next() {
        let page: ResultsPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.data.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_authenticated_create_serialization() {
        let result = CreateResult {
            outcome: "FAILED".to_string(),
            testcase: Testcase {
                name: "dist.rpmdeplint".to_string(),
                ref_url: None,
            },
            groups: vec!["g1".to_string()],
            note: None,
            ref_url: Some("https://ci.example/1".to_string()),
            data: ResultData::new(),
        };

        let with_token = serde_json::to_value(AuthenticatedCreate {
            result: &result,
            auth_token: Some("secret"),
        })
        .unwrap();
        assert_eq!(with_token["_auth_token"], "secret");
        assert_eq!(with_token["outcome"], "FAILED");
        assert_eq!(with_token["testcase"], json!({"name": "dist.rpmdeplint"}));
        assert!(with_token.get("note").is_none());

        let without_token = serde_json::to_value(AuthenticatedCreate {
            result: &result,
            auth_token: None,
        })
        .unwrap();
        assert!(without_token.get("_auth_token").is_none());
    }
}
