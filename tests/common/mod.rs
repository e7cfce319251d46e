// ABOUTME: In-process fake ResultsDB v2.0 API for integration tests
// ABOUTME: Supports since/_sort/limit/data-key queries, pagination links, and result creation

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    base_url: String,
    results: Vec<Value>,
    posts: Vec<Value>,
    /// Message ids whose POST is answered with 400
    reject_msg_ids: HashSet<String>,
    /// Answer every POST with 409
    conflict_on_post: bool,
    /// Answer every GET with 503
    unavailable: bool,
    gets: u32,
}

#[derive(Clone, Default)]
pub struct FakeResultsDb {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeResultsDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<Value>) -> Self {
        let db = Self::new();
        db.inner.lock().unwrap().results = results;
        db
    }

    /// Bind to an ephemeral port and serve in the background. Returns the API URL.
    pub async fn start(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        self.inner.lock().unwrap().base_url = base_url.clone();

        let app = Router::new()
            .route("/api/v2.0/results", get(list_results).post(create_result))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("{}/api", base_url)
    }

    pub fn push_result(&self, result: Value) {
        self.inner.lock().unwrap().results.push(result);
    }

    pub fn reject(&self, msg_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .reject_msg_ids
            .insert(msg_id.to_string());
    }

    pub fn clear_rejections(&self) {
        self.inner.lock().unwrap().reject_msg_ids.clear();
    }

    pub fn set_conflict_on_post(&self, conflict: bool) {
        self.inner.lock().unwrap().conflict_on_post = conflict;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Every accepted or rejected POST body, in arrival order.
    pub fn posts(&self) -> Vec<Value> {
        self.inner.lock().unwrap().posts.clone()
    }

    pub fn results(&self) -> Vec<Value> {
        self.inner.lock().unwrap().results.clone()
    }

    pub fn get_count(&self) -> u32 {
        self.inner.lock().unwrap().gets
    }

    /// Message ids carried by the POST bodies, in arrival order.
    pub fn posted_msg_ids(&self) -> Vec<String> {
        self.posts()
            .iter()
            .map(|post| {
                post["data"]["centos_ci_resultsdb_msg_id"][0]
                    .as_str()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

/// A CentOS CI style result carrying `msg_id` in its data.
pub fn result(id: u64, msg_id: &str, outcome: &str, submit_time: &str) -> Value {
    json!({
        "id": id,
        "outcome": outcome,
        "testcase": {"name": "org.centos.prod.ci.pipeline.complete", "ref_url": null},
        "groups": ["27f94e36-62ec-11e6-83fd-525400d7d6a4"],
        "submit_time": submit_time,
        "note": "",
        "ref_url": format!("https://jenkins.example/job/{}/console", id),
        "data": {
            "msg_id": [msg_id],
            "item": [format!("libfoo-1.0-{}.fc28", id)]
        }
    })
}

fn data_matches(result: &Value, key: &str, expected: &str) -> bool {
    match &result["data"][key] {
        Value::Array(values) => values.iter().any(|v| v.as_str() == Some(expected)),
        Value::String(value) => value == expected,
        _ => false,
    }
}

async fn list_results(
    State(db): State<FakeResultsDb>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let mut state = db.inner.lock().unwrap();
    state.gets += 1;
    if state.unavailable {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }

    let mut limit = 20usize;
    let mut page = 0usize;
    let mut descending = false;
    let mut since: Option<String> = None;
    let mut filters = Vec::new();
    for (key, value) in &params {
        match key.as_str() {
            "limit" => limit = value.parse().unwrap_or(20),
            "page" => page = value.parse().unwrap_or(0),
            "_sort" => descending = value.starts_with("desc"),
            "since" => since = Some(value.clone()),
            _ => filters.push((key.clone(), value.clone())),
        }
    }

    let mut matching: Vec<Value> = state
        .results
        .iter()
        .filter(|r| match &since {
            Some(since) => r["submit_time"].as_str().unwrap_or_default() >= since.as_str(),
            None => true,
        })
        .filter(|r| filters.iter().all(|(k, v)| data_matches(r, k, v)))
        .cloned()
        .collect();
    matching.sort_by(|a, b| {
        let key_a = (a["submit_time"].as_str().unwrap_or_default(), a["id"].as_u64());
        let key_b = (b["submit_time"].as_str().unwrap_or_default(), b["id"].as_u64());
        key_a.cmp(&key_b)
    });
    if descending {
        matching.reverse();
    }

    let start = (page * limit).min(matching.len());
    let end = (start + limit).min(matching.len());
    let next = if end < matching.len() {
        let mut next_params: Vec<(String, String)> =
            params.into_iter().filter(|(k, _)| k != "page").collect();
        next_params.push(("page".to_string(), (page + 1).to_string()));
        let url = url::Url::parse_with_params(
            &format!("{}/api/v2.0/results", state.base_url),
            &next_params,
        )
        .unwrap();
        Value::String(url.to_string())
    } else {
        Value::Null
    };

    Json(json!({
        "data": matching[start..end].to_vec(),
        "prev": null,
        "next": next,
    }))
    .into_response()
}

async fn create_result(State(db): State<FakeResultsDb>, Json(body): Json<Value>) -> Response {
    let mut state = db.inner.lock().unwrap();
    state.posts.push(body.clone());

    let msg_id = body["data"]["centos_ci_resultsdb_msg_id"][0]
        .as_str()
        .unwrap_or_default()
        .to_string();
    if state.reject_msg_ids.contains(&msg_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "invalid outcome"})),
        )
            .into_response();
    }
    if state.conflict_on_post {
        return (StatusCode::CONFLICT, Json(json!({"message": "exists"}))).into_response();
    }

    let id = state.results.len() as u64 + 1;
    let mut stored = body;
    stored["id"] = json!(id);
    stored["submit_time"] = json!(format!("2030-01-01T00:00:{:02}.000000", id % 60));
    if let Some(object) = stored.as_object_mut() {
        object.remove("_auth_token");
    }
    state.results.push(stored.clone());

    (StatusCode::CREATED, Json(stored)).into_response()
}
