//! Minimal HTTP double for the layer backend and the WFS endpoints it points to.
//!
//! Routes are matched on method and path; the query string is recorded but
//! not used for matching. Unknown routes answer 404.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use tokio::task::JoinHandle;
use url::form_urlencoded;

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn json(value: &Value) -> Self {
        Self::text(200, "application/json", value.to_string())
    }

    pub fn xml(body: impl Into<String>) -> Self {
        Self::text(200, "text/xml; subtype=gml/3.1.1", body)
    }

    pub fn text(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
            delay: None,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::text(status, "text/plain", body)
    }

    /// Hold the response back, e.g. to cancel the request meanwhile.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    /// Value of a query parameter, matched case-insensitively on the key.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.into_owned())
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind to an ephemeral localhost port and start serving.
    pub async fn start() -> Result<Self> {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(respond).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow!("Failed to bind mock server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// `http://127.0.0.1:<port>`
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Backend API base as the client expects it.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.origin())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin(), path)
    }

    pub fn mock(&self, method: &str, path: &str, response: MockResponse) {
        let mut routes = self.state.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert((method.to_ascii_uppercase(), path.to_string()), response);
    }

    /// Serve a layer configuration at `/api/ogc/wfst/{id}`.
    pub fn mock_layer(&self, id: &str, config: &Value) {
        self.mock("GET", &format!("/api/ogc/wfst/{}", id), MockResponse::json(config));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let recorded = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        content_type: header_text(header::CONTENT_TYPE),
        authorization: header_text(header::AUTHORIZATION),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let key = (recorded.method.clone(), recorded.path.clone());
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(recorded);

    let response = state
        .routes
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
        .cloned();
    let Some(response) = response else {
        return (StatusCode::NOT_FOUND, "no mock registered").into_response();
    };

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}
