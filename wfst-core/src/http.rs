use reqwest::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::errors::{WfsError, WfsResult};

/// Upstream bodies embedded in errors are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 2_000;

/// Body and content type of a successful response.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub text: String,
}

/// Thin wrapper around a pooled `reqwest::Client` that applies URL
/// resolution, authentication and cancellation uniformly.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> WfsResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| WfsError::Configuration(format!("cannot build HTTP client: {}", err)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `{api_base}/<segments...>`, each segment percent-encoded on its own.
    pub fn backend_url(&self, segments: &[&str]) -> WfsResult<Url> {
        let mut url = Url::parse(&self.config.api_base).map_err(|err| {
            WfsError::Configuration(format!("invalid api_base '{}': {}", self.config.api_base, err))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                WfsError::Configuration(format!(
                    "api_base '{}' cannot carry a path",
                    self.config.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Absolute URL for a layer. Paths starting with `/` go through the
    /// backend origin (the proxy); anything else must already be absolute.
    pub fn resolve_layer_url(&self, layer_url: &str) -> WfsResult<Url> {
        let trimmed = layer_url.trim();
        if trimmed.is_empty() {
            return Err(WfsError::Configuration("layer has no url".to_string()));
        }
        if trimmed.starts_with('/') {
            let origin = Url::parse(&self.config.backend_origin).map_err(|err| {
                WfsError::Configuration(format!(
                    "invalid backend_origin '{}': {}",
                    self.config.backend_origin, err
                ))
            })?;
            return origin.join(trimmed).map_err(|err| {
                WfsError::Configuration(format!("invalid layer url '{}': {}", trimmed, err))
            });
        }
        Url::parse(trimmed)
            .map_err(|err| WfsError::Configuration(format!("invalid layer url '{}': {}", trimmed, err)))
    }

    fn is_backend(&self, url: &Url) -> bool {
        Url::parse(&self.config.backend_origin)
            .map(|origin| origin.origin() == url.origin())
            .unwrap_or(false)
    }

    fn authorize(&self, url: &Url, request: RequestBuilder) -> RequestBuilder {
        match self.config.auth_token.as_deref() {
            Some(token) if self.is_backend(url) => {
                request.header(AUTHORIZATION, format!("Bearer {}", token))
            }
            _ => request,
        }
    }

    /// GET without caching; non-2xx statuses become `Upstream` errors.
    pub async fn get_text(&self, url: Url, cancel: &CancelToken) -> WfsResult<FetchedBody> {
        debug!("GET {}", url);
        let request = self
            .authorize(&url, self.client.get(url.clone()))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        cancel.run(async move { read_success(request.send().await?).await }).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancelToken,
    ) -> WfsResult<T> {
        let body = self.get_text(url, cancel).await?;
        serde_json::from_str(&body.text).map_err(WfsError::from)
    }

    /// POST an XML document.
    pub async fn post_xml(
        &self,
        url: Url,
        document: String,
        cancel: &CancelToken,
    ) -> WfsResult<FetchedBody> {
        debug!("POST {} ({} bytes)", url, document.len());
        let request = self
            .authorize(&url, self.client.post(url.clone()))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/xml"))
            .body(document);
        cancel.run(async move { read_success(request.send().await?).await }).await
    }
}

async fn read_success(response: Response) -> WfsResult<FetchedBody> {
    let status = response.status();
    if !status.is_success() {
        // Best effort: a body that cannot be read still leaves the status.
        let body = response
            .text()
            .await
            .ok()
            .map(|text| truncate(&text, MAX_ERROR_BODY_CHARS))
            .filter(|text| !text.trim().is_empty());
        return Err(WfsError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase());
    let text = response.text().await?;
    Ok(FetchedBody { content_type, text })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
