//! Per-layer service metadata fetched from the backend.
//!
//! Results are never cached: the backend filters layers by access control,
//! so every read and write asks it again.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::errors::{WfsError, WfsResult};
use crate::http::HttpClient;

/// Fields requested by [`MetadataResolver::get_service_meta`].
pub const SERVICE_META_FIELDS: &[&str] = &["id", "caption", "projection", "layers", "serverType"];

/// Characters that are never valid in a layer id.
const FORBIDDEN_ID_CHARS: &[char] = &['\\', '<', '>', '"', '|', '*', '?'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Generic,
    Qgis,
}

/// Layer configuration as served by `GET {api_base}/ogc/wfst/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub caption: Option<String>,
    pub projection: Option<String>,
    #[serde(alias = "typeName", deserialize_with = "one_or_many")]
    pub layers: Vec<String>,
    pub geometry_field: Option<String>,
    /// Feature namespace URI.
    #[serde(rename = "uri")]
    pub namespace_uri: Option<String>,
    pub server_type: Option<String>,
    pub url: String,
}

impl LayerConfig {
    /// The qualified type name (`"workspace:type"`) edits go to.
    pub fn resolve_type_name(&self) -> WfsResult<String> {
        match self.layers.first().map(|name| name.trim()) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            Some(_) => Err(WfsError::Configuration(format!(
                "layer '{}' has a blank type name",
                self.id
            ))),
            None => Err(WfsError::Configuration(format!(
                "layer '{}' does not name any feature type",
                self.id
            ))),
        }
    }

    /// Explicit `serverType` wins. Without one, a URL containing "qgis" is
    /// taken as QGIS Server when `detect_from_url` is set.
    pub fn server_kind(&self, detect_from_url: bool) -> ServerKind {
        match self.server_type.as_deref().map(str::trim) {
            Some(kind) if kind.eq_ignore_ascii_case("qgis") => ServerKind::Qgis,
            Some(kind) if !kind.is_empty() => ServerKind::Generic,
            _ if detect_from_url && self.url.to_ascii_lowercase().contains("qgis") => {
                ServerKind::Qgis
            }
            _ => ServerKind::Generic,
        }
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// Subset of [`LayerConfig`] used by layer pickers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMeta {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub caption: Option<String>,
    pub projection: Option<String>,
    #[serde(alias = "typeName", deserialize_with = "one_or_many")]
    pub layers: Vec<String>,
    pub server_type: Option<String>,
}

/// Entry of the layer listing; fields beyond id and caption pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reject ids that could escape the `ogc/wfst/{id}` path.
pub fn validate_layer_id(id: &str) -> WfsResult<&str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(WfsError::Configuration("layer id cannot be empty".to_string()));
    }
    if trimmed.chars().all(|c| c == '.') {
        return Err(WfsError::Configuration(format!(
            "layer id '{}' is not a path segment",
            trimmed
        )));
    }
    if trimmed.contains("..") {
        return Err(WfsError::Configuration(format!(
            "layer id '{}' cannot contain '..'",
            trimmed
        )));
    }
    if let Some(c) = trimmed.chars().find(|c| FORBIDDEN_ID_CHARS.contains(c)) {
        return Err(WfsError::Configuration(format!(
            "layer id '{}' contains forbidden character '{}'",
            trimmed, c
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
pub struct MetadataResolver {
    http: HttpClient,
}

impl MetadataResolver {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn list_services(
        &self,
        fields: &[&str],
        cancel: &CancelToken,
    ) -> WfsResult<Vec<LayerSummary>> {
        let mut url = self.http.backend_url(&["ogc", "wfst"])?;
        append_fields(&mut url, fields);
        self.http.get_json(url, cancel).await.map_err(|err| {
            warn!("list_services failed: {}", err);
            err
        })
    }

    pub async fn get_service_meta(&self, id: &str, cancel: &CancelToken) -> WfsResult<ServiceMeta> {
        let id = validate_layer_id(id)?;
        let mut url = self.http.backend_url(&["ogc", "wfst", id])?;
        append_fields(&mut url, SERVICE_META_FIELDS);
        self.http.get_json(url, cancel).await.map_err(|err| {
            warn!("get_service_meta failed for layer {}: {}", id, err);
            err
        })
    }

    /// Full configuration; an empty `fields` slice asks for everything.
    pub async fn fetch_layer(
        &self,
        id: &str,
        fields: &[&str],
        cancel: &CancelToken,
    ) -> WfsResult<LayerConfig> {
        let id = validate_layer_id(id)?;
        let mut url = self.http.backend_url(&["ogc", "wfst", id])?;
        append_fields(&mut url, fields);
        let layer: LayerConfig = self.http.get_json(url, cancel).await.map_err(|err| {
            warn!("fetch_layer failed for layer {}: {}", id, err);
            err
        })?;
        debug!(
            "Resolved layer {} (types {:?}, projection {:?})",
            id, layer.layers, layer.projection
        );
        Ok(layer)
    }
}

fn append_fields(url: &mut url::Url, fields: &[&str]) {
    if !fields.is_empty() {
        url.query_pairs_mut().append_pair("fields", &fields.join(","));
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Missing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => name
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        OneOrMany::Many(names) => names,
        OneOrMany::Missing(()) => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_layer_id() {
        assert_eq!(validate_layer_id(" roads ").unwrap(), "roads");
        for bad in ["", "   ", ".", " . ", "../etc", "a..b", "a\\b", "a<b", "a>b", "a\"b", "a|b", "a*b", "a?b"] {
            assert!(
                matches!(validate_layer_id(bad), Err(WfsError::Configuration(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_layer_config_from_backend_json() {
        let layer: LayerConfig = serde_json::from_value(json!({
            "id": 12,
            "caption": "Roads",
            "projection": "EPSG:3006",
            "layers": ["ws:roads"],
            "geometryField": "geom",
            "uri": "http://example.org/ws",
            "serverType": "geoserver",
            "url": "/api/ogc/wfst/proxy/12"
        }))
        .unwrap();

        assert_eq!(layer.id, "12");
        assert_eq!(layer.resolve_type_name().unwrap(), "ws:roads");
        assert_eq!(layer.namespace_uri(), Some("http://example.org/ws"));
        assert_eq!(layer.server_kind(true), ServerKind::Generic);
    }

    #[test]
    fn test_layers_as_string() {
        let layer: LayerConfig =
            serde_json::from_value(json!({"id": "a", "layers": "ws:a, ws:b", "url": "/x"})).unwrap();
        assert_eq!(layer.layers, vec!["ws:a", "ws:b"]);
    }

    #[test]
    fn test_empty_layers_fail_type_name_resolution() {
        let layer: LayerConfig =
            serde_json::from_value(json!({"id": "a", "layers": [], "url": "/x"})).unwrap();
        assert!(matches!(
            layer.resolve_type_name(),
            Err(WfsError::Configuration(_))
        ));

        let blank = LayerConfig {
            layers: vec!["  ".to_string()],
            ..LayerConfig::default()
        };
        assert!(matches!(
            blank.resolve_type_name(),
            Err(WfsError::Configuration(_))
        ));
    }

    #[test]
    fn test_server_kind() {
        let explicit = LayerConfig {
            server_type: Some("QGIS".to_string()),
            url: "https://example.org/wfs".to_string(),
            ..LayerConfig::default()
        };
        assert_eq!(explicit.server_kind(false), ServerKind::Qgis);

        let explicit_generic = LayerConfig {
            server_type: Some("mapserver".to_string()),
            url: "https://qgis.example.org/wfs".to_string(),
            ..LayerConfig::default()
        };
        assert_eq!(explicit_generic.server_kind(true), ServerKind::Generic);

        let by_url = LayerConfig {
            url: "https://qgis.example.org/wfs".to_string(),
            ..LayerConfig::default()
        };
        assert_eq!(by_url.server_kind(true), ServerKind::Qgis);
        assert_eq!(by_url.server_kind(false), ServerKind::Generic);
    }

    #[test]
    fn test_layer_summary_keeps_extra_fields() {
        let summary: LayerSummary = serde_json::from_value(json!({
            "id": "roads",
            "caption": "Roads",
            "projection": "EPSG:3006"
        }))
        .unwrap();
        assert_eq!(summary.extra.get("projection"), Some(&json!("EPSG:3006")));
    }
}
