use std::time::Duration;

use serde::Deserialize;

use crate::errors::{WfsError, WfsResult};

pub const DEFAULT_SRS: &str = "EPSG:3006";
pub const DEFAULT_VERSION: &str = "1.1.0";

/// Client settings. Defaults target a backend served from the same origin on
/// localhost, which is how the viewer is usually run during development.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend API; the metadata endpoints live at
    /// `{api_base}/ogc/wfst`.
    pub api_base: String,
    /// Origin that proxied layer URLs (those starting with `/`) resolve against.
    pub backend_origin: String,
    /// SRS used when neither the caller nor the layer names one.
    pub default_srs: String,
    /// WFS version used for GetFeature when the caller does not override it.
    pub default_version: String,
    /// Scheme of synthesized feature namespaces.
    pub namespace_scheme: String,
    /// Host of synthesized feature namespaces, `<scheme>://<host>/wfs/<workspace>`.
    pub namespace_host: String,
    /// Treat layers whose URL contains "qgis" as QGIS Server when the backend
    /// does not state a server type.
    pub detect_qgis_from_url: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token sent to the backend and to proxied layer URLs.
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3001/api".to_string(),
            backend_origin: "http://localhost:3001".to_string(),
            default_srs: DEFAULT_SRS.to_string(),
            default_version: DEFAULT_VERSION.to_string(),
            namespace_scheme: "http".to_string(),
            namespace_host: "localhost".to_string(),
            detect_qgis_from_url: true,
            timeout_secs: 30,
            auth_token: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>, backend_origin: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            backend_origin: backend_origin.into(),
            ..Self::default()
        }
    }

    /// Overlay `WFST_*` environment variables on the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("WFST_API_BASE") {
            config.api_base = value;
        }
        if let Ok(value) = std::env::var("WFST_BACKEND_ORIGIN") {
            config.backend_origin = value;
        }
        if let Ok(value) = std::env::var("WFST_DEFAULT_SRS") {
            config.default_srs = value;
        }
        if let Ok(value) = std::env::var("WFST_DEFAULT_VERSION") {
            config.default_version = value;
        }
        if let Ok(value) = std::env::var("WFST_NAMESPACE_HOST") {
            config.namespace_host = value;
        }
        if let Ok(value) = std::env::var("WFST_DETECT_QGIS_FROM_URL") {
            config.detect_qgis_from_url = !matches!(value.as_str(), "0" | "false" | "no");
        }
        if let Some(secs) = std::env::var("WFST_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config.auth_token = std::env::var("WFST_AUTH_TOKEN").ok();
        config
    }

    pub fn from_toml_str(source: &str) -> WfsResult<Self> {
        toml::from_str(source)
            .map_err(|err| WfsError::Configuration(format!("invalid client config: {}", err)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Namespace used for a workspace when the layer does not configure one.
    pub fn synthesized_namespace(&self, workspace: &str) -> String {
        format!(
            "{}://{}/wfs/{}",
            self.namespace_scheme, self.namespace_host, workspace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_srs, "EPSG:3006");
        assert_eq!(config.default_version, "1.1.0");
        assert!(config.detect_qgis_from_url);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
api_base = "https://maps.example.org/api"
backend_origin = "https://maps.example.org"
detect_qgis_from_url = false
"#,
        )
        .expect("config should parse");

        assert_eq!(config.api_base, "https://maps.example.org/api");
        assert!(!config.detect_qgis_from_url);
        assert_eq!(config.default_srs, DEFAULT_SRS);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = ClientConfig::from_toml_str("timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, WfsError::Configuration(_)));
    }

    #[test]
    fn test_synthesized_namespace() {
        let config = ClientConfig::default();
        assert_eq!(config.synthesized_namespace("ws"), "http://localhost/wfs/ws");
    }
}
