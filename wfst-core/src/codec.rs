//! Type-name and feature-identifier helpers shared by the read and write paths.

use crate::metadata::{LayerConfig, ServerKind};

/// Prefix reported for type names without an explicit workspace.
pub const DEFAULT_PREFIX: &str = "feature";

/// Split `"workspace:type"` on the first colon.
pub fn split_type_name(type_name: &str) -> (String, String) {
    match type_name.split_once(':') {
        Some((prefix, name)) => (prefix.to_string(), name.to_string()),
        None => (DEFAULT_PREFIX.to_string(), type_name.to_string()),
    }
}

/// Feature identifier in the form the layer's server expects on
/// update and delete filters.
///
/// A leading `"<workspace>:"` matching the layer is stripped first. QGIS
/// Server then gets the id without any workspace prefix; other servers get
/// ids that already contain a `.` back unchanged and everything else
/// qualified as `"<typeName>.<id>"`.
///
/// Never fails. A layer without a resolvable type name gets the raw id back.
pub fn format_feature_id(raw_id: &str, layer: &LayerConfig, detect_qgis_from_url: bool) -> String {
    let raw_id = raw_id.trim();
    let type_name = match layer.resolve_type_name() {
        Ok(type_name) => type_name,
        Err(_) => return raw_id.to_string(),
    };

    let (workspace, _) = split_type_name(&type_name);
    let local_id = raw_id
        .strip_prefix(workspace.as_str())
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(raw_id);

    match layer.server_kind(detect_qgis_from_url) {
        ServerKind::Qgis => local_id.to_string(),
        ServerKind::Generic if raw_id.contains('.') => raw_id.to_string(),
        ServerKind::Generic => format!("{}.{}", type_name, local_id),
    }
}

/// Last colon-delimited segment of a property key.
pub fn unqualify_key(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(layers: &[&str], server_type: Option<&str>, url: &str) -> LayerConfig {
        LayerConfig {
            id: "roads".to_string(),
            layers: layers.iter().map(|name| name.to_string()).collect(),
            server_type: server_type.map(str::to_string),
            url: url.to_string(),
            ..LayerConfig::default()
        }
    }

    #[test]
    fn test_split_type_name() {
        assert_eq!(
            split_type_name("ws:layer"),
            ("ws".to_string(), "layer".to_string())
        );
        assert_eq!(
            split_type_name("a:b:c"),
            ("a".to_string(), "b:c".to_string())
        );
        assert_eq!(
            split_type_name("layer"),
            ("feature".to_string(), "layer".to_string())
        );
    }

    #[test]
    fn test_generic_server_qualifies_id() {
        let layer = layer(&["ws:layer"], None, "/api/ogc/wfst/proxy/roads");
        assert_eq!(format_feature_id("42", &layer, true), "ws:layer.42");
    }

    #[test]
    fn test_workspace_prefix_is_stripped_before_qualifying() {
        let layer = layer(&["ws:layer"], None, "https://gs.example.org/wfs");
        assert_eq!(format_feature_id("ws:42", &layer, true), "ws:layer.42");
    }

    #[test]
    fn test_qualified_ids_are_unchanged() {
        let generic = layer(&["ws:layer"], None, "https://gs.example.org/wfs");
        let qgis = layer(&["ws:layer"], Some("qgis"), "https://qgis.example.org/wfs");
        for id in ["ws:layer.42", "layer.42", "other.1", "a.b.c"] {
            assert_eq!(format_feature_id(id, &generic, true), id);
        }
        for id in ["layer.42", "other.1", "a.b.c"] {
            assert_eq!(format_feature_id(id, &qgis, true), id);
        }
    }

    #[test]
    fn test_qgis_drops_workspace_from_qualified_ids() {
        let qgis = layer(&["ws:layer"], Some("qgis"), "https://maps.example.org/ows");
        assert_eq!(format_feature_id("ws:layer.42", &qgis, true), "layer.42");
        // Only the layer's own workspace is stripped.
        assert_eq!(format_feature_id("other:layer.42", &qgis, true), "other:layer.42");
    }

    #[test]
    fn test_qgis_returns_bare_id() {
        let qgis = layer(&["ws:layer"], Some("qgis"), "https://maps.example.org/ows");
        assert_eq!(format_feature_id("42", &qgis, true), "42");
        assert_eq!(format_feature_id("ws:42", &qgis, true), "42");
    }

    #[test]
    fn test_qgis_url_heuristic_is_configurable() {
        let by_url = layer(&["ws:layer"], None, "https://example.org/cgi-bin/qgis_mapserv.fcgi");
        assert_eq!(format_feature_id("42", &by_url, true), "42");
        assert_eq!(format_feature_id("42", &by_url, false), "ws:layer.42");
    }

    #[test]
    fn test_unresolvable_type_name_returns_raw_id() {
        let layer = layer(&[], None, "https://gs.example.org/wfs");
        assert_eq!(format_feature_id("42", &layer, true), "42");
    }

    #[test]
    fn test_unqualify_key() {
        assert_eq!(unqualify_key("ws:name"), "name");
        assert_eq!(unqualify_key("a:b:name"), "name");
        assert_eq!(unqualify_key("name"), "name");
    }
}
