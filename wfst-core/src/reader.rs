//! GetFeature requests and response normalization.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::codec::{split_type_name, unqualify_key};
use crate::errors::{WfsError, WfsResult};
use crate::gml::{DecodeHints, DecodedFeatures, GML_PIPELINE};
use crate::http::{FetchedBody, HttpClient};
use crate::metadata::{LayerConfig, MetadataResolver};
use crate::model::{
    epsg_urn, CanonicalFeature, CanonicalFeatureCollection, Geometry, Properties, ReadParams,
    FID_PROPERTY,
};

#[derive(Debug, Clone)]
pub struct FeatureReader {
    http: HttpClient,
    metadata: MetadataResolver,
}

impl FeatureReader {
    pub fn new(http: HttpClient, metadata: MetadataResolver) -> Self {
        Self { http, metadata }
    }

    pub async fn read_features(
        &self,
        layer_id: &str,
        params: &ReadParams,
        cancel: &CancelToken,
    ) -> WfsResult<CanonicalFeatureCollection> {
        self.read(layer_id, params, cancel).await.map_err(|err| {
            warn!("read_features failed for layer {}: {}", layer_id, err);
            err
        })
    }

    async fn read(
        &self,
        layer_id: &str,
        params: &ReadParams,
        cancel: &CancelToken,
    ) -> WfsResult<CanonicalFeatureCollection> {
        let layer = self.metadata.fetch_layer(layer_id, &[], cancel).await?;
        let type_name = layer.resolve_type_name()?;
        let srs_name = effective_srs(params, &layer, &self.http.config().default_srs);
        let url = self.get_feature_url(&layer, &type_name, &srs_name, params)?;

        let body = self.http.get_text(url, cancel).await?;
        let (_, feature_type) = split_type_name(&type_name);
        let decoded = decode_body(&body, &feature_type)?;

        info!(
            "Read {} features from layer {} ({})",
            decoded.features.len(),
            layer_id,
            type_name
        );

        let layer_projection = layer
            .projection
            .clone()
            .filter(|projection| !projection.trim().is_empty())
            .unwrap_or_else(|| srs_name.clone());
        Ok(CanonicalFeatureCollection {
            features: decoded.features,
            crs_urn: epsg_urn(&srs_name),
            crs_name: srs_name,
            layer_projection,
            geometry_name: decoded.geometry_name,
        })
    }

    /// GetFeature URL for a layer with the query keys appended.
    pub fn get_feature_url(
        &self,
        layer: &LayerConfig,
        type_name: &str,
        srs_name: &str,
        params: &ReadParams,
    ) -> WfsResult<Url> {
        let version = params
            .version
            .as_deref()
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(self.http.config().default_version.as_str());

        let mut url = self.http.resolve_layer_url(&layer.url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("SERVICE", "WFS")
                .append_pair("REQUEST", "GetFeature")
                .append_pair("VERSION", version)
                .append_pair("TYPENAME", type_name)
                .append_pair("SRSNAME", srs_name);
            if let Some(max_features) = params.max_features {
                query.append_pair("MAXFEATURES", &max_features.to_string());
            }
            let optional = [
                ("BBOX", &params.bbox),
                ("FILTER", &params.filter),
                ("CQL_FILTER", &params.cql_filter),
                ("OUTPUTFORMAT", &params.output_format),
            ];
            for (key, value) in optional {
                if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }
}

/// Caller override, then the layer projection, then the client default.
fn effective_srs(params: &ReadParams, layer: &LayerConfig, default_srs: &str) -> String {
    [params.srs_name.as_deref(), layer.projection.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|srs| !srs.is_empty())
        .unwrap_or(default_srs)
        .to_string()
}

fn is_json(body: &FetchedBody) -> bool {
    match body.content_type.as_deref() {
        Some(content_type) => content_type.contains("json"),
        None => body.text.trim_start().starts_with('{'),
    }
}

/// Route a GetFeature body to the GeoJSON or GML decoder.
pub fn decode_body(body: &FetchedBody, feature_type: &str) -> WfsResult<DecodedFeatures> {
    if is_json(body) {
        debug!("Decoding GetFeature response as GeoJSON");
        return decode_geojson(&body.text);
    }
    debug!(
        "Decoding GetFeature response as GML ({})",
        body.content_type.as_deref().unwrap_or("no content type")
    );
    let hints = DecodeHints {
        feature_type: Some(feature_type).filter(|name| !name.is_empty()),
    };
    GML_PIPELINE.decode(&body.text, &hints)
}

/// GeoJSON FeatureCollection (or single Feature) → canonical features.
///
/// Every feature with an id gets it as a string `@_fid` property, and
/// namespace prefixes are stripped from property keys.
pub fn decode_geojson(text: &str) -> WfsResult<DecodedFeatures> {
    let document: Value = serde_json::from_str(text)?;
    let raw_features = match &document {
        Value::Object(object) if object.get("type").and_then(Value::as_str) == Some("Feature") => {
            vec![document.clone()]
        }
        Value::Object(object) => match object.get("features") {
            Some(Value::Array(features)) => features.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(WfsError::Format(format!(
                    "GeoJSON 'features' is not an array: {}",
                    other
                )))
            }
        },
        other => {
            return Err(WfsError::Format(format!(
                "GeoJSON document is not an object: {}",
                other
            )))
        }
    };

    let geometry_name = raw_features
        .first()
        .and_then(|feature| feature.get("geometry_name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let features = raw_features
        .into_iter()
        .map(geojson_feature)
        .collect::<WfsResult<Vec<_>>>()?;

    Ok(DecodedFeatures {
        features,
        geometry_name,
    })
}

fn geojson_feature(value: Value) -> WfsResult<CanonicalFeature> {
    let Value::Object(mut object) = value else {
        return Err(WfsError::Format("GeoJSON feature is not an object".to_string()));
    };

    let id = match object.remove("id") {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    let raw_properties = match object.remove("properties") {
        Some(Value::Object(properties)) => properties,
        _ => Map::new(),
    };
    let has_fid = raw_properties.contains_key(FID_PROPERTY);

    let mut properties = Properties::new();
    if let (Some(id), false) = (&id, has_fid) {
        properties.insert(FID_PROPERTY.to_string(), Value::String(id.clone()));
    }
    for (key, value) in raw_properties {
        properties.insert(unqualify_key(&key).to_string(), value);
    }

    let geometry = match object.remove("geometry") {
        Some(Value::Null) | None => None,
        Some(raw) => match serde_json::from_value::<Geometry>(raw) {
            Ok(geometry) => Some(geometry),
            Err(err) => {
                warn!(
                    "Dropping unsupported geometry on feature {:?}: {}",
                    id, err
                );
                None
            }
        },
    };

    Ok(CanonicalFeature {
        id,
        properties,
        geometry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use serde_json::json;

    fn reader() -> FeatureReader {
        let http = HttpClient::new(ClientConfig::new(
            "https://maps.example.org/api",
            "https://maps.example.org",
        ))
        .unwrap();
        FeatureReader::new(http.clone(), MetadataResolver::new(http))
    }

    #[test]
    fn test_geojson_injects_fid_and_strips_prefixes() {
        let decoded = decode_geojson(
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "id": "roads.1",
                        "geometry_name": "geom",
                        "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                        "properties": {"ws:name": "Main", "lanes": 2}
                    },
                    {
                        "type": "Feature",
                        "id": 2,
                        "geometry": null,
                        "properties": {"@_fid": "kept", "name": "Side"}
                    }
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(decoded.geometry_name.as_deref(), Some("geom"));
        let first = &decoded.features[0];
        assert_eq!(first.properties[FID_PROPERTY], json!("roads.1"));
        assert_eq!(first.properties["name"], json!("Main"));
        assert_eq!(first.properties["lanes"], json!(2));
        assert!(!first.properties.contains_key("ws:name"));
        assert_eq!(first.geometry, Some(Geometry::Point(vec![1.0, 2.0])));

        let second = &decoded.features[1];
        assert_eq!(second.id.as_deref(), Some("2"));
        assert_eq!(second.properties[FID_PROPERTY], json!("kept"));
        assert!(second.geometry.is_none());
    }

    #[test]
    fn test_numeric_id_injected_as_string() {
        let decoded = decode_geojson(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","id":42,"properties":{}}]}"#,
        )
        .unwrap();
        assert_eq!(decoded.features[0].properties[FID_PROPERTY], json!("42"));
        assert!(decoded.geometry_name.is_none());
    }

    #[test]
    fn test_unsupported_geometry_is_dropped() {
        let decoded = decode_geojson(
            r#"{"features":[{"geometry":{"type":"GeometryCollection","geometries":[]},"properties":{}}]}"#,
        )
        .unwrap();
        assert!(decoded.features[0].geometry.is_none());
    }

    #[test]
    fn test_invalid_geojson_is_format_error() {
        assert!(matches!(decode_geojson("{not json"), Err(WfsError::Format(_))));
        assert!(matches!(decode_geojson("[1,2]"), Err(WfsError::Format(_))));
    }

    #[test]
    fn test_decode_body_routes_on_content_type() {
        let json_body = FetchedBody {
            content_type: Some("application/json;charset=utf-8".to_string()),
            text: r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
        };
        assert!(decode_body(&json_body, "roads").unwrap().features.is_empty());

        let untyped_json = FetchedBody {
            content_type: None,
            text: r#"{"features":[{"id":"a","properties":{}}]}"#.to_string(),
        };
        assert_eq!(decode_body(&untyped_json, "roads").unwrap().features.len(), 1);

        let xml_body = FetchedBody {
            content_type: Some("text/xml; subtype=gml/3.1.1".to_string()),
            text: r#"<wfs:FeatureCollection xmlns:wfs="w"/>"#.to_string(),
        };
        assert!(decode_body(&xml_body, "roads").unwrap().features.is_empty());
    }

    #[test]
    fn test_get_feature_url() {
        let layer = LayerConfig {
            id: "roads".to_string(),
            layers: vec!["ws:roads".to_string()],
            url: "/api/ogc/wfst/proxy/roads".to_string(),
            ..LayerConfig::default()
        };
        let params = ReadParams {
            max_features: Some(50),
            bbox: Some("0,0,10,10,EPSG:3006".to_string()),
            cql_filter: Some("name = 'Main'".to_string()),
            filter: Some("   ".to_string()),
            ..ReadParams::default()
        };
        let url = reader()
            .get_feature_url(&layer, "ws:roads", "EPSG:3006", &params)
            .unwrap();

        assert!(url.as_str().starts_with("https://maps.example.org/api/ogc/wfst/proxy/roads?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("SERVICE"), Some("WFS"));
        assert_eq!(get("REQUEST"), Some("GetFeature"));
        assert_eq!(get("VERSION"), Some("1.1.0"));
        assert_eq!(get("TYPENAME"), Some("ws:roads"));
        assert_eq!(get("SRSNAME"), Some("EPSG:3006"));
        assert_eq!(get("MAXFEATURES"), Some("50"));
        assert_eq!(get("BBOX"), Some("0,0,10,10,EPSG:3006"));
        assert_eq!(get("CQL_FILTER"), Some("name = 'Main'"));
        assert_eq!(get("FILTER"), None);
    }

    #[test]
    fn test_effective_srs_priority() {
        let layer = LayerConfig {
            projection: Some("EPSG:3010".to_string()),
            ..LayerConfig::default()
        };
        let mut params = ReadParams::default();
        assert_eq!(effective_srs(&params, &layer, "EPSG:3006"), "EPSG:3010");
        params.srs_name = Some("EPSG:4326".to_string());
        assert_eq!(effective_srs(&params, &layer, "EPSG:3006"), "EPSG:4326");
        assert_eq!(
            effective_srs(&ReadParams::default(), &LayerConfig::default(), "EPSG:3006"),
            "EPSG:3006"
        );
    }
}
