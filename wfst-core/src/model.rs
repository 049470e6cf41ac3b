//! Canonical value types exchanged with callers.
//!
//! Everything here is request-scoped: the reader produces these from wire
//! data and the transaction builder consumes them again. Nothing is cached.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{WfsError, WfsResult};

/// Property key under which feature identifiers are exposed to callers.
pub const FID_PROPERTY: &str = "@_fid";

/// A coordinate tuple. Only the first two ordinates are written back out.
pub type Position = Vec<f64>;

/// Domain geometry in GeoJSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

pub type Properties = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl CanonicalFeature {
    pub fn new(properties: Properties, geometry: Option<Geometry>) -> Self {
        Self {
            id: None,
            properties,
            geometry,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Identifier from `id`, falling back to the injected `@_fid` property.
    pub fn identifier(&self) -> Option<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        match self.properties.get(FID_PROPERTY) {
            Some(Value::String(fid)) if !fid.is_empty() => Some(fid.clone()),
            Some(Value::Number(fid)) => Some(fid.to_string()),
            _ => None,
        }
    }
}

/// Features in one shape regardless of whether the server spoke GeoJSON or GML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalFeatureCollection {
    pub features: Vec<CanonicalFeature>,
    pub crs_name: String,
    pub layer_projection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs_urn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_name: Option<String>,
}

impl CanonicalFeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// `urn:ogc:def:crs:EPSG::<code>` for names that carry a numeric EPSG code,
/// e.g. `EPSG:3006`, `urn:ogc:def:crs:EPSG::3006` or
/// `http://www.opengis.net/gml/srs/epsg.xml#3006`.
pub fn epsg_urn(crs_name: &str) -> Option<String> {
    let upper = crs_name.to_ascii_uppercase();
    if !upper.contains("EPSG") {
        return None;
    }
    let code: String = crs_name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if code.is_empty() {
        return None;
    }
    Some(format!("urn:ogc:def:crs:EPSG::{}", code))
}

/// Parameters for a GetFeature request. Unset fields fall back to the layer
/// configuration and then to the client defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadParams {
    pub srs_name: Option<String>,
    pub version: Option<String>,
    pub max_features: Option<u32>,
    /// Raw `BBOX` value, e.g. `"minx,miny,maxx,maxy,EPSG:3006"`.
    pub bbox: Option<String>,
    pub filter: Option<String>,
    pub cql_filter: Option<String>,
    pub output_format: Option<String>,
}

/// Delete target: a bare identifier or a feature carrying one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureRef {
    Id(String),
    Feature(CanonicalFeature),
}

impl FeatureRef {
    pub fn identifier(&self) -> WfsResult<String> {
        match self {
            FeatureRef::Id(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            FeatureRef::Id(_) => Err(WfsError::Configuration(
                "delete target has an empty identifier".to_string(),
            )),
            FeatureRef::Feature(feature) => feature.identifier().ok_or_else(|| {
                WfsError::Configuration("delete target feature has no identifier".to_string())
            }),
        }
    }
}

impl From<&str> for FeatureRef {
    fn from(id: &str) -> Self {
        FeatureRef::Id(id.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionRequest {
    pub inserts: Vec<CanonicalFeature>,
    pub updates: Vec<CanonicalFeature>,
    pub deletes: Vec<FeatureRef>,
    pub srs_name: Option<String>,
    pub geometry_name: Option<String>,
    /// `"1.0.0"` writes a WFS 1.0.0 document with GML2 geometries.
    pub version: Option<String>,
}

impl TransactionRequest {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Outcome of a transaction as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub success: bool,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inserted_ids: Vec<String>,
}

impl TransactionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Turn a failed result into a `Protocol` error.
    pub fn into_result(self) -> WfsResult<TransactionResult> {
        if self.success {
            Ok(self)
        } else {
            Err(WfsError::Protocol(
                self.error
                    .unwrap_or_else(|| "transaction failed".to_string()),
            ))
        }
    }
}
