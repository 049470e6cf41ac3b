//! GML feature collections in, GML geometries out.
//!
//! Reading goes through [`DecodePipeline`]: a GML3-oriented stage first and,
//! when that finds nothing in a body that plainly contains feature members, a
//! GML2-oriented retry. Each stage is a stateless [`FeatureDecoder`] that can
//! be exercised on its own.

pub mod geometry;
pub mod gml2;
pub mod gml3;
pub mod writer;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::unqualify_key;
use crate::errors::{WfsError, WfsResult};
use crate::model::{CanonicalFeature, Properties};
use crate::xml::{self, Element};

pub use geometry::GmlFlavor;
pub use gml2::Gml2Decoder;
pub use gml3::Gml3Decoder;

static FEATURE_MEMBER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)featureMember|wfs:member").expect("valid marker pattern"));

/// Whether a raw body looks like it carries feature members at all.
pub fn has_feature_member_marker(body: &str) -> bool {
    FEATURE_MEMBER_MARKER.is_match(body)
}

/// What the caller knows about the expected features.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeHints<'a> {
    /// Local feature type name (`"roads"` for `"ws:roads"`).
    pub feature_type: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFeatures {
    pub features: Vec<CanonicalFeature>,
    /// First geometry property observed in the document.
    pub geometry_name: Option<String>,
}

impl DecodedFeatures {
    fn push(&mut self, feature: CanonicalFeature, geometry_name: Option<String>) {
        if self.geometry_name.is_none() {
            self.geometry_name = geometry_name;
        }
        self.features.push(feature);
    }
}

/// One decoding stage over an already-parsed document.
pub trait FeatureDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, root: &Element, hints: &DecodeHints<'_>) -> WfsResult<DecodedFeatures>;
}

/// GML3 first, GML2 on a marker match. Holds no per-request state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodePipeline {
    primary: Gml3Decoder,
    fallback: Gml2Decoder,
}

/// Shared pipeline instance.
pub static GML_PIPELINE: DecodePipeline = DecodePipeline {
    primary: Gml3Decoder,
    fallback: Gml2Decoder,
};

impl DecodePipeline {
    /// Decode a GetFeature body.
    ///
    /// A body that is not XML at all, or an OGC exception report, is an
    /// error. Failures inside a stage only empty that stage's result.
    pub fn decode(&self, body: &str, hints: &DecodeHints<'_>) -> WfsResult<DecodedFeatures> {
        let root = xml::parse_document(body)?;
        if let Some(message) = exception_message(&root) {
            return Err(WfsError::Protocol(message));
        }

        let decoded = run_stage(&self.primary, &root, hints);
        if !decoded.features.is_empty() || !has_feature_member_marker(body) {
            return Ok(decoded);
        }

        debug!(
            "{} stage found no features in a body with feature members, retrying with {}",
            self.primary.name(),
            self.fallback.name()
        );
        Ok(run_stage(&self.fallback, &root, hints))
    }
}

fn run_stage(decoder: &dyn FeatureDecoder, root: &Element, hints: &DecodeHints<'_>) -> DecodedFeatures {
    match decoder.decode(root, hints) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("{} decoding failed, treating as no features: {}", decoder.name(), err);
            DecodedFeatures::default()
        }
    }
}

/// Text of an `ExceptionReport` / `ServiceExceptionReport` root.
fn exception_message(root: &Element) -> Option<String> {
    if !root.local_name().contains("ExceptionReport") {
        return None;
    }
    let texts: Vec<String> = root
        .find_all("ows:ExceptionText")
        .into_iter()
        .chain(root.find_all("ServiceException"))
        .map(Element::deep_text)
        .filter(|text| !text.is_empty())
        .collect();
    if texts.is_empty() {
        Some("server returned an exception report".to_string())
    } else {
        Some(texts.join("; "))
    }
}

/// Decode the features found under the given member elements.
pub(crate) fn decode_members<'a>(
    members: impl Iterator<Item = &'a Element>,
    flavor: GmlFlavor,
    hints: &DecodeHints<'_>,
) -> WfsResult<DecodedFeatures> {
    let mut decoded = DecodedFeatures::default();
    for feature in members {
        if let Some(expected) = hints.feature_type {
            if feature.local_name() != expected {
                warn!(
                    "Dropping member <{}>, expected feature type {}",
                    feature.name, expected
                );
                continue;
            }
        }
        let (feature, geometry_name) = decode_feature(feature, flavor)?;
        decoded.push(feature, geometry_name);
    }
    Ok(decoded)
}

/// One feature element → canonical feature plus its geometry property name.
fn decode_feature(
    element: &Element,
    flavor: GmlFlavor,
) -> WfsResult<(CanonicalFeature, Option<String>)> {
    let id = element
        .attr("gml:id")
        .or_else(|| element.attr("fid"))
        .map(str::to_string);

    let mut properties = Properties::new();
    let mut geometry = None;
    let mut geometry_name = None;

    for property in &element.children {
        // gml:boundedBy, gml:name, gml:description and friends
        if property.prefix() == Some("gml") || property.is("boundedBy") {
            continue;
        }
        let key = unqualify_key(&property.name).to_string();

        if let Some(shape) = property
            .children
            .iter()
            .find(|child| geometry::is_geometry_element(child))
        {
            if geometry.is_none() {
                geometry = Some(geometry::read_geometry(shape, flavor)?);
                geometry_name = Some(key);
            }
            continue;
        }

        let value = if property.attr("xsi:nil") == Some("true") {
            Value::Null
        } else if property.children.is_empty() {
            Value::String(property.trimmed_text().to_string())
        } else {
            Value::String(property.deep_text())
        };
        properties.insert(key, value);
    }

    Ok((
        CanonicalFeature {
            id,
            properties,
            geometry,
        },
        geometry_name,
    ))
}
