//! WFS-T Transaction documents for inserts, updates and deletes.

use quick_xml::events::{BytesDecl, Event};
use quick_xml::Writer;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::codec::{format_feature_id, split_type_name};
use crate::config::ClientConfig;
use crate::errors::{WfsError, WfsResult};
use crate::gml::writer::{self as xml_out, GmlVersion, XmlWriter};
use crate::http::HttpClient;
use crate::metadata::{LayerConfig, MetadataResolver};
use crate::model::{
    CanonicalFeature, Geometry, TransactionRequest, TransactionResult, FID_PROPERTY,
};
use crate::response::parse_transaction_response;

pub const DEFAULT_GEOMETRY_NAME: &str = "geometry";

const WFS_NS: &str = "http://www.opengis.net/wfs";
const OGC_NS: &str = "http://www.opengis.net/ogc";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// WFS version of the written document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionVersion {
    V1_1_0,
    V1_0_0,
}

impl TransactionVersion {
    pub fn parse(version: Option<&str>) -> WfsResult<Self> {
        match version.map(str::trim) {
            None | Some("") | Some("1.1.0") => Ok(Self::V1_1_0),
            Some("1.0.0") => Ok(Self::V1_0_0),
            Some(other) => Err(WfsError::Configuration(format!(
                "unsupported WFS version '{}', expected 1.1.0 or 1.0.0",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_1_0 => "1.1.0",
            Self::V1_0_0 => "1.0.0",
        }
    }

    fn schema_location(self) -> &'static str {
        match self {
            Self::V1_1_0 => "http://www.opengis.net/wfs http://schemas.opengis.net/wfs/1.1.0/wfs.xsd",
            Self::V1_0_0 => {
                "http://www.opengis.net/wfs http://schemas.opengis.net/wfs/1.0.0/WFS-transaction.xsd"
            }
        }
    }

    fn gml(self) -> GmlVersion {
        match self {
            Self::V1_1_0 => GmlVersion::Gml3,
            Self::V1_0_0 => GmlVersion::Gml2,
        }
    }
}

/// Everything about the target feature type a document needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionTarget {
    pub type_name: String,
    pub prefix: String,
    pub feature_type: String,
    pub namespace: String,
    pub geometry_name: String,
    pub srs_name: String,
    pub version: TransactionVersion,
}

impl TransactionTarget {
    /// Resolve the target for `request` against a layer.
    pub fn resolve(
        layer: &LayerConfig,
        request: &TransactionRequest,
        config: &ClientConfig,
    ) -> WfsResult<Self> {
        let type_name = layer.resolve_type_name()?;
        let (prefix, feature_type) = split_type_name(&type_name);

        let geometry_name = [request.geometry_name.as_deref(), layer.geometry_field.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or(DEFAULT_GEOMETRY_NAME)
            .to_string();

        let namespace = layer
            .namespace_uri()
            .map(str::to_string)
            .unwrap_or_else(|| config.synthesized_namespace(&prefix));

        let srs_name = [request.srs_name.as_deref(), layer.projection.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|srs| !srs.is_empty())
            .unwrap_or(config.default_srs.as_str())
            .to_string();

        Ok(Self {
            type_name,
            prefix,
            feature_type,
            namespace,
            geometry_name,
            srs_name,
            version: TransactionVersion::parse(request.version.as_deref())?,
        })
    }

    fn qualified(&self, local: &str) -> String {
        format!("{}:{}", self.prefix, local)
    }

    fn type_name_attr(&self) -> String {
        self.qualified(&self.feature_type)
    }
}

/// A feature ready to be written: ordered values with the geometry assigned
/// under the target's geometry name.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFeature {
    pub fid: Option<String>,
    pub values: Vec<(String, WriteValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Scalar(Value),
    Geometry(Geometry),
}

impl WriteFeature {
    fn from_canonical(feature: &CanonicalFeature, target: &TransactionTarget) -> WfsResult<Self> {
        let mut values = Vec::with_capacity(feature.properties.len() + 1);
        for (key, value) in &feature.properties {
            if key == FID_PROPERTY || *key == target.geometry_name {
                continue;
            }
            validate_property_name(key)?;
            values.push((key.clone(), WriteValue::Scalar(value.clone())));
        }
        if let Some(geometry) = &feature.geometry {
            values.push((
                target.geometry_name.clone(),
                WriteValue::Geometry(geometry.clone()),
            ));
        }
        Ok(Self { fid: None, values })
    }

    fn delete_marker(fid: String) -> Self {
        Self {
            fid: Some(fid),
            values: Vec::new(),
        }
    }
}

/// Inserts, updates and deletes converted for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPlan {
    pub inserts: Vec<WriteFeature>,
    pub updates: Vec<WriteFeature>,
    pub deletes: Vec<WriteFeature>,
}

impl TransactionPlan {
    pub fn build(
        request: &TransactionRequest,
        layer: &LayerConfig,
        target: &TransactionTarget,
        detect_qgis_from_url: bool,
    ) -> WfsResult<Self> {
        let inserts = request
            .inserts
            .iter()
            .map(|feature| WriteFeature::from_canonical(feature, target))
            .collect::<WfsResult<Vec<_>>>()?;

        let updates = request
            .updates
            .iter()
            .map(|feature| -> WfsResult<WriteFeature> {
                let raw_id = feature.identifier().ok_or_else(|| {
                    WfsError::Configuration("update feature has no identifier".to_string())
                })?;
                let mut write = WriteFeature::from_canonical(feature, target)?;
                write.fid = Some(format_feature_id(&raw_id, layer, detect_qgis_from_url));
                Ok(write)
            })
            .collect::<WfsResult<Vec<_>>>()?;

        let deletes = request
            .deletes
            .iter()
            .map(|reference| -> WfsResult<WriteFeature> {
                let raw_id = reference.identifier()?;
                Ok(WriteFeature::delete_marker(format_feature_id(
                    &raw_id,
                    layer,
                    detect_qgis_from_url,
                )))
            })
            .collect::<WfsResult<Vec<_>>>()?;

        Ok(Self {
            inserts,
            updates,
            deletes,
        })
    }
}

/// Property keys become element names, so they must be XML names.
fn validate_property_name(name: &str) -> WfsResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        Ok(())
    } else {
        Err(WfsError::Configuration(format!(
            "property name '{}' cannot be written as an XML element",
            name
        )))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

/// Serialize one Transaction document covering every operation in `plan`.
pub fn write_transaction(target: &TransactionTarget, plan: &TransactionPlan) -> WfsResult<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let prefix_attr = format!("xmlns:{}", target.prefix);
    xml_out::start(
        &mut writer,
        "wfs:Transaction",
        &[
            ("service", "WFS"),
            ("version", target.version.as_str()),
            ("xmlns:wfs", WFS_NS),
            ("xmlns:gml", xml_out::GML_NS),
            ("xmlns:ogc", OGC_NS),
            ("xmlns:xsi", XSI_NS),
            (prefix_attr.as_str(), target.namespace.as_str()),
            ("xsi:schemaLocation", target.version.schema_location()),
        ],
    )?;

    if !plan.inserts.is_empty() {
        xml_out::start(&mut writer, "wfs:Insert", &[])?;
        let element = target.qualified(&target.feature_type);
        for feature in &plan.inserts {
            xml_out::start(&mut writer, &element, &[])?;
            for (name, value) in &feature.values {
                write_insert_value(&mut writer, target, name, value)?;
            }
            xml_out::end(&mut writer, &element)?;
        }
        xml_out::end(&mut writer, "wfs:Insert")?;
    }

    for feature in &plan.updates {
        xml_out::start(
            &mut writer,
            "wfs:Update",
            &[("typeName", target.type_name_attr().as_str())],
        )?;
        for (name, value) in &feature.values {
            write_update_property(&mut writer, target, name, value)?;
        }
        write_fid_filter(&mut writer, feature)?;
        xml_out::end(&mut writer, "wfs:Update")?;
    }

    for feature in &plan.deletes {
        xml_out::start(
            &mut writer,
            "wfs:Delete",
            &[("typeName", target.type_name_attr().as_str())],
        )?;
        write_fid_filter(&mut writer, feature)?;
        xml_out::end(&mut writer, "wfs:Delete")?;
    }

    xml_out::end(&mut writer, "wfs:Transaction")?;
    String::from_utf8(writer.into_inner())
        .map_err(|err| WfsError::Format(format!("transaction is not UTF-8: {}", err)))
}

fn write_insert_value(
    writer: &mut XmlWriter,
    target: &TransactionTarget,
    name: &str,
    value: &WriteValue,
) -> WfsResult<()> {
    let element = target.qualified(name);
    match value {
        WriteValue::Geometry(geometry) => {
            xml_out::start(writer, &element, &[])?;
            xml_out::write_geometry(writer, geometry, &target.srs_name, target.version.gml())?;
            xml_out::end(writer, &element)
        }
        WriteValue::Scalar(value) => match scalar_text(value) {
            Some(text) => xml_out::text_element(writer, &element, &[], &text),
            // Omitted values are left to the server default.
            None => Ok(()),
        },
    }
}

fn write_update_property(
    writer: &mut XmlWriter,
    target: &TransactionTarget,
    name: &str,
    value: &WriteValue,
) -> WfsResult<()> {
    xml_out::start(writer, "wfs:Property", &[])?;
    xml_out::text_element(writer, "wfs:Name", &[], name)?;
    match value {
        WriteValue::Geometry(geometry) => {
            xml_out::start(writer, "wfs:Value", &[])?;
            xml_out::write_geometry(writer, geometry, &target.srs_name, target.version.gml())?;
            xml_out::end(writer, "wfs:Value")?;
        }
        WriteValue::Scalar(value) => {
            // A Property without Value sets the attribute to null.
            if let Some(text) = scalar_text(value) {
                xml_out::text_element(writer, "wfs:Value", &[], &text)?;
            }
        }
    }
    xml_out::end(writer, "wfs:Property")
}

fn write_fid_filter(writer: &mut XmlWriter, feature: &WriteFeature) -> WfsResult<()> {
    let fid = feature
        .fid
        .as_deref()
        .ok_or_else(|| WfsError::Configuration("feature without identifier".to_string()))?;
    xml_out::start(writer, "ogc:Filter", &[])?;
    xml_out::empty(writer, "ogc:FeatureId", &[("fid", fid)])?;
    xml_out::end(writer, "ogc:Filter")
}

/// A transaction ready to be posted.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub url: Url,
    pub target: TransactionTarget,
    pub document: String,
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    http: HttpClient,
    metadata: MetadataResolver,
}

impl TransactionBuilder {
    pub fn new(http: HttpClient, metadata: MetadataResolver) -> Self {
        Self { http, metadata }
    }

    /// Resolve the layer and build the document without sending it.
    pub async fn prepare(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        cancel: &CancelToken,
    ) -> WfsResult<PreparedTransaction> {
        let layer = self.metadata.fetch_layer(layer_id, &[], cancel).await?;
        self.prepare_for_layer(&layer, request)
    }

    pub fn prepare_for_layer(
        &self,
        layer: &LayerConfig,
        request: &TransactionRequest,
    ) -> WfsResult<PreparedTransaction> {
        let config = self.http.config();
        let target = TransactionTarget::resolve(layer, request, config)?;
        let plan = TransactionPlan::build(request, layer, &target, config.detect_qgis_from_url)?;
        let document = write_transaction(&target, &plan)?;
        let url = self.http.resolve_layer_url(&layer.url)?;

        if request.is_empty() {
            debug!("Sending empty transaction for layer {}", layer.id);
        }
        Ok(PreparedTransaction {
            url,
            target,
            document,
        })
    }

    /// Build, post and interpret one transaction. Never retried.
    pub async fn commit_transaction(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        cancel: &CancelToken,
    ) -> WfsResult<TransactionResult> {
        let result = self.commit(layer_id, request, cancel).await;
        match &result {
            Ok(outcome) if outcome.success => info!(
                "Transaction on layer {} applied: {} inserted, {} updated, {} deleted",
                layer_id, outcome.inserted, outcome.updated, outcome.deleted
            ),
            Ok(outcome) => warn!(
                "Transaction on layer {} rejected: {}",
                layer_id,
                outcome.error.as_deref().unwrap_or("no reason given")
            ),
            Err(err) => error!("commit_transaction failed for layer {}: {}", layer_id, err),
        }
        result
    }

    async fn commit(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        cancel: &CancelToken,
    ) -> WfsResult<TransactionResult> {
        let prepared = self.prepare(layer_id, request, cancel).await?;
        debug!(
            "Posting {} transaction to {} ({} inserts, {} updates, {} deletes)",
            prepared.target.type_name,
            prepared.url,
            request.inserts.len(),
            request.updates.len(),
            request.deletes.len()
        );
        let body = match self.http.post_xml(prepared.url, prepared.document, cancel).await {
            Ok(body) => body,
            Err(err) if err.is_network() => {
                warn!(
                    "Transaction on layer {} was sent without a response, it may have been applied: {}",
                    layer_id, err
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        Ok(parse_transaction_response(&body.text))
    }
}
