use super::{decode_members, DecodeHints, DecodedFeatures, FeatureDecoder, GmlFlavor};
use crate::errors::WfsResult;
use crate::xml::Element;

/// GML2 / WFS 1.0.0 collections, and WFS 2.0 style `wfs:member` wrappers.
///
/// Members are looked up anywhere in the document and geometries may use
/// `coordinates`, `coord` or the GML3 encodings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gml2Decoder;

const MEMBER_NAMES: &[&str] = &["featureMember", "featureMembers", "member"];

impl FeatureDecoder for Gml2Decoder {
    fn name(&self) -> &'static str {
        "GML2"
    }

    fn decode(&self, root: &Element, hints: &DecodeHints<'_>) -> WfsResult<DecodedFeatures> {
        let mut wrappers = Vec::new();
        for name in MEMBER_NAMES {
            wrappers.extend(root.find_all(name));
        }
        let members = wrappers
            .into_iter()
            .flat_map(|wrapper| wrapper.children.iter());
        decode_members(members, GmlFlavor::Gml2, hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Geometry;
    use crate::xml::parse_document;

    #[test]
    fn test_gml2_feature_member() {
        let root = parse_document(
            r#"<wfs:FeatureCollection xmlns:wfs="w" xmlns:gml="g" xmlns:ws="x">
  <gml:featureMember>
    <ws:roads fid="roads.3">
      <ws:the_geom><gml:MultiLineString><gml:lineStringMember><gml:LineString><gml:coordinates>1,1 2,2</gml:coordinates></gml:LineString></gml:lineStringMember></gml:MultiLineString></ws:the_geom>
      <ws:kind>gravel</ws:kind>
    </ws:roads>
  </gml:featureMember>
</wfs:FeatureCollection>"#,
        )
        .unwrap();
        let decoded = Gml2Decoder.decode(&root, &DecodeHints::default()).unwrap();
        assert_eq!(decoded.geometry_name.as_deref(), Some("the_geom"));
        assert_eq!(
            decoded.features[0].geometry,
            Some(Geometry::MultiLineString(vec![vec![
                vec![1.0, 1.0],
                vec![2.0, 2.0]
            ]]))
        );
    }

    #[test]
    fn test_nested_members() {
        let root = parse_document(
            r#"<wfs:FeatureCollection xmlns:wfs="w" xmlns:ws="x">
  <wfs:member><ws:roads fid="a"/></wfs:member>
  <wfs:additionalObjects><wfs:member><ws:roads fid="b"/></wfs:member></wfs:additionalObjects>
</wfs:FeatureCollection>"#,
        )
        .unwrap();
        let decoded = Gml2Decoder.decode(&root, &DecodeHints::default()).unwrap();
        assert_eq!(decoded.features.len(), 2);
    }
}
