use super::{decode_members, DecodeHints, DecodedFeatures, FeatureDecoder, GmlFlavor};
use crate::errors::WfsResult;
use crate::xml::Element;

/// GML3 / WFS 1.1.0 collections: features inside `gml:featureMember` or
/// `gml:featureMembers`, geometries as `pos` / `posList`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gml3Decoder;

impl FeatureDecoder for Gml3Decoder {
    fn name(&self) -> &'static str {
        "GML3"
    }

    fn decode(&self, root: &Element, hints: &DecodeHints<'_>) -> WfsResult<DecodedFeatures> {
        let members = root
            .children
            .iter()
            .filter(|child| child.local_name() == "featureMember" || child.local_name() == "featureMembers")
            .flat_map(|wrapper| wrapper.children.iter());
        decode_members(members, GmlFlavor::Gml3, hints)
    }
}
