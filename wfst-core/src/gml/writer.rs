//! GML geometry output for transaction documents.
//!
//! Geometries are always written 2D; extra ordinates are dropped. Elements
//! use the `gml:` prefix, which the enclosing document must declare.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::errors::{WfsError, WfsResult};
use crate::model::{Geometry, Position};

pub const GML_NS: &str = "http://www.opengis.net/gml";

/// GML encoding written into a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmlVersion {
    /// `pos` / `posList`, MultiCurve / MultiSurface (WFS 1.1.0).
    Gml3,
    /// `coordinates`, outer/inner boundaries (WFS 1.0.0).
    Gml2,
}

pub type XmlWriter = Writer<Vec<u8>>;

pub(crate) fn start(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> WfsResult<()> {
    let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
    writer.write_event(Event::Start(element))?;
    Ok(())
}

pub(crate) fn end(writer: &mut XmlWriter, name: &str) -> WfsResult<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub(crate) fn empty(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> WfsResult<()> {
    let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

pub(crate) fn text_element(
    writer: &mut XmlWriter,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> WfsResult<()> {
    start(writer, name, attributes)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

/// Write `geometry`, with `srsName` on the outermost element.
pub fn write_geometry(
    writer: &mut XmlWriter,
    geometry: &Geometry,
    srs_name: &str,
    version: GmlVersion,
) -> WfsResult<()> {
    let srs: &[(&str, &str)] = &[("srsName", srs_name)];
    match geometry {
        Geometry::Point(position) => write_point(writer, position, srs, version),
        Geometry::LineString(line) => write_line(writer, line, srs, version),
        Geometry::Polygon(rings) => write_polygon(writer, rings, srs, version),
        Geometry::MultiPoint(points) => {
            start(writer, "gml:MultiPoint", srs)?;
            for point in points {
                start(writer, "gml:pointMember", &[])?;
                write_point(writer, point, &[], version)?;
                end(writer, "gml:pointMember")?;
            }
            end(writer, "gml:MultiPoint")
        }
        Geometry::MultiLineString(lines) => {
            let (container, member) = match version {
                GmlVersion::Gml3 => ("gml:MultiCurve", "gml:curveMember"),
                GmlVersion::Gml2 => ("gml:MultiLineString", "gml:lineStringMember"),
            };
            start(writer, container, srs)?;
            for line in lines {
                start(writer, member, &[])?;
                write_line(writer, line, &[], version)?;
                end(writer, member)?;
            }
            end(writer, container)
        }
        Geometry::MultiPolygon(polygons) => {
            let (container, member) = match version {
                GmlVersion::Gml3 => ("gml:MultiSurface", "gml:surfaceMember"),
                GmlVersion::Gml2 => ("gml:MultiPolygon", "gml:polygonMember"),
            };
            start(writer, container, srs)?;
            for polygon in polygons {
                start(writer, member, &[])?;
                write_polygon(writer, polygon, &[], version)?;
                end(writer, member)?;
            }
            end(writer, container)
        }
    }
}

fn write_point(
    writer: &mut XmlWriter,
    position: &Position,
    attributes: &[(&str, &str)],
    version: GmlVersion,
) -> WfsResult<()> {
    start(writer, "gml:Point", attributes)?;
    write_coordinates(writer, std::slice::from_ref(position), version, true)?;
    end(writer, "gml:Point")
}

fn write_line(
    writer: &mut XmlWriter,
    line: &[Position],
    attributes: &[(&str, &str)],
    version: GmlVersion,
) -> WfsResult<()> {
    start(writer, "gml:LineString", attributes)?;
    write_coordinates(writer, line, version, false)?;
    end(writer, "gml:LineString")
}

fn write_polygon(
    writer: &mut XmlWriter,
    rings: &[Vec<Position>],
    attributes: &[(&str, &str)],
    version: GmlVersion,
) -> WfsResult<()> {
    let (outer, inner) = match version {
        GmlVersion::Gml3 => ("gml:exterior", "gml:interior"),
        GmlVersion::Gml2 => ("gml:outerBoundaryIs", "gml:innerBoundaryIs"),
    };
    if rings.is_empty() {
        return Err(WfsError::Format("polygon without rings".to_string()));
    }

    start(writer, "gml:Polygon", attributes)?;
    for (idx, ring) in rings.iter().enumerate() {
        let boundary = if idx == 0 { outer } else { inner };
        start(writer, boundary, &[])?;
        start(writer, "gml:LinearRing", &[])?;
        write_coordinates(writer, ring, version, false)?;
        end(writer, "gml:LinearRing")?;
        end(writer, boundary)?;
    }
    end(writer, "gml:Polygon")
}

fn write_coordinates(
    writer: &mut XmlWriter,
    positions: &[Position],
    version: GmlVersion,
    single: bool,
) -> WfsResult<()> {
    let pairs = positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(WfsError::Format(format!(
                "position needs two ordinates, got {:?}",
                position
            ))),
        })
        .collect::<WfsResult<Vec<(f64, f64)>>>()?;

    match version {
        GmlVersion::Gml3 => {
            let text = pairs
                .iter()
                .map(|(x, y)| format!("{} {}", x, y))
                .collect::<Vec<_>>()
                .join(" ");
            let name = if single { "gml:pos" } else { "gml:posList" };
            text_element(writer, name, &[("srsDimension", "2")], &text)
        }
        GmlVersion::Gml2 => {
            let text = pairs
                .iter()
                .map(|(x, y)| format!("{},{}", x, y))
                .collect::<Vec<_>>()
                .join(" ");
            text_element(
                writer,
                "gml:coordinates",
                &[("decimal", "."), ("cs", ","), ("ts", " ")],
                &text,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(geometry: &Geometry, version: GmlVersion) -> String {
        let mut writer = Writer::new(Vec::new());
        write_geometry(&mut writer, geometry, "EPSG:3006", version).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_gml3_point_drops_z() {
        assert_eq!(
            render(&Geometry::Point(vec![1.0, 2.5, 30.0]), GmlVersion::Gml3),
            r#"<gml:Point srsName="EPSG:3006"><gml:pos srsDimension="2">1 2.5</gml:pos></gml:Point>"#
        );
    }

    #[test]
    fn test_gml2_line() {
        assert_eq!(
            render(
                &Geometry::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]]),
                GmlVersion::Gml2
            ),
            r#"<gml:LineString srsName="EPSG:3006"><gml:coordinates decimal="." cs="," ts=" ">0,0 1,1</gml:coordinates></gml:LineString>"#
        );
    }

    #[test]
    fn test_multipolygon_as_multisurface() {
        let ring = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]];
        let xml = render(&Geometry::MultiPolygon(vec![vec![ring]]), GmlVersion::Gml3);
        assert!(xml.starts_with(r#"<gml:MultiSurface srsName="EPSG:3006"><gml:surfaceMember><gml:Polygon><gml:exterior>"#));
        assert!(xml.contains("<gml:posList srsDimension=\"2\">0 0 1 0 1 1 0 0</gml:posList>"));
    }

    #[test]
    fn test_short_position_is_rejected() {
        let mut writer = Writer::new(Vec::new());
        let result = write_geometry(
            &mut writer,
            &Geometry::Point(vec![1.0]),
            "EPSG:3006",
            GmlVersion::Gml3,
        );
        assert!(matches!(result, Err(WfsError::Format(_))));
    }
}
