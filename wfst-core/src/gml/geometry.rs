//! GML geometry elements → [`Geometry`].

use crate::errors::{WfsError, WfsResult};
use crate::model::{Geometry, Position};
use crate::xml::Element;

/// Which coordinate encodings a decoding stage accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmlFlavor {
    /// `pos` / `posList`, `exterior` / `interior` rings.
    Gml3,
    /// `coordinates` / `coord`, `outerBoundaryIs` / `innerBoundaryIs`, with
    /// GML3 encodings accepted as well.
    Gml2,
}

const GEOMETRY_NAMES: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Curve",
    "Polygon",
    "Surface",
    "MultiPoint",
    "MultiLineString",
    "MultiCurve",
    "MultiPolygon",
    "MultiSurface",
];

pub fn is_geometry_element(element: &Element) -> bool {
    GEOMETRY_NAMES.contains(&element.local_name())
}

pub fn read_geometry(element: &Element, flavor: GmlFlavor) -> WfsResult<Geometry> {
    let dimension = srs_dimension(element);
    match element.local_name() {
        "Point" => Ok(Geometry::Point(read_point(element, flavor, dimension)?)),
        "LineString" | "LinearRing" => Ok(Geometry::LineString(read_positions(
            element, flavor, dimension,
        )?)),
        "Curve" => Ok(Geometry::LineString(read_curve(element, flavor, dimension)?)),
        "Polygon" | "Surface" => Ok(Geometry::Polygon(read_polygon(element, flavor, dimension)?)),
        "MultiPoint" => {
            let points = members(element, &["pointMember", "pointMembers"])
                .map(|point| read_point(point, flavor, srs_dimension(point).or(dimension)))
                .collect::<WfsResult<Vec<_>>>()?;
            Ok(Geometry::MultiPoint(points))
        }
        "MultiLineString" | "MultiCurve" => {
            let lines = members(
                element,
                &["lineStringMember", "curveMember", "curveMembers"],
            )
            .map(|line| {
                let dimension = srs_dimension(line).or(dimension);
                if line.is("Curve") {
                    read_curve(line, flavor, dimension)
                } else {
                    read_positions(line, flavor, dimension)
                }
            })
            .collect::<WfsResult<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(lines))
        }
        "MultiPolygon" | "MultiSurface" => {
            let polygons = members(
                element,
                &["polygonMember", "surfaceMember", "surfaceMembers"],
            )
            .map(|polygon| read_polygon(polygon, flavor, srs_dimension(polygon).or(dimension)))
            .collect::<WfsResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(polygons))
        }
        other => Err(WfsError::Format(format!(
            "unsupported GML geometry <{}>",
            other
        ))),
    }
}

/// Geometry elements inside `*Member` / `*Members` wrappers.
fn members<'a>(element: &'a Element, wrappers: &'a [&'a str]) -> impl Iterator<Item = &'a Element> + 'a {
    element
        .children
        .iter()
        .filter(move |child| wrappers.iter().any(|wrapper| child.is(wrapper)))
        .flat_map(|wrapper| wrapper.children.iter())
        .filter(|child| is_geometry_element(child))
}

fn srs_dimension(element: &Element) -> Option<usize> {
    element
        .attr("srsDimension")
        .or_else(|| element.attr("dimension"))
        .and_then(|value| value.trim().parse().ok())
}

fn read_point(element: &Element, flavor: GmlFlavor, dimension: Option<usize>) -> WfsResult<Position> {
    let positions = read_positions(element, flavor, dimension)?;
    positions
        .into_iter()
        .next()
        .ok_or_else(|| WfsError::Format("point without coordinates".to_string()))
}

fn read_curve(element: &Element, flavor: GmlFlavor, dimension: Option<usize>) -> WfsResult<Vec<Position>> {
    let mut positions = Vec::new();
    for segments in element.children_named("segments") {
        for segment in &segments.children {
            positions.extend(read_positions(segment, flavor, srs_dimension(segment).or(dimension))?);
        }
    }
    Ok(positions)
}

fn read_polygon(
    element: &Element,
    flavor: GmlFlavor,
    dimension: Option<usize>,
) -> WfsResult<Vec<Vec<Position>>> {
    if element.is("Surface") {
        let patch = element
            .child("patches")
            .and_then(|patches| patches.children.first())
            .ok_or_else(|| WfsError::Format("surface without patches".to_string()))?;
        return read_polygon(patch, flavor, srs_dimension(patch).or(dimension));
    }

    let (outer, inner): (&[&str], &[&str]) = match flavor {
        GmlFlavor::Gml3 => (&["exterior"][..], &["interior"][..]),
        GmlFlavor::Gml2 => (
            &["outerBoundaryIs", "exterior"][..],
            &["innerBoundaryIs", "interior"][..],
        ),
    };

    let mut rings = Vec::new();
    for boundary in element
        .children
        .iter()
        .filter(|child| outer.iter().any(|name| child.is(name)))
        .chain(
            element
                .children
                .iter()
                .filter(|child| inner.iter().any(|name| child.is(name))),
        )
    {
        let ring = boundary
            .children
            .first()
            .ok_or_else(|| WfsError::Format(format!("empty <{}>", boundary.name)))?;
        rings.push(read_positions(ring, flavor, srs_dimension(ring).or(dimension))?);
    }

    if rings.is_empty() {
        return Err(WfsError::Format("polygon without rings".to_string()));
    }
    Ok(rings)
}

/// Coordinates of a point, line or ring element.
fn read_positions(
    element: &Element,
    flavor: GmlFlavor,
    dimension: Option<usize>,
) -> WfsResult<Vec<Position>> {
    if let Some(pos_list) = element.child("posList") {
        let dimension = srs_dimension(pos_list).or(dimension).unwrap_or(2);
        return parse_pos_list(pos_list.trimmed_text(), dimension);
    }

    let pos: Vec<&Element> = element.children_named("pos").collect();
    if !pos.is_empty() {
        return pos
            .into_iter()
            .map(|pos| parse_tuple(pos.trimmed_text(), char::is_whitespace))
            .collect();
    }

    // Rings given as a sequence of points.
    let points: Vec<&Element> = element
        .children_named("pointProperty")
        .flat_map(|property| property.children_named("Point"))
        .collect();
    if !points.is_empty() {
        return points
            .into_iter()
            .map(|point| read_point(point, flavor, dimension))
            .collect();
    }

    if flavor == GmlFlavor::Gml2 {
        if let Some(coordinates) = element.child("coordinates") {
            return parse_coordinates(coordinates);
        }
        let coords: Vec<&Element> = element.children_named("coord").collect();
        if !coords.is_empty() {
            return coords.into_iter().map(parse_coord).collect();
        }
    }

    Err(WfsError::Format(format!(
        "no {} coordinates in <{}>",
        match flavor {
            GmlFlavor::Gml3 => "GML3",
            GmlFlavor::Gml2 => "GML2",
        },
        element.name
    )))
}

fn parse_number(token: &str) -> WfsResult<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| WfsError::Format(format!("invalid coordinate '{}'", token)))
}

fn parse_tuple(text: &str, separator: impl Fn(char) -> bool) -> WfsResult<Position> {
    let values = text
        .split(separator)
        .filter(|token| !token.is_empty())
        .map(parse_number)
        .collect::<WfsResult<Vec<f64>>>()?;
    if values.len() < 2 {
        return Err(WfsError::Format(format!("incomplete position '{}'", text)));
    }
    Ok(values)
}

fn parse_pos_list(text: &str, dimension: usize) -> WfsResult<Vec<Position>> {
    let dimension = dimension.max(2);
    let values = text
        .split_whitespace()
        .map(parse_number)
        .collect::<WfsResult<Vec<f64>>>()?;
    if values.len() % dimension != 0 {
        return Err(WfsError::Format(format!(
            "posList of {} values is not a multiple of dimension {}",
            values.len(),
            dimension
        )));
    }
    Ok(values
        .chunks(dimension)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// GML2 `<coordinates>` honouring its `cs`, `ts` and `decimal` attributes.
fn parse_coordinates(element: &Element) -> WfsResult<Vec<Position>> {
    let cs = element.attr("cs").unwrap_or(",");
    let ts = element.attr("ts").unwrap_or(" ");
    let decimal = element.attr("decimal").unwrap_or(".");
    let text = element.trimmed_text();

    let tuples: Vec<&str> = if ts.trim().is_empty() {
        text.split_whitespace().collect()
    } else {
        text.split(ts).map(str::trim).filter(|t| !t.is_empty()).collect()
    };

    tuples
        .into_iter()
        .map(|tuple| {
            let values = tuple
                .split(cs)
                .map(|token| {
                    if decimal == "." {
                        parse_number(token)
                    } else {
                        parse_number(&token.replace(decimal, "."))
                    }
                })
                .collect::<WfsResult<Vec<f64>>>()?;
            if values.len() < 2 {
                return Err(WfsError::Format(format!("incomplete coordinate '{}'", tuple)));
            }
            Ok(values)
        })
        .collect()
}

fn parse_coord(element: &Element) -> WfsResult<Position> {
    let x = element
        .child("X")
        .ok_or_else(|| WfsError::Format("<coord> without X".to_string()))?;
    let y = element
        .child("Y")
        .ok_or_else(|| WfsError::Format("<coord> without Y".to_string()))?;
    Ok(vec![parse_number(x.trimmed_text())?, parse_number(y.trimmed_text())?])
}
