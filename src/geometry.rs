use crate::error::GeometryIssue;
use geo::{Coord, LineInterpolatePoint, LineLocatePoint, LineString, MultiLineString, Point};

/// Geometry accepted at the planner boundary. Anything else is rejected by
/// `TryFrom<geo_types::Geometry>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    LineString(LineString<f64>),
    MultiLineString(MultiLineString<f64>),
}

impl Geometry {
    pub fn validate(&self) -> Result<(), GeometryIssue> {
        let finite = match self {
            Geometry::Point(p) => coord_is_finite(p.0),
            Geometry::LineString(ls) => ls.0.iter().all(|c| coord_is_finite(*c)),
            Geometry::MultiLineString(mls) => mls
                .0
                .iter()
                .all(|ls| ls.0.iter().all(|c| coord_is_finite(*c))),
        };
        if !finite {
            return Err(GeometryIssue::NonFinite);
        }
        Ok(())
    }

    /// The point of a point geometry, for layers that only take points.
    pub fn as_point(&self) -> Result<Coord<f64>, GeometryIssue> {
        match self {
            Geometry::Point(p) => {
                if coord_is_finite(p.0) {
                    Ok(p.0)
                } else {
                    Err(GeometryIssue::NonFinite)
                }
            }
            Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Err(GeometryIssue::WrongKind)
            }
        }
    }

    /// Line parts of a linear geometry, for layers that only take segments.
    pub fn line_parts(&self) -> Result<Vec<&LineString<f64>>, GeometryIssue> {
        match self {
            Geometry::Point(_) => Err(GeometryIssue::WrongKind),
            Geometry::LineString(ls) => Ok(vec![ls]),
            Geometry::MultiLineString(mls) if mls.0.is_empty() => Err(GeometryIssue::Degenerate),
            Geometry::MultiLineString(mls) => Ok(mls.0.iter().collect()),
        }
    }
}

impl TryFrom<geo_types::Geometry<f64>> for Geometry {
    type Error = GeometryIssue;

    fn try_from(value: geo_types::Geometry<f64>) -> Result<Self, Self::Error> {
        match value {
            geo_types::Geometry::Point(p) => Ok(Geometry::Point(p)),
            geo_types::Geometry::LineString(ls) => Ok(Geometry::LineString(ls)),
            geo_types::Geometry::MultiLineString(mls) => Ok(Geometry::MultiLineString(mls)),
            geo_types::Geometry::Line(l) => Ok(Geometry::LineString(LineString::new(vec![
                l.start, l.end,
            ]))),
            _ => Err(GeometryIssue::WrongKind),
        }
    }
}

impl From<Coord<f64>> for Geometry {
    fn from(c: Coord<f64>) -> Self {
        Geometry::Point(Point(c))
    }
}

pub fn coord_is_finite(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.0
        .windows(2)
        .map(|w| planar_distance(w[0], w[1]))
        .sum()
}

/// Drops consecutive duplicate vertices. Returns `None` if fewer than two remain.
pub fn clean_polyline(line: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(line.0.len());
    for c in &line.0 {
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    if coords.len() < 2 {
        return None;
    }
    Some(LineString::new(coords))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance from the line's first vertex to the projected point, along the line.
    pub distance_along: f64,
    /// Distance from the query point to the projected point.
    pub offset: f64,
    pub point: Coord<f64>,
}

/// Project a point onto a polyline.
pub fn project_onto_polyline(line: &LineString<f64>, point: Coord<f64>) -> Option<Projection> {
    let total = polyline_length(line);
    if total <= 0.0 {
        return None;
    }

    let p = Point(point);
    let fraction = line.line_locate_point(&p)?;
    let projected = line.line_interpolate_point(fraction)?;

    Some(Projection {
        distance_along: fraction * total,
        offset: planar_distance(point, projected.0),
        point: projected.0,
    })
}

/// Split a polyline at a distance along it. Both halves keep the original
/// vertices on their side, so their lengths add up to the original length.
pub fn split_polyline(
    line: &LineString<f64>,
    distance_along: f64,
) -> Option<(LineString<f64>, LineString<f64>)> {
    let total = polyline_length(line);
    if distance_along <= 0.0 || distance_along >= total {
        return None;
    }

    let mut head: Vec<Coord<f64>> = vec![line.0[0]];
    let mut walked = 0.0;

    for (i, w) in line.0.windows(2).enumerate() {
        let seg = planar_distance(w[0], w[1]);
        if walked + seg >= distance_along {
            let t = if seg > 0.0 {
                (distance_along - walked) / seg
            } else {
                0.0
            };
            let cut = Coord {
                x: w[0].x + (w[1].x - w[0].x) * t,
                y: w[0].y + (w[1].y - w[0].y) * t,
            };
            if head.last() != Some(&cut) {
                head.push(cut);
            }

            let mut tail: Vec<Coord<f64>> = vec![cut];
            for c in &line.0[i + 1..] {
                if tail.last() != Some(c) {
                    tail.push(*c);
                }
            }

            if head.len() < 2 || tail.len() < 2 {
                return None;
            }
            return Some((LineString::new(head), LineString::new(tail)));
        }
        walked += seg;
        head.push(w[1]);
    }

    None
}
