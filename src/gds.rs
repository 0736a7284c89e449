//! GDSII cell loading and the polygon queries used for port detection.

use derive_more::{Add, Mul, Sub};
use gds21::{GdsElement, GdsLibrary, GdsPoint, GdsStrans, GdsStruct};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::port::{Direction, PortSpec};
use crate::{round_to, Float, LayerId, PdkError};

/// Tolerance, in micrometers, for comparing edge lengths and positions.
const GRID_TOL: Float = 1e-3;

#[derive(Debug, Error)]
pub enum GdsError {
    #[error("Cell not found: {0}")]
    InvalidCell(String),
    #[error("Reference to undefined cell {0} from {1}")]
    DanglingReference(String, String),
    #[error("Cell hierarchy is recursive at {0}")]
    Recursive(String),
    #[error("Unsupported transformation in {0}: {1}")]
    Transform(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Add, Sub, Mul, Serialize, Deserialize)]
pub struct Point {
    pub x: Float,
    pub y: Float,
}

impl Point {
    pub fn new(x: Float, y: Float) -> Point {
        Point { x, y }
    }

    pub fn dot(&self, other: Point) -> Float {
        self.x * other.x + self.y * other.y
    }

    pub fn rounded(&self, decimals: i32) -> Point {
        Point::new(round_to(self.x, decimals), round_to(self.y, decimals))
    }
}

/// Closed polygon in micrometers; the closing vertex is not repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Polygon {
        Polygon { points }
    }

    pub fn rect(p0: Point, p1: Point) -> Polygon {
        let (x0, x1) = (p0.x.min(p1.x), p0.x.max(p1.x));
        let (y0, y1) = (p0.y.min(p1.y), p0.y.max(p1.y));
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    /// Lower-left and upper-right corners.
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let first = self.points.first()?;
        let (mut lo, mut hi) = (*first, *first);

        for p in self.points.iter().skip(1) {
            lo.x = lo.x.min(p.x);
            lo.y = lo.y.min(p.y);
            hi.x = hi.x.max(p.x);
            hi.y = hi.y.max(p.y);
        }

        Some((lo, hi))
    }

    /// Center of the bounding box.
    pub fn center(&self) -> Option<Point> {
        self.bounds().map(|(lo, hi)| (lo + hi) * 0.5)
    }

    /// Twice the signed area; positive for counter-clockwise winding.
    fn winding(&self) -> Float {
        let n = self.points.len();
        (0..n)
            .map(|i| {
                let (a, b) = (self.points[i], self.points[(i + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum()
    }

    /// Edges paired with the unit normal pointing into the polygon.
    fn inner_edges(&self) -> impl Iterator<Item = (Point, Point, Point)> + '_ {
        let n = self.points.len();
        let sign = if self.winding() >= 0.0 { 1.0 } else { -1.0 };

        (0..n).filter_map(move |i| {
            let (a, b) = (self.points[i], self.points[(i + 1) % n]);
            let d = b - a;
            let len = d.dot(d).sqrt();
            if len == 0.0 {
                return None;
            }
            // Left normal of a counter-clockwise edge points inside.
            let normal = Point::new(-d.y / len, d.x / len) * sign;
            Some((a, b, normal))
        })
    }
}

/// A port found on the layout geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPort {
    pub center: Point,
    pub direction: Direction,
}

/// Flattened cell geometry, grouped by layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    pub name: String,
    pub structures: BTreeMap<LayerId, Vec<Polygon>>,
}

impl Layout {
    pub fn new(name: &str) -> Layout {
        Layout {
            name: name.to_owned(),
            structures: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, layer: LayerId, polygon: Polygon) {
        self.structures.entry(layer).or_default().push(polygon);
    }

    pub fn get(&self, layer: LayerId) -> &[Polygon] {
        self.structures.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn polygon_count(&self) -> usize {
        self.structures.values().map(Vec::len).sum()
    }

    /// Move every polygon on a source layer onto its target layer.
    pub fn remap_layers(&mut self, map: &[(LayerId, LayerId)]) {
        for (from, to) in map {
            if from == to {
                continue;
            }
            if let Some(polygons) = self.structures.remove(from) {
                self.structures.entry(*to).or_default().extend(polygons);
            }
        }
    }

    /// Bounding-box centers of every shape on `layer`, rounded to `decimals`.
    pub fn centers(&self, layer: LayerId, decimals: i32) -> Vec<Point> {
        self.get(layer)
            .iter()
            .filter_map(Polygon::center)
            .map(|c| c.rounded(decimals))
            .collect()
    }

    /// Find ports of `spec` whose center lies inside the window `(lo, hi)`.
    ///
    /// A port exists where every path profile of the spec ends on an edge of
    /// matching width, centered at the profile offset, with the waveguide body
    /// on the side the port faces.
    pub fn detect_ports(&self, spec: &PortSpec, window: (Point, Point)) -> Vec<DetectedPort> {
        let Some(first) = spec.path_profiles.first() else {
            return Vec::new();
        };
        let (lo, hi) = window;
        let inside = |p: Point| {
            p.x >= lo.x - GRID_TOL
                && p.x <= hi.x + GRID_TOL
                && p.y >= lo.y - GRID_TOL
                && p.y <= hi.y + GRID_TOL
        };

        let mut found: Vec<DetectedPort> = Vec::new();

        for direction in Direction::ALL {
            let t = direction.transverse();
            for mid in self.profile_ends(first.layer, first.width, direction) {
                let center = mid - t * first.offset;
                if !inside(center) {
                    continue;
                }

                let complete = spec.path_profiles.iter().skip(1).all(|profile| {
                    let expected = center + t * profile.offset;
                    self.profile_ends(profile.layer, profile.width, direction)
                        .iter()
                        .any(|m| close(*m, expected))
                });

                let duplicate = found
                    .iter()
                    .any(|p| p.direction == direction && close(p.center, center));

                if complete && !duplicate {
                    found.push(DetectedPort { center, direction });
                }
            }
        }

        found
    }

    /// Midpoints of axis-aligned edges on `layer` with length `width` whose
    /// polygon interior lies along `direction`.
    fn profile_ends(&self, layer: LayerId, width: Float, direction: Direction) -> Vec<Point> {
        let facing = direction.unit();
        self.get(layer)
            .iter()
            .flat_map(|poly| poly.inner_edges())
            .filter_map(|(a, b, normal)| {
                let d = b - a;
                let len = d.dot(d).sqrt();
                let aligned = normal.dot(facing) > 1.0 - 1e-9;
                if aligned && (len - width).abs() <= GRID_TOL {
                    Some((a + b) * 0.5)
                } else {
                    None
                }
            })
            .collect()
    }
}

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= GRID_TOL && (a.y - b.y).abs() <= GRID_TOL
}

/// Affine placement of a referenced cell: optional x-axis reflection, then
/// rotation by a multiple of 90°, magnification and translation.
#[derive(Debug, Clone, Copy)]
struct Placement {
    reflect: bool,
    quarter_turns: u8,
    mag: Float,
    offset: Point,
}

impl Placement {
    const IDENTITY: Placement = Placement {
        reflect: false,
        quarter_turns: 0,
        mag: 1.0,
        offset: Point { x: 0.0, y: 0.0 },
    };

    fn from_strans(strans: Option<&GdsStrans>, offset: Point, cell: &str) -> Result<Placement, GdsError> {
        let Some(strans) = strans else {
            return Ok(Placement {
                offset,
                ..Placement::IDENTITY
            });
        };

        if strans.abs_mag || strans.abs_angle {
            return Err(GdsError::Transform(
                cell.to_owned(),
                "absolute magnification or angle".to_owned(),
            ));
        }

        let angle = strans.angle.unwrap_or(0.0);
        let turns = angle / 90.0;
        if (turns - turns.round()).abs() > 1e-9 {
            return Err(GdsError::Transform(
                cell.to_owned(),
                format!("rotation by {angle}°"),
            ));
        }

        Ok(Placement {
            reflect: strans.reflected,
            quarter_turns: (turns.round() as i64).rem_euclid(4) as u8,
            mag: strans.mag.unwrap_or(1.0),
            offset,
        })
    }

    fn apply(&self, p: Point) -> Point {
        let p = if self.reflect { Point::new(p.x, -p.y) } else { p };
        let p = match self.quarter_turns {
            1 => Point::new(-p.y, p.x),
            2 => Point::new(-p.x, -p.y),
            3 => Point::new(p.y, -p.x),
            _ => p,
        };
        p * self.mag + self.offset
    }

    /// `self` applied after `inner`.
    fn compose(&self, inner: &Placement) -> Placement {
        // Reflection conjugates the inner rotation.
        let inner_turns = if self.reflect {
            (4 - inner.quarter_turns) % 4
        } else {
            inner.quarter_turns
        };
        Placement {
            reflect: self.reflect ^ inner.reflect,
            quarter_turns: (self.quarter_turns + inner_turns) % 4,
            mag: self.mag * inner.mag,
            offset: self.apply(inner.offset),
        }
    }
}

/// Converts raw GDS structs into flattened [Layout]s in micrometers.
struct Flattener<'a> {
    structs: HashMap<&'a str, &'a GdsStruct>,
    scale: Float,
}

impl<'a> Flattener<'a> {
    fn new(lib: &'a GdsLibrary) -> Flattener<'a> {
        Flattener {
            structs: lib.structs.iter().map(|s| (s.name.as_str(), s)).collect(),
            // Database units to micrometers
            scale: lib.units.db_unit() / 1e-6,
        }
    }

    fn point(&self, p: &GdsPoint) -> Point {
        Point::new(p.x as Float * self.scale, p.y as Float * self.scale)
    }

    fn flatten(&self, name: &str) -> Result<Layout, GdsError> {
        let mut layout = Layout::new(name);
        let mut stack = Vec::new();
        self.visit(name, &Placement::IDENTITY, &mut stack, &mut layout)?;
        Ok(layout)
    }

    fn visit(
        &self,
        name: &str,
        placement: &Placement,
        stack: &mut Vec<String>,
        layout: &mut Layout,
    ) -> Result<(), GdsError> {
        if stack.iter().any(|s| s == name) {
            return Err(GdsError::Recursive(name.to_owned()));
        }
        let strukt = self
            .structs
            .get(name)
            .ok_or_else(|| GdsError::InvalidCell(name.to_owned()))?;
        stack.push(name.to_owned());

        let place = |pts: Vec<Point>| Polygon::new(pts.into_iter().map(|p| placement.apply(p)).collect());

        for elem in &strukt.elems {
            match elem {
                GdsElement::GdsBoundary(b) => {
                    let mut pts: Vec<Point> = b.xy.iter().map(|p| self.point(p)).collect();
                    if pts.len() > 1 && pts.first() == pts.last() {
                        pts.pop();
                    }
                    if pts.len() >= 3 {
                        layout.add((b.layer as u16, b.datatype as u16), place(pts));
                    }
                }
                GdsElement::GdsBox(b) => {
                    let rect = Polygon::rect(self.point(&b.xy[0]), self.point(&b.xy[2]));
                    layout.add((b.layer as u16, b.boxtype as u16), place(rect.points));
                }
                GdsElement::GdsPath(p) => {
                    let pts: Vec<Point> = p.xy.iter().map(|q| self.point(q)).collect();
                    let width = p.width.unwrap_or(0).unsigned_abs() as Float * self.scale;
                    let extend = match p.path_type {
                        Some(2) => width / 2.0,
                        _ => 0.0,
                    };
                    for segment in path_segments(&pts, width, extend) {
                        layout.add((p.layer as u16, p.datatype as u16), place(segment.points));
                    }
                }
                GdsElement::GdsStructRef(r) => {
                    let inner = Placement::from_strans(r.strans.as_ref(), self.point(&r.xy), name)?;
                    self.descend(&r.name, name, &placement.compose(&inner), stack, layout)?;
                }
                GdsElement::GdsArrayRef(a) => {
                    let (p0, p1, p2) = (self.point(&a.xy[0]), self.point(&a.xy[1]), self.point(&a.xy[2]));
                    let (cols, rows) = (a.cols.max(1) as Float, a.rows.max(1) as Float);
                    let col_step = (p1 - p0) * (1.0 / cols);
                    let row_step = (p2 - p0) * (1.0 / rows);
                    for ix in 0..a.cols.max(1) {
                        for iy in 0..a.rows.max(1) {
                            let origin = p0 + col_step * ix as Float + row_step * iy as Float;
                            let inner = Placement::from_strans(a.strans.as_ref(), origin, name)?;
                            self.descend(&a.name, name, &placement.compose(&inner), stack, layout)?;
                        }
                    }
                }
                // Text and node elements carry no mask geometry
                _ => {}
            }
        }

        stack.pop();
        Ok(())
    }

    fn descend(
        &self,
        child: &str,
        parent: &str,
        placement: &Placement,
        stack: &mut Vec<String>,
        layout: &mut Layout,
    ) -> Result<(), GdsError> {
        if !self.structs.contains_key(child) {
            return Err(GdsError::DanglingReference(child.to_owned(), parent.to_owned()));
        }
        self.visit(child, placement, stack, layout)
    }
}

/// Rectangles covering each segment of a path of the given width.
fn path_segments(pts: &[Point], width: Float, extend: Float) -> Vec<Polygon> {
    let half = width / 2.0;
    let last = pts.len().saturating_sub(2);

    pts.windows(2)
        .enumerate()
        .filter_map(|(i, w)| {
            let (mut a, mut b) = (w[0], w[1]);
            let d = b - a;
            let len = d.dot(d).sqrt();
            if len == 0.0 {
                return None;
            }
            let u = d * (1.0 / len);
            if i == 0 {
                a = a - u * extend;
            }
            if i == last {
                b = b + u * extend;
            }
            let n = Point::new(-u.y, u.x) * half;
            Some(Polygon::new(vec![a - n, b - n, b + n, a + n]))
        })
        .collect()
}

/// Names of cells not referenced by any other cell in the library.
pub fn top_level_cells(lib: &GdsLibrary) -> Vec<String> {
    let referenced: HashSet<&str> = lib
        .structs
        .iter()
        .flat_map(|s| s.elems.iter())
        .filter_map(|e| match e {
            GdsElement::GdsStructRef(r) => Some(r.name.as_str()),
            GdsElement::GdsArrayRef(a) => Some(a.name.as_str()),
            _ => None,
        })
        .collect();

    let mut names: Vec<String> = lib
        .structs
        .iter()
        .map(|s| s.name.clone())
        .filter(|n| !referenced.contains(n.as_str()))
        .collect();
    names.sort();
    names
}

/// Flatten one cell of an already-parsed library.
pub fn flatten_cell(lib: &GdsLibrary, cell: &str) -> Result<Layout, GdsError> {
    Flattener::new(lib).flatten(cell)
}

/// Load a GDSII file and flatten the named cell.
///
/// The file is parsed and released inside this call.
pub fn load_cell(path: &Path, cell: &str) -> Result<Layout, PdkError> {
    let lib = GdsLibrary::load(path)?;
    Ok(flatten_cell(&lib, cell)?)
}
