//! Zone geometry - points, regions, and containment tests

/// A 2-D point in sensor pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Tolerance for on-boundary checks, in pixel units
const EPS: f64 = 1e-9;

/// A zone region: arbitrary closed polygon or axis-aligned rectangle
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Vertices in order, implicitly closed (last connects to first)
    Polygon(Vec<Point>),
    /// Normalized corners: min then max
    Rect(Point, Point),
}

impl Region {
    /// Build a rectangle from any two opposite corners
    pub fn rect(a: Point, b: Point) -> Self {
        let min = Point::new(a.x.min(b.x), a.y.min(b.y));
        let max = Point::new(a.x.max(b.x), a.y.max(b.y));
        Region::Rect(min, max)
    }

    /// Boundary-inclusive containment test
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Region::Rect(min, max) => {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
            }
            Region::Polygon(pts) => polygon_contains(pts, p),
        }
    }
}

/// Ray-casting crossing test with an explicit on-edge check so that
/// points exactly on the boundary count as inside
fn polygon_contains(pts: &[Point], p: Point) -> bool {
    let n = pts.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = pts[i];
        let b = pts[j];
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPS {
        return false;
    }
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

/// A named zone with its region, immutable after configuration load
#[derive(Debug, Clone)]
pub struct ZoneDefinition {
    pub name: String,
    pub region: Region,
}

impl ZoneDefinition {
    pub fn new(name: impl Into<String>, region: Region) -> Self {
        Self { name: name.into(), region }
    }
}
