//! Geometry value types: points, rectangles, affine transforms and paths.
//!
//! Coordinates follow the device convention: x grows right, y grows down.
//! Transforms use the row-vector form
//!
//! ```text
//! x' = a·x + c·y + e
//! y' = b·x + d·y + f
//! ```

use serde::{Deserialize, Serialize};

/// A point in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Map the point through a transform.
    pub fn transform(self, m: &Transform) -> Self {
        Self {
            x: self.x * m.a + self.y * m.c + m.e,
            y: self.x * m.b + self.y * m.d + m.f,
        }
    }
}

/// A 2D affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Transform {
    pub const fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub const fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Clockwise rotation in a y-down space.
    ///
    /// Quarter turns are exact so that rotated page boxes keep integral sizes.
    pub fn rotate(degrees: f32) -> Self {
        let degrees = degrees.rem_euclid(360.0);
        let (sin, cos) = if degrees == 0.0 {
            (0.0, 1.0)
        } else if degrees == 90.0 {
            (1.0, 0.0)
        } else if degrees == 180.0 {
            (0.0, -1.0)
        } else if degrees == 270.0 {
            (-1.0, 0.0)
        } else {
            degrees.to_radians().sin_cos()
        };
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Transform that applies `self` first and `next` second.
    pub fn concat(&self, next: &Transform) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Coefficients in `[a, b, c, d, e, f]` order.
    pub fn to_array(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Transform {
        tiny_skia::Transform::from_row(self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f32; 6]> for Transform {
    fn from(m: [f32; 6]) -> Self {
        Self::new(m[0], m[1], m[2], m[3], m[4], m[5])
    }
}

/// A floating-point rectangle given by two corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build a rectangle from any two opposite corners.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        !(self.x1 > self.x0 && self.y1 > self.y0)
    }

    /// Axis-aligned bounding box of the four transformed corners.
    pub fn transform(&self, m: &Transform) -> Rect {
        let corners = [
            Point::new(self.x0, self.y0).transform(m),
            Point::new(self.x1, self.y0).transform(m),
            Point::new(self.x0, self.y1).transform(m),
            Point::new(self.x1, self.y1).transform(m),
        ];

        let mut out = Rect::new(corners[0].x, corners[0].y, corners[0].x, corners[0].y);
        for p in &corners[1..] {
            out.x0 = out.x0.min(p.x);
            out.y0 = out.y0.min(p.y);
            out.x1 = out.x1.max(p.x);
            out.y1 = out.y1.max(p.y);
        }
        out
    }

    /// Round each coordinate independently to the nearest integer.
    pub fn round(&self) -> IRect {
        IRect::new(
            round_coord(self.x0),
            round_coord(self.y0),
            round_coord(self.x1),
            round_coord(self.y1),
        )
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        )
    }
}

fn round_coord(v: f32) -> i32 {
    // Saturating cast keeps absurd page boxes from wrapping.
    v.round() as i32
}

/// An integer rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl IRect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> i64 {
        self.x1 as i64 - self.x0 as i64
    }

    pub fn height(&self) -> i64 {
        self.y1 as i64 - self.y0 as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// One segment of a path outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    Close,
}

/// A vector outline made of subpaths, in the coordinate space of the
/// transform it is drawn with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    segments: Vec<PathSegment>,
    start: Option<Point>,
    current: Option<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        let p = Point::new(x, y);
        self.segments.push(PathSegment::MoveTo(p));
        self.start = Some(p);
        self.current = Some(p);
    }

    /// A line from the current point. Without a current point this starts a
    /// subpath instead.
    pub fn line_to(&mut self, x: f32, y: f32) {
        if self.current.is_none() {
            self.move_to(x, y);
            return;
        }
        let p = Point::new(x, y);
        self.segments.push(PathSegment::LineTo(p));
        self.current = Some(p);
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        if self.current.is_none() {
            self.move_to(x1, y1);
        }
        let end = Point::new(x3, y3);
        self.segments.push(PathSegment::CurveTo(
            Point::new(x1, y1),
            Point::new(x2, y2),
            end,
        ));
        self.current = Some(end);
    }

    pub fn close(&mut self) {
        if self.current.is_some() {
            self.segments.push(PathSegment::Close);
            self.current = self.start;
        }
    }

    /// Append a closed rectangle subpath.
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.move_to(x, y);
        self.line_to(x + w, y);
        self.line_to(x + w, y + h);
        self.line_to(x, y + h);
        self.close();
    }

    pub fn current_point(&self) -> Option<Point> {
        self.current
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.start = None;
        self.current = None;
    }
}
