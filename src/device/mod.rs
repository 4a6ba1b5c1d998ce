//! Device trait for rendering backend abstraction.
//!
//! Document handlers decode page content into calls on a [`Device`]. The
//! device decides what to do with each primitive: [`DrawDevice`] rasterizes
//! into a [`PixelBuffer`](crate::PixelBuffer), other implementations can
//! collect bounds or trace calls.

mod draw;

pub use draw::DrawDevice;

use crate::error::Result;
use crate::geometry::{Path, Transform};

/// Rule deciding which regions of a self-intersecting path are inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// Line cap style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// Line join style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Stroke parameters, in the units of the transform the path is drawn with.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    /// Line width; zero means the thinnest line the device can draw.
    pub line_width: f32,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f32,
    /// Alternating on/off lengths. Empty for solid lines.
    pub dash_array: Vec<f32>,
    pub dash_phase: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            line_cap: LineCap::default(),
            line_join: LineJoin::default(),
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_phase: 0.0,
        }
    }
}

/// A straight (non-premultiplied) RGBA colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn gray(v: f32) -> Self {
        Self::rgb(v, v, v)
    }

    /// Naive CMYK conversion; no colour management.
    pub fn cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        let k = 1.0 - k.clamp(0.0, 1.0);
        Self::rgb(
            (1.0 - c.clamp(0.0, 1.0)) * k,
            (1.0 - m.clamp(0.0, 1.0)) * k,
            (1.0 - y.clamp(0.0, 1.0)) * k,
        )
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Components as bytes, rounded.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// A decoded raster image, RGBA8 with straight alpha, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

impl ImageData {
    /// Wrap RGBA samples; `None` when the length does not match the size.
    pub fn from_rgba(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || samples.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            samples,
        })
    }

    /// Memory held by the samples.
    pub fn byte_size(&self) -> usize {
        self.samples.len()
    }
}

/// A consumer of decoded page content.
///
/// Every call carries the full transform from the primitive's own space to
/// page space; a device composes it with its own device transform.
pub trait Device {
    /// Fill the interior of `path`.
    fn fill_path(&mut self, path: &Path, rule: FillRule, ctm: &Transform, color: Color)
        -> Result<()>;

    /// Stroke the outline of `path`.
    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeStyle,
        ctm: &Transform,
        color: Color,
    ) -> Result<()>;

    /// Intersect the clip region with `path` until the matching [`pop_clip`].
    ///
    /// [`pop_clip`]: Device::pop_clip
    fn clip_path(&mut self, path: &Path, rule: FillRule, ctm: &Transform) -> Result<()>;

    /// Restore the clip region in effect before the last `clip_path`.
    fn pop_clip(&mut self) -> Result<()>;

    /// Draw `image` with `ctm` mapping the unit square onto page space, image
    /// row 0 at the unit square's top edge (y = 0).
    fn fill_image(&mut self, image: &ImageData, ctm: &Transform, alpha: f32) -> Result<()>;

    /// Flush any pending output. Called once after the page has run.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
