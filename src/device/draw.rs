//! A tiny-skia based rasterizing device.

use tiny_skia::{
    FillRule as SkiaFillRule, FilterQuality, LineCap as SkiaLineCap, LineJoin as SkiaLineJoin,
    Mask, Paint, PathBuilder, Pixmap, PixmapMut, PixmapPaint, Stroke, StrokeDash,
};

use super::{Color, Device, FillRule, ImageData, LineCap, LineJoin, StrokeStyle};
use crate::error::{Error, Result};
use crate::geometry::{Path, PathSegment, Transform};
use crate::pixmap::PixelBuffer;

// --- Conversion helpers ---

fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for segment in path.segments() {
        match *segment {
            PathSegment::MoveTo(p) => pb.move_to(p.x, p.y),
            PathSegment::LineTo(p) => pb.line_to(p.x, p.y),
            PathSegment::CurveTo(c1, c2, p) => pb.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y),
            PathSegment::Close => pb.close(),
        }
    }
    pb.finish()
}

fn to_skia_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(
        to_byte(color.r),
        to_byte(color.g),
        to_byte(color.b),
        to_byte(color.a),
    );
    paint.anti_alias = true;
    paint
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn to_skia_fill_rule(rule: FillRule) -> SkiaFillRule {
    match rule {
        FillRule::NonZero => SkiaFillRule::Winding,
        FillRule::EvenOdd => SkiaFillRule::EvenOdd,
    }
}

fn to_skia_stroke(style: &StrokeStyle) -> Stroke {
    Stroke {
        width: style.line_width.max(0.0),
        miter_limit: style.miter_limit.max(1.0),
        line_cap: match style.line_cap {
            LineCap::Butt => SkiaLineCap::Butt,
            LineCap::Round => SkiaLineCap::Round,
            LineCap::Square => SkiaLineCap::Square,
        },
        line_join: match style.line_join {
            LineJoin::Miter => SkiaLineJoin::Miter,
            LineJoin::Round => SkiaLineJoin::Round,
            LineJoin::Bevel => SkiaLineJoin::Bevel,
        },
        dash: to_skia_dash(style),
    }
}

fn to_skia_dash(style: &StrokeStyle) -> Option<StrokeDash> {
    if style.dash_array.is_empty() {
        return None;
    }
    let mut array = style.dash_array.clone();
    // tiny-skia wants an even number of intervals.
    if array.len() % 2 == 1 {
        array.extend_from_within(..);
    }
    StrokeDash::new(array, style.dash_phase)
}

/// Rasterizes device calls into a [`PixelBuffer`].
///
/// The device transform maps page space to device pixels; the buffer origin
/// is subtracted on top of it, so content lands relative to the buffer's
/// top-left sample.
pub struct DrawDevice<'a> {
    pixmap: PixmapMut<'a>,
    base: Transform,
    clip_stack: Vec<Option<Mask>>,
    closed: bool,
}

impl<'a> DrawDevice<'a> {
    /// Bind a draw device to `ctm` and `pixmap`.
    pub fn new(ctm: Transform, pixmap: &'a mut PixelBuffer) -> Result<Self> {
        let (x, y) = pixmap.origin();
        let base = ctm.concat(&Transform::translate(-(x as f32), -(y as f32)));
        let pixmap = pixmap
            .as_skia_mut()
            .ok_or_else(|| Error::Render("cannot bind draw device to pixmap".to_string()))?;

        Ok(Self {
            pixmap,
            base,
            clip_stack: Vec::new(),
            closed: false,
        })
    }

    /// Full transform from primitive space to buffer pixels.
    fn device_transform(&self, ctm: &Transform) -> tiny_skia::Transform {
        ctm.concat(&self.base).to_skia()
    }

    /// Depth of the clip stack.
    pub fn clip_depth(&self) -> usize {
        self.clip_stack.len()
    }
}

impl Device for DrawDevice<'_> {
    fn fill_path(
        &mut self,
        path: &Path,
        rule: FillRule,
        ctm: &Transform,
        color: Color,
    ) -> Result<()> {
        let Some(path) = to_skia_path(path) else {
            return Ok(());
        };
        let transform = self.device_transform(ctm);
        let paint = to_skia_paint(color);
        let clip = self.clip_stack.last().and_then(|m| m.as_ref());
        self.pixmap
            .fill_path(&path, &paint, to_skia_fill_rule(rule), transform, clip);
        Ok(())
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &StrokeStyle,
        ctm: &Transform,
        color: Color,
    ) -> Result<()> {
        let Some(path) = to_skia_path(path) else {
            return Ok(());
        };
        let transform = self.device_transform(ctm);
        let paint = to_skia_paint(color);
        let stroke = to_skia_stroke(stroke);
        let clip = self.clip_stack.last().and_then(|m| m.as_ref());
        self.pixmap
            .stroke_path(&path, &paint, &stroke, transform, clip);
        Ok(())
    }

    fn clip_path(&mut self, path: &Path, rule: FillRule, ctm: &Transform) -> Result<()> {
        let transform = self.device_transform(ctm);
        let rule = to_skia_fill_rule(rule);

        let current = self.clip_stack.last().and_then(|m| m.clone());
        let mask = match (to_skia_path(path), current) {
            (Some(path), Some(mut mask)) => {
                mask.intersect_path(&path, rule, true, transform);
                Some(mask)
            }
            (Some(path), None) => {
                let mut mask = Mask::new(self.pixmap.width(), self.pixmap.height())
                    .ok_or_else(|| Error::Render("cannot allocate clip mask".to_string()))?;
                mask.fill_path(&path, rule, true, transform);
                Some(mask)
            }
            // An empty clip path clips everything away.
            (None, _) => Mask::new(self.pixmap.width(), self.pixmap.height()),
        };

        self.clip_stack.push(mask);
        Ok(())
    }

    fn pop_clip(&mut self) -> Result<()> {
        if self.clip_stack.pop().is_none() {
            log::warn!("pop_clip without matching clip_path");
        }
        Ok(())
    }

    fn fill_image(&mut self, image: &ImageData, ctm: &Transform, alpha: f32) -> Result<()> {
        let size = tiny_skia::IntSize::from_wh(image.width, image.height)
            .ok_or_else(|| Error::Render("image has zero size".to_string()))?;
        let premultiplied = premultiply(&image.samples);
        let source = Pixmap::from_vec(premultiplied, size)
            .ok_or_else(|| Error::Render("image samples do not match size".to_string()))?;

        let image_to_unit = Transform::scale(1.0 / image.width as f32, 1.0 / image.height as f32);
        let transform = self.device_transform(&image_to_unit.concat(ctm));
        let paint = PixmapPaint {
            opacity: alpha.clamp(0.0, 1.0),
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        let clip = self.clip_stack.last().and_then(|m| m.as_ref());
        self.pixmap
            .draw_pixmap(0, 0, source.as_ref(), &paint, transform, clip);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.clip_stack.is_empty() {
            log::debug!("closing draw device with {} open clips", self.clip_stack.len());
            self.clip_stack.clear();
        }
        self.closed = true;
        Ok(())
    }
}

/// Straight RGBA to tiny-skia's premultiplied storage.
fn premultiply(samples: &[u8]) -> Vec<u8> {
    let mut out = samples.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a != 255 {
            for c in &mut px[..3] {
                *c = ((*c as u16 * a + 127) / 255) as u8;
            }
        }
    }
    out
}
