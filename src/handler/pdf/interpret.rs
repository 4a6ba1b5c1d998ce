//! Content stream interpreter.
//!
//! Walks decoded content stream operations, tracks the graphics state and
//! forwards path, clip and image primitives to a [`Device`]. Text operators
//! are accepted and ignored.

use std::sync::Arc;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use super::content::{decode_content, INLINE_IMAGE};
use super::image::decode_image;
use super::{number, rect_from_object, resolve};
use crate::context::{Context, ResourceKey};
use crate::device::{Color, Device, FillRule, ImageData, LineCap, LineJoin, StrokeStyle};
use crate::error::Result;
use crate::geometry::{Path, Transform};

/// Store namespace for decoded image XObjects.
const IMAGE_NAMESPACE: &str = "pdf-image";

/// Form XObjects nested deeper than this are not drawn.
const MAX_FORM_DEPTH: usize = 16;

/// Maps the unit square with row 0 at the top onto PDF image space.
const IMAGE_FLIP: Transform = Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0);

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Transform,
    fill_color: Color,
    stroke_color: Color,
    fill_alpha: f32,
    stroke_alpha: f32,
    stroke: StrokeStyle,
    /// Clips pushed on the device since this state was saved.
    clip_count: usize,
}

impl GraphicsState {
    fn new(ctm: Transform) -> Self {
        Self {
            ctm,
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            stroke: StrokeStyle::default(),
            clip_count: 0,
        }
    }
}

/// Executes one page (and the forms it draws) against a device.
pub(super) struct Interpreter<'a> {
    doc: &'a LopdfDocument,
    ctx: &'a Context,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: Path,
    pending_clip: Option<FillRule>,
    form_depth: usize,
    /// `Q` never restores below this many saved states; a form cannot pop
    /// the states of the content that drew it.
    save_floor: usize,
}

impl<'a> Interpreter<'a> {
    pub(super) fn new(doc: &'a LopdfDocument, ctx: &'a Context, ctm: Transform) -> Self {
        Self {
            doc,
            ctx,
            state: GraphicsState::new(ctm),
            saved: Vec::new(),
            path: Path::new(),
            pending_clip: None,
            form_depth: 0,
            save_floor: 0,
        }
    }

    /// Run a page's operations, then drop any clips the content left open.
    pub(super) fn run_page(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        device: &mut dyn Device,
    ) -> Result<()> {
        let result = self.execute(operations, resources, device);

        // Unbalanced q/Q and trailing W are common; leave the device clean.
        while !self.saved.is_empty() {
            self.restore(device)?;
        }
        self.pop_clips(self.state.clip_count, device)?;
        self.state.clip_count = 0;

        result
    }

    fn execute(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        device: &mut dyn Device,
    ) -> Result<()> {
        for op in operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                // Graphics state
                "q" => self.save(),
                "Q" => {
                    if self.saved.len() <= self.save_floor {
                        log::trace!("ignoring Q without matching q");
                    } else {
                        self.restore(device)?;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix(operands) {
                        self.state.ctm = m.concat(&self.state.ctm);
                    }
                }
                "w" => {
                    if let Some(width) = first_number(operands) {
                        self.state.stroke.line_width = width.abs();
                    }
                }
                "J" => {
                    if let Some(cap) = first_number(operands) {
                        self.state.stroke.line_cap = line_cap(cap);
                    }
                }
                "j" => {
                    if let Some(join) = first_number(operands) {
                        self.state.stroke.line_join = line_join(join);
                    }
                }
                "M" => {
                    if let Some(limit) = first_number(operands) {
                        self.state.stroke.miter_limit = limit.max(1.0);
                    }
                }
                "d" => {
                    if let [array, phase] = operands {
                        self.set_dash(array, phase);
                    }
                }
                "gs" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.apply_ext_gstate(resources, name);
                    }
                }

                // Path construction
                "m" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        self.path.move_to(x, y);
                    }
                }
                "l" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        self.path.line_to(x, y);
                    }
                }
                "c" => {
                    if let Some([x1, y1, x2, y2, x3, y3]) = numbers::<6>(operands) {
                        self.path.curve_to(x1, y1, x2, y2, x3, y3);
                    }
                }
                "v" => {
                    if let (Some([x2, y2, x3, y3]), Some(p)) =
                        (numbers::<4>(operands), self.path.current_point())
                    {
                        self.path.curve_to(p.x, p.y, x2, y2, x3, y3);
                    }
                }
                "y" => {
                    if let Some([x1, y1, x3, y3]) = numbers::<4>(operands) {
                        self.path.curve_to(x1, y1, x3, y3, x3, y3);
                    }
                }
                "h" => self.path.close(),
                "re" => {
                    if let Some([x, y, w, h]) = numbers::<4>(operands) {
                        self.path.rect(x, y, w, h);
                    }
                }

                // Path painting
                "S" => self.paint(device, None, true)?,
                "s" => {
                    self.path.close();
                    self.paint(device, None, true)?;
                }
                "f" | "F" => self.paint(device, Some(FillRule::NonZero), false)?,
                "f*" => self.paint(device, Some(FillRule::EvenOdd), false)?,
                "B" => self.paint(device, Some(FillRule::NonZero), true)?,
                "B*" => self.paint(device, Some(FillRule::EvenOdd), true)?,
                "b" => {
                    self.path.close();
                    self.paint(device, Some(FillRule::NonZero), true)?;
                }
                "b*" => {
                    self.path.close();
                    self.paint(device, Some(FillRule::EvenOdd), true)?;
                }
                "n" => self.paint(device, None, false)?,

                // Clipping
                "W" => self.pending_clip = Some(FillRule::NonZero),
                "W*" => self.pending_clip = Some(FillRule::EvenOdd),

                // Colour
                "g" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        self.state.fill_color = Color::gray(v);
                    }
                }
                "G" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        self.state.stroke_color = Color::gray(v);
                    }
                }
                "rg" => {
                    if let Some([r, g, b]) = numbers::<3>(operands) {
                        self.state.fill_color = Color::rgb(r, g, b);
                    }
                }
                "RG" => {
                    if let Some([r, g, b]) = numbers::<3>(operands) {
                        self.state.stroke_color = Color::rgb(r, g, b);
                    }
                }
                "k" => {
                    if let Some([c, m, y, k]) = numbers::<4>(operands) {
                        self.state.fill_color = Color::cmyk(c, m, y, k);
                    }
                }
                "K" => {
                    if let Some([c, m, y, k]) = numbers::<4>(operands) {
                        self.state.stroke_color = Color::cmyk(c, m, y, k);
                    }
                }
                "cs" => self.state.fill_color = Color::BLACK,
                "CS" => self.state.stroke_color = Color::BLACK,
                "sc" | "scn" => {
                    if let Some(color) = color_from_components(operands) {
                        self.state.fill_color = color;
                    }
                }
                "SC" | "SCN" => {
                    if let Some(color) = color_from_components(operands) {
                        self.state.stroke_color = color;
                    }
                }

                // XObjects
                "Do" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.draw_xobject(resources, name, device)?;
                    }
                }

                INLINE_IMAGE => {
                    if let Some(Object::Stream(image)) = operands.first() {
                        self.draw_inline_image(image, resources, device)?;
                    }
                }

                "sh" => log::trace!("unsupported operator sh"),
                _ => {}
            }
        }
        Ok(())
    }

    fn save(&mut self) {
        let mut state = self.state.clone();
        state.clip_count = 0;
        self.saved.push(std::mem::replace(&mut self.state, state));
    }

    fn restore(&mut self, device: &mut dyn Device) -> Result<()> {
        self.pop_clips(self.state.clip_count, device)?;
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        Ok(())
    }

    fn pop_clips(&self, count: usize, device: &mut dyn Device) -> Result<()> {
        for _ in 0..count {
            device.pop_clip()?;
        }
        Ok(())
    }

    /// Fill and/or stroke the current path, apply a pending clip, then start
    /// a new path.
    fn paint(&mut self, device: &mut dyn Device, fill: Option<FillRule>, stroke: bool) -> Result<()> {
        if !self.path.is_empty() {
            if let Some(rule) = fill {
                let color = self.state.fill_color.with_alpha(self.state.fill_alpha);
                device.fill_path(&self.path, rule, &self.state.ctm, color)?;
            }
            if stroke {
                let color = self.state.stroke_color.with_alpha(self.state.stroke_alpha);
                device.stroke_path(&self.path, &self.state.stroke, &self.state.ctm, color)?;
            }
        }
        if let Some(rule) = self.pending_clip.take() {
            device.clip_path(&self.path, rule, &self.state.ctm)?;
            self.state.clip_count += 1;
        }
        self.path.clear();
        Ok(())
    }

    fn set_dash(&mut self, array: &Object, phase: &Object) {
        let Ok(items) = resolve(self.doc, array).as_array() else {
            return;
        };
        let dashes: Vec<f32> = items
            .iter()
            .filter_map(|o| number(resolve(self.doc, o)))
            .collect();
        // All-zero dash arrays are invalid; treat them as solid.
        self.state.stroke.dash_array = if dashes.iter().all(|d| *d <= 0.0) {
            Vec::new()
        } else {
            dashes
        };
        self.state.stroke.dash_phase = number(resolve(self.doc, phase)).unwrap_or(0.0);
    }

    fn apply_ext_gstate(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) {
        let Some(gs) = lookup_resource(self.doc, resources, b"ExtGState", name)
            .and_then(|o| o.as_dict().ok())
        else {
            log::debug!("missing ExtGState {}", String::from_utf8_lossy(name));
            return;
        };

        for (key, value) in gs.iter() {
            let value = resolve(self.doc, value);
            match key.as_slice() {
                b"LW" => {
                    if let Some(w) = number(value) {
                        self.state.stroke.line_width = w.abs();
                    }
                }
                b"LC" => {
                    if let Some(v) = number(value) {
                        self.state.stroke.line_cap = line_cap(v);
                    }
                }
                b"LJ" => {
                    if let Some(v) = number(value) {
                        self.state.stroke.line_join = line_join(v);
                    }
                }
                b"ML" => {
                    if let Some(v) = number(value) {
                        self.state.stroke.miter_limit = v.max(1.0);
                    }
                }
                b"CA" => {
                    if let Some(a) = number(value) {
                        self.state.stroke_alpha = a.clamp(0.0, 1.0);
                    }
                }
                b"ca" => {
                    if let Some(a) = number(value) {
                        self.state.fill_alpha = a.clamp(0.0, 1.0);
                    }
                }
                b"D" => {
                    if let Ok([array, phase]) = value.as_array().map(|a| a.as_slice()) {
                        self.set_dash(array, phase);
                    }
                }
                _ => {}
            }
        }
    }

    fn draw_xobject(
        &mut self,
        resources: Option<&'a Dictionary>,
        name: &[u8],
        device: &mut dyn Device,
    ) -> Result<()> {
        let Some(entry) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve(self.doc, x).as_dict().ok())
            .and_then(|x| x.get(name).ok())
        else {
            log::debug!("missing XObject {}", String::from_utf8_lossy(name));
            return Ok(());
        };
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Ok(stream) = resolve(self.doc, entry).as_stream() else {
            return Ok(());
        };

        match stream.dict.get(b"Subtype") {
            Ok(Object::Name(subtype)) if subtype == b"Image" => {
                self.draw_image(id, stream, device)
            }
            Ok(Object::Name(subtype)) if subtype == b"Form" => {
                self.draw_form(stream, resources, device)
            }
            _ => {
                log::trace!("skipping XObject {}", String::from_utf8_lossy(name));
                Ok(())
            }
        }
    }

    fn draw_image(
        &mut self,
        id: Option<ObjectId>,
        stream: &lopdf::Stream,
        device: &mut dyn Device,
    ) -> Result<()> {
        let key = id.map(image_key);
        let cached = key.and_then(|k| self.ctx.cached_image(&k));

        let image: Arc<ImageData> = match cached {
            Some(image) => image,
            None => match decode_image(self.doc, stream) {
                Ok(Some(decoded)) => match key {
                    Some(key) => self.ctx.cache_image(key, decoded),
                    None => Arc::new(decoded),
                },
                Ok(None) => return Ok(()),
                Err(e) => {
                    log::warn!("skipping undecodable image: {}", e);
                    return Ok(());
                }
            },
        };

        let ctm = IMAGE_FLIP.concat(&self.state.ctm);
        device.fill_image(&image, &ctm, self.state.fill_alpha)
    }

    /// Inline images are decoded on every use; they have no object id to
    /// cache them under.
    fn draw_inline_image(
        &mut self,
        image: &lopdf::Stream,
        resources: Option<&'a Dictionary>,
        device: &mut dyn Device,
    ) -> Result<()> {
        // A colour space may name an entry of the resource dictionary.
        let named = match image.dict.get(b"ColorSpace") {
            Ok(Object::Name(name)) => lookup_resource(self.doc, resources, b"ColorSpace", name),
            _ => None,
        };
        match named {
            Some(space) => {
                let mut image = image.clone();
                image.dict.set("ColorSpace", space.clone());
                self.draw_image(None, &image, device)
            }
            None => self.draw_image(None, image, device),
        }
    }

    fn draw_form(
        &mut self,
        stream: &'a lopdf::Stream,
        parent_resources: Option<&'a Dictionary>,
        device: &mut dyn Device,
    ) -> Result<()> {
        if self.form_depth >= MAX_FORM_DEPTH {
            log::warn!("form XObjects nested too deep, skipping");
            return Ok(());
        }

        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let operations = match decode_content(&content) {
            Ok(operations) => operations,
            Err(e) => {
                log::warn!("skipping form with bad content: {}", e);
                return Ok(());
            }
        };
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(self.doc, r).as_dict().ok())
            .or(parent_resources);

        let depth = self.saved.len();
        self.save();
        let outer_floor = std::mem::replace(&mut self.save_floor, self.saved.len());
        if let Some(m) = stream.dict.get(b"Matrix").ok().and_then(|m| {
            let values = resolve(self.doc, m).as_array().ok()?;
            matrix(values)
        }) {
            self.state.ctm = m.concat(&self.state.ctm);
        }
        if let Some(bbox) = stream
            .dict
            .get(b"BBox")
            .ok()
            .and_then(|b| rect_from_object(self.doc, b))
        {
            let mut clip = Path::new();
            clip.rect(bbox.x0, bbox.y0, bbox.width(), bbox.height());
            device.clip_path(&clip, FillRule::NonZero, &self.state.ctm)?;
            self.state.clip_count += 1;
        }

        // The current path is not part of the form's state.
        let outer_path = std::mem::take(&mut self.path);
        self.form_depth += 1;
        let result = self.execute(&operations, resources, device);
        self.form_depth -= 1;
        self.path = outer_path;
        self.save_floor = outer_floor;

        while self.saved.len() > depth {
            self.restore(device)?;
        }
        result
    }
}

fn image_key(id: ObjectId) -> ResourceKey {
    ResourceKey::new(IMAGE_NAMESPACE, ((id.0 as u64) << 16) | id.1 as u64)
}

fn lookup_resource<'a>(
    doc: &'a LopdfDocument,
    resources: Option<&'a Dictionary>,
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    let dict = resolve(doc, resources?.get(category).ok()?).as_dict().ok()?;
    Some(resolve(doc, dict.get(name).ok()?))
}

fn first_number(operands: &[Object]) -> Option<f32> {
    operands.first().and_then(number)
}

/// Exactly `N` numeric operands.
fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let values: Vec<f32> = operands.iter().filter_map(number).collect();
    let found = values.len();
    let result = values.try_into().ok();
    if result.is_none() {
        log::trace!("expected {} numeric operands, got {}", N, found);
    }
    result
}

fn matrix(operands: &[Object]) -> Option<Transform> {
    let values: Vec<f32> = operands.iter().filter_map(number).collect();
    match values.as_slice() {
        [a, b, c, d, e, f] => Some(Transform::new(*a, *b, *c, *d, *e, *f)),
        _ => None,
    }
}

fn line_cap(v: f32) -> LineCap {
    match v as i32 {
        1 => LineCap::Round,
        2 => LineCap::Square,
        _ => LineCap::Butt,
    }
}

fn line_join(v: f32) -> LineJoin {
    match v as i32 {
        1 => LineJoin::Round,
        2 => LineJoin::Bevel,
        _ => LineJoin::Miter,
    }
}

/// Pick a colour from `sc`/`scn` operands by component count. Pattern names
/// and unusual counts leave the colour unchanged.
fn color_from_components(operands: &[Object]) -> Option<Color> {
    let values: Vec<f32> = operands.iter().filter_map(number).collect();
    if values.len() != operands.len() {
        return None;
    }
    match values.as_slice() {
        [v] => Some(Color::gray(*v)),
        [r, g, b] => Some(Color::rgb(*r, *g, *b)),
        [c, m, y, k] => Some(Color::cmyk(*c, *m, *y, *k)),
        _ => None,
    }
}
