//! RGBA pixel buffers.

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::geometry::IRect;

/// Bytes per pixel: R, G, B, A.
pub const BYTES_PER_PIXEL: usize = 4;

/// A dense RGBA8 pixel buffer covering an integer rectangle of device space.
///
/// Samples are stored row by row with a stride of `4 * width` bytes. The
/// buffer is allocated per render and handed over to the output image.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer covering `bbox`.
    ///
    /// Empty or oversized rectangles and failed allocations are reported as
    /// [`Error::PixmapCreation`].
    pub fn with_bbox(bbox: IRect) -> Result<Self> {
        let creation_error = || Error::PixmapCreation {
            width: bbox.width(),
            height: bbox.height(),
        };

        if bbox.is_empty() {
            return Err(creation_error());
        }

        let width = u32::try_from(bbox.width()).map_err(|_| creation_error())?;
        let height = u32::try_from(bbox.height()).map_err(|_| creation_error())?;
        let len = (width as usize)
            .checked_mul(BYTES_PER_PIXEL)
            .and_then(|stride| stride.checked_mul(height as usize))
            .ok_or_else(creation_error)?;

        let mut samples = Vec::new();
        samples.try_reserve_exact(len).map_err(|e| {
            log::warn!("pixmap allocation of {} bytes failed: {}", len, e);
            creation_error()
        })?;
        samples.resize(len, 0);

        Ok(Self {
            x: bbox.x0,
            y: bbox.y0,
            width,
            height,
            samples,
        })
    }

    /// Device-space position of the top-left sample.
    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn bbox(&self) -> IRect {
        IRect::new(
            self.x,
            self.y,
            self.x + self.width as i32,
            self.y + self.height as i32,
        )
    }

    /// Set every byte, alpha included, to `value`.
    pub fn clear_with_value(&mut self, value: u8) {
        self.samples.fill(value);
    }

    /// Read access to the raw samples.
    pub fn samples(&self) -> Result<&[u8]> {
        if self.samples.is_empty() || self.samples.len() != self.stride() * self.height as usize {
            return Err(Error::PixelRead);
        }
        Ok(&self.samples)
    }

    /// The RGBA value at buffer-relative `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = self.samples.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Mutable tiny-skia view over the samples.
    pub(crate) fn as_skia_mut(&mut self) -> Option<tiny_skia::PixmapMut<'_>> {
        tiny_skia::PixmapMut::from_bytes(&mut self.samples, self.width, self.height)
    }

    /// Move the samples into an [`RgbaImage`] without copying.
    pub fn into_image(self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.samples).ok_or(Error::PixelRead)
    }
}
