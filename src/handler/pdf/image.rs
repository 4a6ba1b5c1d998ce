//! Image XObject decoding.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document as LopdfDocument, Object, Stream};

use super::{number, resolve};
use crate::device::{Color, ImageData};
use crate::error::{Error, Result};

/// Largest image accepted, in pixels.
const MAX_IMAGE_PIXELS: u64 = 1 << 28;

/// PNG predictors work on at most this many interleaved components.
const MAX_PREDICTOR_COLORS: i64 = 32;

/// Decode an image XObject into RGBA samples.
///
/// Returns `Ok(None)` for images this decoder does not support (stencil
/// masks, JPX, JBIG2, CCITT); these are skipped rather than failing the page.
pub(super) fn decode_image(doc: &LopdfDocument, stream: &Stream) -> Result<Option<ImageData>> {
    let dict = &stream.dict;
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        log::debug!("skipping stencil image mask");
        return Ok(None);
    }

    let width = dict_u32(doc, dict, b"Width").unwrap_or(0);
    let height = dict_u32(doc, dict, b"Height").unwrap_or(0);
    if width == 0 || height == 0 || width as u64 * height as u64 > MAX_IMAGE_PIXELS {
        return Err(Error::Render(format!(
            "unsupported image size {}x{}",
            width, height
        )));
    }

    let Some(data) = stream_data(stream)? else {
        return Ok(None);
    };

    let mut rgba = match data {
        StreamData::Jpeg(bytes) => decode_jpeg(&bytes, width, height)?,
        StreamData::Raw(bytes) => {
            let bpc = dict_u32(doc, dict, b"BitsPerComponent").unwrap_or(8);
            let space = dict
                .get(b"ColorSpace")
                .ok()
                .map(|cs| ColorSpace::from_object(doc, cs))
                .unwrap_or(ColorSpace::Gray);
            decode_samples(&bytes, width, height, bpc, &space)?
        }
    };

    if let Ok(smask) = dict.get(b"SMask") {
        if let Object::Stream(mask) = resolve(doc, smask) {
            apply_soft_mask(doc, mask, width, height, &mut rgba)?;
        }
    }

    Ok(ImageData::from_rgba(width, height, rgba))
}

enum StreamData {
    Raw(Vec<u8>),
    Jpeg(Vec<u8>),
}

/// Undo the stream's filters. `None` when a filter is not supported.
fn stream_data(stream: &Stream) -> Result<Option<StreamData>> {
    let filters: Vec<&[u8]> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(names)) => names
            .iter()
            .filter_map(|n| n.as_name().ok())
            .collect(),
        _ => Vec::new(),
    };
    let params: Vec<Option<&Dictionary>> = match stream.dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(d)) => vec![Some(d)],
        Ok(Object::Array(items)) => items.iter().map(|o| o.as_dict().ok()).collect(),
        _ => Vec::new(),
    };

    let mut data = stream.content.clone();
    for (i, &filter) in filters.iter().enumerate() {
        let parms = params.get(i).copied().flatten();
        data = match filter {
            b"FlateDecode" | b"Fl" => apply_predictor(inflate(&data)?, parms)?,
            b"ASCIIHexDecode" | b"AHx" => decode_ascii_hex(&data),
            b"DCTDecode" | b"DCT" if i + 1 == filters.len() => {
                return Ok(Some(StreamData::Jpeg(data)));
            }
            other => {
                log::debug!(
                    "unsupported image filter {}",
                    String::from_utf8_lossy(other)
                );
                return Ok(None);
            }
        };
    }
    Ok(Some(StreamData::Raw(data)))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data);
    if let Err(e) = decoder.read_to_end(&mut out) {
        // Truncated streams are common; keep what was inflated.
        if out.is_empty() {
            return Err(Error::Render(format!("cannot inflate image stream: {}", e)));
        }
        log::warn!("image stream truncated: {}", e);
    }
    Ok(out)
}

/// Reverse PNG row predictors (Predictor >= 10).
fn apply_predictor(data: Vec<u8>, parms: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let get = |key: &[u8], default: i64| match parms.get(key) {
        Ok(Object::Integer(v)) => *v,
        _ => default,
    };
    let predictor = get(b"Predictor", 1);
    if predictor < 10 {
        if predictor == 2 {
            log::debug!("TIFF predictor not supported, using samples as-is");
        }
        return Ok(data);
    }

    let colors = get(b"Colors", 1);
    let bpc = get(b"BitsPerComponent", 8);
    let columns = get(b"Columns", 1);
    if !(1..=MAX_PREDICTOR_COLORS).contains(&colors) || !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(Error::Render(format!(
            "bad predictor parameters: Colors {} BitsPerComponent {}",
            colors, bpc
        )));
    }
    let (colors, bpc) = (colors as usize, bpc as usize);
    let bpp = (colors * bpc).div_ceil(8).max(1);

    // A row can never be longer than the inflated data it was predicted from.
    let row_len = usize::try_from(columns)
        .ok()
        .filter(|&c| c > 0)
        .and_then(|c| c.checked_mul(colors * bpc))
        .map(|bits| bits.div_ceil(8))
        .filter(|&len| len < data.len())
        .ok_or_else(|| {
            Error::Render(format!(
                "predictor Columns {} does not fit {} bytes of image data",
                columns,
                data.len()
            ))
        })?;

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < 2 {
            break;
        }
        let kind = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::Render(format!("bad PNG predictor row type {}", other)));
                }
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn decode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = data
        .iter()
        .take_while(|&&b| b != b'>')
        .filter_map(|&b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn decode_jpeg(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let decoded = ::image::load_from_memory_with_format(bytes, ::image::ImageFormat::Jpeg)
        .map_err(|e| Error::Render(format!("cannot decode JPEG image: {}", e)))?
        .to_rgba8();
    if decoded.dimensions() != (width, height) {
        log::warn!(
            "JPEG is {:?} but image dictionary says {}x{}",
            decoded.dimensions(),
            width,
            height
        );
        return Err(Error::Render("JPEG size mismatch".to_string()));
    }
    Ok(decoded.into_raw())
}

/// Colour spaces understood by the sample decoder.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of RGB entries.
    Indexed(Vec<[u8; 3]>),
}

impl ColorSpace {
    fn from_object(doc: &LopdfDocument, obj: &Object) -> Self {
        match resolve(doc, obj) {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let family = items.first().and_then(|o| resolve(doc, o).as_name().ok());
                match family {
                    Some(b"ICCBased") => {
                        let n = items
                            .get(1)
                            .and_then(|o| resolve(doc, o).as_stream().ok())
                            .and_then(|s| s.dict.get(b"N").ok())
                            .and_then(number)
                            .unwrap_or(3.0);
                        Self::from_components(n as usize)
                    }
                    Some(b"CalGray") => ColorSpace::Gray,
                    Some(b"CalRGB") | Some(b"Lab") => ColorSpace::Rgb,
                    Some(b"Indexed") | Some(b"I") => Self::indexed(doc, items),
                    Some(other) => Self::from_name(other),
                    None => ColorSpace::Gray,
                }
            }
            _ => ColorSpace::Gray,
        }
    }

    fn from_name(name: &[u8]) -> Self {
        match name {
            b"DeviceRGB" | b"RGB" | b"CalRGB" => ColorSpace::Rgb,
            b"DeviceCMYK" | b"CMYK" => ColorSpace::Cmyk,
            _ => ColorSpace::Gray,
        }
    }

    fn from_components(n: usize) -> Self {
        match n {
            3 => ColorSpace::Rgb,
            4 => ColorSpace::Cmyk,
            _ => ColorSpace::Gray,
        }
    }

    fn indexed(doc: &LopdfDocument, items: &[Object]) -> Self {
        let base = items
            .get(1)
            .map(|o| ColorSpace::from_object(doc, o))
            .unwrap_or(ColorSpace::Rgb);
        let lookup: Vec<u8> = match items.get(3).map(|o| resolve(doc, o)) {
            Some(Object::String(bytes, _)) => bytes.clone(),
            Some(Object::Stream(s)) => s
                .decompressed_content()
                .unwrap_or_else(|_| s.content.clone()),
            _ => Vec::new(),
        };
        let n = base.components();
        let palette = lookup
            .chunks_exact(n)
            .map(|entry| base.to_rgb(entry))
            .collect();
        ColorSpace::Indexed(palette)
    }

    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed(_) => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    /// Convert one pixel's 8-bit components.
    fn to_rgb(&self, c: &[u8]) -> [u8; 3] {
        match self {
            ColorSpace::Gray => [c[0], c[0], c[0]],
            ColorSpace::Rgb => [c[0], c[1], c[2]],
            ColorSpace::Cmyk => {
                let f = |v: u8| v as f32 / 255.0;
                let rgba = Color::cmyk(f(c[0]), f(c[1]), f(c[2]), f(c[3])).to_rgba8();
                [rgba[0], rgba[1], rgba[2]]
            }
            ColorSpace::Indexed(palette) => palette
                .get(c[0] as usize)
                .copied()
                .unwrap_or([0, 0, 0]),
        }
    }
}

/// Unpack `bpc`-bit samples into 8-bit components, row by row.
fn unpack_components(data: &[u8], width: u32, height: u32, n: usize, bpc: u32) -> Vec<u8> {
    let per_row = width as usize * n;
    let row_bytes = (per_row * bpc as usize).div_ceil(8);
    let mut out = Vec::with_capacity(per_row * height as usize);
    let max = ((1u32 << bpc.min(8)) - 1) as f32;

    for row in 0..height as usize {
        let start = row * row_bytes;
        let bytes = data.get(start..).unwrap_or(&[]);
        for i in 0..per_row {
            let value = match bpc {
                8 => bytes.get(i).copied().unwrap_or(0),
                16 => bytes.get(i * 2).copied().unwrap_or(0),
                1 | 2 | 4 => {
                    let bit = i * bpc as usize;
                    let byte = bytes.get(bit / 8).copied().unwrap_or(0);
                    let shift = 8 - bpc as usize - (bit % 8);
                    let raw = (byte >> shift) & ((1u8 << bpc) - 1);
                    ((raw as f32 / max) * 255.0).round() as u8
                }
                _ => 0,
            };
            out.push(value);
        }
    }
    out
}

fn decode_samples(
    data: &[u8],
    width: u32,
    height: u32,
    bpc: u32,
    space: &ColorSpace,
) -> Result<Vec<u8>> {
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(Error::Render(format!("unsupported BitsPerComponent {}", bpc)));
    }
    let n = space.components();

    let components = if let ColorSpace::Indexed(_) = space {
        // Palette indices are used raw, not rescaled to 0..255.
        unpack_indices(data, width, height, bpc)
    } else {
        unpack_components(data, width, height, n, bpc)
    };

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for px in components.chunks_exact(n) {
        let [r, g, b] = space.to_rgb(px);
        rgba.extend_from_slice(&[r, g, b, 255]);
    }
    Ok(rgba)
}

fn unpack_indices(data: &[u8], width: u32, height: u32, bpc: u32) -> Vec<u8> {
    let bpc = bpc.min(8);
    let row_bytes = (width as usize * bpc as usize).div_ceil(8);
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height as usize {
        let bytes = data.get(row * row_bytes..).unwrap_or(&[]);
        for i in 0..width as usize {
            let bit = i * bpc as usize;
            let byte = bytes.get(bit / 8).copied().unwrap_or(0);
            let shift = 8 - bpc as usize - (bit % 8);
            out.push((byte >> shift) & (((1u16 << bpc) - 1) as u8));
        }
    }
    out
}

fn apply_soft_mask(
    doc: &LopdfDocument,
    mask: &Stream,
    width: u32,
    height: u32,
    rgba: &mut [u8],
) -> Result<()> {
    if dict_u32(doc, &mask.dict, b"Width") != Some(width)
        || dict_u32(doc, &mask.dict, b"Height") != Some(height)
    {
        log::debug!("soft mask size differs from image, ignoring");
        return Ok(());
    }
    let Some(StreamData::Raw(data)) = stream_data(mask)? else {
        return Ok(());
    };
    let bpc = dict_u32(doc, &mask.dict, b"BitsPerComponent").unwrap_or(8);
    let alpha = unpack_components(&data, width, height, 1, bpc);
    for (px, a) in rgba.chunks_exact_mut(4).zip(alpha) {
        px[3] = a;
    }
    Ok(())
}

fn dict_u32(doc: &LopdfDocument, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let value = number(resolve(doc, dict.get(key).ok()?))?;
    (value >= 0.0).then_some(value as u32)
}
