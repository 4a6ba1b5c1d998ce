//! Content stream decoding.
//!
//! lopdf's content parser stops at the binary data of an inline image, so the
//! raw stream is split at each `BI ... ID <data> EI` first. The pieces between
//! images go through lopdf; each image becomes one [`INLINE_IMAGE`] operation
//! whose operand is the image as a stream with its keys spelled out in full.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream};

use crate::error::{Error, Result};

/// Operator of the synthetic inline image operation.
pub(super) const INLINE_IMAGE: &str = "BI";

/// Decode a content stream into operations, inline images included.
pub(super) fn decode_content(data: &[u8]) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut rest = data;

    while let Some(begin) = find_keyword(rest, b"BI") {
        decode_operations(&rest[..begin], &mut operations)?;

        let after = &rest[begin + 2..];
        let Some(id) = find_keyword(after, b"ID") else {
            log::warn!("inline image without ID, ignoring the rest of the content stream");
            return Ok(operations);
        };
        let dict = inline_dictionary(&after[..id])?;

        // A single white-space byte separates ID from the image data.
        let body = after.get(id + 3..).unwrap_or(&[]);
        let Some((len, resume)) = find_end(body, expected_length(&dict)) else {
            log::warn!("inline image without EI, ignoring the rest of the content stream");
            return Ok(operations);
        };

        operations.push(Operation::new(
            INLINE_IMAGE,
            vec![Object::Stream(Stream::new(dict, body[..len].to_vec()))],
        ));
        rest = &body[resume..];
    }

    decode_operations(rest, &mut operations)?;
    Ok(operations)
}

fn decode_operations(data: &[u8], operations: &mut Vec<Operation>) -> Result<()> {
    if data.iter().all(|b| is_whitespace(*b)) {
        return Ok(());
    }
    let content = Content::decode(data)
        .map_err(|e| Error::Render(format!("cannot decode content stream: {}", e)))?;
    operations.extend(content.operations);
    Ok(())
}

/// Parse the key/value pairs between `BI` and `ID` and expand abbreviated
/// keys to their image XObject names.
fn inline_dictionary(data: &[u8]) -> Result<Dictionary> {
    let mut wrapped = Vec::with_capacity(data.len() + 8);
    wrapped.extend_from_slice(b"<<");
    wrapped.extend_from_slice(data);
    wrapped.extend_from_slice(b">> BI");

    let parsed = Content::decode(&wrapped)
        .ok()
        .and_then(|c| c.operations.into_iter().next())
        .and_then(|op| op.operands.into_iter().next());
    let Some(Object::Dictionary(short)) = parsed else {
        return Err(Error::Render("bad inline image dictionary".to_string()));
    };

    let mut dict = Dictionary::new();
    for (key, value) in short.into_iter() {
        let key: &[u8] = match key.as_slice() {
            b"BPC" => b"BitsPerComponent",
            b"CS" => b"ColorSpace",
            b"D" => b"Decode",
            b"DP" => b"DecodeParms",
            b"F" => b"Filter",
            b"H" => b"Height",
            b"IM" => b"ImageMask",
            b"I" => b"Interpolate",
            b"W" => b"Width",
            other => other,
        };
        dict.set(key.to_vec(), value);
    }
    Ok(dict)
}

/// Byte length of unfiltered image data, when the dictionary pins it down.
fn expected_length(dict: &Dictionary) -> Option<usize> {
    if dict.get(b"Filter").is_ok() {
        return None;
    }
    let int = |key: &[u8]| match dict.get(key) {
        Ok(Object::Integer(v)) => usize::try_from(*v).ok(),
        _ => None,
    };
    let width = int(b"Width")?;
    let height = int(b"Height")?;

    let (components, bpc) = if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        (1, 1)
    } else {
        let components = match dict.get(b"ColorSpace") {
            Ok(Object::Name(name)) => match name.as_slice() {
                b"G" | b"DeviceGray" => 1,
                b"RGB" | b"DeviceRGB" => 3,
                b"CMYK" | b"DeviceCMYK" => 4,
                _ => return None,
            },
            Ok(Object::Array(items)) => match items.first() {
                Some(Object::Name(family)) if family == b"I" || family == b"Indexed" => 1,
                _ => return None,
            },
            _ => return None,
        };
        (components, int(b"BitsPerComponent")?)
    };

    let row_bits = width.checked_mul(components)?.checked_mul(bpc)?;
    row_bits.div_ceil(8).checked_mul(height)
}

/// Locate the end of inline image data. Returns the data length and the
/// offset just past `EI`.
fn find_end(body: &[u8], expected: Option<usize>) -> Option<(usize, usize)> {
    if let Some(len) = expected.filter(|&len| len <= body.len()) {
        let mut i = len;
        while i < body.len() && is_whitespace(body[i]) {
            i += 1;
        }
        if is_end_marker(body, i) {
            return Some((len, i + 2));
        }
        log::debug!("inline image data does not end at its declared length");
    }

    (1..body.len())
        .find(|&i| is_whitespace(body[i - 1]) && is_end_marker(body, i))
        .map(|i| (i - 1, i + 2))
}

fn is_end_marker(body: &[u8], i: usize) -> bool {
    body.get(i..i + 2) == Some(b"EI".as_slice())
        && body
            .get(i + 2)
            .map_or(true, |b| is_whitespace(*b) || is_delimiter(*b))
}

/// Offset of the first `keyword` token outside strings, names and comments.
fn find_keyword(data: &[u8], keyword: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'%' => {
                while i < data.len() && !matches!(data[i], b'\r' | b'\n') {
                    i += 1;
                }
            }
            b'(' => i = skip_literal_string(data, i),
            b'/' => {
                i += 1;
                while i < data.len() && is_regular(data[i]) {
                    i += 1;
                }
            }
            b if !is_regular(b) => i += 1,
            _ => {
                let start = i;
                while i < data.len() && is_regular(data[i]) {
                    i += 1;
                }
                if &data[start..i] == keyword {
                    return Some(start);
                }
            }
        }
    }
    None
}

/// Offset just past the literal string opening at `start`.
fn skip_literal_string(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    data.len()
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}
