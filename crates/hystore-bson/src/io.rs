//! Document read/write engine.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::BsonError;
use crate::value::{Bson, Document};

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 128;

/// Smallest valid document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: usize = 5;

const BINARY_SUBTYPE_GENERIC: u8 = 0x00;

// -----------------------------------------------------------------------
// Reading
// -----------------------------------------------------------------------

pub(crate) fn read_document(buf: &mut impl Buf, depth: usize) -> Result<Document, BsonError> {
    if depth > MAX_DEPTH {
        return Err(BsonError::NestingTooDeep { limit: MAX_DEPTH });
    }
    ensure_remaining(buf, 4)?;
    let declared = buf.get_i32_le();
    if declared < MIN_DOCUMENT_LEN as i32 {
        return Err(BsonError::InvalidLength(declared));
    }
    let declared = declared as usize;
    ensure_remaining(buf, declared - 4)?;
    let mut body: Bytes = buf.copy_to_bytes(declared - 4);

    let mut doc = Document::new();
    loop {
        ensure_remaining(&body, 1)?;
        let element_type = body.get_u8();
        if element_type == 0 {
            break;
        }
        let key = read_cstring(&mut body)?;
        let value = read_value(&mut body, element_type, depth)?;
        doc.insert(key, value);
    }

    if body.has_remaining() {
        return Err(BsonError::LengthMismatch {
            declared,
            consumed: declared - body.remaining(),
        });
    }
    Ok(doc)
}

fn read_value(buf: &mut Bytes, element_type: u8, depth: usize) -> Result<Bson, BsonError> {
    match element_type {
        0x01 => {
            ensure_remaining(buf, 8)?;
            Ok(Bson::Double(buf.get_f64_le()))
        }
        0x02 => Ok(Bson::String(read_string(buf)?)),
        0x03 => Ok(Bson::Document(read_document(buf, depth + 1)?)),
        0x04 => {
            let doc = read_document(buf, depth + 1)?;
            Ok(Bson::Array(doc.iter().map(|(_, v)| v.clone()).collect()))
        }
        0x05 => {
            ensure_remaining(buf, 5)?;
            let len = buf.get_i32_le();
            if len < 0 {
                return Err(BsonError::InvalidLength(len));
            }
            let _subtype = buf.get_u8();
            let len = len as usize;
            ensure_remaining(buf, len)?;
            Ok(Bson::Binary(buf.copy_to_bytes(len).to_vec()))
        }
        0x08 => {
            ensure_remaining(buf, 1)?;
            Ok(Bson::Boolean(buf.get_u8() != 0))
        }
        0x10 => {
            ensure_remaining(buf, 4)?;
            Ok(Bson::Int32(buf.get_i32_le()))
        }
        0x12 => {
            ensure_remaining(buf, 8)?;
            Ok(Bson::Int64(buf.get_i64_le()))
        }
        other => Err(BsonError::UnknownElementType(other)),
    }
}

fn read_cstring(buf: &mut Bytes) -> Result<String, BsonError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(BsonError::MissingTerminator)?;
    let data = buf.copy_to_bytes(end);
    buf.advance(1);
    String::from_utf8(data.to_vec()).map_err(|_| BsonError::InvalidUtf8)
}

fn read_string(buf: &mut Bytes) -> Result<String, BsonError> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_i32_le();
    if len < 1 {
        return Err(BsonError::InvalidLength(len));
    }
    let len = len as usize;
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len - 1);
    if buf.get_u8() != 0 {
        return Err(BsonError::MissingTerminator);
    }
    String::from_utf8(data.to_vec()).map_err(|_| BsonError::InvalidUtf8)
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), BsonError> {
    if buf.remaining() < needed {
        Err(BsonError::UnexpectedEof)
    } else {
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

pub(crate) fn write_document(buf: &mut BytesMut, doc: &Document) {
    write_elements(buf, doc.iter());
}

/// Writes `[len:i32le][elements...][0x00]`, back-patching the length once
/// the body size is known.
fn write_elements<'a>(buf: &mut BytesMut, elements: impl Iterator<Item = (&'a str, &'a Bson)>) {
    let start = buf.len();
    buf.put_i32_le(0);
    for (key, value) in elements {
        buf.put_u8(value.element_type());
        write_cstring(buf, key);
        write_value(buf, value);
    }
    buf.put_u8(0);
    let len = (buf.len() - start) as i32;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
}

fn write_value(buf: &mut BytesMut, value: &Bson) {
    match value {
        Bson::Double(v) => buf.put_f64_le(*v),
        Bson::String(s) => {
            buf.put_i32_le(s.len() as i32 + 1);
            buf.put_slice(s.as_bytes());
            buf.put_u8(0);
        }
        Bson::Document(doc) => write_document(buf, doc),
        Bson::Array(items) => {
            let keys: Vec<String> = (0..items.len()).map(|i| i.to_string()).collect();
            write_elements(buf, keys.iter().map(String::as_str).zip(items.iter()));
        }
        Bson::Binary(data) => {
            buf.put_i32_le(data.len() as i32);
            buf.put_u8(BINARY_SUBTYPE_GENERIC);
            buf.put_slice(data);
        }
        Bson::Boolean(v) => buf.put_u8(u8::from(*v)),
        Bson::Int32(v) => buf.put_i32_le(*v),
        Bson::Int64(v) => buf.put_i64_le(*v),
    }
}

fn write_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}
