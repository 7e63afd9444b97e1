//! Binary document codec for chunk storage.
//!
//! Encodes the little-endian, length-prefixed document layout used as the
//! outer framing of every stored chunk. Only the element types the chunk
//! format needs are supported: double, string, document, array, binary,
//! boolean, int32 and int64.

pub mod error;
mod io;
pub mod value;

pub use error::BsonError;
pub use value::{Bson, Document};

use bytes::{Buf, BytesMut};

/// Read a single document from a buffer.
pub fn read_document(buf: &mut impl Buf) -> Result<Document, BsonError> {
    io::read_document(buf, 0)
}

/// Write a document to a buffer.
pub fn write_document(buf: &mut BytesMut, doc: &Document) {
    io::write_document(buf, doc)
}

/// Encode a document into a freshly allocated byte vector.
pub fn to_vec(doc: &Document) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_document(&mut buf, doc);
    buf.to_vec()
}

/// Decode a document from a byte slice, requiring the whole slice be consumed.
pub fn from_slice(data: &[u8]) -> Result<Document, BsonError> {
    let mut buf = data;
    let doc = read_document(&mut buf)?;
    if buf.has_remaining() {
        return Err(BsonError::LengthMismatch {
            declared: data.len(),
            consumed: data.len() - buf.remaining(),
        });
    }
    Ok(doc)
}
