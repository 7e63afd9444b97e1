//! Primitive readers and writers shared by the section payload codecs.
//!
//! Section payloads are big-endian; strings are `[len:u16][utf8]`.

use bytes::{Buf, BufMut};

use crate::error::{Result, StorageError};

pub(crate) fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        Err(StorageError::Truncated {
            needed,
            remaining: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn read_u8(buf: &mut impl Buf) -> Result<u8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn read_bool(buf: &mut impl Buf) -> Result<bool> {
    Ok(read_u8(buf)? != 0)
}

pub(crate) fn read_u16(buf: &mut impl Buf) -> Result<u16> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn read_i32(buf: &mut impl Buf) -> Result<i32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

/// Read a length that must be non-negative and fit in the remaining input.
pub(crate) fn read_len(buf: &mut impl Buf) -> Result<usize> {
    let len = read_i32(buf)?;
    if len < 0 {
        return Err(StorageError::Corruption(format!("negative length {len}")));
    }
    ensure_remaining(buf, len as usize)?;
    Ok(len as usize)
}

pub(crate) fn read_utf(buf: &mut impl Buf) -> Result<String> {
    let len = read_u16(buf)? as usize;
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec())
        .map_err(|_| StorageError::Corruption("invalid UTF-8 in section string".into()))
}

/// Fail if `s` does not fit a `u16` length prefix.
pub(crate) fn check_utf(s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(StorageError::StringTooLong(s.len()));
    }
    Ok(())
}

/// Strings reach the writers only after [`check_utf`] accepted them.
pub(crate) fn write_utf(buf: &mut impl BufMut, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn utf_layout() {
        let mut buf = BytesMut::new();
        write_utf(&mut buf, "Rock_Stone");
        assert_eq!(&buf[..2], &[0x00, 0x0A]);
        assert_eq!(read_utf(&mut buf.freeze()).unwrap(), "Rock_Stone");
    }

    #[test]
    fn truncated_utf() {
        let data = [0x00, 0x05, b'a', b'b'];
        let err = read_utf(&mut &data[..]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Truncated {
                needed: 5,
                remaining: 2
            }
        ));
    }

    #[test]
    fn utf_length_limit() {
        assert!(check_utf(&"a".repeat(u16::MAX as usize)).is_ok());
        assert!(matches!(
            check_utf(&"a".repeat(u16::MAX as usize + 1)),
            Err(StorageError::StringTooLong(65536))
        ));
    }

    #[test]
    fn negative_len() {
        let data = (-1i32).to_be_bytes();
        assert!(read_len(&mut &data[..]).unwrap_err().is_corruption());
    }
}
