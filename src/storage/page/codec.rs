// Fixed-Width Page Codec
//
// Hash index pages hold fixed-size key/value entries directly in the page
// byte array. This trait is the explicit serialization seam for them.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// Fixed-width encoding of a value into a page byte slice.
pub trait FixedCodec: Sized {
    /// Encoded width in bytes. `encode`/`decode` operate on exactly this
    /// many bytes.
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl FixedCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl FixedCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl FixedCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl FixedCodec for Rid {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    fn decode(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}
