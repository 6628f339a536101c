// Index Key
//
// Fixed-width key for the disk-resident hash index. Variable-length key
// tuples are serialized and packed into N bytes (zero padded, truncated if
// longer), so the bucket page layout stays fixed.

use crate::storage::page::FixedCodec;
use crate::storage::table::Tuple;

/// Width of the keys used by table indexes.
pub const INDEX_KEY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositeKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> CompositeKey<N> {
    pub fn from_tuple(tuple: &Tuple) -> Result<Self, bincode::Error> {
        let bytes = tuple.to_bytes()?;
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Ok(Self { data })
    }
}

impl<const N: usize> FixedCodec for CompositeKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::value::Value;

    #[test]
    fn test_key_round_trip() {
        let tuple = Tuple::new(vec![Value::Integer(77)]);
        let key = CompositeKey::<16>::from_tuple(&tuple).unwrap();

        let mut buf = [0u8; 16];
        key.encode(&mut buf);
        assert_eq!(CompositeKey::<16>::decode(&buf), key);
    }

    #[test]
    fn test_distinct_tuples_distinct_keys() {
        let a = CompositeKey::<16>::from_tuple(&Tuple::new(vec![Value::Integer(1)])).unwrap();
        let b = CompositeKey::<16>::from_tuple(&Tuple::new(vec![Value::Integer(2)])).unwrap();
        assert_ne!(a, b);
    }
}
