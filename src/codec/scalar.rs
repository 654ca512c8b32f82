//! Little-endian marshalling for fixed-width values.
//!
//! # Example
//!
//! ```
//! use pine_client::codec::{decode_array, encode_array, Scalar};
//!
//! let bytes = 0x1234_5678u32.to_wire();
//! assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12]);
//! assert_eq!(u32::from_wire(&bytes), Some(0x1234_5678));
//!
//! let packed = encode_array(&[1u16, 2, 3]);
//! assert_eq!(decode_array::<u16>(&packed, 3), Some(vec![1, 2, 3]));
//! ```

/// A value with a fixed little-endian wire representation.
pub trait Scalar: Copy + Send + Sync + 'static {
    /// Size in bytes.
    const SIZE: usize;

    /// Append the little-endian bytes of `self` to `out`.
    fn write_to(self, out: &mut Vec<u8>);

    /// Decode from the first `SIZE` bytes of `bytes`.
    fn from_wire(bytes: &[u8]) -> Option<Self>;

    fn to_wire(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut out);
        out
    }
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_to(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn from_wire(bytes: &[u8]) -> Option<Self> {
                    let raw = bytes.get(..Self::SIZE)?.try_into().ok()?;
                    Some(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_to(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    #[inline]
    fn from_wire(bytes: &[u8]) -> Option<Self> {
        bytes.first().map(|&b| b != 0)
    }
}

/// Pack a slice of scalars back to back.
pub fn encode_array<T: Scalar>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for &value in values {
        value.write_to(&mut out);
    }
    out
}

/// Unpack `count` scalars. Returns `None` if `bytes` is too short.
pub fn decode_array<T: Scalar>(bytes: &[u8], count: usize) -> Option<Vec<T>> {
    let needed = count.checked_mul(T::SIZE)?;
    let bytes = bytes.get(..needed)?;
    bytes.chunks_exact(T::SIZE).map(T::from_wire).collect()
}
