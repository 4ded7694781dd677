//! Fixed-size operation parameter buffer.

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{check_capacity, CapacityKind, IrResult};
use crate::limits::PARAM_BYTES_MAX;

/// A primitive that can be stored in an [`OpParams`] buffer (little-endian).
pub trait ParamValue: Copy + Send + Sync + 'static {
    /// Data type this primitive represents.
    const DTYPE: DType;

    /// Write `self` into the start of `buf`. `buf` must hold at least `DTYPE.byte_size()` bytes.
    fn write_le(self, buf: &mut [u8]);

    /// Read a value from the start of `buf`.
    fn read_le(buf: &[u8]) -> Self;
}

macro_rules! impl_param_value {
    ($($t:ty => $dtype:expr),* $(,)?) => {
        $(
            impl ParamValue for $t {
                const DTYPE: DType = $dtype;

                fn write_le(self, buf: &mut [u8]) {
                    const N: usize = std::mem::size_of::<$t>();
                    buf[..N].copy_from_slice(&self.to_le_bytes());
                }

                fn read_le(buf: &[u8]) -> Self {
                    const N: usize = std::mem::size_of::<$t>();
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(&buf[..N]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_param_value!(
    u8 => DType::U8,
    u16 => DType::U16,
    u32 => DType::U32,
    u64 => DType::U64,
    i8 => DType::I8,
    i16 => DType::I16,
    i32 => DType::I32,
    i64 => DType::I64,
    f32 => DType::F32,
    f64 => DType::F64,
);

/// Opaque parameter bytes of one operation (e.g. a fill value or a scalar operand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpParams {
    bytes: [u8; PARAM_BYTES_MAX],
    len: u8,
}

impl OpParams {
    pub fn empty() -> Self {
        OpParams {
            bytes: [0; PARAM_BYTES_MAX],
            len: 0,
        }
    }

    pub fn from_scalar<T: ParamValue>(value: T) -> Self {
        let mut params = Self::empty();
        value.write_le(&mut params.bytes);
        params.len = T::DTYPE.byte_size() as u8;
        params
    }

    pub fn from_bytes(bytes: &[u8]) -> IrResult<Self> {
        check_capacity(CapacityKind::Params, PARAM_BYTES_MAX, bytes.len())?;
        let mut params = Self::empty();
        params.bytes[..bytes.len()].copy_from_slice(bytes);
        params.len = bytes.len() as u8;
        Ok(params)
    }

    /// Decode the leading scalar, if the buffer holds exactly one `T`.
    pub fn scalar<T: ParamValue>(&self) -> Option<T> {
        if self.len() != T::DTYPE.byte_size() {
            return None;
        }
        Some(T::read_le(&self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for OpParams {
    fn default() -> Self {
        Self::empty()
    }
}
