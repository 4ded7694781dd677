//! Primitive element types, storage classes and layouts.

use serde::{Deserialize, Serialize};

/// Primitive element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    /// Half precision. Legal in the IR; the CPU memory store has no pool for it.
    F16,
    F32,
    F64,
}

impl DType {
    /// Every data type, in declaration order.
    pub const ALL: [DType; 11] = [
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::F32,
        DType::F64,
    ];

    /// Number of data types.
    pub const COUNT: usize = Self::ALL.len();

    pub fn byte_size(&self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::U8 => "UINT8",
            DType::U16 => "UINT16",
            DType::U32 => "UINT32",
            DType::U64 => "UINT64",
            DType::I8 => "INT8",
            DType::I16 => "INT16",
            DType::I32 => "INT32",
            DType::I64 => "INT64",
            DType::F16 => "F16",
            DType::F32 => "F32",
            DType::F64 => "F64",
        }
    }

    /// Dense index of this type, usable to address per-type tables.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a tensor lives. Carried through planning; the CPU store serves every tensor from host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    Host,
    Device,
}

/// Informational element layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    RowMajor,
    ColMajor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(DType::U8.byte_size(), 1);
        assert_eq!(DType::F16.byte_size(), 2);
        assert_eq!(DType::I32.byte_size(), 4);
        assert_eq!(DType::F64.byte_size(), 8);
    }

    #[test]
    fn test_index_is_dense() {
        for (i, dtype) in DType::ALL.iter().enumerate() {
            assert_eq!(dtype.index(), i);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::F32.to_string(), "F32");
        assert_eq!(DType::U16.to_string(), "UINT16");
    }
}
