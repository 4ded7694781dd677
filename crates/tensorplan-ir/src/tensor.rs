//! Tensor descriptors.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::dtype::{DType, Layout, StorageClass};
use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::limits::MAX_RANK;

/// Caller-assigned tensor identifier, stable across rebuilds.
pub type TensorId = u32;

/// Fixed-capacity list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: SmallVec<[usize; MAX_RANK]>,
}

impl Shape {
    /// Build a shape, rejecting rank 0, rank above [`MAX_RANK`], zero-sized dimensions and
    /// element counts that overflow `usize`.
    pub fn new(dims: &[usize]) -> IrResult<Self> {
        check_capacity(CapacityKind::Rank, MAX_RANK, dims.len())?;
        if dims.is_empty() || dims.contains(&0) {
            return Err(IrError::InvalidShape);
        }
        checked_elements(dims).ok_or_else(|| IrError::ShapeOverflow {
            dims: dims.to_vec(),
        })?;
        Ok(Shape {
            dims: SmallVec::from_slice(dims),
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total element count (product of the dimensions).
    ///
    /// Saturates for a shape that bypassed [`Shape::new`], e.g. a hand-edited snapshot; such
    /// tensors are rejected again when a DAG is built.
    pub fn num_elements(&self) -> usize {
        checked_elements(&self.dims).unwrap_or(usize::MAX)
    }
}

fn checked_elements(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// Descriptor of one tensor value. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorRef {
    id: TensorId,
    dtype: DType,
    shape: Shape,
    #[serde(default)]
    storage: StorageClass,
    #[serde(default)]
    layout: Layout,
}

impl TensorRef {
    /// Fails when the shape is invalid or its byte size cannot be addressed.
    pub fn new(id: TensorId, dtype: DType, dims: &[usize]) -> IrResult<Self> {
        let tensor = TensorRef {
            id,
            dtype,
            shape: Shape::new(dims)?,
            storage: StorageClass::Host,
            layout: Layout::RowMajor,
        };
        tensor.validate()?;
        Ok(tensor)
    }

    /// Single-element tensor.
    pub fn scalar(id: TensorId, dtype: DType) -> Self {
        TensorRef {
            id,
            dtype,
            shape: Shape {
                dims: SmallVec::from_slice(&[1]),
            },
            storage: StorageClass::Host,
            layout: Layout::RowMajor,
        }
    }

    pub fn array(id: TensorId, dtype: DType, len: usize) -> IrResult<Self> {
        Self::new(id, dtype, &[len])
    }

    pub fn matrix(id: TensorId, dtype: DType, rows: usize, cols: usize) -> IrResult<Self> {
        Self::new(id, dtype, &[rows, cols])
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Total element count.
    pub fn size(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn size_bytes(&self) -> usize {
        self.size().saturating_mul(self.dtype.byte_size())
    }

    /// Re-check the shape and that the byte size stays within `isize::MAX`.
    pub fn validate(&self) -> IrResult<()> {
        let dims = self.shape.dims();
        Shape::new(dims)?;
        let fits = self
            .size()
            .checked_mul(self.dtype.byte_size())
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(IrError::ShapeOverflow {
                dims: dims.to_vec(),
            });
        }
        Ok(())
    }

    pub fn storage(&self) -> StorageClass {
        self.storage
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_rejects_bad_dims() {
        assert_eq!(Shape::new(&[]), Err(IrError::InvalidShape));
        assert_eq!(Shape::new(&[2, 0]), Err(IrError::InvalidShape));
        assert!(matches!(
            Shape::new(&[1, 1, 1, 1, 1, 1]),
            Err(IrError::CapacityOverflow {
                what: CapacityKind::Rank,
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_shapes_rejected() {
        assert_eq!(
            Shape::new(&[usize::MAX, 2]),
            Err(IrError::ShapeOverflow {
                dims: vec![usize::MAX, 2]
            })
        );
        // The element count fits, the byte size does not.
        let half = usize::MAX / 4;
        assert!(Shape::new(&[half]).is_ok());
        assert_eq!(
            TensorRef::array(0, DType::F64, half),
            Err(IrError::ShapeOverflow { dims: vec![half] })
        );
        assert!(TensorRef::array(0, DType::U8, 1 << 20).is_ok());
    }

    #[test]
    fn test_tensor_size() {
        let t = TensorRef::matrix(3, DType::F64, 4, 5).unwrap();
        assert_eq!(t.rank(), 2);
        assert_eq!(t.size(), 20);
        assert_eq!(t.size_bytes(), 160);
        assert_eq!(t.shape().to_string(), "[4x5]");
    }

    #[test]
    fn test_builders_return_new_value() {
        let t = TensorRef::scalar(0, DType::I32)
            .with_layout(Layout::ColMajor)
            .with_storage(StorageClass::Device);
        assert_eq!(t.layout(), Layout::ColMajor);
        assert_eq!(t.storage(), StorageClass::Device);
        assert_eq!(t.size(), 1);
    }
}
