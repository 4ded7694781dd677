//! Typed arena memory store.
//!
//! One contiguous pool per primitive data type, sized to exactly the element total of that
//! type in a [`CompactStaticGraph`]. Tensors receive their slots by a running cursor in
//! tensor-array order, so the layout is a pure function of the graph.

use std::ops::Range;

use serde::Serialize;
use smallvec::SmallVec;
use tensorplan_ir::{CompactOp, CompactStaticGraph, DType, OpParams, ParamValue};

use crate::error::{ExecutorError, ExecutorResult};
use crate::traits::{KernelArgs, TypedIo};

mod sealed {
    pub trait Sealed {}
}

/// A primitive with a memory pool.
pub trait Element: ParamValue + Default + PartialEq + std::fmt::Debug + sealed::Sealed {
    #[doc(hidden)]
    fn pool(pools: &Pools) -> &[Self];
    #[doc(hidden)]
    fn pool_mut(pools: &mut Pools) -> &mut [Self];
}

/// Backing vectors of a [`MemoryStore`], one per supported primitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pools {
    u8s: Vec<u8>,
    u16s: Vec<u16>,
    u32s: Vec<u32>,
    u64s: Vec<u64>,
    i8s: Vec<i8>,
    i16s: Vec<i16>,
    i32s: Vec<i32>,
    i64s: Vec<i64>,
    f32s: Vec<f32>,
    f64s: Vec<f64>,
}

macro_rules! impl_element {
    ($($t:ty => $field:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Element for $t {
                fn pool(pools: &Pools) -> &[Self] {
                    &pools.$field
                }

                fn pool_mut(pools: &mut Pools) -> &mut [Self] {
                    &mut pools.$field
                }
            }
        )*
    };
}

impl_element!(
    u8 => u8s,
    u16 => u16s,
    u32 => u32s,
    u64 => u64s,
    i8 => i8s,
    i16 => i16s,
    i32 => i32s,
    i64 => i64s,
    f32 => f32s,
    f64 => f64s,
);

impl Pools {
    /// Whether `dtype` has a pool. Exhaustive so a new dtype cannot be skipped silently.
    pub fn supports(dtype: DType) -> bool {
        match dtype {
            DType::U8
            | DType::U16
            | DType::U32
            | DType::U64
            | DType::I8
            | DType::I16
            | DType::I32
            | DType::I64
            | DType::F32
            | DType::F64 => true,
            DType::F16 => false,
        }
    }

    pub fn len(&self, dtype: DType) -> usize {
        match dtype {
            DType::U8 => self.u8s.len(),
            DType::U16 => self.u16s.len(),
            DType::U32 => self.u32s.len(),
            DType::U64 => self.u64s.len(),
            DType::I8 => self.i8s.len(),
            DType::I16 => self.i16s.len(),
            DType::I32 => self.i32s.len(),
            DType::I64 => self.i64s.len(),
            DType::F32 => self.f32s.len(),
            DType::F64 => self.f64s.len(),
            DType::F16 => 0,
        }
    }

    fn allocate(&mut self, dtype: DType, elements: usize) {
        match dtype {
            DType::U8 => self.u8s = vec![0; elements],
            DType::U16 => self.u16s = vec![0; elements],
            DType::U32 => self.u32s = vec![0; elements],
            DType::U64 => self.u64s = vec![0; elements],
            DType::I8 => self.i8s = vec![0; elements],
            DType::I16 => self.i16s = vec![0; elements],
            DType::I32 => self.i32s = vec![0; elements],
            DType::I64 => self.i64s = vec![0; elements],
            DType::F32 => self.f32s = vec![0.0; elements],
            DType::F64 => self.f64s = vec![0.0; elements],
            DType::F16 => {}
        }
    }
}

/// Location of one tensor inside its type's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TensorSlot {
    pub dtype: DType,
    /// Offset in elements
    pub offset: usize,
    /// Length in elements
    pub len: usize,
    /// Offset in bytes
    pub byte_offset: usize,
}

impl TensorSlot {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Exactly-sized typed arenas for one execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStore {
    pools: Pools,
    slots: Vec<TensorSlot>,
}

impl MemoryStore {
    /// Size every pool and assign every tensor its slot.
    ///
    /// Fails with [`ExecutorError::UnsupportedDType`] on the first tensor whose dtype has no
    /// pool.
    pub fn new(graph: &CompactStaticGraph) -> ExecutorResult<Self> {
        let mut cursors = [0usize; DType::COUNT];
        let mut slots = Vec::with_capacity(graph.tensors().len());
        for tensor in graph.tensors() {
            let dtype = tensor.dtype();
            if !Pools::supports(dtype) {
                return Err(ExecutorError::UnsupportedDType {
                    tensor: tensor.id(),
                    dtype,
                });
            }
            let cursor = &mut cursors[dtype.index()];
            let end = cursor
                .checked_add(tensor.size())
                .filter(|&end| end <= isize::MAX as usize / dtype.byte_size())
                .ok_or(ExecutorError::PoolOverflow {
                    tensor: tensor.id(),
                    dtype,
                })?;
            slots.push(TensorSlot {
                dtype,
                offset: *cursor,
                len: tensor.size(),
                byte_offset: *cursor * dtype.byte_size(),
            });
            *cursor = end;
        }

        let mut pools = Pools::default();
        for dtype in DType::ALL {
            let elements = cursors[dtype.index()];
            if elements > 0 {
                pools.allocate(dtype, elements);
                tracing::debug!(dtype = %dtype, elements, "allocated pool");
            }
        }

        Ok(MemoryStore { pools, slots })
    }

    pub fn slots(&self) -> &[TensorSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> ExecutorResult<&TensorSlot> {
        self.slots
            .get(index)
            .ok_or(ExecutorError::TensorIndexOutOfBounds {
                index,
                len: self.slots.len(),
            })
    }

    /// Pool length in elements.
    pub fn pool_len(&self, dtype: DType) -> usize {
        self.pools.len(dtype)
    }

    pub fn total_bytes(&self) -> usize {
        DType::ALL
            .iter()
            .map(|&d| self.pools.len(d) * d.byte_size())
            .sum()
    }

    pub fn slice<T: Element>(&self, index: usize) -> ExecutorResult<&[T]> {
        let range = self.typed_range::<T>(index)?;
        Ok(&T::pool(&self.pools)[range])
    }

    pub fn slice_mut<T: Element>(&mut self, index: usize) -> ExecutorResult<&mut [T]> {
        let range = self.typed_range::<T>(index)?;
        Ok(&mut T::pool_mut(&mut self.pools)[range])
    }

    /// Overwrite a tensor; `data` must have exactly the tensor's element count.
    pub fn write<T: Element>(&mut self, index: usize, data: &[T]) -> ExecutorResult<()> {
        let slice = self.slice_mut::<T>(index)?;
        if slice.len() != data.len() {
            return Err(ExecutorError::ShapeMismatch(format!(
                "tensor {} holds {} elements, got {}",
                index,
                slice.len(),
                data.len()
            )));
        }
        slice.copy_from_slice(data);
        Ok(())
    }

    /// Borrow the operands of `op` from its dtype's pool.
    pub(crate) fn kernel_args<'a>(&'a mut self, op: &'a CompactOp) -> ExecutorResult<KernelArgs<'a>> {
        let mut inputs: SmallVec<[Range<usize>; 8]> = SmallVec::new();
        for &i in op.inputs.iter() {
            inputs.push(self.slot(i as usize)?.range());
        }
        let mut outputs: SmallVec<[Range<usize>; 8]> = SmallVec::new();
        for &o in op.outputs.iter() {
            outputs.push(self.slot(o as usize)?.range());
        }

        let pools = &mut self.pools;
        let params = &op.params;
        Ok(match op.dtype {
            DType::U8 => KernelArgs::U8(split_io(&mut pools.u8s, &inputs, &outputs, params)?),
            DType::U16 => KernelArgs::U16(split_io(&mut pools.u16s, &inputs, &outputs, params)?),
            DType::U32 => KernelArgs::U32(split_io(&mut pools.u32s, &inputs, &outputs, params)?),
            DType::U64 => KernelArgs::U64(split_io(&mut pools.u64s, &inputs, &outputs, params)?),
            DType::I8 => KernelArgs::I8(split_io(&mut pools.i8s, &inputs, &outputs, params)?),
            DType::I16 => KernelArgs::I16(split_io(&mut pools.i16s, &inputs, &outputs, params)?),
            DType::I32 => KernelArgs::I32(split_io(&mut pools.i32s, &inputs, &outputs, params)?),
            DType::I64 => KernelArgs::I64(split_io(&mut pools.i64s, &inputs, &outputs, params)?),
            DType::F32 => KernelArgs::F32(split_io(&mut pools.f32s, &inputs, &outputs, params)?),
            DType::F64 => KernelArgs::F64(split_io(&mut pools.f64s, &inputs, &outputs, params)?),
            DType::F16 => {
                return Err(ExecutorError::UnsupportedOperation {
                    op: op.id,
                    kind: op.kind,
                    dtype: op.dtype,
                })
            }
        })
    }

    fn typed_range<T: Element>(&self, index: usize) -> ExecutorResult<Range<usize>> {
        let slot = self.slot(index)?;
        if slot.dtype != T::DTYPE {
            return Err(ExecutorError::DTypeMismatch {
                expected: slot.dtype,
                actual: T::DTYPE,
            });
        }
        Ok(slot.range())
    }
}

/// Split one pool into shared input views and disjoint mutable output views.
///
/// Inputs may repeat a range; an output range must not overlap any other operand.
fn split_io<'a, T>(
    pool: &'a mut [T],
    inputs: &[Range<usize>],
    outputs: &[Range<usize>],
    params: &'a OpParams,
) -> ExecutorResult<TypedIo<'a, T>> {
    let mut wanted: SmallVec<[Range<usize>; 8]> = inputs.iter().chain(outputs).cloned().collect();
    wanted.sort_by_key(|r| (r.start, r.end));
    wanted.dedup();
    for pair in wanted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(ExecutorError::ExecutionFailed(format!(
                "overlapping tensor slots {:?} and {:?}",
                pair[0], pair[1]
            )));
        }
    }
    if let Some(last) = wanted.last() {
        if last.end > pool.len() {
            return Err(ExecutorError::ExecutionFailed(format!(
                "slot {:?} exceeds pool of {} elements",
                last,
                pool.len()
            )));
        }
    }

    let mut pieces: SmallVec<[(Range<usize>, Option<&'a mut [T]>); 8]> = SmallVec::new();
    let mut rest: &'a mut [T] = pool;
    let mut consumed = 0;
    for range in wanted {
        let tail = std::mem::take(&mut rest);
        let (_, tail) = tail.split_at_mut(range.start - consumed);
        let (piece, tail) = tail.split_at_mut(range.end - range.start);
        rest = tail;
        consumed = range.end;
        pieces.push((range, Some(piece)));
    }

    let mut outs = SmallVec::new();
    for range in outputs {
        let piece = pieces
            .iter_mut()
            .find(|(r, _)| r == range)
            .and_then(|(_, piece)| piece.take())
            .ok_or_else(|| {
                ExecutorError::ExecutionFailed(format!("output slot {:?} is also an operand", range))
            })?;
        outs.push(piece);
    }

    let mut shared: SmallVec<[(Range<usize>, &'a [T]); 8]> = SmallVec::new();
    for (range, piece) in pieces {
        if let Some(piece) = piece {
            let piece: &'a [T] = piece;
            shared.push((range, piece));
        }
    }
    let mut ins = SmallVec::new();
    for range in inputs {
        let view = shared
            .iter()
            .find(|(r, _)| r == range)
            .map(|&(_, view)| view)
            .ok_or_else(|| {
                ExecutorError::ExecutionFailed(format!("input slot {:?} is also an output", range))
            })?;
        ins.push(view);
    }

    Ok(TypedIo {
        inputs: ins,
        outputs: outs,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensorplan_ir::{ops, GraphCapacity, StaticDag, TensorRef};

    fn compact(tensors: Vec<TensorRef>, exprs: Vec<tensorplan_ir::ExprNode>) -> CompactStaticGraph {
        let dag = StaticDag::build(tensors, exprs, GraphCapacity::default())
            .unwrap()
            .topological_sort()
            .unwrap();
        CompactStaticGraph::from_dag(&dag).unwrap()
    }

    #[test]
    fn test_pool_overflow_rejected_before_allocation() {
        let big = isize::MAX as usize / 2;
        let tensors: Vec<_> = (0..3)
            .map(|i| TensorRef::array(i, DType::U8, big).unwrap())
            .collect();
        let graph = compact(tensors, vec![]);
        assert_eq!(
            MemoryStore::new(&graph),
            Err(ExecutorError::PoolOverflow {
                tensor: 2,
                dtype: DType::U8
            })
        );
    }

    #[test]
    fn test_running_cursor_per_dtype() {
        let a = TensorRef::scalar(0, DType::F32);
        let b = TensorRef::scalar(1, DType::F32);
        let n = TensorRef::array(2, DType::I16, 3).unwrap();
        let c = TensorRef::scalar(3, DType::F32);
        let graph = compact(
            vec![a.clone(), b.clone(), n, c.clone()],
            vec![ops::elm_add(0, &c, &[&a, &b]).unwrap()],
        );
        let store = MemoryStore::new(&graph).unwrap();

        let offsets: Vec<_> = store.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 1, 0, 2]);
        assert_eq!(store.slots()[3].byte_offset, 8);
        assert_eq!(store.pool_len(DType::F32), 3);
        assert_eq!(store.pool_len(DType::I16), 3);
        assert_eq!(store.pool_len(DType::U8), 0);
        assert_eq!(store.total_bytes(), 3 * 4 + 3 * 2);
    }

    #[test]
    fn test_f16_is_fatal() {
        let h = TensorRef::array(7, DType::F16, 2).unwrap();
        let graph = compact(vec![h], vec![]);
        assert_eq!(
            MemoryStore::new(&graph),
            Err(ExecutorError::UnsupportedDType {
                tensor: 7,
                dtype: DType::F16
            })
        );
    }

    #[test]
    fn test_typed_access() {
        let a = TensorRef::array(0, DType::U32, 2).unwrap();
        let graph = compact(vec![a], vec![]);
        let mut store = MemoryStore::new(&graph).unwrap();

        store.write(0, &[3u32, 4]).unwrap();
        assert_eq!(store.slice::<u32>(0).unwrap(), &[3, 4]);
        assert_eq!(
            store.slice::<f32>(0),
            Err(ExecutorError::DTypeMismatch {
                expected: DType::U32,
                actual: DType::F32
            })
        );
        assert!(matches!(
            store.write(0, &[1u32]),
            Err(ExecutorError::ShapeMismatch(_))
        ));
        assert!(matches!(
            store.slice::<u32>(4),
            Err(ExecutorError::TensorIndexOutOfBounds { index: 4, len: 1 })
        ));
    }

    #[test]
    fn test_split_repeated_input() {
        let mut pool = [1i32, 2, 3, 4, 5, 6];
        let params = OpParams::empty();
        let io = split_io(&mut pool, &[2..4, 2..4], &[4..6], &params).unwrap();
        assert_eq!(io.inputs.len(), 2);
        assert_eq!(io.inputs[0], &[3, 4]);
        assert_eq!(io.inputs[1], &[3, 4]);
        assert_eq!(io.outputs[0], &mut [5, 6]);
    }

    #[test]
    fn test_split_rejects_overlap() {
        let mut pool = [0u8; 6];
        let params = OpParams::empty();
        assert!(split_io(&mut pool, &[0..3], &[2..4], &params).is_err());
        assert!(split_io(&mut pool, &[0..2], &[0..2], &params).is_err());
        assert!(split_io(&mut pool, &[0..2], &[4..7], &params).is_err());
    }
}
