//! Compile-wide per-node limits and caller-declared graph capacities.

use serde::{Deserialize, Serialize};

/// Maximum number of inputs an operation (or members a group) may declare.
pub const MAX_IN: usize = 5;

/// Maximum number of outputs an operation may declare.
pub const MAX_OUT: usize = 2;

/// Maximum tensor rank.
pub const MAX_RANK: usize = 5;

/// Maximum number of consuming operations per tensor.
pub const TENSOR_MAX_OUT: usize = 10;

/// Size of the opaque parameter buffer carried by every operation.
pub const PARAM_BYTES_MAX: usize = 32;

/// First id of the range reserved for synthetic operation ids.
///
/// Tree resolution assigns `SYNTHETIC_ID_BASE + arena_index` to operation nodes, so caller
/// tensor ids must stay strictly below this value.
pub const SYNTHETIC_ID_BASE: u32 = 1 << 31;

/// Fixed upper bounds for a graph, declared before construction.
///
/// Construction never grows past these bounds; exceeding one is a fatal
/// [`IrError::CapacityOverflow`](crate::IrError::CapacityOverflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphCapacity {
    /// Maximum number of unique tensors
    pub max_tensors: usize,
    /// Maximum number of unique operations (group markers included)
    pub max_operations: usize,
}

impl GraphCapacity {
    pub fn new(max_tensors: usize, max_operations: usize) -> Self {
        GraphCapacity {
            max_tensors,
            max_operations,
        }
    }

    /// Capacity that fits exactly the given counts.
    pub fn exact(tensors: usize, operations: usize) -> Self {
        Self::new(tensors, operations)
    }

    /// Whether the given counts fit.
    pub fn fits(&self, tensors: usize, operations: usize) -> bool {
        tensors <= self.max_tensors && operations <= self.max_operations
    }
}

impl Default for GraphCapacity {
    fn default() -> Self {
        GraphCapacity {
            max_tensors: 256,
            max_operations: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_fits() {
        let cap = GraphCapacity::new(3, 1);
        assert!(cap.fits(3, 1));
        assert!(!cap.fits(4, 1));
        assert!(!cap.fits(3, 2));
    }

    #[test]
    fn test_capacity_serde() {
        let cap = GraphCapacity::exact(10, 4);
        let json = serde_json::to_string(&cap).unwrap();
        let back: GraphCapacity = serde_json::from_str(&json).unwrap();
        assert_eq!(cap, back);
    }
}
