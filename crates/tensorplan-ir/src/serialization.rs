//! Versioned JSON snapshots of a DAG.
//!
//! A snapshot stores the descriptors and the declared capacity, not the derived adjacency.
//! Loading goes through [`StaticDag::build`], so a loaded DAG satisfies every construction
//! invariant and its schedule slots are regenerated.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::expr::ExprNode;
use crate::graph::StaticDag;
use crate::limits::GraphCapacity;
use crate::tensor::TensorRef;

/// Current serialization format version
pub const FORMAT_VERSION: &str = "1.0.0";

/// Descriptor-level content of a DAG, in operation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagSnapshot {
    pub capacity: GraphCapacity,
    pub tensors: Vec<TensorRef>,
    pub exprs: Vec<ExprNode>,
}

impl DagSnapshot {
    pub fn from_dag(dag: &StaticDag) -> Self {
        let (tensors, exprs) = dag.descriptors();
        DagSnapshot {
            capacity: dag.capacity(),
            tensors,
            exprs,
        }
    }

    pub fn into_dag(self) -> IrResult<StaticDag> {
        StaticDag::build(self.tensors, self.exprs, self.capacity)
    }
}

/// Versioned wrapper for DAG serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedDag {
    /// Format version (semver)
    pub version: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: Option<String>,
    /// Optional metadata
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub dag: DagSnapshot,
}

impl VersionedDag {
    pub fn new(dag: &StaticDag) -> Self {
        VersionedDag {
            version: FORMAT_VERSION.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            metadata: None,
            dag: DagSnapshot::from_dag(dag),
        }
    }

    pub fn with_metadata(
        dag: &StaticDag,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        VersionedDag {
            metadata: Some(metadata),
            ..Self::new(dag)
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON, rejecting an incompatible major version.
    pub fn from_json(json: &str) -> IrResult<Self> {
        let versioned: VersionedDag =
            serde_json::from_str(json).map_err(|e| IrError::Serialization(e.to_string()))?;
        if !versioned.is_compatible() {
            return Err(IrError::Serialization(format!(
                "unsupported format version {} (expected {})",
                versioned.version, FORMAT_VERSION
            )));
        }
        Ok(versioned)
    }

    /// Same major version as [`FORMAT_VERSION`].
    pub fn is_compatible(&self) -> bool {
        major(&self.version) == major(FORMAT_VERSION)
    }

    /// Rebuild the DAG, re-running every construction check.
    pub fn into_dag(self) -> IrResult<StaticDag> {
        self.dag.into_dag()
    }
}

fn major(version: &str) -> Option<&str> {
    version.split('.').next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::ops;

    fn sample() -> StaticDag {
        let t: Vec<_> = (0..3).map(|i| TensorRef::scalar(i, DType::F32)).collect();
        let exprs = vec![
            ops::group(9, &[1, 2], true).unwrap(),
            ops::fill(1, &t[1], 3.0f32).unwrap(),
            ops::scalar_mul(2, &t[2], &t[1], 2.0f32).unwrap(),
        ];
        StaticDag::build(t, exprs, GraphCapacity::new(4, 4)).unwrap()
    }

    #[test]
    fn test_json_roundtrip_rebuilds_dag() {
        let dag = sample();
        let json = VersionedDag::new(&dag).to_json_pretty().unwrap();
        let loaded = VersionedDag::from_json(&json).unwrap();
        assert_eq!(loaded.version, FORMAT_VERSION);
        assert!(loaded.created_at.is_some());
        assert_eq!(loaded.into_dag().unwrap(), dag);
    }

    #[test]
    fn test_incompatible_version() {
        let mut versioned = VersionedDag::new(&sample());
        versioned.version = "2.0.0".to_string();
        let json = versioned.to_json_compact().unwrap();
        assert!(matches!(
            VersionedDag::from_json(&json),
            Err(IrError::Serialization(_))
        ));
    }

    #[test]
    fn test_invalid_snapshot_is_rejected_on_load() {
        let mut versioned = VersionedDag::new(&sample());
        versioned.dag.capacity = GraphCapacity::new(4, 2);
        assert!(versioned.into_dag().is_err());
    }

    #[test]
    fn test_metadata() {
        let mut meta = serde_json::Map::new();
        meta.insert("author".to_string(), serde_json::json!("planner"));
        let versioned = VersionedDag::with_metadata(&sample(), meta);
        let json = versioned.to_json_compact().unwrap();
        assert!(json.contains("\"author\":\"planner\""));
    }
}
