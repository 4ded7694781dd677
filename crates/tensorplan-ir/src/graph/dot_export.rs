//! DOT format export for graph visualization.
//!
//! Tensors render as boxes labeled `T<id>_<index>`. Executable operations render as circles
//! labeled `OP<id>_<index>_<magnitude><suffix>`, where the magnitude is the rank of a free
//! operation or the header index of a group member, and the suffix is empty for a free
//! operation, `_t` for a member of a pinned group and `_f` for a member of a movable group.
//! Group markers are not rendered. Every tensor gets an edge line, `T.. -> { };` when
//! nothing consumes it.
//!
//! ```
//! use tensorplan_ir::{export_to_dot, ops, DType, GraphCapacity, StaticDag, TensorRef};
//!
//! let a = TensorRef::scalar(0, DType::F32);
//! let b = TensorRef::scalar(1, DType::F32);
//! let e = ops::exp(7, &b, &a).unwrap();
//! let dag = StaticDag::build(vec![a, b], vec![e], GraphCapacity::default()).unwrap();
//!
//! let dot = export_to_dot(&dag);
//! assert!(dot.contains("  T0_0 -> { OP7_0_1 };"));
//! assert!(dot.contains("  OP7_0_1 -> { T1_1 };"));
//! ```

use serde::{Deserialize, Serialize};

use super::{ScheduleSlot, StaticDag};

/// Options for DOT export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotExportOptions {
    pub graph_name: String,
    /// Graphviz `rankdir` value
    pub rank_dir: String,
}

impl Default for DotExportOptions {
    fn default() -> Self {
        Self {
            graph_name: "G".to_string(),
            rank_dir: "LR".to_string(),
        }
    }
}

/// Export with default options.
pub fn export_to_dot(dag: &StaticDag) -> String {
    export_to_dot_with_options(dag, &DotExportOptions::default())
}

pub fn export_to_dot_with_options(dag: &StaticDag, options: &DotExportOptions) -> String {
    let mut out = format!(
        "digraph {} {{\n  rankdir=\"{}\"\n",
        options.graph_name, options.rank_dir
    );

    for i in 0..dag.num_tensors() {
        out.push_str(&format!(
            "  {} [shape=box,color=aliceblue,style=\"filled,rounded\"];\n",
            tensor_label(dag, i)
        ));
    }
    for i in 0..dag.num_ops() {
        if let Some(label) = op_label(dag, i) {
            out.push_str(&format!(
                "  {} [shape=circle,color=lavender,style=\"filled,rounded\"];\n",
                label
            ));
        }
    }

    for (i, t) in dag.tensors().iter().enumerate() {
        let targets: Vec<String> = t.outgoing().filter_map(|op| op_label(dag, op)).collect();
        write_edges(&mut out, &tensor_label(dag, i), &targets);
    }
    for (i, op) in dag.ops().iter().enumerate() {
        let Some(label) = op_label(dag, i) else {
            continue;
        };
        let targets: Vec<String> = op.out_idxs().map(|t| tensor_label(dag, t)).collect();
        write_edges(&mut out, &label, &targets);
    }

    out.push_str("}\n");
    out
}

fn tensor_label(dag: &StaticDag, index: usize) -> String {
    format!("T{}_{}", dag.tensors()[index].id(), index)
}

fn op_label(dag: &StaticDag, index: usize) -> Option<String> {
    let id = dag.ops()[index].id();
    match dag.schedule()[index] {
        ScheduleSlot::Free { rank } => Some(format!("OP{}_{}_{}", id, index, rank)),
        ScheduleSlot::GroupMember { header, pinned } => Some(format!(
            "OP{}_{}_{}{}",
            id,
            index,
            header,
            if pinned { "_t" } else { "_f" }
        )),
        ScheduleSlot::GroupHeader { .. } => None,
    }
}

/// One `from -> { .. };` line; an empty target list still gets its line.
fn write_edges(out: &mut String, from: &str, targets: &[String]) {
    out.push_str("  ");
    out.push_str(from);
    out.push_str(" -> { ");
    for target in targets {
        out.push_str(target);
        out.push(' ');
    }
    out.push_str("};\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::limits::GraphCapacity;
    use crate::ops;
    use crate::tensor::TensorRef;

    #[test]
    fn test_full_output() {
        let t: Vec<_> = (0..3).map(|i| TensorRef::scalar(i, DType::F32)).collect();
        let add = ops::elm_add(5, &t[2], &[&t[0], &t[1]]).unwrap();
        let dag = StaticDag::build(t, vec![add], GraphCapacity::default()).unwrap();

        let expected = concat!(
            "digraph G {\n",
            "  rankdir=\"LR\"\n",
            "  T0_0 [shape=box,color=aliceblue,style=\"filled,rounded\"];\n",
            "  T1_1 [shape=box,color=aliceblue,style=\"filled,rounded\"];\n",
            "  T2_2 [shape=box,color=aliceblue,style=\"filled,rounded\"];\n",
            "  OP5_0_2 [shape=circle,color=lavender,style=\"filled,rounded\"];\n",
            "  T0_0 -> { OP5_0_2 };\n",
            "  T1_1 -> { OP5_0_2 };\n",
            "  T2_2 -> { };\n",
            "  OP5_0_2 -> { T2_2 };\n",
            "}\n",
        );
        assert_eq!(export_to_dot(&dag), expected);
    }

    #[test]
    fn test_group_member_suffixes() {
        let t: Vec<_> = (0..3).map(|i| TensorRef::scalar(i, DType::F32)).collect();
        let exprs = vec![
            ops::group(9, &[1, 2], true).unwrap(),
            ops::exp(1, &t[1], &t[0]).unwrap(),
            ops::sin(2, &t[2], &t[1]).unwrap(),
        ];
        let dag = StaticDag::build(t, exprs, GraphCapacity::default()).unwrap();
        let dot = export_to_dot(&dag);
        assert!(dot.contains("OP1_1_0_t [shape=circle"));
        assert!(dot.contains("OP2_2_0_t [shape=circle"));
        assert!(!dot.contains("OP9_"));
    }

    #[test]
    fn test_options() {
        let t = vec![TensorRef::scalar(0, DType::U8)];
        let dag = StaticDag::build(t, vec![], GraphCapacity::default()).unwrap();
        let options = DotExportOptions {
            graph_name: "plan".to_string(),
            rank_dir: "TB".to_string(),
        };
        let dot = export_to_dot_with_options(&dag, &options);
        assert!(dot.starts_with("digraph plan {\n  rankdir=\"TB\"\n"));
        assert!(dot.contains("  T0_0 -> { };\n"));
    }
}
