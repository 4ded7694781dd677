//! Property-based tests for TensorPlan IR
//!
//! Random layered DAGs, with two-output operations and pinned or movable groups, are listed
//! out of order, then scheduled, extracted and compacted.

use proptest::prelude::*;
use tensorplan_ir::{
    ops, validate_topological_order, CompactStaticGraph, DType, ExprNode, GraphCapacity, OpId,
    OpKind, StaticDag, SymbolContainer, TensorRef,
};

// ===== Strategies for generating test data =====

/// Per op: binary or unary, two input picks, a second output, and an optional group of
/// `(len, pinned)` starting at that op. The `u64` orders movable units before sorting.
type OpSpec = (bool, usize, usize, bool, Option<(usize, bool)>, u64);

fn arb_op_specs() -> impl Strategy<Value = (usize, Vec<OpSpec>)> {
    (
        1usize..4,
        prop::collection::vec(
            (
                any::<bool>(),
                any::<usize>(),
                any::<usize>(),
                prop::bool::weighted(0.25),
                prop::option::weighted(0.3, (2usize..=3, any::<bool>())),
                any::<u64>(),
            ),
            1..=10,
        ),
    )
}

/// A DAG listed out of order, plus the `(index, op id)` of every pinned group operation.
#[derive(Debug, Clone)]
struct ShuffledDag {
    dag: StaticDag,
    pinned: Vec<(usize, OpId)>,
}

/// One schedulable block: a free op, or a group marker followed by its members.
struct Block {
    exprs: Vec<ExprNode>,
    pinned: bool,
    key: u64,
}

/// Layered DAG: `sources` unproduced inputs, then each op writes one or two fresh tensors
/// from tensors created before it. Groups cover consecutive ops. Movable blocks are
/// reordered by key within each run between pinned groups.
fn build_layered(sources: usize, specs: &[OpSpec]) -> (Vec<TensorRef>, Vec<ExprNode>, Vec<(usize, OpId)>) {
    let tensor = |i: usize| TensorRef::array(i as u32, DType::F32, 1 + i % 3).unwrap();
    let mut tensors: Vec<TensorRef> = (0..sources).map(tensor).collect();
    let mut exprs = Vec::new();
    for (i, &(binary, a, b, two_outputs, _, _)) in specs.iter().enumerate() {
        let available = tensors.len();
        let mut inputs = vec![a % available];
        if binary {
            inputs.push(b % available);
        }
        let mut outputs = vec![available];
        if two_outputs {
            outputs.push(available + 1);
        }
        for &o in &outputs {
            tensors.push(tensor(o));
        }
        let kind = if binary { OpKind::ElemAdd } else { OpKind::Exp };
        let ids = |idxs: &[usize]| idxs.iter().map(|&t| t as u32).collect::<Vec<_>>();
        exprs.push(
            ExprNode::new(i as u32, kind, DType::F32, &ids(&inputs), &ids(&outputs)).unwrap(),
        );
    }

    let mut blocks = Vec::new();
    let mut exprs = exprs.into_iter().enumerate();
    while let Some((i, expr)) = exprs.next() {
        let (_, _, _, _, group, key) = specs[i];
        match group {
            Some((len, pinned)) if i + len <= specs.len() => {
                let members: Vec<u32> = (i..i + len).map(|m| m as u32).collect();
                let mut block = vec![ops::group(1000 + i as u32, &members, pinned).unwrap(), expr];
                for _ in 1..len {
                    if let Some((_, member)) = exprs.next() {
                        block.push(member);
                    }
                }
                blocks.push(Block { exprs: block, pinned, key });
            }
            _ => blocks.push(Block { exprs: vec![expr], pinned: false, key }),
        }
    }

    let mut listed = Vec::new();
    let mut pinned_at = Vec::new();
    let mut run: Vec<Block> = Vec::new();
    for block in blocks {
        if block.pinned {
            run.sort_by_key(|b| b.key);
            listed.extend(run.drain(..).flat_map(|b| b.exprs));
            for e in block.exprs {
                pinned_at.push((listed.len(), e.id()));
                listed.push(e);
            }
        } else {
            run.push(block);
        }
    }
    run.sort_by_key(|b| b.key);
    listed.extend(run.into_iter().flat_map(|b| b.exprs));
    (tensors, listed, pinned_at)
}

fn arb_grouped_dag() -> impl Strategy<Value = ShuffledDag> {
    arb_op_specs().prop_map(|(sources, specs)| {
        let (tensors, exprs, pinned) = build_layered(sources, &specs);
        ShuffledDag {
            dag: StaticDag::build(tensors, exprs, GraphCapacity::new(64, 64)).unwrap(),
            pinned,
        }
    })
}

fn arb_shuffled_dag() -> impl Strategy<Value = StaticDag> {
    arb_grouped_dag().prop_map(|g| g.dag)
}

// ===== Property Tests =====

proptest! {
    #[test]
    fn prop_sorted_order_is_topological(dag in arb_shuffled_dag()) {
        let sorted = dag.topological_sort().unwrap();
        prop_assert!(validate_topological_order(&sorted).is_ok());
        prop_assert_eq!(sorted.num_ops(), dag.num_ops());
        prop_assert_eq!(sorted.num_tensors(), dag.num_tensors());
    }

    #[test]
    fn prop_pinned_groups_keep_their_index(g in arb_grouped_dag()) {
        let sorted = g.dag.topological_sort().unwrap();
        for &(index, id) in &g.pinned {
            prop_assert_eq!(sorted.ops()[index].id(), id);
        }
    }

    #[test]
    fn prop_sorting_is_idempotent(dag in arb_shuffled_dag()) {
        let once = dag.topological_sort().unwrap();
        let twice = once.topological_sort().unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_all_outputs_reproduce_counts(dag in arb_shuffled_dag()) {
        let io = dag.io_indices();
        let count = dag.subgraph_count_by_idx(&io.outputs).unwrap();
        prop_assert_eq!(count.tensors, dag.num_tensors());
        prop_assert_eq!(count.operations, dag.num_ops());
    }

    #[test]
    fn prop_subgraph_is_closed_and_minimal(
        dag in arb_shuffled_dag(),
        picks in prop::collection::vec(any::<usize>(), 1..4),
    ) {
        let wanted: Vec<usize> = picks.iter().map(|p| p % dag.num_tensors()).collect();
        let reach = dag.reachability(&wanted).unwrap();

        // Closed: every kept op's inputs and their producers are kept.
        for (i, op) in dag.ops().iter().enumerate() {
            if !reach.ops[i] {
                continue;
            }
            for t in op.inp_idxs() {
                prop_assert!(reach.tensors[t]);
                if let Some(p) = dag.tensors()[t].incoming() {
                    prop_assert!(reach.ops[p]);
                }
            }
        }
        // Minimal: every kept tensor is wanted or read by a kept op.
        for (t, node) in dag.tensors().iter().enumerate() {
            if reach.tensors[t] {
                let needed = wanted.contains(&t)
                    || node.outgoing().any(|c| reach.ops[c])
                    || node.incoming().is_some_and(|p| reach.ops[p]);
                prop_assert!(needed);
            }
        }

        // Every output of a kept op is kept.
        for (i, op) in dag.ops().iter().enumerate() {
            if reach.ops[i] {
                prop_assert!(op.out_idxs().all(|t| reach.tensors[t]));
            }
        }

        let sub = dag.subgraph_by_idx(&wanted, reach.count().capacity()).unwrap();
        prop_assert_eq!(sub.num_ops(), reach.count().operations);
        prop_assert_eq!(sub.num_tensors(), reach.count().tensors);
    }

    #[test]
    fn prop_metadata_matches_tensor_sizes(dag in arb_shuffled_dag()) {
        let sorted = dag.topological_sort().unwrap();
        let compact = CompactStaticGraph::from_dag(&sorted).unwrap();
        let total: usize = compact.tensors().iter().map(|t| t.size()).sum();
        prop_assert_eq!(compact.metadata().dtype_stats(DType::F32).elements, total);
        let executable = sorted.ops().iter().filter(|o| !o.is_group()).count();
        prop_assert_eq!(compact.metadata().num_ops, executable);
        prop_assert_eq!(compact.ops().len(), executable);
    }

    #[test]
    fn prop_flat_resolution_merges_repeats(dag in arb_shuffled_dag()) {
        let (tensors, exprs) = dag.descriptors();
        let mut symbols = SymbolContainer::new(GraphCapacity::new(128, 128));
        for t in tensors.iter().chain(tensors.iter()) {
            symbols.push_tensor(t.clone()).unwrap();
        }
        for e in exprs.iter().chain(exprs.iter()) {
            symbols.push_expr(e.clone()).unwrap();
        }
        let res = symbols.resolve().unwrap();
        prop_assert_eq!(res.tensors.len(), tensors.len());
        prop_assert_eq!(res.exprs.len(), exprs.len());
        prop_assert_eq!(res.merged, exprs.len());
    }
}
