//! Symbol resolution and common-subexpression elimination.
//!
//! Both input forms go through the same deduplication rules:
//!
//! - tensors are merged by id; an id seen twice with different descriptors is an error
//! - operations are probed against the ones kept so far, using
//!   [`ExprNode::content_hash`] as a pre-filter and [`ExprNode::structurally_eq`] as the
//!   decision; a duplicate is dropped and every reference to it redirected to the survivor
//! - two operations whose hashes match but whose structure differs are both kept and a
//!   warning is logged
//!
//! The output never exceeds the declared [`GraphCapacity`].

use std::collections::{BTreeMap, HashMap};

use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::expr::{ExprNode, OpId};
use crate::graph::StaticDag;
use crate::limits::{GraphCapacity, MAX_IN, MAX_OUT, SYNTHETIC_ID_BASE};
use crate::symbols::SymbolContainer;
use crate::tensor::{TensorId, TensorRef};
use crate::tree::{ExprArena, NodeIdx, TreeNode};

use smallvec::SmallVec;

/// Deduplicated symbols, ready to be frozen into a [`StaticDag`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tensors: Vec<TensorRef>,
    pub exprs: Vec<ExprNode>,
    /// Surviving operation id for every input operation: keyed by the caller's op id in flat
    /// form, by arena node index in tree form.
    pub redirects: BTreeMap<u32, OpId>,
    /// Number of operations dropped as duplicates
    pub merged: usize,
}

impl Resolution {
    pub fn redirect(&self, key: u32) -> Option<OpId> {
        self.redirects.get(&key).copied()
    }

    pub fn into_dag(self, capacity: GraphCapacity) -> IrResult<StaticDag> {
        StaticDag::build(self.tensors, self.exprs, capacity)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    capacity: GraphCapacity,
}

impl Resolver {
    pub fn new(capacity: GraphCapacity) -> Self {
        Resolver { capacity }
    }

    /// Resolve the flat form.
    pub fn resolve_flat(&self, symbols: &SymbolContainer) -> IrResult<Resolution> {
        let mut dedup = Dedup::new(self.capacity);
        for tensor in symbols.tensors() {
            dedup.add_tensor(tensor)?;
        }

        let mut redirects = BTreeMap::new();
        for expr in symbols.exprs() {
            let survivor = dedup.add_expr(expr.clone())?;
            redirects.insert(expr.id(), survivor);
        }

        let mut resolution = dedup.finish(redirects);
        let redirects = &resolution.redirects;
        for expr in resolution.exprs.iter_mut() {
            expr.map_members(|m| redirects.get(&m).copied().unwrap_or(m));
        }

        tracing::debug!(
            tensors = resolution.tensors.len(),
            ops = resolution.exprs.len(),
            merged = resolution.merged,
            "resolved flat symbols"
        );
        Ok(resolution)
    }

    /// Resolve every node reachable from `roots`.
    ///
    /// Group nodes are only reachable when listed as roots. Operation nodes receive the id
    /// `SYNTHETIC_ID_BASE + node_index`; group markers are placed right before their first
    /// member.
    pub fn resolve_tree(&self, arena: &ExprArena, roots: &[NodeIdx]) -> IrResult<Resolution> {
        let reachable = mark_reachable(arena, roots)?;

        let mut dedup = Dedup::new(self.capacity);
        let mut values: Vec<Option<TensorId>> = vec![None; arena.len()];
        let mut survivors: Vec<Option<OpId>> = vec![None; arena.len()];
        let mut redirects = BTreeMap::new();

        let value_of = |values: &[Option<TensorId>], idx: NodeIdx| {
            values[idx.index()].ok_or(IrError::ExpectedOperation { index: idx.index() })
        };

        for (index, node) in arena.nodes().iter().enumerate() {
            if !reachable[index] {
                continue;
            }
            match node {
                TreeNode::Tensor(tensor) => {
                    if tensor.id() >= SYNTHETIC_ID_BASE {
                        return Err(IrError::ReservedTensorId {
                            id: tensor.id(),
                            base: SYNTHETIC_ID_BASE,
                        });
                    }
                    dedup.add_tensor(tensor)?;
                    values[index] = Some(tensor.id());
                }
                TreeNode::Op {
                    kind,
                    dtype,
                    inputs,
                    outputs,
                    params,
                } => {
                    let mut ins: SmallVec<[TensorId; MAX_IN]> = SmallVec::new();
                    for &i in inputs {
                        ins.push(value_of(&values, i)?);
                    }
                    let mut outs: SmallVec<[TensorId; MAX_OUT]> = SmallVec::new();
                    for &o in outputs {
                        outs.push(value_of(&values, o)?);
                    }
                    let expr = ExprNode::with_params(
                        synthetic_id(index)?,
                        *kind,
                        *dtype,
                        &ins,
                        &outs,
                        *params,
                    )?;
                    let survivor = dedup.add_expr(expr)?;
                    // An op node used as an input stands for its first output.
                    values[index] = outs.first().copied();
                    survivors[index] = Some(survivor);
                    redirects.insert(index as u32, survivor);
                }
                TreeNode::Group { members, pinned } => {
                    let mut ids: SmallVec<[OpId; MAX_IN]> = SmallVec::new();
                    for m in members {
                        ids.push(
                            survivors[m.index()]
                                .ok_or(IrError::ExpectedOperation { index: m.index() })?,
                        );
                    }
                    let expr = ExprNode::group(synthetic_id(index)?, &ids, *pinned)?;
                    let survivor = dedup.add_expr(expr)?;
                    survivors[index] = Some(survivor);
                    redirects.insert(index as u32, survivor);
                }
            }
        }

        let mut resolution = dedup.finish(redirects);
        resolution.exprs = hoist_group_headers(std::mem::take(&mut resolution.exprs));

        tracing::debug!(
            roots = roots.len(),
            tensors = resolution.tensors.len(),
            ops = resolution.exprs.len(),
            merged = resolution.merged,
            "resolved expression tree"
        );
        Ok(resolution)
    }
}

fn synthetic_id(index: usize) -> IrResult<OpId> {
    u32::try_from(index)
        .ok()
        .and_then(|i| SYNTHETIC_ID_BASE.checked_add(i))
        .ok_or(IrError::CapacityOverflow {
            what: CapacityKind::Operations,
            limit: (u32::MAX - SYNTHETIC_ID_BASE) as usize,
            requested: index,
        })
}

fn mark_reachable(arena: &ExprArena, roots: &[NodeIdx]) -> IrResult<Vec<bool>> {
    let mut reachable = vec![false; arena.len()];
    let mut stack: Vec<NodeIdx> = roots.to_vec();
    while let Some(idx) = stack.pop() {
        let node = arena.get(idx)?;
        if reachable[idx.index()] {
            continue;
        }
        reachable[idx.index()] = true;
        match node {
            TreeNode::Tensor(_) => {}
            TreeNode::Op {
                inputs, outputs, ..
            } => {
                stack.extend(inputs.iter().copied());
                stack.extend(outputs.iter().copied());
            }
            TreeNode::Group { members, .. } => stack.extend(members.iter().copied()),
        }
    }
    Ok(reachable)
}

/// Move every group marker right before its earliest member.
fn hoist_group_headers(exprs: Vec<ExprNode>) -> Vec<ExprNode> {
    let position: HashMap<OpId, usize> = exprs
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id(), i))
        .collect();

    let mut before: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut hoisted = vec![false; exprs.len()];
    for (g, expr) in exprs.iter().enumerate() {
        let first = expr
            .members()
            .and_then(|members| members.iter().filter_map(|m| position.get(m)).min());
        if let Some(&first) = first {
            if first < g {
                before.entry(first).or_default().push(g);
                hoisted[g] = true;
            }
        }
    }
    if before.is_empty() {
        return exprs;
    }

    let mut slots: Vec<Option<ExprNode>> = exprs.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for i in 0..slots.len() {
        if let Some(groups) = before.get(&i) {
            for &g in groups {
                out.extend(slots[g].take());
            }
        }
        if !hoisted[i] {
            out.extend(slots[i].take());
        }
    }
    out
}

struct Dedup {
    capacity: GraphCapacity,
    tensors: Vec<TensorRef>,
    tensor_pos: HashMap<TensorId, usize>,
    exprs: Vec<ExprNode>,
    hashes: Vec<u64>,
    owners: HashMap<OpId, OpId>,
    merged: usize,
}

impl Dedup {
    fn new(capacity: GraphCapacity) -> Self {
        Dedup {
            capacity,
            tensors: Vec::new(),
            tensor_pos: HashMap::new(),
            exprs: Vec::new(),
            hashes: Vec::new(),
            owners: HashMap::new(),
            merged: 0,
        }
    }

    fn add_tensor(&mut self, tensor: &TensorRef) -> IrResult<()> {
        if let Some(&pos) = self.tensor_pos.get(&tensor.id()) {
            if &self.tensors[pos] != tensor {
                return Err(IrError::ConflictingTensor { id: tensor.id() });
            }
            return Ok(());
        }
        check_capacity(
            CapacityKind::Tensors,
            self.capacity.max_tensors,
            self.tensors.len() + 1,
        )?;
        self.tensor_pos.insert(tensor.id(), self.tensors.len());
        self.tensors.push(tensor.clone());
        Ok(())
    }

    /// Returns the id of the surviving operation.
    fn add_expr(&mut self, expr: ExprNode) -> IrResult<OpId> {
        let hash = expr.content_hash();
        let mut survivor = None;
        for (existing, &h) in self.exprs.iter().zip(&self.hashes) {
            if h != hash {
                continue;
            }
            if existing.structurally_eq(&expr) {
                survivor = Some(existing.id());
                break;
            }
            tracing::warn!(
                op = expr.id(),
                existing = existing.id(),
                hash,
                "content hash collision between structurally different operations, keeping both"
            );
        }

        let id = expr.id();
        match survivor {
            Some(s) => {
                if self.owners.get(&id).is_some_and(|&owner| owner != s) {
                    return Err(IrError::ConflictingOperation { id });
                }
                self.owners.insert(id, s);
                self.merged += 1;
                Ok(s)
            }
            None => {
                if self.owners.contains_key(&id) {
                    return Err(IrError::ConflictingOperation { id });
                }
                check_capacity(
                    CapacityKind::Operations,
                    self.capacity.max_operations,
                    self.exprs.len() + 1,
                )?;
                self.owners.insert(id, id);
                self.hashes.push(hash);
                self.exprs.push(expr);
                Ok(id)
            }
        }
    }

    fn finish(self, redirects: BTreeMap<u32, OpId>) -> Resolution {
        Resolution {
            tensors: self.tensors,
            exprs: self.exprs,
            redirects,
            merged: self.merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::graph::OpKind;
    use crate::ops;

    fn f32s(ids: &[u32]) -> Vec<TensorRef> {
        ids.iter().map(|&i| TensorRef::scalar(i, DType::F32)).collect()
    }

    #[test]
    fn test_flat_duplicate_tensor_merges() {
        let t = f32s(&[0, 1, 2]);
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        for tensor in t.iter().chain(t.iter()) {
            symbols.push_tensor(tensor.clone()).unwrap();
        }
        symbols
            .push_expr(ops::elm_add(0, &t[2], &[&t[0], &t[1]]).unwrap())
            .unwrap();
        let res = symbols.resolve().unwrap();
        assert_eq!(res.tensors.len(), 3);
    }

    #[test]
    fn test_flat_conflicting_tensor() {
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        symbols.push_tensor(TensorRef::scalar(0, DType::F32)).unwrap();
        symbols.push_tensor(TensorRef::scalar(0, DType::F64)).unwrap();
        assert_eq!(
            symbols.resolve(),
            Err(IrError::ConflictingTensor { id: 0 })
        );
    }

    #[test]
    fn test_flat_duplicate_op_redirects() {
        let t = f32s(&[0, 1, 2]);
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        for tensor in &t {
            symbols.push_tensor(tensor.clone()).unwrap();
        }
        symbols
            .push_expr(ops::elm_add(4, &t[2], &[&t[0], &t[1]]).unwrap())
            .unwrap();
        symbols
            .push_expr(ops::elm_add(9, &t[2], &[&t[0], &t[1]]).unwrap())
            .unwrap();
        let res = symbols.resolve().unwrap();
        assert_eq!(res.exprs.len(), 1);
        assert_eq!(res.merged, 1);
        assert_eq!(res.redirect(4), Some(4));
        assert_eq!(res.redirect(9), Some(4));
    }

    #[test]
    fn test_flat_same_id_different_ops() {
        let t = f32s(&[0, 1, 2]);
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        for tensor in &t {
            symbols.push_tensor(tensor.clone()).unwrap();
        }
        symbols.push_expr(ops::copy(3, &t[1], &t[0]).unwrap()).unwrap();
        symbols.push_expr(ops::copy(3, &t[2], &t[0]).unwrap()).unwrap();
        assert_eq!(
            symbols.resolve(),
            Err(IrError::ConflictingOperation { id: 3 })
        );
    }

    #[test]
    fn test_flat_group_members_follow_redirects() {
        let t = f32s(&[0, 1, 2, 3]);
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        for tensor in &t {
            symbols.push_tensor(tensor.clone()).unwrap();
        }
        symbols.push_expr(ops::group(100, &[11, 2], true).unwrap()).unwrap();
        symbols.push_expr(ops::copy(1, &t[1], &t[0]).unwrap()).unwrap();
        symbols.push_expr(ops::copy(11, &t[1], &t[0]).unwrap()).unwrap();
        symbols.push_expr(ops::exp(2, &t[2], &t[1]).unwrap()).unwrap();
        let res = symbols.resolve().unwrap();
        let group = res.exprs.iter().find(|e| e.is_group()).unwrap();
        assert_eq!(group.members(), Some(&[1, 2][..]));
    }

    #[test]
    fn test_flat_operation_capacity() {
        let t = f32s(&[0, 1, 2]);
        let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
        for tensor in &t {
            symbols.push_tensor(tensor.clone()).unwrap();
        }
        symbols.push_expr(ops::copy(0, &t[1], &t[0]).unwrap()).unwrap();
        symbols.push_expr(ops::copy(1, &t[2], &t[1]).unwrap()).unwrap();
        let res = Resolver::new(GraphCapacity::new(8, 1)).resolve_flat(&symbols);
        assert!(matches!(
            res,
            Err(IrError::CapacityOverflow {
                what: CapacityKind::Operations,
                limit: 1,
                requested: 2
            })
        ));
    }

    #[test]
    fn test_tree_shared_leaf_and_subexpression() {
        let mut arena = ExprArena::new();
        let x = arena.tensor(TensorRef::scalar(0, DType::F32));
        let y = arena.tensor(TensorRef::scalar(1, DType::F32));
        let e1 = arena.op(OpKind::Exp, &[x], &[y]).unwrap();
        let e2 = arena.op(OpKind::Exp, &[x], &[y]).unwrap();
        let z = arena.tensor(TensorRef::scalar(2, DType::F32));
        let add = arena.op(OpKind::ElemAdd, &[e1, e2], &[z]).unwrap();

        let res = Resolver::new(GraphCapacity::default())
            .resolve_tree(&arena, &[add])
            .unwrap();
        assert_eq!(res.tensors.len(), 3);
        assert_eq!(res.exprs.len(), 2);
        assert_eq!(res.redirect(e1.0), res.redirect(e2.0));
        assert_eq!(res.exprs[1].inputs(), &[1, 1]);
        assert_eq!(res.exprs[0].id(), SYNTHETIC_ID_BASE + e1.0);
    }

    #[test]
    fn test_tree_prunes_unreachable() {
        let mut arena = ExprArena::new();
        let x = arena.tensor(TensorRef::scalar(0, DType::F32));
        let y = arena.tensor(TensorRef::scalar(1, DType::F32));
        let z = arena.tensor(TensorRef::scalar(2, DType::F32));
        let keep = arena.op(OpKind::Exp, &[x], &[y]).unwrap();
        arena.op(OpKind::Sin, &[x], &[z]).unwrap();
        let res = Resolver::new(GraphCapacity::default())
            .resolve_tree(&arena, &[keep])
            .unwrap();
        assert_eq!(res.exprs.len(), 1);
        assert_eq!(res.tensors.len(), 2);
    }

    #[test]
    fn test_tree_reserved_tensor_id() {
        let mut arena = ExprArena::new();
        let x = arena.tensor(TensorRef::scalar(SYNTHETIC_ID_BASE, DType::F32));
        let y = arena.tensor(TensorRef::scalar(1, DType::F32));
        let e = arena.op(OpKind::Copy, &[x], &[y]).unwrap();
        assert_eq!(
            Resolver::new(GraphCapacity::default()).resolve_tree(&arena, &[e]),
            Err(IrError::ReservedTensorId {
                id: SYNTHETIC_ID_BASE,
                base: SYNTHETIC_ID_BASE
            })
        );
    }

    #[test]
    fn test_tree_group_header_precedes_members() {
        let mut arena = ExprArena::new();
        let x = arena.tensor(TensorRef::scalar(0, DType::F32));
        let y = arena.tensor(TensorRef::scalar(1, DType::F32));
        let z = arena.tensor(TensorRef::scalar(2, DType::F32));
        let a = arena.op(OpKind::Exp, &[x], &[y]).unwrap();
        let b = arena.op(OpKind::Sin, &[a], &[z]).unwrap();
        let g = arena.group(&[a, b], false).unwrap();

        let res = Resolver::new(GraphCapacity::default())
            .resolve_tree(&arena, &[g])
            .unwrap();
        let kinds: Vec<_> = res.exprs.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![OpKind::Group { pinned: false }, OpKind::Exp, OpKind::Sin]
        );
        assert!(res.into_dag(GraphCapacity::default()).is_ok());
    }
}
