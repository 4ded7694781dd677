//! Group-aware topological scheduling.
//!
//! Every operation of a [`StaticDag`] owns one [`ScheduleSlot`] describing how it may move:
//!
//! - a free operation carries its rank and is reordered by it
//! - a group marker and its members move as one block; members never change order
//! - a pinned group keeps its absolute position and acts as a barrier that no other
//!   operation is moved across
//!
//! The rank of an operation is `num_inputs + Σ rank(producer)` over its inputs, so every
//! consumer ranks strictly above each of its producers. Ranks saturate at `u64::MAX` on deep
//! fan-in chains; among saturated units the dependency depth decides.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::node::{ExprEdge, TensorNode};
use super::validation::validate_topological_order;
use super::StaticDag;
use crate::error::{IrError, IrResult};
use crate::expr::{ExprNode, OpId};
use crate::limits::MAX_IN;

/// Ordering constraint of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleSlot {
    Free { rank: u64 },
    GroupHeader { members: usize, pinned: bool },
    GroupMember { header: usize, pinned: bool },
}

impl ScheduleSlot {
    pub fn is_pinned(&self) -> bool {
        match self {
            ScheduleSlot::Free { .. } => false,
            ScheduleSlot::GroupHeader { pinned, .. } | ScheduleSlot::GroupMember { pinned, .. } => {
                *pinned
            }
        }
    }

    pub fn rank(&self) -> Option<u64> {
        match self {
            ScheduleSlot::Free { rank } => Some(*rank),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    len: usize,
    pinned: bool,
    group: bool,
}

impl StaticDag {
    /// Return a new DAG whose operations are in a valid execution order.
    ///
    /// Movable units (free operations and movable groups) are stably sorted by rank within
    /// each run delimited by pinned groups. Units whose rank saturated are ordered by
    /// dependency depth. Sorting an already sorted DAG returns an equal DAG.
    ///
    /// Fails with [`IrError::InvalidGroup`] when a movable group cannot stay contiguous, and
    /// with [`IrError::ScheduleViolation`] when a pinned group forces a consumer before its
    /// producer.
    pub fn topological_sort(&self) -> IrResult<StaticDag> {
        let units = self.units();
        let ranks = self.unit_ranks(&units)?;

        let mut order: Vec<usize> = Vec::with_capacity(units.len());
        let mut run: Vec<usize> = Vec::new();
        for (u, unit) in units.iter().enumerate() {
            if unit.pinned {
                run.sort_by_key(|&v| ranks[v]);
                order.append(&mut run);
                order.push(u);
            } else {
                run.push(u);
            }
        }
        run.sort_by_key(|&v| ranks[v]);
        order.append(&mut run);

        let moved = order.iter().enumerate().filter(|&(i, &u)| i != u).count();
        let (tensors, exprs) = self.descriptors();
        let mut slots: Vec<Option<ExprNode>> = exprs.into_iter().map(Some).collect();
        let mut sorted = Vec::with_capacity(slots.len());
        for &u in &order {
            let unit = units[u];
            for slot in &mut slots[unit.start..unit.start + unit.len] {
                sorted.extend(slot.take());
            }
        }

        let dag = StaticDag::build(tensors, sorted, self.capacity())?;
        validate_topological_order(&dag)?;

        tracing::debug!(
            ops = dag.num_ops(),
            units = units.len(),
            pinned = units.iter().filter(|u| u.pinned).count(),
            moved,
            "topological sort"
        );
        Ok(dag)
    }

    /// Whether the current order already satisfies every producer/consumer edge.
    pub fn is_topologically_sorted(&self) -> bool {
        validate_topological_order(self).is_ok()
    }

    fn units(&self) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut i = 0;
        while i < self.schedule().len() {
            let unit = match self.schedule()[i] {
                ScheduleSlot::GroupHeader { members, pinned } => Unit {
                    start: i,
                    len: members + 1,
                    pinned,
                    group: true,
                },
                _ => Unit {
                    start: i,
                    len: 1,
                    pinned: false,
                    group: false,
                },
            };
            i += unit.len;
            units.push(unit);
        }
        units
    }

    /// Sort key of each unit: its rank over the inputs it reads from outside itself, plus the
    /// dependency depth when that rank saturated.
    fn unit_ranks(&self, units: &[Unit]) -> IrResult<Vec<(u64, usize)>> {
        let mut unit_of = vec![0usize; self.num_ops()];
        for (u, unit) in units.iter().enumerate() {
            for slot in &mut unit_of[unit.start..unit.start + unit.len] {
                *slot = u;
            }
        }

        // Per unit: one entry per external input, holding the producing unit if any.
        let external: Vec<Vec<Option<usize>>> = units
            .iter()
            .enumerate()
            .map(|(u, unit)| {
                self.ops()[unit.start..unit.start + unit.len]
                    .iter()
                    .flat_map(|op| op.inp_idxs())
                    .filter_map(|t| match self.tensors()[t].incoming() {
                        Some(p) if unit_of[p] == u => None,
                        Some(p) => Some(Some(unit_of[p])),
                        None => Some(None),
                    })
                    .collect()
            })
            .collect();

        let mut rank: Vec<Option<u64>> = vec![None; units.len()];
        let mut depth = vec![0usize; units.len()];
        let mut on_path = vec![false; units.len()];
        for root in 0..units.len() {
            let mut path = vec![root];
            while let Some(&u) = path.last() {
                if rank[u].is_some() {
                    path.pop();
                    continue;
                }
                on_path[u] = true;
                let pending = external[u]
                    .iter()
                    .flatten()
                    .copied()
                    .find(|&p| rank[p].is_none());
                match pending {
                    Some(p) if on_path[p] => {
                        let group = path
                            .iter()
                            .map(|&v| units[v])
                            .find(|unit| unit.group)
                            .map(|unit| self.ops()[unit.start].id());
                        return Err(match group {
                            Some(group) => IrError::InvalidGroup {
                                group,
                                reason: "group cannot stay contiguous: an operation outside \
                                         the group both feeds and consumes it"
                                    .to_string(),
                            },
                            None => IrError::CyclicGraph,
                        });
                    }
                    Some(p) => path.push(p),
                    None => {
                        let sum = external[u]
                            .iter()
                            .flatten()
                            .fold(external[u].len() as u64, |acc, &p| {
                                acc.saturating_add(rank[p].unwrap_or(0))
                            });
                        rank[u] = Some(sum);
                        depth[u] = external[u]
                            .iter()
                            .flatten()
                            .map(|&p| depth[p] + 1)
                            .max()
                            .unwrap_or(0);
                        on_path[u] = false;
                        path.pop();
                    }
                }
            }
        }
        Ok(rank
            .into_iter()
            .zip(depth)
            .map(|(r, d)| match r.unwrap_or(0) {
                u64::MAX => (u64::MAX, d),
                r => (r, 0),
            })
            .collect())
    }
}

/// Rotate group members so each sits right after its marker, in declared order.
pub(crate) fn arrange_groups(mut exprs: Vec<ExprNode>) -> IrResult<Vec<ExprNode>> {
    let groups: HashSet<OpId> = exprs
        .iter()
        .filter(|e| e.is_group())
        .map(|e| e.id())
        .collect();
    let mut claimed: HashSet<OpId> = HashSet::new();

    let mut i = 0;
    while i < exprs.len() {
        let members: SmallVec<[OpId; MAX_IN]> = match exprs[i].members() {
            Some(m) => SmallVec::from_slice(m),
            None => {
                i += 1;
                continue;
            }
        };
        let group = exprs[i].id();
        for (k, &member) in members.iter().enumerate() {
            if groups.contains(&member) {
                return Err(IrError::InvalidGroup {
                    group,
                    reason: format!("member {} is itself a group", member),
                });
            }
            if !claimed.insert(member) {
                return Err(IrError::InvalidGroup {
                    group,
                    reason: format!("member {} already belongs to another group", member),
                });
            }
            let slot = i + 1 + k;
            let found = exprs
                .iter()
                .skip(slot)
                .position(|e| e.id() == member)
                .map(|p| p + slot)
                .ok_or(IrError::GroupMemberNotFound { group, member })?;
            if found != slot {
                tracing::trace!(group, member, from = found, to = slot, "rotating group member");
                exprs[slot..=found].rotate_right(1);
            }
        }
        i += 1 + members.len();
    }
    Ok(exprs)
}

/// Memoized `num_inputs + Σ rank(producer)` per operation; group markers rank 0.
///
/// Fails with [`IrError::CyclicGraph`] if the producer relation has a cycle.
pub(crate) fn compute_ranks(tensors: &[TensorNode], ops: &[ExprEdge]) -> IrResult<Vec<u64>> {
    let mut pending = vec![0usize; ops.len()];
    for (i, op) in ops.iter().enumerate() {
        pending[i] = op
            .inp_idxs()
            .filter(|&t| tensors[t].incoming().is_some())
            .count();
    }

    let mut ready: Vec<usize> = (0..ops.len())
        .rev()
        .filter(|&i| !ops[i].is_group() && pending[i] == 0)
        .collect();
    let mut rank = vec![0u64; ops.len()];
    let mut processed = 0;

    while let Some(i) = ready.pop() {
        processed += 1;
        rank[i] = ops[i].inp_idxs().fold(ops[i].inp_idxs().len() as u64, |acc, t| {
            match tensors[t].incoming() {
                Some(p) => acc.saturating_add(rank[p]),
                None => acc,
            }
        });
        for t in ops[i].out_idxs() {
            for c in tensors[t].outgoing() {
                let uses = ops[c].inp_idxs().filter(|&x| x == t).count();
                pending[c] -= uses;
                if pending[c] == 0 {
                    ready.push(c);
                }
            }
        }
    }

    let executable = ops.iter().filter(|o| !o.is_group()).count();
    if processed < executable {
        return Err(IrError::CyclicGraph);
    }
    Ok(rank)
}

/// Slot array for contiguous groups; `ranks` is indexed like `ops`.
pub(crate) fn build_slots(ops: &[ExprEdge], ranks: &[u64]) -> Vec<ScheduleSlot> {
    let mut slots: Vec<ScheduleSlot> = ranks
        .iter()
        .map(|&rank| ScheduleSlot::Free { rank })
        .collect();
    for (i, op) in ops.iter().enumerate() {
        if let Some(members) = op.expr().members() {
            let pinned = op.expr().is_pinned();
            slots[i] = ScheduleSlot::GroupHeader {
                members: members.len(),
                pinned,
            };
            for slot in &mut slots[i + 1..i + 1 + members.len()] {
                *slot = ScheduleSlot::GroupMember { header: i, pinned };
            }
        }
    }
    slots
}
