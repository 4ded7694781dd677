//! Post-construction checks for `StaticDag` instances.
//!
//! [`validate_topological_order`] is the hard check the scheduler relies on.
//! [`validate_dag`] produces a full diagnostic report, including non-fatal warnings.

use super::{ScheduleSlot, StaticDag};
use crate::error::{IrError, IrResult};

/// Result of DAG validation with detailed diagnostics.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Total number of validation checks performed
    pub checks_performed: usize,
    pub errors: Vec<ValidationError>,
    /// Non-fatal issues
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub op_index: Option<usize>,
    pub tensor_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// A consumer is placed before its producer
    ScheduleOrder,
    /// A group's members do not follow its marker
    GroupLayout,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub kind: ValidationWarningKind,
    pub message: String,
    pub op_index: Option<usize>,
    pub tensor_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarningKind {
    /// Tensor is neither produced nor consumed
    IsolatedTensor,
    /// Operation output that no other operation reads
    DeadOutput,
    /// Tensor placed on device storage, which the CPU store serves from the host
    DeviceTensor,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Validation: {} errors, {} warnings ({} checks)",
            self.errors.len(),
            self.warnings.len(),
            self.checks_performed
        )
    }
}

/// Check that every producer precedes all of its consumers.
pub fn validate_topological_order(dag: &StaticDag) -> IrResult<()> {
    for (i, op) in dag.ops().iter().enumerate() {
        for t in op.inp_idxs() {
            if let Some(p) = dag.tensors()[t].incoming() {
                if p >= i {
                    return Err(IrError::ScheduleViolation {
                        producer: dag.ops()[p].id(),
                        consumer: op.id(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Run every check and collect the findings.
pub fn validate_dag(dag: &StaticDag) -> ValidationReport {
    let mut report = ValidationReport {
        checks_performed: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    report.checks_performed += 1;
    check_order(dag, &mut report);

    report.checks_performed += 1;
    check_group_layout(dag, &mut report);

    report.checks_performed += 1;
    check_tensor_usage(dag, &mut report);

    report
}

fn check_order(dag: &StaticDag, report: &mut ValidationReport) {
    for (i, op) in dag.ops().iter().enumerate() {
        for t in op.inp_idxs() {
            match dag.tensors()[t].incoming() {
                Some(p) if p >= i => report.errors.push(ValidationError {
                    kind: ValidationErrorKind::ScheduleOrder,
                    message: format!(
                        "Operation {} reads tensor {} before operation {} writes it",
                        op.id(),
                        dag.tensors()[t].id(),
                        dag.ops()[p].id()
                    ),
                    op_index: Some(i),
                    tensor_index: Some(t),
                }),
                _ => {}
            }
        }
    }
}

fn check_group_layout(dag: &StaticDag, report: &mut ValidationReport) {
    for (i, op) in dag.ops().iter().enumerate() {
        let Some(members) = op.expr().members() else {
            continue;
        };
        for (k, &member) in members.iter().enumerate() {
            let slot = i + 1 + k;
            let in_place = dag.ops().get(slot).is_some_and(|o| o.id() == member)
                && matches!(
                    dag.schedule()[slot],
                    ScheduleSlot::GroupMember { header, .. } if header == i
                );
            if !in_place {
                report.errors.push(ValidationError {
                    kind: ValidationErrorKind::GroupLayout,
                    message: format!(
                        "Group {} expects member {} at position {}",
                        op.id(),
                        member,
                        slot
                    ),
                    op_index: Some(i),
                    tensor_index: None,
                });
            }
        }
    }
}

fn check_tensor_usage(dag: &StaticDag, report: &mut ValidationReport) {
    for (t, node) in dag.tensors().iter().enumerate() {
        if node.tensor().storage() == crate::dtype::StorageClass::Device {
            report.warnings.push(ValidationWarning {
                kind: ValidationWarningKind::DeviceTensor,
                message: format!("Tensor {} is marked as device storage", node.id()),
                op_index: None,
                tensor_index: Some(t),
            });
        }
        match (node.incoming(), node.total_out()) {
            (None, 0) => report.warnings.push(ValidationWarning {
                kind: ValidationWarningKind::IsolatedTensor,
                message: format!("Tensor {} is neither produced nor consumed", node.id()),
                op_index: None,
                tensor_index: Some(t),
            }),
            (Some(p), 0) => report.warnings.push(ValidationWarning {
                kind: ValidationWarningKind::DeadOutput,
                message: format!(
                    "Tensor {} written by operation {} is never read",
                    node.id(),
                    dag.ops()[p].id()
                ),
                op_index: Some(p),
                tensor_index: Some(t),
            }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::limits::GraphCapacity;
    use crate::ops;
    use crate::tensor::TensorRef;

    #[test]
    fn test_report_on_unsorted_dag() {
        let t: Vec<_> = (0..4).map(|i| TensorRef::scalar(i, DType::F32)).collect();
        let exprs = vec![
            ops::exp(2, &t[2], &t[1]).unwrap(),
            ops::exp(1, &t[1], &t[0]).unwrap(),
        ];
        let dag = StaticDag::build(t, exprs, GraphCapacity::default()).unwrap();

        let report = validate_dag(&dag);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ValidationErrorKind::ScheduleOrder);
        // t2 is a dead output, t3 is isolated
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.summary(), "Validation: 1 errors, 2 warnings (3 checks)");

        let sorted = dag.topological_sort().unwrap();
        assert!(validate_dag(&sorted).is_valid());
    }
}
