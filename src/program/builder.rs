//! Validated construction of [`Program`]s.
//!
//! Operations are appended to their computation's schedule in the order
//! they are added. [`ProgramBuilder::set_schedule`] replaces that order
//! with an explicit one.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{
    Computation, ComputationId, OpId, Opcode, Operation, OutputSlot, Program, ProgramId,
    ShapeIndex,
};

/// Errors raised while assembling a program.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgramError {
    /// Two operations share a name.
    #[error("duplicate operation name `{0}`")]
    DuplicateOp(String),

    /// Two computations share a name.
    #[error("duplicate computation name `{0}`")]
    DuplicateComputation(String),

    /// A computation id or name does not exist.
    #[error("unknown computation `{0}`")]
    UnknownComputation(String),

    /// An operation name does not exist.
    #[error("unknown operation `{0}`")]
    UnknownOp(String),

    /// An operand refers to an operation that has not been added.
    #[error("operand {operand} of `{op}` does not exist")]
    DanglingOperand {
        /// Name of the consuming operation.
        op: String,
        /// Offending operand id.
        operand: OpId,
    },

    /// Copy-start with other than exactly one operand.
    #[error("copy-start `{0}` must have exactly one operand")]
    InvalidCopyStart(String),

    /// Copy-done whose operand is not a single copy-start.
    #[error("copy-done `{0}` must consume exactly one copy-start")]
    InvalidCopyDone(String),

    /// Trip counts must be finite and non-negative.
    #[error("invalid trip count {trip_count} for computation `{name}`")]
    InvalidTripCount {
        /// Computation name.
        name: String,
        /// Rejected value.
        trip_count: f64,
    },

    /// Explicit schedule names an operation of a different computation.
    #[error("schedule for `{computation}` includes `{op}` from another computation")]
    ForeignScheduledOp {
        /// Computation whose schedule was being set.
        computation: String,
        /// Offending operation.
        op: String,
    },

    /// Explicit schedule does not list every operation exactly once.
    #[error("schedule for `{computation}` covers {scheduled} of {expected} operations")]
    IncompleteSchedule {
        /// Computation whose schedule was being set.
        computation: String,
        /// Distinct operations in the schedule.
        scheduled: usize,
        /// Operations the computation owns.
        expected: usize,
    },
}

/// Incremental builder for [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    ops: Vec<Operation>,
    computations: Vec<Computation>,
    schedule: Vec<Vec<OpId>>,
    op_names: HashMap<String, OpId>,
    computation_names: HashMap<String, ComputationId>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a computation.
    ///
    /// `trip_count` is the number of executions per invocation of `parent`;
    /// top-level computations normally use `1.0`.
    pub fn add_computation(
        &mut self,
        name: &str,
        trip_count: f64,
        parent: Option<ComputationId>,
    ) -> Result<ComputationId, ProgramError> {
        if self.computation_names.contains_key(name) {
            return Err(ProgramError::DuplicateComputation(name.to_string()));
        }
        if !trip_count.is_finite() || trip_count < 0.0 {
            return Err(ProgramError::InvalidTripCount {
                name: name.to_string(),
                trip_count,
            });
        }
        if let Some(parent) = parent {
            self.check_computation(parent)?;
        }

        let id = ComputationId(self.computations.len() as u32);
        self.computations.push(Computation {
            id,
            name: name.to_string(),
            trip_count,
            parent,
        });
        self.schedule.push(Vec::new());
        self.computation_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add an operation with an arbitrary output shape.
    pub fn add_op(
        &mut self,
        computation: ComputationId,
        name: &str,
        opcode: Opcode,
        operands: &[OpId],
        outputs: Vec<OutputSlot>,
    ) -> Result<OpId, ProgramError> {
        self.check_computation(computation)?;
        if self.op_names.contains_key(name) {
            return Err(ProgramError::DuplicateOp(name.to_string()));
        }
        if let Some(&missing) = operands.iter().find(|o| o.index() >= self.ops.len()) {
            return Err(ProgramError::DanglingOperand {
                op: name.to_string(),
                operand: missing,
            });
        }
        match opcode {
            Opcode::CopyStart if operands.len() != 1 => {
                return Err(ProgramError::InvalidCopyStart(name.to_string()));
            }
            Opcode::CopyDone => {
                let valid = operands.len() == 1
                    && self.ops[operands[0].index()].opcode == Opcode::CopyStart;
                if !valid {
                    return Err(ProgramError::InvalidCopyDone(name.to_string()));
                }
            }
            _ => {}
        }

        let id = OpId(self.ops.len() as u32);
        self.ops.push(Operation {
            id,
            name: name.to_string(),
            opcode,
            operands: operands.to_vec(),
            outputs,
            users: Vec::new(),
            computation,
            flops: 0.0,
        });
        self.schedule[computation.index()].push(id);
        self.op_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add an operation with a single array-shaped output.
    pub fn add_array_op(
        &mut self,
        computation: ComputationId,
        name: &str,
        opcode: Opcode,
        operands: &[OpId],
        bytes: u64,
        memory_space: i64,
    ) -> Result<OpId, ProgramError> {
        self.add_op(
            computation,
            name,
            opcode,
            operands,
            vec![OutputSlot {
                index: ShapeIndex::new(),
                bytes,
                memory_space,
            }],
        )
    }

    /// Set the floating-point work of an operation.
    pub fn set_flops(&mut self, op: OpId, flops: f64) -> Result<(), ProgramError> {
        let op = self
            .ops
            .get_mut(op.index())
            .ok_or_else(|| ProgramError::UnknownOp(op.to_string()))?;
        op.flops = flops;
        Ok(())
    }

    /// Resolve an operation by name.
    pub fn op_id(&self, name: &str) -> Result<OpId, ProgramError> {
        self.op_names
            .get(name)
            .copied()
            .ok_or_else(|| ProgramError::UnknownOp(name.to_string()))
    }

    /// Resolve a computation by name.
    pub fn computation_id(&self, name: &str) -> Result<ComputationId, ProgramError> {
        self.computation_names
            .get(name)
            .copied()
            .ok_or_else(|| ProgramError::UnknownComputation(name.to_string()))
    }

    /// Replace a computation's schedule.
    ///
    /// The sequence must list every operation of the computation exactly once.
    pub fn set_schedule(
        &mut self,
        computation: ComputationId,
        sequence: Vec<OpId>,
    ) -> Result<(), ProgramError> {
        self.check_computation(computation)?;
        let comp_name = &self.computations[computation.index()].name;

        let mut seen = HashSet::with_capacity(sequence.len());
        for &id in &sequence {
            let op = self
                .ops
                .get(id.index())
                .ok_or_else(|| ProgramError::UnknownOp(id.to_string()))?;
            if op.computation != computation {
                return Err(ProgramError::ForeignScheduledOp {
                    computation: comp_name.clone(),
                    op: op.name.clone(),
                });
            }
            seen.insert(id);
        }

        let expected = self.schedule[computation.index()].len();
        if seen.len() != expected || sequence.len() != expected {
            return Err(ProgramError::IncompleteSchedule {
                computation: comp_name.clone(),
                scheduled: seen.len(),
                expected,
            });
        }

        self.schedule[computation.index()] = sequence;
        Ok(())
    }

    /// Finish construction, deriving user lists.
    pub fn build(mut self) -> Result<Program, ProgramError> {
        for i in 0..self.ops.len() {
            let user = self.ops[i].id;
            let operands = self.ops[i].operands.clone();
            for operand in operands {
                let users = &mut self.ops[operand.index()].users;
                if !users.contains(&user) {
                    users.push(user);
                }
            }
        }

        log::debug!(
            "Built program with {} operations in {} computations",
            self.ops.len(),
            self.computations.len()
        );

        Ok(Program {
            id: ProgramId::next(),
            ops: self.ops,
            computations: self.computations,
            schedule: self.schedule,
        })
    }

    fn check_computation(&self, id: ComputationId) -> Result<(), ProgramError> {
        if id.index() < self.computations.len() {
            Ok(())
        } else {
            Err(ProgramError::UnknownComputation(format!("#{}", id.0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_entry() -> (ProgramBuilder, ComputationId) {
        let mut builder = ProgramBuilder::new();
        let entry = builder.add_computation("entry", 1.0, None).unwrap();
        (builder, entry)
    }

    #[test]
    fn test_users_are_derived() {
        let (mut builder, entry) = builder_with_entry();
        let p = builder.add_array_op(entry, "p", Opcode::Control, &[], 64, 0).unwrap();
        let cs = builder.add_array_op(entry, "cs", Opcode::CopyStart, &[p], 64, 1).unwrap();
        let cd = builder.add_array_op(entry, "cd", Opcode::CopyDone, &[cs], 64, 1).unwrap();
        let add = builder.add_array_op(entry, "add", Opcode::Compute, &[cd, p], 64, 0).unwrap();
        let program = builder.build().unwrap();

        assert_eq!(program.op(p).users(), &[cs, add]);
        assert_eq!(program.op(cs).users(), &[cd]);
        assert_eq!(program.op(cd).users(), &[add]);
        assert!(program.op(add).users().is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (mut builder, entry) = builder_with_entry();
        builder.add_array_op(entry, "x", Opcode::Compute, &[], 4, 0).unwrap();
        assert_eq!(
            builder.add_array_op(entry, "x", Opcode::Compute, &[], 4, 0),
            Err(ProgramError::DuplicateOp("x".to_string()))
        );
        assert_eq!(
            builder.add_computation("entry", 1.0, None),
            Err(ProgramError::DuplicateComputation("entry".to_string()))
        );
    }

    #[test]
    fn test_copy_shape_validation() {
        let (mut builder, entry) = builder_with_entry();
        let a = builder.add_array_op(entry, "a", Opcode::Control, &[], 4, 0).unwrap();
        let b = builder.add_array_op(entry, "b", Opcode::Control, &[], 4, 0).unwrap();

        assert_eq!(
            builder.add_array_op(entry, "cs", Opcode::CopyStart, &[a, b], 4, 1),
            Err(ProgramError::InvalidCopyStart("cs".to_string()))
        );
        assert_eq!(
            builder.add_array_op(entry, "cd", Opcode::CopyDone, &[a], 4, 1),
            Err(ProgramError::InvalidCopyDone("cd".to_string()))
        );
    }

    #[test]
    fn test_dangling_operand_rejected() {
        let (mut builder, entry) = builder_with_entry();
        let err = builder
            .add_array_op(entry, "a", Opcode::Compute, &[OpId(3)], 4, 0)
            .unwrap_err();
        assert!(matches!(err, ProgramError::DanglingOperand { operand: OpId(3), .. }));
    }

    #[test]
    fn test_invalid_trip_count_rejected() {
        let mut builder = ProgramBuilder::new();
        assert!(builder.add_computation("loop", -1.0, None).is_err());
        assert!(builder.add_computation("loop", f64::NAN, None).is_err());
        assert!(builder.add_computation("loop", 0.0, None).is_ok());
    }

    #[test]
    fn test_explicit_schedule() {
        let (mut builder, entry) = builder_with_entry();
        let body = builder.add_computation("body", 2.0, Some(entry)).unwrap();
        let a = builder.add_array_op(entry, "a", Opcode::Control, &[], 4, 0).unwrap();
        let b = builder.add_array_op(entry, "b", Opcode::Compute, &[], 4, 0).unwrap();
        let c = builder.add_array_op(body, "c", Opcode::Compute, &[], 4, 0).unwrap();

        assert!(matches!(
            builder.set_schedule(entry, vec![b, c]),
            Err(ProgramError::ForeignScheduledOp { .. })
        ));
        assert!(matches!(
            builder.set_schedule(entry, vec![b, b]),
            Err(ProgramError::IncompleteSchedule { scheduled: 1, expected: 2, .. })
        ));

        builder.set_schedule(entry, vec![b, a]).unwrap();
        let program = builder.build().unwrap();
        assert_eq!(program.sequence(entry), &[b, a]);
        assert_eq!(program.sequence(body), &[c]);
    }

    #[test]
    fn test_name_lookup() {
        let (mut builder, entry) = builder_with_entry();
        let a = builder.add_array_op(entry, "a", Opcode::Control, &[], 4, 0).unwrap();
        builder.set_flops(a, 12.0).unwrap();

        assert_eq!(builder.op_id("a"), Ok(a));
        assert_eq!(builder.computation_id("entry"), Ok(entry));
        assert!(builder.op_id("missing").is_err());
        assert!(builder.computation_id("missing").is_err());
        assert_eq!(builder.build().unwrap().op(a).flops(), 12.0);
    }
}
