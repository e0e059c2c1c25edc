//! Cost model backed by fixed per-operation figures.
//!
//! Useful when the numbers come from an external profiler or when a
//! scenario needs exact, hand-picked timings. Operations without an entry
//! cost nothing. Placement arguments are ignored: the table already
//! describes the placement it was measured under.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{AccessFilter, CostAnalysis};
use crate::program::{OpId, Program, ShapeIndex};

/// Recorded cost of one operation invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpCost {
    /// Elapsed time in seconds.
    pub elapsed: f64,
    /// Operand bytes read from default memory.
    pub operand_bytes: f64,
    /// Output bytes written to default memory.
    pub output_bytes: f64,
    /// Seconds during which default memory is unused.
    pub idle_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TableCostModel {
    costs: HashMap<OpId, OpCost>,
    buffer_sizes: HashMap<OpId, f64>,
}

impl TableCostModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cost(&mut self, op: OpId, cost: OpCost) {
        self.costs.insert(op, cost);
    }

    /// Override the size reported for `op`'s value (copy sources).
    pub fn set_buffer_size(&mut self, op: OpId, bytes: f64) {
        self.buffer_sizes.insert(op, bytes);
    }

    pub fn cost(&self, op: OpId) -> OpCost {
        self.costs.get(&op).copied().unwrap_or_default()
    }
}

impl CostAnalysis for TableCostModel {
    fn elapsed_in_alternate_memory(
        &self,
        _program: &Program,
        op: OpId,
        _operands_in_alternate: &[(usize, ShapeIndex)],
        _outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        self.cost(op).elapsed
    }

    fn bytes_accessed_from_default_memory(
        &self,
        _program: &Program,
        op: OpId,
        _operands_in_alternate: &[(usize, ShapeIndex)],
        _outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> f64 {
        let cost = self.cost(op);
        let mut bytes = 0.0;
        if filter.include_operands {
            bytes += cost.operand_bytes;
        }
        if filter.include_outputs {
            bytes += cost.output_bytes;
        }
        bytes
    }

    fn default_memory_bandwidth_idle_time(
        &self,
        _program: &Program,
        op: OpId,
        _operands_in_alternate: &[(usize, ShapeIndex)],
        _outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        self.cost(op).idle_time
    }

    fn buffer_size(&self, program: &Program, op: OpId) -> f64 {
        self.buffer_sizes
            .get(&op)
            .copied()
            .unwrap_or_else(|| program.op(op).output_bytes() as f64)
    }
}
