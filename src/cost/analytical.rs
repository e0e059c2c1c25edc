//! Roofline-style analytical cost model.
//!
//! # Timing Model
//!
//! Each compute operation is bounded by the slowest of three resources:
//!
//! ```text
//! elapsed = max( flops / flops_per_second,
//!                default_bytes / default_mem_bytes_per_second,
//!                alternate_bytes / alternate_mem_bytes_per_second )
//!
//! idle    = elapsed - default_bytes / default_mem_bytes_per_second
//! ```
//!
//! Operand bytes are the output slot sizes of the operand's producer; a slot
//! counts as alternate traffic when its `(operand_number, index)` pair is
//! listed as alternate-resident. Output bytes are the operation's own slots.
//!
//! Copies, loops and control operations cost nothing here: copies are timed
//! by the simulator itself, loop bodies are timed in their own computation.

use serde::{Deserialize, Serialize};

use super::{AccessFilter, CostAnalysis};
use crate::program::{OpId, Opcode, Program, ShapeIndex};

/// Hardware rates for [`AnalyticalCostModel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticalCostConfig {
    /// Peak compute throughput.
    pub flops_per_second: f64,
    /// Alternate (fast) memory bandwidth in bytes/second.
    pub alternate_mem_bytes_per_second: f64,
    /// Default (slow) memory bandwidth in bytes/second.
    pub default_mem_bytes_per_second: f64,
}

impl Default for AnalyticalCostConfig {
    fn default() -> Self {
        Self {
            flops_per_second: 1.0e12,
            alternate_mem_bytes_per_second: 1.0e12,
            default_mem_bytes_per_second: 100.0e9,
        }
    }
}

/// Bytes moved by one invocation, split by tier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Traffic {
    default_bytes: f64,
    alternate_bytes: f64,
}

/// Cost model deriving times from flops, sizes and bandwidths.
#[derive(Debug, Clone, Default)]
pub struct AnalyticalCostModel {
    config: AnalyticalCostConfig,
}

impl AnalyticalCostModel {
    pub fn new(config: AnalyticalCostConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticalCostConfig {
        &self.config
    }

    fn traffic(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> Traffic {
        let mut traffic = Traffic::default();
        let operation = program.op(op);
        if operation.opcode() != Opcode::Compute {
            return traffic;
        }

        if filter.include_operands {
            for (operand_number, &operand) in operation.operands().iter().enumerate() {
                for slot in program.op(operand).outputs() {
                    let in_alternate = operands_in_alternate
                        .iter()
                        .any(|(n, index)| *n == operand_number && *index == slot.index);
                    traffic.add(slot.bytes as f64, in_alternate);
                }
            }
        }

        if filter.include_outputs {
            for slot in operation.outputs() {
                let in_alternate = outputs_in_alternate.contains(&slot.index);
                traffic.add(slot.bytes as f64, in_alternate);
            }
        }

        traffic
    }

    fn compute_time(&self, program: &Program, op: OpId) -> f64 {
        let operation = program.op(op);
        if operation.opcode() != Opcode::Compute {
            return 0.0;
        }
        seconds(operation.flops(), self.config.flops_per_second)
    }
}

impl Traffic {
    fn add(&mut self, bytes: f64, in_alternate: bool) {
        if in_alternate {
            self.alternate_bytes += bytes;
        } else {
            self.default_bytes += bytes;
        }
    }
}

/// `amount / rate`, or zero for a non-positive rate.
fn seconds(amount: f64, rate: f64) -> f64 {
    if rate > 0.0 {
        amount / rate
    } else {
        0.0
    }
}

impl CostAnalysis for AnalyticalCostModel {
    fn elapsed_in_alternate_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        let traffic = self.traffic(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
            AccessFilter::ALL,
        );
        let default_time = seconds(traffic.default_bytes, self.config.default_mem_bytes_per_second);
        let alternate_time =
            seconds(traffic.alternate_bytes, self.config.alternate_mem_bytes_per_second);
        self.compute_time(program, op).max(default_time).max(alternate_time)
    }

    fn bytes_accessed_from_default_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> f64 {
        self.traffic(program, op, operands_in_alternate, outputs_in_alternate, filter)
            .default_bytes
    }

    fn default_memory_bandwidth_idle_time(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        let default_bytes = self.bytes_accessed_from_default_memory(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
            AccessFilter::ALL,
        );
        let default_time = seconds(default_bytes, self.config.default_mem_bytes_per_second);
        let elapsed =
            self.elapsed_in_alternate_memory(program, op, operands_in_alternate, outputs_in_alternate);
        (elapsed - default_time).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramBuilder, DEFAULT_MEMORY_SPACE};
    use smallvec::smallvec;

    fn model() -> AnalyticalCostModel {
        AnalyticalCostModel::new(AnalyticalCostConfig {
            flops_per_second: 1000.0,
            alternate_mem_bytes_per_second: 1000.0,
            default_mem_bytes_per_second: 100.0,
        })
    }

    /// p0 (400 B) -> add (200 B, 50 flops)
    fn single_add() -> (Program, OpId, OpId) {
        let mut builder = ProgramBuilder::new();
        let entry = builder.add_computation("entry", 1.0, None).unwrap();
        let p0 = builder
            .add_array_op(entry, "p0", Opcode::Control, &[], 400, DEFAULT_MEMORY_SPACE)
            .unwrap();
        let add = builder
            .add_array_op(entry, "add", Opcode::Compute, &[p0], 200, DEFAULT_MEMORY_SPACE)
            .unwrap();
        builder.set_flops(add, 50.0).unwrap();
        (builder.build().unwrap(), p0, add)
    }

    #[test]
    fn test_all_default_is_memory_bound() {
        let (program, _, add) = single_add();
        let model = model();

        let bytes = model.bytes_accessed_from_default_memory(&program, add, &[], &[], AccessFilter::ALL);
        assert_eq!(bytes, 600.0);
        assert_eq!(
            model.bytes_accessed_from_default_memory(&program, add, &[], &[], AccessFilter::OPERANDS),
            400.0
        );
        assert_eq!(
            model.bytes_accessed_from_default_memory(&program, add, &[], &[], AccessFilter::OUTPUTS),
            200.0
        );

        // 600 B at 100 B/s dominates 50 flops at 1000 flop/s
        assert!((model.elapsed_in_alternate_memory(&program, add, &[], &[]) - 6.0).abs() < 1e-12);
        assert_eq!(model.default_memory_bandwidth_idle_time(&program, add, &[], &[]), 0.0);
    }

    #[test]
    fn test_alternate_placement_moves_traffic() {
        let (program, _, add) = single_add();
        let model = model();
        let operands: Vec<(usize, ShapeIndex)> = vec![(0, smallvec![])];
        let outputs: Vec<ShapeIndex> = vec![smallvec![]];

        assert_eq!(
            model.bytes_accessed_from_default_memory(&program, add, &operands, &outputs, AccessFilter::ALL),
            0.0
        );
        // 600 B at 1000 B/s = 0.6s beats 0.05s of compute
        let elapsed = model.elapsed_in_alternate_memory(&program, add, &operands, &outputs);
        assert!((elapsed - 0.6).abs() < 1e-12);
        let idle = model.default_memory_bandwidth_idle_time(&program, add, &operands, &outputs);
        assert!((idle - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_operand_match_requires_operand_number() {
        let (program, _, add) = single_add();
        let model = model();
        // Operand 1 does not exist on `add`, so nothing moves to alternate.
        let operands: Vec<(usize, ShapeIndex)> = vec![(1, smallvec![])];
        assert_eq!(
            model.bytes_accessed_from_default_memory(&program, add, &operands, &[], AccessFilter::OPERANDS),
            400.0
        );
    }

    #[test]
    fn test_non_compute_ops_are_free() {
        let (program, p0, _) = single_add();
        let model = model();
        assert_eq!(model.elapsed_in_alternate_memory(&program, p0, &[], &[]), 0.0);
        assert_eq!(
            model.bytes_accessed_from_default_memory(&program, p0, &[], &[], AccessFilter::ALL),
            0.0
        );
        assert_eq!(model.buffer_size(&program, p0), 400.0);
    }

    #[test]
    fn test_zero_rates_degenerate_to_zero() {
        let (program, _, add) = single_add();
        let model = AnalyticalCostModel::new(AnalyticalCostConfig {
            flops_per_second: 0.0,
            alternate_mem_bytes_per_second: 0.0,
            default_mem_bytes_per_second: 0.0,
        });
        assert_eq!(model.elapsed_in_alternate_memory(&program, add, &[], &[]), 0.0);
    }
}
