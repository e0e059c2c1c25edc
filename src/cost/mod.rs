//! Cost model interface consumed by the simulator.
//!
//! The simulator treats the cost model as an opaque service. Given an
//! operation and which of its operands/outputs live in alternate memory,
//! a [`CostAnalysis`] answers:
//!
//! - How long one invocation takes ([`CostAnalysis::elapsed_in_alternate_memory`])
//! - How many bytes it moves to or from default memory, split into operand
//!   and output traffic ([`CostAnalysis::bytes_accessed_from_default_memory`])
//! - How long it computes without touching default memory
//!   ([`CostAnalysis::default_memory_bandwidth_idle_time`])
//! - How many times it runs per program execution
//!   ([`CostAnalysis::nest_trip_count`])
//!
//! Two implementations ship with the crate:
//!
//! - [`AnalyticalCostModel`]: roofline-style estimate from flops, byte sizes
//!   and per-tier bandwidths
//! - [`TableCostModel`]: fixed per-operation figures, for replaying numbers
//!   produced elsewhere
//!
//! # Trip Counts
//!
//! Nest trip counts are memoized per computation in a [`TripCountCache`].
//! The cache belongs to the caller and is meant to be reused across
//! simulation calls. It remembers which program filled it and starts over
//! when handed another one.

pub mod analytical;
pub mod table;

pub use analytical::{AnalyticalCostConfig, AnalyticalCostModel};
pub use table::{OpCost, TableCostModel};

use std::collections::HashMap;

use crate::program::{ComputationId, OpId, Program, ProgramId, ShapeIndex};

/// Selects which side of an operation's memory traffic to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFilter {
    pub include_operands: bool,
    pub include_outputs: bool,
}

impl AccessFilter {
    /// Operand reads only.
    pub const OPERANDS: Self = Self {
        include_operands: true,
        include_outputs: false,
    };

    /// Output writes only.
    pub const OUTPUTS: Self = Self {
        include_operands: false,
        include_outputs: true,
    };

    /// All traffic.
    pub const ALL: Self = Self {
        include_operands: true,
        include_outputs: true,
    };
}

/// Memoized nest trip counts, keyed by computation.
///
/// Entries belong to one program at a time. Asking about a different
/// program drops everything memoized so far.
#[derive(Debug, Clone, Default)]
pub struct TripCountCache {
    program: Option<ProgramId>,
    by_computation: HashMap<ComputationId, f64>,
}

impl TripCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Product of trip counts from `computation` up to its outermost parent.
    pub fn nest_trip_count(&mut self, program: &Program, computation: ComputationId) -> f64 {
        if self.program != Some(program.id()) {
            if self.program.is_some() {
                log::debug!("Trip count cache switched programs; dropping {} entries", self.len());
            }
            self.by_computation.clear();
            self.program = Some(program.id());
        }
        if let Some(&cached) = self.by_computation.get(&computation) {
            return cached;
        }

        let comp = program.computation(computation);
        let trip_count = match comp.parent() {
            Some(parent) => comp.trip_count() * self.nest_trip_count(program, parent),
            None => comp.trip_count(),
        };
        self.by_computation.insert(computation, trip_count);
        trip_count
    }

    pub fn len(&self) -> usize {
        self.by_computation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_computation.is_empty()
    }

    /// Drop all memoized entries.
    pub fn clear(&mut self) {
        self.program = None;
        self.by_computation.clear();
    }
}

/// Per-operation cost queries.
///
/// `operands_in_alternate` lists `(operand_number, operand_index)` pairs read
/// from alternate memory; `outputs_in_alternate` lists output slots written
/// to alternate memory. Everything else is assumed to live in default memory.
pub trait CostAnalysis {
    /// Elapsed time of one invocation of `op`, in seconds.
    fn elapsed_in_alternate_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64;

    /// Bytes one invocation of `op` reads from or writes to default memory.
    fn bytes_accessed_from_default_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> f64;

    /// Time within one invocation of `op` during which default memory is unused.
    fn default_memory_bandwidth_idle_time(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64;

    /// Size of the value produced by `op`, in bytes.
    fn buffer_size(&self, program: &Program, op: OpId) -> f64 {
        program.op(op).output_bytes() as f64
    }

    /// Number of times `op` executes per program execution.
    fn nest_trip_count(&self, program: &Program, op: OpId, cache: &mut TripCountCache) -> f64 {
        cache.nest_trip_count(program, program.op(op).computation())
    }
}

impl<C: CostAnalysis + ?Sized> CostAnalysis for &C {
    fn elapsed_in_alternate_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        (**self).elapsed_in_alternate_memory(program, op, operands_in_alternate, outputs_in_alternate)
    }

    fn bytes_accessed_from_default_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> f64 {
        (**self).bytes_accessed_from_default_memory(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
            filter,
        )
    }

    fn default_memory_bandwidth_idle_time(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        (**self).default_memory_bandwidth_idle_time(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
        )
    }

    fn buffer_size(&self, program: &Program, op: OpId) -> f64 {
        (**self).buffer_size(program, op)
    }

    fn nest_trip_count(&self, program: &Program, op: OpId, cache: &mut TripCountCache) -> f64 {
        (**self).nest_trip_count(program, op, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Opcode, ProgramBuilder};

    #[test]
    fn test_nest_trip_count_multiplies_parents() {
        let mut builder = ProgramBuilder::new();
        let entry = builder.add_computation("entry", 1.0, None).unwrap();
        let outer = builder.add_computation("outer", 4.0, Some(entry)).unwrap();
        let inner = builder.add_computation("inner", 3.0, Some(outer)).unwrap();
        builder.add_array_op(inner, "x", Opcode::Compute, &[], 8, 0).unwrap();
        let program = builder.build().unwrap();

        let mut cache = TripCountCache::new();
        assert_eq!(cache.nest_trip_count(&program, inner), 12.0);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.nest_trip_count(&program, entry), 1.0);
        assert_eq!(cache.nest_trip_count(&program, outer), 4.0);

        cache.clear();
        assert!(cache.is_empty());
    }

    fn looped(body_trip_count: f64) -> (Program, ComputationId) {
        let mut builder = ProgramBuilder::new();
        let entry = builder.add_computation("entry", 1.0, None).unwrap();
        let body = builder.add_computation("body", body_trip_count, Some(entry)).unwrap();
        builder.add_array_op(body, "x", Opcode::Compute, &[], 8, 0).unwrap();
        (builder.build().unwrap(), body)
    }

    #[test]
    fn test_cache_restarts_on_another_program() {
        let (four, body_four) = looped(4.0);
        let (two, body_two) = looped(2.0);
        assert_eq!(body_four, body_two);

        let mut cache = TripCountCache::new();
        assert_eq!(cache.nest_trip_count(&four, body_four), 4.0);
        assert_eq!(cache.nest_trip_count(&two, body_two), 2.0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.nest_trip_count(&four, body_four), 4.0);
    }

    #[test]
    fn test_access_filter_constants() {
        assert!(AccessFilter::OPERANDS.include_operands);
        assert!(!AccessFilter::OPERANDS.include_outputs);
        assert!(AccessFilter::OUTPUTS.include_outputs);
        assert!(!AccessFilter::OUTPUTS.include_operands);
        assert_eq!(
            AccessFilter::ALL,
            AccessFilter {
                include_operands: true,
                include_outputs: true
            }
        );
    }
}
