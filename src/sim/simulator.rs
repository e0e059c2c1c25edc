//! Whole-program elapsed-time estimation.

use crate::allocation::AllocationSequence;
use crate::cost::{AccessFilter, CostAnalysis, TripCountCache};
use crate::program::{ComputationId, OpId, Opcode, Program};

use super::bandwidth::{
    process_async_copies_in_time_window, simulate_async_copy_transfer, RemainingBytes,
    TransferQueue,
};
use super::direction::{transfer_direction, TransferDirection};
use super::placement::PlacementIndex;

/// Phase breakdown of one compute instruction under contention.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputePhases {
    /// Operand reads from default memory, sharing with pending writes.
    pub load: f64,
    /// Time computing without touching default memory.
    pub idle: f64,
    /// Output writes to default memory, sharing with pending reads.
    pub store: f64,
}

impl ComputePhases {
    pub fn total(&self) -> f64 {
        self.load + self.idle + self.store
    }
}

/// How an instruction's elapsed time was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstructionKind {
    /// Cost-model estimate with copies assumed free.
    Baseline,
    /// Three-phase compute timing.
    Compute(ComputePhases),
    /// Completion of a copy moving `bytes` (including earlier same-direction copies).
    CopyDone { bytes: f64 },
}

/// Timing of one simulated instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstructionTiming {
    pub op: OpId,
    pub kind: InstructionKind,
    /// Seconds per invocation.
    pub elapsed: f64,
    /// Nest trip count applied (zero when `elapsed` was not positive).
    pub trip_count: f64,
}

impl InstructionTiming {
    /// Contribution to the program total.
    pub fn contribution(&self) -> f64 {
        self.elapsed * self.trip_count
    }
}

/// Elapsed time of one computation's schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputationTiming {
    pub computation: ComputationId,
    pub elapsed: f64,
}

/// Result of a simulation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    /// Predicted program execution time in seconds.
    pub total: f64,
    /// Per-computation subtotals, in simulation order.
    pub computations: Vec<ComputationTiming>,
    /// Timed instructions, in simulation order.
    pub instructions: Vec<InstructionTiming>,
}

/// In-flight copies of one computation.
#[derive(Debug, Default)]
struct DefaultMemoryQueues {
    /// Copies reading default memory (prefetches).
    read: TransferQueue,
    /// Copies writing default memory (evictions).
    write: TransferQueue,
    remaining: RemainingBytes,
}

impl DefaultMemoryQueues {
    fn issue(&mut self, copy_start: OpId, direction: TransferDirection, bytes: f64) {
        match direction {
            TransferDirection::DefaultToAlternate => self.read.push_back(copy_start),
            TransferDirection::AlternateToDefault => self.write.push_back(copy_start),
            TransferDirection::Unsupported => return,
        }
        self.remaining.insert(copy_start, bytes);
    }

    /// Finish `copy_start` and every earlier copy in the same direction.
    ///
    /// Returns the bytes still outstanding and the time to move them.
    fn complete(
        &mut self,
        copy_start: OpId,
        direction: TransferDirection,
        bytes_per_second: f64,
    ) -> (f64, f64) {
        let (same_direction, opposite_direction) = match direction {
            TransferDirection::DefaultToAlternate => (&mut self.read, &mut self.write),
            TransferDirection::AlternateToDefault => (&mut self.write, &mut self.read),
            TransferDirection::Unsupported => return (0.0, 0.0),
        };

        let mut total_bytes = 0.0;
        while self.remaining.contains(copy_start) {
            let front = same_direction.pop_front().unwrap_or_else(|| {
                panic!("copy {} tracked but not queued", copy_start)
            });
            total_bytes += self.remaining.remove(front).unwrap_or_else(|| {
                panic!("in-flight copy {} missing from remaining-bytes table", front)
            });
        }

        let elapsed = simulate_async_copy_transfer(
            total_bytes,
            opposite_direction,
            &mut self.remaining,
            bytes_per_second,
        );
        (total_bytes, elapsed)
    }

    fn load(&mut self, bytes: f64, bytes_per_second: f64) -> f64 {
        simulate_async_copy_transfer(bytes, &mut self.write, &mut self.remaining, bytes_per_second)
    }

    fn idle(&mut self, time_window: f64, bytes_per_second: f64) {
        process_async_copies_in_time_window(
            time_window,
            &mut self.read,
            &mut self.write,
            &mut self.remaining,
            bytes_per_second,
        );
    }

    fn store(&mut self, bytes: f64, bytes_per_second: f64) -> f64 {
        simulate_async_copy_transfer(bytes, &mut self.read, &mut self.remaining, bytes_per_second)
    }
}

/// Predicts program execution time for a given memory-tier assignment.
///
/// Holds the cost model and the trip-count cache; everything else is
/// rebuilt on every call, so repeated calls with identical inputs give
/// identical results.
pub struct RuntimeSimulator<C: CostAnalysis> {
    cost_analysis: C,
    trip_count_cache: TripCountCache,
}

impl<C: CostAnalysis> RuntimeSimulator<C> {
    pub fn new(cost_analysis: C) -> Self {
        Self {
            cost_analysis,
            trip_count_cache: TripCountCache::new(),
        }
    }

    pub fn cost_analysis(&self) -> &C {
        &self.cost_analysis
    }

    pub fn trip_count_cache(&self) -> &TripCountCache {
        &self.trip_count_cache
    }

    /// Forget memoized trip counts.
    pub fn reset_trip_count_cache(&mut self) {
        self.trip_count_cache.clear();
    }

    /// Sum of per-instruction costs, ignoring copy overhead.
    pub fn elapsed_without_copies(
        &mut self,
        program: &Program,
        allocations: &AllocationSequence,
    ) -> f64 {
        self.simulate_without_copies(program, allocations).total
    }

    /// [`Self::elapsed_without_copies`] with per-instruction detail.
    pub fn simulate_without_copies(
        &mut self,
        program: &Program,
        allocations: &AllocationSequence,
    ) -> SimulationReport {
        let placement = PlacementIndex::build(allocations);
        let mut report = SimulationReport::default();

        for (computation, sequence) in program.sequences() {
            let mut computation_elapsed = 0.0;
            for &op in sequence {
                if program.op(op).opcode() == Opcode::While {
                    continue;
                }
                let elapsed = self.cost_analysis.elapsed_in_alternate_memory(
                    program,
                    op,
                    placement.operands_in_alternate(op),
                    placement.outputs_in_alternate(op),
                );
                let trip_count =
                    self.cost_analysis
                        .nest_trip_count(program, op, &mut self.trip_count_cache);
                report.total += trip_count * elapsed;
                computation_elapsed += trip_count * elapsed;
                report.instructions.push(InstructionTiming {
                    op,
                    kind: InstructionKind::Baseline,
                    elapsed,
                    trip_count,
                });
            }
            report.computations.push(ComputationTiming {
                computation: computation.id(),
                elapsed: computation_elapsed,
            });
        }

        log::debug!(
            "Elapsed without async copies: {:.6e}s over {} instructions",
            report.total,
            report.instructions.len()
        );
        report
    }

    /// Elapsed time including default-memory contention from async copies.
    ///
    /// Returns 0 when `default_memory_bytes_per_second` is not positive.
    pub fn elapsed_with_copies(
        &mut self,
        program: &Program,
        allocations: &AllocationSequence,
        alternate_memory_space: i64,
        default_memory_bytes_per_second: f64,
    ) -> f64 {
        self.simulate(
            program,
            allocations,
            alternate_memory_space,
            default_memory_bytes_per_second,
        )
        .total
    }

    /// [`Self::elapsed_with_copies`] with per-instruction detail.
    ///
    /// Each computation is walked once in schedule order with its own pair
    /// of copy queues:
    ///
    /// - `while`: skipped, its body is a separate computation
    /// - copy-start: queued by direction with the source value's size
    /// - copy-done: completes its copy and every earlier copy in the same
    ///   direction, sharing bandwidth with the opposite queue
    /// - anything else: load operands, idle window, store outputs
    ///
    /// Positive per-invocation times are scaled by the nest trip count.
    pub fn simulate(
        &mut self,
        program: &Program,
        allocations: &AllocationSequence,
        alternate_memory_space: i64,
        default_memory_bytes_per_second: f64,
    ) -> SimulationReport {
        let placement = PlacementIndex::build(allocations);
        let mut report = SimulationReport::default();

        // Also rejects NaN.
        if !(default_memory_bytes_per_second > 0.0) {
            log::debug!(
                "Default memory bandwidth {} is not positive; skipping simulation",
                default_memory_bytes_per_second
            );
            return report;
        }
        let bandwidth = default_memory_bytes_per_second;

        for (computation, sequence) in program.sequences() {
            let mut queues = DefaultMemoryQueues::default();
            let mut computation_elapsed = 0.0;

            for &op in sequence {
                let operation = program.op(op);
                let (kind, elapsed) = match operation.opcode() {
                    Opcode::While => continue,
                    Opcode::CopyStart => {
                        let direction = transfer_direction(program, op, alternate_memory_space);
                        if !direction.is_supported() {
                            log::debug!("Skipping unsupported copy {} ({})", op, operation.name());
                            continue;
                        }
                        let bytes = operation
                            .operand(0)
                            .map(|source| self.cost_analysis.buffer_size(program, source))
                            .unwrap_or(0.0);
                        log::trace!("{}: issue {:?} copy of {} bytes", op, direction, bytes);
                        queues.issue(op, direction, bytes);
                        continue;
                    }
                    Opcode::CopyDone => {
                        let Some(copy_start) = operation.operand(0) else {
                            continue;
                        };
                        let direction =
                            transfer_direction(program, copy_start, alternate_memory_space);
                        if !direction.is_supported() {
                            continue;
                        }
                        let (bytes, elapsed) = queues.complete(copy_start, direction, bandwidth);
                        (InstructionKind::CopyDone { bytes }, elapsed)
                    }
                    Opcode::Compute | Opcode::Control => {
                        let phases = self.compute_phases(program, op, &placement, &mut queues, bandwidth);
                        (InstructionKind::Compute(phases), phases.total())
                    }
                };

                let mut trip_count = 0.0;
                if elapsed > 0.0 {
                    trip_count =
                        self.cost_analysis
                            .nest_trip_count(program, op, &mut self.trip_count_cache);
                    report.total += elapsed * trip_count;
                    computation_elapsed += elapsed * trip_count;
                }
                log::trace!("{}: {:?} elapsed {:.6e}s x {}", op, kind, elapsed, trip_count);
                report.instructions.push(InstructionTiming {
                    op,
                    kind,
                    elapsed,
                    trip_count,
                });
            }

            report.computations.push(ComputationTiming {
                computation: computation.id(),
                elapsed: computation_elapsed,
            });
        }

        log::debug!(
            "Elapsed with async copies: {:.6e}s at {} B/s",
            report.total,
            bandwidth
        );
        report
    }

    /// Load, idle and store phases of one compute instruction.
    ///
    /// The phases run back to back; overlap between operand loads and
    /// output stores within one instruction is not modeled.
    fn compute_phases(
        &self,
        program: &Program,
        op: OpId,
        placement: &PlacementIndex,
        queues: &mut DefaultMemoryQueues,
        bandwidth: f64,
    ) -> ComputePhases {
        let operands_in_alternate = placement.operands_in_alternate(op);
        let outputs_in_alternate = placement.outputs_in_alternate(op);

        let operand_bytes = self.cost_analysis.bytes_accessed_from_default_memory(
            program,
            op,
            operands_in_alternate,
            &[],
            AccessFilter::OPERANDS,
        );
        let load = queues.load(operand_bytes, bandwidth);

        let idle = self.cost_analysis.default_memory_bandwidth_idle_time(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
        );
        queues.idle(idle, bandwidth);

        let output_bytes = self.cost_analysis.bytes_accessed_from_default_memory(
            program,
            op,
            &[],
            outputs_in_alternate,
            AccessFilter::OUTPUTS,
        );
        let store = queues.store(output_bytes, bandwidth);

        ComputePhases { load, idle, store }
    }
}
