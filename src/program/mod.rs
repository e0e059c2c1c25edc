//! Scheduled program representation.
//!
//! The simulator never builds or mutates programs; it only walks an
//! already-scheduled instruction sequence per computation. This module
//! provides the minimal representation it needs:
//!
//! - [`Operation`]: opcode, operands, output slots, users
//! - [`Computation`]: a named sub-program with a loop trip count
//! - [`Program`]: the operation arena plus one schedule per computation
//!
//! # Identity
//!
//! Operations live in a single arena owned by [`Program`] and are addressed
//! by [`OpId`], a plain index. Every simulator table (placement index,
//! in-flight transfers) is keyed by `OpId`, so identity is stable for the
//! lifetime of the program and independent of where operations live in
//! memory.
//!
//! ```text
//! Program
//! ├── ops:          [ %0 param | %1 copy-start | %2 copy-done | %3 add ... ]
//! ├── computations: [ entry (trip 1) | body (trip 8, parent entry) ]
//! └── schedule:     entry -> [%0, %1, %4, %2, %3]
//!                   body  -> [%5, %6]
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use msa_sim::program::{Opcode, ProgramBuilder, DEFAULT_MEMORY_SPACE};
//!
//! let mut builder = ProgramBuilder::new();
//! let entry = builder.add_computation("entry", 1.0, None)?;
//! let p0 = builder.add_array_op(entry, "p0", Opcode::Control, &[], 1024, DEFAULT_MEMORY_SPACE)?;
//! let add = builder.add_array_op(entry, "add", Opcode::Compute, &[p0], 1024, DEFAULT_MEMORY_SPACE)?;
//! let program = builder.build()?;
//! ```

pub mod builder;

pub use builder::{ProgramBuilder, ProgramError};

use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Memory space id of the default (slow, unbounded) memory.
pub const DEFAULT_MEMORY_SPACE: i64 = 0;

/// Conventional memory space id of the alternate (fast) memory.
pub const ALTERNATE_MEMORY_SPACE: i64 = 1;

/// Hierarchical address of one output slot of an operation.
///
/// The empty index addresses the root value. Tuple-shaped outputs use
/// one element per nesting level.
pub type ShapeIndex = SmallVec<[i64; 2]>;

/// Stable identity of an operation inside its [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl OpId {
    /// Arena index of this operation.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identity of one built [`Program`].
///
/// Every [`ProgramBuilder::build`] draws a fresh id; clones share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u64);

impl ProgramId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable identity of a computation inside its [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(pub u32);

impl ComputationId {
    /// Index of this computation.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operation kind, as far as the simulator cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Arithmetic or data-movement kernel timed by the cost model.
    Compute,
    /// Issue of an asynchronous copy between memory tiers.
    CopyStart,
    /// Completion of an asynchronous copy.
    CopyDone,
    /// Loop; its body is scheduled in a separate computation.
    While,
    /// Parameters, tuples and other bookkeeping operations.
    Control,
}

impl Opcode {
    /// Parse an opcode from its manifest spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "compute" => Some(Self::Compute),
            "copy-start" => Some(Self::CopyStart),
            "copy-done" => Some(Self::CopyDone),
            "while" => Some(Self::While),
            "control" => Some(Self::Control),
            _ => None,
        }
    }

    /// Manifest spelling of this opcode.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::CopyStart => "copy-start",
            Self::CopyDone => "copy-done",
            Self::While => "while",
            Self::Control => "control",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One leaf of an operation's output shape.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    /// Address of the slot within the output shape.
    pub index: ShapeIndex,
    /// Size of the value held in this slot.
    pub bytes: u64,
    /// Memory space id the slot's layout lives in.
    pub memory_space: i64,
}

impl OutputSlot {
    /// Root slot of an array-shaped output.
    pub fn root(bytes: u64, memory_space: i64) -> Self {
        Self {
            index: ShapeIndex::new(),
            bytes,
            memory_space,
        }
    }

    /// Slot at the given tuple index.
    pub fn at(index: &[i64], bytes: u64, memory_space: i64) -> Self {
        Self {
            index: ShapeIndex::from_slice(index),
            bytes,
            memory_space,
        }
    }
}

/// A scheduled operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub(crate) id: OpId,
    pub(crate) name: String,
    pub(crate) opcode: Opcode,
    pub(crate) operands: Vec<OpId>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) users: Vec<OpId>,
    pub(crate) computation: ComputationId,
    pub(crate) flops: f64,
}

impl Operation {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operands(&self) -> &[OpId] {
        &self.operands
    }

    /// Operand at `operand_number`, if present.
    pub fn operand(&self, operand_number: usize) -> Option<OpId> {
        self.operands.get(operand_number).copied()
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    /// Operations consuming this operation's result, in program order.
    pub fn users(&self) -> &[OpId] {
        &self.users
    }

    /// Computation this operation belongs to.
    pub fn computation(&self) -> ComputationId {
        self.computation
    }

    /// Floating-point operations per invocation (used by analytical costs).
    pub fn flops(&self) -> f64 {
        self.flops
    }

    /// Memory space of the operation's value.
    ///
    /// Uses the root slot when present, otherwise the first slot.
    /// Operations without outputs report the default memory space.
    pub fn memory_space(&self) -> i64 {
        self.outputs
            .iter()
            .find(|slot| slot.index.is_empty())
            .or_else(|| self.outputs.first())
            .map(|slot| slot.memory_space)
            .unwrap_or(DEFAULT_MEMORY_SPACE)
    }

    /// Total size of all output slots.
    pub fn output_bytes(&self) -> u64 {
        self.outputs.iter().map(|slot| slot.bytes).sum()
    }

    /// Output slot at `index`, if the shape has one.
    pub fn output_slot(&self, index: &[i64]) -> Option<&OutputSlot> {
        self.outputs.iter().find(|slot| slot.index.as_slice() == index)
    }
}

/// A named sub-program with its own schedule.
#[derive(Debug, Clone)]
pub struct Computation {
    pub(crate) id: ComputationId,
    pub(crate) name: String,
    pub(crate) trip_count: f64,
    pub(crate) parent: Option<ComputationId>,
}

impl Computation {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executions per invocation of the parent computation.
    pub fn trip_count(&self) -> f64 {
        self.trip_count
    }

    /// Enclosing computation for loop bodies.
    pub fn parent(&self) -> Option<ComputationId> {
        self.parent
    }
}

/// Scheduled program: operation arena, computations, per-computation order.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) id: ProgramId,
    pub(crate) ops: Vec<Operation>,
    pub(crate) computations: Vec<Computation>,
    pub(crate) schedule: Vec<Vec<OpId>>,
}

impl Program {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Look up an operation.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this program.
    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    /// All operations in creation order.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Find an operation by name.
    pub fn find_op(&self, name: &str) -> Option<OpId> {
        self.ops.iter().find(|op| op.name == name).map(|op| op.id)
    }

    /// Look up a computation.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this program.
    pub fn computation(&self, id: ComputationId) -> &Computation {
        &self.computations[id.index()]
    }

    /// All computations in creation order.
    pub fn computations(&self) -> &[Computation] {
        &self.computations
    }

    /// Find a computation by name.
    pub fn find_computation(&self, name: &str) -> Option<ComputationId> {
        self.computations
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Scheduled instruction sequence of one computation.
    pub fn sequence(&self, computation: ComputationId) -> &[OpId] {
        &self.schedule[computation.index()]
    }

    /// Every computation paired with its instruction sequence.
    pub fn sequences(&self) -> impl Iterator<Item = (&Computation, &[OpId])> {
        self.computations
            .iter()
            .map(move |c| (c, self.schedule[c.id.index()].as_slice()))
    }

    /// All computations' sequences concatenated in computation order.
    pub fn flattened_sequence(&self) -> impl Iterator<Item = OpId> + '_ {
        self.schedule.iter().flat_map(|seq| seq.iter().copied())
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
