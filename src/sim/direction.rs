//! Classification of asynchronous copies by memory-tier direction.

use crate::program::{OpId, Opcode, Program, DEFAULT_MEMORY_SPACE};

/// Direction of an asynchronous copy relative to default memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Not timed: same tier on both ends, unrelated tiers, or no copy-done.
    Unsupported,
    /// Prefetch: reads default memory.
    DefaultToAlternate,
    /// Eviction: writes default memory.
    AlternateToDefault,
}

impl TransferDirection {
    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }
}

/// Classify the copy issued by `copy_start`.
///
/// The source tier is the memory space of the copy-start's operand, the
/// destination tier that of its paired copy-done (first user with that
/// opcode).
pub fn transfer_direction(
    program: &Program,
    copy_start: OpId,
    alternate_memory_space: i64,
) -> TransferDirection {
    let op = program.op(copy_start);
    debug_assert_eq!(op.opcode(), Opcode::CopyStart, "{} is not a copy-start", copy_start);

    let Some(source) = op.operand(0) else {
        return TransferDirection::Unsupported;
    };
    let operand_memory_space = program.op(source).memory_space();

    let output_memory_space = op
        .users()
        .iter()
        .map(|&user| program.op(user))
        .find(|user| user.opcode() == Opcode::CopyDone)
        .map(|copy_done| copy_done.memory_space());
    let Some(output_memory_space) = output_memory_space else {
        return TransferDirection::Unsupported;
    };

    if operand_memory_space == DEFAULT_MEMORY_SPACE && output_memory_space == alternate_memory_space
    {
        TransferDirection::DefaultToAlternate
    } else if operand_memory_space == alternate_memory_space
        && output_memory_space == DEFAULT_MEMORY_SPACE
    {
        TransferDirection::AlternateToDefault
    } else {
        TransferDirection::Unsupported
    }
}
