//! Per-operation view of which values live in alternate memory.

use std::collections::HashMap;

use crate::allocation::{AllocationSequence, MemorySpace};
use crate::program::{OpId, ShapeIndex};

/// Lookup tables derived from an [`AllocationSequence`].
///
/// - `outputs_in_alternate[op]`: output slots of `op` defined directly in
///   alternate memory (copy allocations excluded; their defining op is the
///   copy itself)
/// - `operands_in_alternate[op]`: `(operand_number, operand_index)` pairs
///   recorded as uses on any allocation
#[derive(Debug, Clone, Default)]
pub struct PlacementIndex {
    outputs_in_alternate: HashMap<OpId, Vec<ShapeIndex>>,
    operands_in_alternate: HashMap<OpId, Vec<(usize, ShapeIndex)>>,
}

impl PlacementIndex {
    pub fn build(allocations: &AllocationSequence) -> Self {
        let mut index = Self::default();
        index.rebuild(allocations);
        index
    }

    /// Clear and refill from `allocations`.
    pub fn rebuild(&mut self, allocations: &AllocationSequence) {
        self.outputs_in_alternate.clear();
        self.operands_in_alternate.clear();

        for allocation in allocations {
            if !allocation.is_copy_allocation() && allocation.memory_space() == MemorySpace::Alternate {
                let position = allocation.defining_position();
                self.outputs_in_alternate
                    .entry(position.op)
                    .or_default()
                    .push(position.index.clone());
            }
            for value_use in allocation.uses() {
                self.operands_in_alternate
                    .entry(value_use.op)
                    .or_default()
                    .push((value_use.operand_number, value_use.operand_index.clone()));
            }
        }

        log::trace!(
            "Placement index: {} ops with alternate outputs, {} ops with alternate operands",
            self.outputs_in_alternate.len(),
            self.operands_in_alternate.len()
        );
    }

    /// Output slots of `op` in alternate memory (empty if none).
    pub fn outputs_in_alternate(&self, op: OpId) -> &[ShapeIndex] {
        self.outputs_in_alternate
            .get(&op)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Operand slots of `op` read from alternate memory (empty if none).
    pub fn operands_in_alternate(&self, op: OpId) -> &[(usize, ShapeIndex)] {
        self.operands_in_alternate
            .get(&op)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.outputs_in_alternate.is_empty() && self.operands_in_alternate.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{Allocation, Position, Use};

    #[test]
    fn test_empty_sequence_gives_empty_index() {
        let index = PlacementIndex::build(&AllocationSequence::new());
        assert!(index.is_empty());
        assert!(index.outputs_in_alternate(OpId(0)).is_empty());
        assert!(index.operands_in_alternate(OpId(0)).is_empty());
    }

    #[test]
    fn test_outputs_only_from_non_copy_alternate() {
        let allocations: AllocationSequence = vec![
            Allocation::pinned(Position::root(OpId(0)), MemorySpace::Alternate),
            Allocation::pinned(Position::new(OpId(0), &[1]), MemorySpace::Alternate),
            Allocation::pinned(Position::root(OpId(1)), MemorySpace::Default),
            Allocation::copy(Position::root(OpId(2)), MemorySpace::Alternate),
        ]
        .into_iter()
        .collect();

        let index = PlacementIndex::build(&allocations);
        let outputs: Vec<&[i64]> = index
            .outputs_in_alternate(OpId(0))
            .iter()
            .map(|i| i.as_slice())
            .collect();
        let expected: Vec<&[i64]> = vec![&[], &[1]];
        assert_eq!(outputs, expected);
        assert!(index.outputs_in_alternate(OpId(1)).is_empty());
        assert!(index.outputs_in_alternate(OpId(2)).is_empty());
    }

    #[test]
    fn test_uses_recorded_from_every_allocation() {
        let allocations: AllocationSequence = vec![
            Allocation::pinned(Position::root(OpId(0)), MemorySpace::Default)
                .with_use(Use::new(OpId(3), 0, &[])),
            Allocation::copy(Position::root(OpId(2)), MemorySpace::Alternate)
                .with_use(Use::new(OpId(3), 1, &[0])),
        ]
        .into_iter()
        .collect();

        let index = PlacementIndex::build(&allocations);
        let operands = index.operands_in_alternate(OpId(3));
        assert_eq!(operands.len(), 2);
        assert_eq!(operands[0].0, 0);
        assert_eq!(operands[1].0, 1);
        assert_eq!(operands[1].1.as_slice(), &[0]);
    }

    #[test]
    fn test_rebuild_discards_stale_entries() {
        let first: AllocationSequence =
            std::iter::once(Allocation::pinned(Position::root(OpId(5)), MemorySpace::Alternate))
                .collect();
        let mut index = PlacementIndex::build(&first);
        assert_eq!(index.outputs_in_alternate(OpId(5)).len(), 1);

        index.rebuild(&AllocationSequence::new());
        assert!(index.is_empty());
    }
}
