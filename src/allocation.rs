//! Memory-tier assignment produced by an external placement optimizer.
//!
//! An [`AllocationSequence`] lists, for every value of a program, which
//! memory tier holds it, where it is defined, and which operands read it.
//! Copy allocations describe values materialized by an asynchronous copy
//! (copy-start/copy-done pair) rather than by their producer.
//!
//! The simulator only reads this data; see [`crate::sim::PlacementIndex`]
//! for the lookup tables built from it.

use serde::{Deserialize, Serialize};

use crate::program::{OpId, ShapeIndex};

/// Memory tier of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySpace {
    /// Slow memory with effectively unlimited capacity.
    Default,
    /// Fast memory with limited capacity.
    Alternate,
}

/// Defining point of a value: an operation plus one of its output slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub op: OpId,
    pub index: ShapeIndex,
}

impl Position {
    pub fn new(op: OpId, index: &[i64]) -> Self {
        Self {
            op,
            index: ShapeIndex::from_slice(index),
        }
    }

    /// Root output slot of `op`.
    pub fn root(op: OpId) -> Self {
        Self {
            op,
            index: ShapeIndex::new(),
        }
    }
}

/// One read of a value by an operand slot of a consuming operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Use {
    /// Consuming operation.
    pub op: OpId,
    /// Operand position within the consumer.
    pub operand_number: usize,
    /// Slot within the operand's shape.
    pub operand_index: ShapeIndex,
}

impl Use {
    pub fn new(op: OpId, operand_number: usize, operand_index: &[i64]) -> Self {
        Self {
            op,
            operand_number,
            operand_index: ShapeIndex::from_slice(operand_index),
        }
    }
}

/// Memory-tier assignment of one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    defining_position: Position,
    memory_space: MemorySpace,
    is_copy: bool,
    uses: Vec<Use>,
}

impl Allocation {
    /// Value kept where its producer writes it.
    pub fn pinned(defining_position: Position, memory_space: MemorySpace) -> Self {
        Self {
            defining_position,
            memory_space,
            is_copy: false,
            uses: Vec::new(),
        }
    }

    /// Value produced by an asynchronous copy into `memory_space`.
    pub fn copy(defining_position: Position, memory_space: MemorySpace) -> Self {
        Self {
            defining_position,
            memory_space,
            is_copy: true,
            uses: Vec::new(),
        }
    }

    /// Builder-style variant of [`Allocation::add_use`].
    pub fn with_use(mut self, value_use: Use) -> Self {
        self.add_use(value_use);
        self
    }

    pub fn add_use(&mut self, value_use: Use) {
        self.uses.push(value_use);
    }

    pub fn defining_position(&self) -> &Position {
        &self.defining_position
    }

    pub fn memory_space(&self) -> MemorySpace {
        self.memory_space
    }

    pub fn is_copy_allocation(&self) -> bool {
        self.is_copy
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

/// Complete set of allocations for one program, in optimizer order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationSequence(Vec<Allocation>);

impl AllocationSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, allocation: Allocation) {
        self.0.push(allocation);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Allocation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any allocation is materialized by an asynchronous copy.
    pub fn has_copies(&self) -> bool {
        self.0.iter().any(Allocation::is_copy_allocation)
    }
}

impl FromIterator<Allocation> for AllocationSequence {
    fn from_iter<I: IntoIterator<Item = Allocation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AllocationSequence {
    type Item = &'a Allocation;
    type IntoIter = std::slice::Iter<'a, Allocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_constructors() {
        let pinned = Allocation::pinned(Position::root(OpId(0)), MemorySpace::Alternate)
            .with_use(Use::new(OpId(1), 0, &[]));
        assert!(!pinned.is_copy_allocation());
        assert_eq!(pinned.memory_space(), MemorySpace::Alternate);
        assert_eq!(pinned.uses().len(), 1);
        assert_eq!(pinned.defining_position().op, OpId(0));

        let copy = Allocation::copy(Position::new(OpId(2), &[1]), MemorySpace::Alternate);
        assert!(copy.is_copy_allocation());
        assert_eq!(copy.defining_position().index.as_slice(), &[1]);
    }

    #[test]
    fn test_sequence_has_copies() {
        let mut sequence: AllocationSequence =
            std::iter::once(Allocation::pinned(Position::root(OpId(0)), MemorySpace::Default))
                .collect();
        assert!(!sequence.has_copies());

        sequence.push(Allocation::copy(Position::root(OpId(2)), MemorySpace::Alternate));
        assert!(sequence.has_copies());
        assert_eq!(sequence.len(), 2);
        assert_eq!((&sequence).into_iter().count(), 2);
    }

    #[test]
    fn test_memory_space_serde_names() {
        #[derive(Deserialize)]
        struct Holder {
            space: MemorySpace,
        }
        let holder: Holder = toml::from_str("space = \"alternate\"").unwrap();
        assert_eq!(holder.space, MemorySpace::Alternate);
    }
}
