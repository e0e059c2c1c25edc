//! Runtime simulation of a memory-tier assignment.
//!
//! Predicts how long a scheduled program runs once its values are placed
//! in alternate or default memory and asynchronous copies move values
//! between the two.
//!
//! - [`placement`]: which operands/outputs of each operation are alternate-resident
//! - [`direction`]: classification of copies (prefetch, eviction, unsupported)
//! - [`bandwidth`]: the bandwidth-sharing transfer and time-window drain primitives
//! - [`simulator`]: the [`RuntimeSimulator`] orchestrating the above
//!
//! # Timing Model
//!
//! Each computation is simulated independently. Copies issued by a
//! copy-start wait in a per-direction queue and make progress whenever
//! default memory has spare capacity. A compute instruction runs three
//! back-to-back phases:
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────────┐  ┌──────────────────┐
//! │ Load operands    │─►│ Idle window          │─►│ Store outputs    │
//! │ shares with      │  │ drains both queues   │  │ shares with      │
//! │ pending writes   │  │ (no extra time)      │  │ pending reads    │
//! └──────────────────┘  └──────────────────────┘  └──────────────────┘
//! ```
//!
//! A copy-done charges the time to move whatever is left of its copy (and
//! of every copy issued before it in the same direction), sharing the
//! channel with the opposite queue.
//!
//! # Usage
//!
//! ```ignore
//! use msa_sim::cost::{AnalyticalCostConfig, AnalyticalCostModel};
//! use msa_sim::sim::RuntimeSimulator;
//!
//! let model = AnalyticalCostModel::new(AnalyticalCostConfig::default());
//! let mut simulator = RuntimeSimulator::new(&model);
//! let baseline = simulator.elapsed_without_copies(&program, &allocations);
//! let with_copies = simulator.elapsed_with_copies(&program, &allocations, 1, 100.0e9);
//! ```

pub mod bandwidth;
pub mod direction;
pub mod placement;
pub mod simulator;

pub use bandwidth::{
    process_async_copies_in_time_window, simulate_async_copy_transfer, RemainingBytes,
    TransferQueue,
};
pub use direction::{transfer_direction, TransferDirection};
pub use placement::PlacementIndex;
pub use simulator::{
    ComputationTiming, ComputePhases, InstructionKind, InstructionTiming, RuntimeSimulator,
    SimulationReport,
};
