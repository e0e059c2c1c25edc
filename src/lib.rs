//! msa-sim library
//!
//! Runtime cost simulation for memory-space assignment: predicts how long a
//! scheduled program takes to run when its values are split between a
//! small fast (alternate) memory and a large slow (default) memory, with
//! asynchronous copies competing for default-memory bandwidth.
//!
//! - [`program`]: scheduled program representation
//! - [`allocation`]: memory-tier assignment of every value
//! - [`cost`]: per-operation cost models
//! - [`sim`]: placement lookup, copy classification, bandwidth sharing and
//!   the [`sim::RuntimeSimulator`]
//! - [`manifest`]: TOML scenario files
//! - [`config`]: layered configuration

pub mod allocation;
pub mod config;
pub mod cost;
pub mod manifest;
pub mod program;
pub mod sim;
