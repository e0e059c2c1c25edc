//! TOML scenario manifests.
//!
//! A manifest describes everything a simulation needs: the program and its
//! schedule, the memory-tier assignment, and the cost model. Operations,
//! computations and allocations refer to each other by name.
//!
//! # Example Manifest
//!
//! ```toml
//! [simulation]
//! default_memory_bytes_per_second = 100.0
//! alternate_memory_space = 1
//! mode = "both"
//!
//! [cost]
//! model = "table"
//!
//! [[computations]]
//! name = "entry"
//!
//! [[ops]]
//! name = "param"
//! opcode = "control"
//! bytes = 100
//!
//! [[ops]]
//! name = "add"
//! opcode = "compute"
//! operands = ["param"]
//! bytes = 50
//! cost = { elapsed = 1.0, operand_bytes = 100.0, output_bytes = 50.0, idle_time = 0.0 }
//!
//! [[allocations]]
//! op = "param"
//! memory_space = "default"
//! uses = [{ op = "add", operand = 0 }]
//! ```
//!
//! Ops belong to the first computation unless they name another one.
//! Output shapes default to a single root slot of `bytes` bytes in
//! `memory_space` (0 when omitted); tuple-shaped ops list their slots in
//! `outputs` instead.

use serde::Deserialize;
use std::path::Path;

use thiserror::Error;

use crate::allocation::{Allocation, AllocationSequence, MemorySpace, Position, Use};
use crate::config::{Config, SimulationMode};
use crate::cost::{
    AccessFilter, AnalyticalCostConfig, AnalyticalCostModel, CostAnalysis, OpCost,
    TableCostModel, TripCountCache,
};
use crate::program::{
    Opcode, OpId, OutputSlot, Program, ProgramBuilder, ProgramError, ShapeIndex,
    DEFAULT_MEMORY_SPACE,
};

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error("unknown opcode `{opcode}` on operation `{op}`")]
    UnknownOpcode { op: String, opcode: String },

    #[error("manifest defines no computations")]
    NoComputations,

    #[error("operation `{op}` sets both `bytes` and `outputs`")]
    ConflictingShape { op: String },

    #[error("table cost given for `{op}` but the cost model is analytical")]
    UnexpectedCost { op: String },
}

/// Raw manifest as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub cost: CostSection,
    pub computations: Vec<ComputationDef>,
    #[serde(default)]
    pub ops: Vec<OpDef>,
    #[serde(default)]
    pub allocations: Vec<AllocationDef>,
    #[serde(default)]
    pub schedules: Vec<ScheduleDef>,
}

/// Per-scenario overrides of the global [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub default_memory_bytes_per_second: Option<f64>,
    pub alternate_memory_space: Option<i64>,
    pub mode: Option<SimulationMode>,
}

impl SimulationSettings {
    /// Apply these settings on top of `config`.
    pub fn resolve(&self, config: &Config) -> Config {
        let mut resolved = config.clone();
        resolved.merge(Config {
            default_memory_bytes_per_second: self.default_memory_bytes_per_second,
            alternate_memory_space: self.alternate_memory_space,
            mode: self.mode,
        });
        resolved
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostModelKind {
    #[default]
    Analytical,
    Table,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CostSection {
    pub model: CostModelKind,
    /// Rates for the analytical model.
    pub rates: AnalyticalCostConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputationDef {
    pub name: String,
    #[serde(default = "default_trip_count")]
    pub trip_count: f64,
    #[serde(default)]
    pub parent: Option<String>,
}

fn default_trip_count() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpDef {
    pub name: String,
    #[serde(default)]
    pub computation: Option<String>,
    pub opcode: String,
    #[serde(default)]
    pub operands: Vec<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub memory_space: Option<i64>,
    #[serde(default)]
    pub outputs: Option<Vec<OutputDef>>,
    #[serde(default)]
    pub flops: f64,
    /// Fixed cost, table model only.
    #[serde(default)]
    pub cost: Option<OpCost>,
    /// Copy source size override, table model only.
    #[serde(default)]
    pub buffer_size: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputDef {
    #[serde(default)]
    pub index: Vec<i64>,
    pub bytes: u64,
    #[serde(default)]
    pub memory_space: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationDef {
    pub op: String,
    #[serde(default)]
    pub index: Vec<i64>,
    pub memory_space: MemorySpace,
    #[serde(default)]
    pub is_copy: bool,
    #[serde(default)]
    pub uses: Vec<UseDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UseDef {
    pub op: String,
    #[serde(default)]
    pub operand: usize,
    #[serde(default)]
    pub index: Vec<i64>,
}

/// Explicit instruction order for one computation.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDef {
    pub computation: String,
    pub sequence: Vec<String>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve names and build the program, allocations and cost model.
    pub fn into_scenario(self) -> Result<Scenario, ManifestError> {
        if self.computations.is_empty() {
            return Err(ManifestError::NoComputations);
        }

        let mut builder = ProgramBuilder::new();
        for def in &self.computations {
            let parent = def
                .parent
                .as_deref()
                .map(|name| builder.computation_id(name))
                .transpose()?;
            builder.add_computation(&def.name, def.trip_count, parent)?;
        }
        let entry = builder.computation_id(&self.computations[0].name)?;

        let mut table = TableCostModel::new();
        for def in &self.ops {
            let opcode =
                Opcode::from_name(&def.opcode).ok_or_else(|| ManifestError::UnknownOpcode {
                    op: def.name.clone(),
                    opcode: def.opcode.clone(),
                })?;
            let computation = match &def.computation {
                Some(name) => builder.computation_id(name)?,
                None => entry,
            };
            let operands = def
                .operands
                .iter()
                .map(|name| builder.op_id(name))
                .collect::<Result<Vec<_>, _>>()?;

            let id = builder.add_op(computation, &def.name, opcode, &operands, def.output_slots()?)?;
            if def.flops != 0.0 {
                builder.set_flops(id, def.flops)?;
            }

            if self.cost.model == CostModelKind::Analytical
                && (def.cost.is_some() || def.buffer_size.is_some())
            {
                return Err(ManifestError::UnexpectedCost {
                    op: def.name.clone(),
                });
            }
            if let Some(cost) = def.cost {
                table.set_cost(id, cost);
            }
            if let Some(bytes) = def.buffer_size {
                table.set_buffer_size(id, bytes);
            }
        }

        for schedule in &self.schedules {
            let computation = builder.computation_id(&schedule.computation)?;
            let sequence = schedule
                .sequence
                .iter()
                .map(|name| builder.op_id(name))
                .collect::<Result<Vec<_>, _>>()?;
            builder.set_schedule(computation, sequence)?;
        }

        let mut allocations = AllocationSequence::new();
        for def in &self.allocations {
            let position = Position::new(builder.op_id(&def.op)?, &def.index);
            let mut allocation = if def.is_copy {
                Allocation::copy(position, def.memory_space)
            } else {
                Allocation::pinned(position, def.memory_space)
            };
            for use_def in &def.uses {
                allocation.add_use(Use::new(
                    builder.op_id(&use_def.op)?,
                    use_def.operand,
                    &use_def.index,
                ));
            }
            allocations.push(allocation);
        }

        let program = builder.build()?;
        let cost_model = match self.cost.model {
            CostModelKind::Analytical => {
                CostModel::Analytical(AnalyticalCostModel::new(self.cost.rates))
            }
            CostModelKind::Table => CostModel::Table(table),
        };

        log::debug!(
            "Loaded scenario: {} ops, {} allocations, {:?} cost model",
            program.len(),
            allocations.len(),
            self.cost.model
        );

        Ok(Scenario {
            program,
            allocations,
            cost_model,
            settings: self.simulation,
        })
    }
}

impl OpDef {
    fn output_slots(&self) -> Result<Vec<OutputSlot>, ManifestError> {
        match (&self.outputs, self.bytes) {
            (Some(_), Some(_)) => Err(ManifestError::ConflictingShape {
                op: self.name.clone(),
            }),
            (Some(outputs), None) => Ok(outputs
                .iter()
                .map(|o| OutputSlot::at(&o.index, o.bytes, o.memory_space))
                .collect()),
            (None, bytes) => Ok(vec![OutputSlot::root(
                bytes.unwrap_or(0),
                self.memory_space.unwrap_or(DEFAULT_MEMORY_SPACE),
            )]),
        }
    }
}

/// Cost model selected by a manifest.
#[derive(Debug, Clone)]
pub enum CostModel {
    Analytical(AnalyticalCostModel),
    Table(TableCostModel),
}

impl CostModel {
    fn inner(&self) -> &dyn CostAnalysis {
        match self {
            CostModel::Analytical(model) => model as &dyn CostAnalysis,
            CostModel::Table(model) => model as &dyn CostAnalysis,
        }
    }
}

impl CostAnalysis for CostModel {
    fn elapsed_in_alternate_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
    ) -> f64 {
        self.inner()
            .elapsed_in_alternate_memory(program, op, operands_in_alternate, outputs_in_alternate)
    }

    fn bytes_accessed_from_default_memory(
        &self,
        program: &Program,
        op: OpId,
        operands_in_alternate: &[(usize, ShapeIndex)],
        outputs_in_alternate: &[ShapeIndex],
        filter: AccessFilter,
    ) -> f64 {
        self.inner().bytes_accessed_from_default_memory(
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
        self.inner().default_memory_bandwidth_idle_time(
            program,
            op,
            operands_in_alternate,
            outputs_in_alternate,
        )
    }

    fn buffer_size(&self, program: &Program, op: OpId) -> f64 {
        self.inner().buffer_size(program, op)
    }

    fn nest_trip_count(&self, program: &Program, op: OpId, cache: &mut TripCountCache) -> f64 {
        self.inner().nest_trip_count(program, op, cache)
    }
}

/// A fully resolved simulation input.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub program: Program,
    pub allocations: AllocationSequence,
    pub cost_model: CostModel,
    pub settings: SimulationSettings,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        Manifest::from_file(path)?.into_scenario()
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Manifest::parse(content)?.into_scenario()
    }
}
