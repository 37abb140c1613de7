//! Model-wide configuration shared by property resolution and steppers.
//!
//! A [`Context`] holds the registries that would otherwise be global:
//! which dimension names count as each spatial direction, which tracers are
//! registered and the values of physical constants. A context is built once,
//! usually from a TOML file, and handed to steppers behind an `Arc`.
//!
//! ```
//! use resm_core::context::Context;
//! use resm_core::schema::Direction;
//!
//! let ctx = Context::from_toml_str(r#"
//!     [directions]
//!     x = ["lon"]
//!     z = ["mid_levels", "interface_levels"]
//!
//!     [[tracers]]
//!     name = "specific_humidity"
//!     units = "kg/kg"
//!
//!     [constants.gravitational_acceleration]
//!     value = 3.71
//!     units = "m s^-2"
//! "#).unwrap();
//!
//! assert!(ctx.direction_names(Direction::Z).contains(&"mid_levels".to_string()));
//! assert_eq!(ctx.tracers().len(), 1);
//! ```

use crate::constants::{Constant, ConstantRegistry};
use crate::errors::{RESMError, RESMResult};
use crate::schema::Direction;
use crate::tracers::TracerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Names recognised for each spatial direction.
///
/// A direction always recognises its own letter.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionNames {
    names: HashMap<Direction, Vec<String>>,
}

impl Default for DirectionNames {
    fn default() -> Self {
        Self {
            names: Direction::ALL
                .iter()
                .map(|d| (*d, vec![d.letter().to_string()]))
                .collect(),
        }
    }
}

impl DirectionNames {
    pub fn get(&self, direction: Direction) -> &[String] {
        self.names.get(&direction).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the names of `direction`.
    pub fn set<S: AsRef<str>>(&mut self, direction: Direction, names: &[S]) {
        self.names
            .insert(direction, vec![direction.letter().to_string()]);
        self.add(direction, names);
    }

    /// Adds names to `direction`, skipping ones already present.
    pub fn add<S: AsRef<str>>(&mut self, direction: Direction, names: &[S]) {
        let entry = self.names.entry(direction).or_default();
        for name in names {
            let name = name.as_ref();
            if !entry.iter().any(|n| n == name) {
                entry.push(name.to_string());
            }
        }
    }
}

/// Explicit model-wide registries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    directions: DirectionNames,
    tracers: TracerRegistry,
    constants: ConstantRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction_names(&self, direction: Direction) -> &[String] {
        self.directions.get(direction)
    }

    pub fn set_direction_names<S: AsRef<str>>(&mut self, direction: Direction, names: &[S]) {
        self.directions.set(direction, names);
    }

    pub fn add_direction_names<S: AsRef<str>>(&mut self, direction: Direction, names: &[S]) {
        self.directions.add(direction, names);
    }

    pub fn tracers(&self) -> &TracerRegistry {
        &self.tracers
    }

    pub fn register_tracer(&mut self, name: &str, units: &str) -> RESMResult<()> {
        self.tracers.register(name, units)
    }

    pub fn clear_tracers(&mut self) {
        self.tracers.clear();
    }

    pub fn constants(&self) -> &ConstantRegistry {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantRegistry {
        &mut self.constants
    }

    /// The constant `name` expressed in `units`.
    pub fn constant(&self, name: &str, units: &str) -> RESMResult<f64> {
        self.constants.get(name, units)
    }

    /// A copy that later changes to this context do not affect.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Restores default directions and constants and drops all tracers.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn from_config(config: ContextConfig) -> RESMResult<Self> {
        let mut ctx = Self::default();
        for direction in Direction::ALL {
            ctx.add_direction_names(direction, config.directions.get(direction));
        }
        for tracer in &config.tracers {
            ctx.register_tracer(&tracer.name, &tracer.units)?;
        }
        for (name, constant) in &config.constants {
            ctx.constants.set(name, constant.value, &constant.units)?;
        }
        Ok(ctx)
    }

    pub fn from_toml_str(toml_str: &str) -> RESMResult<Self> {
        Self::from_config(toml::from_str(toml_str)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> RESMResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| RESMError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Loading context from {}", path.display());
        Self::from_toml_str(&contents)
    }
}

/// Extra dimension names per direction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectionConfig {
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub z: Vec<String>,
}

impl DirectionConfig {
    pub fn get(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::X => &self.x,
            Direction::Y => &self.y,
            Direction::Z => &self.z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerConfig {
    pub name: String,
    pub units: String,
}

/// On-disk form of a [`Context`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    pub directions: DirectionConfig,
    pub tracers: Vec<TracerConfig>,
    /// Constants to add or override.
    pub constants: HashMap<String, Constant>,
}
