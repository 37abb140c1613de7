//! Named physical constants.
//!
//! Components read constants through the [`Context`](crate::context::Context)
//! so that a model can change them (for example to run on another planet)
//! without touching component code.

use crate::array::{DataArray, FloatValue};
use crate::errors::{RESMError, RESMResult};
use crate::units::{self, parse_unit};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::debug;

/// A constant value with its units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: FloatValue,
    pub units: String,
}

impl Constant {
    pub fn new(value: FloatValue, units: &str) -> Self {
        Self {
            value,
            units: units.to_string(),
        }
    }
}

const DEFAULT_CONSTANTS: &[(&str, FloatValue, &str)] = &[
    ("stefan_boltzmann", 5.6734e-8, "W m^-2 K^-4"),
    ("gravitational_acceleration", 9.80665, "m s^-2"),
    ("heat_capacity_of_dry_air_at_constant_pressure", 1004.64, "J kg^-1 K^-1"),
    ("reference_pressure", 1e5, "Pa"),
    ("gas_constant_of_dry_air", 287.0, "J kg^-1 K^-1"),
    ("gas_constant_of_water_vapor", 461.5, "J kg^-1 K^-1"),
    ("planetary_rotation_rate", 7.292e-5, "s^-1"),
    ("planetary_radius", 6.371e6, "m"),
    ("latent_heat_of_vaporization_of_water", 2.5e6, "J kg^-1"),
    ("density_of_liquid_water", 1e3, "kg m^-3"),
    ("solar_constant", 1367.0, "W m^-2"),
];

/// Registry of named constants, initialised with Earth defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantRegistry {
    constants: IndexMap<String, Constant>,
}

impl Default for ConstantRegistry {
    fn default() -> Self {
        Self {
            constants: DEFAULT_CONSTANTS
                .iter()
                .map(|(name, value, units)| (name.to_string(), Constant::new(*value, units)))
                .collect(),
        }
    }
}

impl ConstantRegistry {
    /// The value of `name` expressed in `units`.
    pub fn get(&self, name: &str, units: &str) -> RESMResult<FloatValue> {
        let constant = self.get_constant(name)?;
        let conversion = units::conversion_for(name, &constant.units, units)?;
        Ok(conversion.apply(constant.value))
    }

    pub fn get_constant(&self, name: &str) -> RESMResult<&Constant> {
        self.constants.get(name).ok_or_else(|| RESMError::MissingInput {
            name: name.to_string(),
            component: None,
        })
    }

    /// The constant as a zero-dimensional array in its stored units.
    pub fn get_array(&self, name: &str) -> RESMResult<DataArray> {
        let constant = self.get_constant(name)?;
        DataArray::scalar(constant.value, &constant.units)
    }

    /// Sets or adds a constant.
    pub fn set(&mut self, name: &str, value: FloatValue, units: &str) -> RESMResult<()> {
        parse_unit(units)?;
        debug!("Setting constant {name} = {value} {units}");
        self.constants
            .insert(name.to_string(), Constant::new(value, units));
        Ok(())
    }

    /// Restores the default constants, dropping any added ones.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constant)> {
        self.constants.iter()
    }

    /// A table of all constants, one per line.
    pub fn describe(&self) -> String {
        let width = self.constants.keys().map(String::len).max().unwrap_or(0);
        let mut out = String::new();
        for (name, constant) in &self.constants {
            let _ = writeln!(
                out,
                "{name:<width$}: {} {}",
                constant.value, constant.units
            );
        }
        out
    }
}
