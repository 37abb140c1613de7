//! Physical units for field metadata.
//!
//! Every [`crate::array::DataArray`] carries a unit string. This module parses
//! those strings, checks that two units describe the same physical dimension
//! and produces the conversion between them.
//!
//! ```
//! use resm_core::units::{is_compatible, Unit};
//!
//! assert!(is_compatible("degK s^-1", "K/day"));
//!
//! let celsius = Unit::parse("degC").unwrap();
//! let kelvin = Unit::parse("K").unwrap();
//! let t = celsius.convert_value(0.0, &kelvin).unwrap();
//! assert!((t - 273.15).abs() < 1e-12);
//! ```
//!
//! Registered symbols cover SI base units and prefixes, time (`yr`, `day`,
//! `h`, `min`), pressure (`Pa`, `bar`, `atm`), energy and power, absolute
//! temperature scales (`K`/`degK`, `degC`, `degF`), angles
//! (`degrees_north`, `degrees_east`) and ratios (`percent`, `ppm`).

pub mod conversion;
pub mod dimension;
pub mod parser;
pub mod registry;

pub use conversion::{convert, is_compatible, Conversion, ConversionError, Unit};
pub use dimension::Dimension;
pub use parser::{ParseError, ParsedUnit};
pub use registry::{UnitInfo, UnitRegistry, UNIT_REGISTRY};

use crate::errors::{RESMError, RESMResult};

/// Parses `unit`, reporting failures as [`RESMError::InvalidUnit`].
pub fn parse_unit(unit: &str) -> RESMResult<Unit> {
    Unit::parse(unit).map_err(|e| RESMError::InvalidUnit {
        unit: unit.to_string(),
        reason: e.to_string(),
    })
}

/// The conversion for field `name` from `from` to `to`.
pub(crate) fn conversion_for(name: &str, from: &str, to: &str) -> RESMResult<Conversion> {
    let incompatible = || RESMError::IncompatibleUnits {
        name: name.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    };
    let from_unit = Unit::parse(from).map_err(|_| incompatible())?;
    let to_unit = Unit::parse(to).map_err(|_| incompatible())?;
    from_unit.conversion_to(&to_unit).map_err(|_| incompatible())
}

/// `unit` per second, as written for tendencies.
pub fn per_second(unit: &str) -> String {
    let unit = unit.trim();
    if unit.is_empty() || unit == "1" {
        "s^-1".to_string()
    } else if unit.contains('/') || unit.contains("per") {
        format!("({unit}) s^-1")
    } else {
        format!("{unit} s^-1")
    }
}

/// `unit` times seconds, normalised (`degK s^-1` becomes `degK`).
pub fn times_seconds(unit: &str) -> RESMResult<String> {
    let seconds = parse_unit("s")?;
    Ok(parse_unit(unit)?.multiply(&seconds).to_string())
}
