//! Registry of known unit symbols.
//!
//! Each entry records the unit's dimension, the factor that converts a value
//! in the unit to SI base units and, for absolute temperature scales, the
//! offset added after scaling:
//!
//! ```text
//! si_value = value * to_si_factor + to_si_offset
//! ```
//!
//! Offsets only apply when a unit is used on its own (`degC`), never inside a
//! compound unit (`degC s^-1` is a rate and converts like `K s^-1`).

use super::dimension::Dimension;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::LazyLock;

/// Information about a known unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub name: String,
    pub dimension: Dimension,
    pub to_si_factor: f64,
    /// Offset added after scaling; non-zero only for absolute temperature scales.
    pub to_si_offset: f64,
}

impl UnitInfo {
    fn new(name: &str, dimension: Dimension, to_si_factor: f64) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            to_si_factor,
            to_si_offset: 0.0,
        }
    }

    fn with_offset(name: &str, dimension: Dimension, to_si_factor: f64, offset: f64) -> Self {
        Self {
            to_si_offset: offset,
            ..Self::new(name, dimension, to_si_factor)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SiPrefix {
    pub symbol: &'static str,
    pub factor: f64,
}

pub static SI_PREFIXES: &[SiPrefix] = &[
    SiPrefix { symbol: "Y", factor: 1e24 },
    SiPrefix { symbol: "Z", factor: 1e21 },
    SiPrefix { symbol: "E", factor: 1e18 },
    SiPrefix { symbol: "P", factor: 1e15 },
    SiPrefix { symbol: "T", factor: 1e12 },
    SiPrefix { symbol: "G", factor: 1e9 },
    SiPrefix { symbol: "M", factor: 1e6 },
    SiPrefix { symbol: "k", factor: 1e3 },
    SiPrefix { symbol: "h", factor: 1e2 },
    SiPrefix { symbol: "da", factor: 1e1 },
    SiPrefix { symbol: "d", factor: 1e-1 },
    SiPrefix { symbol: "c", factor: 1e-2 },
    SiPrefix { symbol: "m", factor: 1e-3 },
    SiPrefix { symbol: "u", factor: 1e-6 },
    SiPrefix { symbol: "n", factor: 1e-9 },
    SiPrefix { symbol: "p", factor: 1e-12 },
];

pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
pub const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;
pub const SECONDS_PER_HOUR: f64 = 3600.0;
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Offset of the Celsius scale from absolute zero.
pub const CELSIUS_OFFSET: f64 = 273.15;

/// The global unit registry.
pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);

/// Registry of known units with their dimensions and conversion factors.
#[derive(Debug)]
pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
        };
        registry.register_base_units();
        registry.register_time_units();
        registry.register_derived_units();
        registry.register_temperature_units();
        registry.register_angle_units();
        registry.register_ratio_units();
        registry
    }

    /// Looks up a unit by symbol, handling aliases and SI prefixes.
    pub fn lookup(&self, symbol: &str) -> Option<UnitInfo> {
        if let Some(info) = self.get(symbol) {
            return Some(info.clone());
        }
        self.lookup_prefixed(symbol)
    }

    fn get(&self, symbol: &str) -> Option<&UnitInfo> {
        self.units.get(symbol).or_else(|| {
            self.aliases
                .get(symbol)
                .and_then(|canonical| self.units.get(canonical))
        })
    }

    fn lookup_prefixed(&self, symbol: &str) -> Option<UnitInfo> {
        let mut prefixes: Vec<_> = SI_PREFIXES.iter().collect();
        prefixes.sort_by(|a, b| b.symbol.len().cmp(&a.symbol.len()));

        for prefix in prefixes {
            let Some(base_symbol) = symbol.strip_prefix(prefix.symbol) else {
                continue;
            };
            // Offset scales (degC) cannot take a prefix.
            if let Some(base) = self.get(base_symbol).filter(|b| b.to_si_offset == 0.0) {
                return Some(UnitInfo::new(
                    symbol,
                    base.dimension,
                    base.to_si_factor * prefix.factor,
                ));
            }
        }
        None
    }

    fn insert(&mut self, info: UnitInfo, symbol: &'static str) {
        self.units.insert(symbol, info);
    }

    fn alias(&mut self, alias: &'static str, canonical: &'static str) {
        self.aliases.insert(alias, canonical);
    }

    fn register_base_units(&mut self) {
        self.insert(UnitInfo::new("kg", Dimension::MASS, 1.0), "kg");
        self.insert(UnitInfo::new("g", Dimension::MASS, 1e-3), "g");
        self.insert(UnitInfo::new("t", Dimension::MASS, 1e3), "t");
        self.insert(UnitInfo::new("m", Dimension::LENGTH, 1.0), "m");
        self.insert(UnitInfo::new("s", Dimension::TIME, 1.0), "s");
        self.insert(UnitInfo::new("K", Dimension::TEMPERATURE, 1.0), "K");
        self.insert(UnitInfo::new("mol", Dimension::AMOUNT, 1.0), "mol");
        self.insert(UnitInfo::new("A", Dimension::CURRENT, 1.0), "A");
        self.insert(UnitInfo::new("1", Dimension::dimensionless(), 1.0), "1");

        self.alias("dimensionless", "1");
        self.alias("meter", "m");
        self.alias("meters", "m");
        self.alias("metre", "m");
        self.alias("kilogram", "kg");
    }

    fn register_time_units(&mut self) {
        self.insert(UnitInfo::new("yr", Dimension::TIME, SECONDS_PER_YEAR), "yr");
        self.insert(UnitInfo::new("day", Dimension::TIME, SECONDS_PER_DAY), "day");
        self.insert(UnitInfo::new("h", Dimension::TIME, SECONDS_PER_HOUR), "h");
        self.insert(UnitInfo::new("min", Dimension::TIME, SECONDS_PER_MINUTE), "min");

        self.alias("year", "yr");
        self.alias("years", "yr");
        self.alias("days", "day");
        self.alias("hr", "h");
        self.alias("hour", "h");
        self.alias("hours", "h");
        self.alias("minute", "min");
        self.alias("minutes", "min");
        self.alias("sec", "s");
        self.alias("second", "s");
        self.alias("seconds", "s");
    }

    /// Force, pressure, energy and power.
    fn register_derived_units(&mut self) {
        self.insert(UnitInfo::new("N", Dimension::FORCE, 1.0), "N");
        self.insert(UnitInfo::new("Pa", Dimension::PRESSURE, 1.0), "Pa");
        self.insert(UnitInfo::new("bar", Dimension::PRESSURE, 1e5), "bar");
        self.insert(UnitInfo::new("atm", Dimension::PRESSURE, 101_325.0), "atm");
        self.insert(UnitInfo::new("J", Dimension::ENERGY, 1.0), "J");
        self.insert(UnitInfo::new("W", Dimension::POWER, 1.0), "W");

        self.alias("newton", "N");
        self.alias("pascal", "Pa");
        self.alias("joule", "J");
        self.alias("watt", "W");
    }

    /// Absolute temperature scales and temperature differences.
    fn register_temperature_units(&mut self) {
        self.insert(
            UnitInfo::with_offset("degC", Dimension::TEMPERATURE, 1.0, CELSIUS_OFFSET),
            "degC",
        );
        self.insert(
            UnitInfo::with_offset(
                "degF",
                Dimension::TEMPERATURE,
                5.0 / 9.0,
                CELSIUS_OFFSET - 32.0 * 5.0 / 9.0,
            ),
            "degF",
        );
        self.insert(
            UnitInfo::new("delta_degC", Dimension::TEMPERATURE, 1.0),
            "delta_degC",
        );

        self.alias("degK", "K");
        self.alias("kelvin", "K");
        self.alias("celsius", "degC");
        self.alias("deg_C", "degC");
        self.alias("fahrenheit", "degF");
    }

    fn register_angle_units(&mut self) {
        self.insert(UnitInfo::new("radian", Dimension::dimensionless(), 1.0), "radian");
        self.insert(
            UnitInfo::new("degree", Dimension::dimensionless(), PI / 180.0),
            "degree",
        );

        self.alias("rad", "radian");
        self.alias("radians", "radian");
        self.alias("degrees", "degree");
        self.alias("degrees_north", "degree");
        self.alias("degrees_east", "degree");
        self.alias("degree_north", "degree");
        self.alias("degree_east", "degree");
    }

    /// Dimensionless ratios.
    fn register_ratio_units(&mut self) {
        self.insert(UnitInfo::new("percent", Dimension::dimensionless(), 1e-2), "percent");
        self.insert(UnitInfo::new("ppm", Dimension::dimensionless(), 1e-6), "ppm");
        self.insert(UnitInfo::new("ppb", Dimension::dimensionless(), 1e-9), "ppb");
        self.insert(UnitInfo::new("ppt", Dimension::dimensionless(), 1e-12), "ppt");
    }
}
