//! Physical dimensions used for unit compatibility checks.
//!
//! A dimension is a vector of integer exponents over the SI base
//! quantities (mass, length, time, temperature, amount, current and
//! luminous intensity). Two units can be converted into each other exactly
//! when their dimensions are equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Integer exponents of the SI base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    pub temperature: i8,
    pub amount: i8,
    pub current: i8,
    pub luminosity: i8,
}

impl Dimension {
    #[must_use]
    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0, 0, 0, 0, 0)
    }

    #[must_use]
    pub const fn new(
        mass: i8,
        length: i8,
        time: i8,
        temperature: i8,
        amount: i8,
        current: i8,
        luminosity: i8,
    ) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
            amount,
            current,
            luminosity,
        }
    }

    pub const MASS: Self = Self::new(1, 0, 0, 0, 0, 0, 0);
    pub const LENGTH: Self = Self::new(0, 1, 0, 0, 0, 0, 0);
    pub const TIME: Self = Self::new(0, 0, 1, 0, 0, 0, 0);
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1, 0, 0, 0);
    pub const AMOUNT: Self = Self::new(0, 0, 0, 0, 1, 0, 0);
    pub const CURRENT: Self = Self::new(0, 0, 0, 0, 0, 1, 0);
    pub const LUMINOSITY: Self = Self::new(0, 0, 0, 0, 0, 0, 1);

    /// Area (L²).
    pub const AREA: Self = Self::new(0, 2, 0, 0, 0, 0, 0);
    /// Force (M L T⁻²).
    pub const FORCE: Self = Self::new(1, 1, -2, 0, 0, 0, 0);
    /// Pressure (M L⁻¹ T⁻²).
    pub const PRESSURE: Self = Self::new(1, -1, -2, 0, 0, 0, 0);
    /// Energy (M L² T⁻²).
    pub const ENERGY: Self = Self::new(1, 2, -2, 0, 0, 0, 0);
    /// Power (M L² T⁻³).
    pub const POWER: Self = Self::new(1, 2, -3, 0, 0, 0, 0);

    #[must_use]
    pub const fn is_dimensionless(&self) -> bool {
        self.mass == 0
            && self.length == 0
            && self.time == 0
            && self.temperature == 0
            && self.amount == 0
            && self.current == 0
            && self.luminosity == 0
    }

    /// Raises this dimension to an integer power.
    #[must_use]
    pub const fn pow(&self, exp: i8) -> Self {
        Self::new(
            self.mass * exp,
            self.length * exp,
            self.time * exp,
            self.temperature * exp,
            self.amount * exp,
            self.current * exp,
            self.luminosity * exp,
        )
    }

    fn exponents(&self) -> [(i8, &'static str); 7] {
        [
            (self.mass, "M"),
            (self.length, "L"),
            (self.time, "T"),
            (self.temperature, "Θ"),
            (self.amount, "N"),
            (self.current, "I"),
            (self.luminosity, "J"),
        ]
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
            self.amount + rhs.amount,
            self.current + rhs.current,
            self.luminosity + rhs.luminosity,
        )
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.pow(-1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let parts: Vec<String> = self
            .exponents()
            .iter()
            .filter(|(exp, _)| *exp != 0)
            .map(|(exp, sym)| {
                if *exp == 1 {
                    sym.to_string()
                } else {
                    format!("{sym}^{exp}")
                }
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
