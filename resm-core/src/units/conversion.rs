//! Conversion between compatible units.
//!
//! Conversions are affine: `to = from * scale + shift`. The shift is zero
//! except between absolute temperature scales used on their own
//! (`degC` to `K`).

use super::dimension::Dimension;
use super::parser::{ParseError, ParsedUnit};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    IncompatibleDimensions {
        from: Dimension,
        to: Dimension,
        from_unit: String,
        to_unit: String,
    },
    ParseError(ParseError),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleDimensions {
                from,
                to,
                from_unit,
                to_unit,
            } => write!(
                f,
                "cannot convert from '{from_unit}' to '{to_unit}': \
                 incompatible dimensions ({from} vs {to})"
            ),
            Self::ParseError(e) => write!(f, "unit parse error: {e}"),
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for ConversionError {
    fn from(e: ParseError) -> Self {
        Self::ParseError(e)
    }
}

/// Affine map from values in one unit to values in another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub scale: f64,
    pub shift: f64,
}

impl Conversion {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        shift: 0.0,
    };

    #[must_use]
    pub fn is_identity(&self) -> bool {
        is_close::is_close!(self.scale, 1.0) && self.shift == 0.0
    }

    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.shift
    }

    #[must_use]
    pub fn apply_array(&self, values: &ArrayD<f64>) -> ArrayD<f64> {
        values.mapv(|v| self.apply(v))
    }
}

/// A parsed unit that remembers how it was written.
///
/// Equality compares the parsed form, so `W/m^2 == W m^-2`. Units that are
/// merely equivalent (`degK` and `K`) compare unequal but convert with an
/// identity [`Conversion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    original: String,
    parsed: ParsedUnit,
}

impl Unit {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Self {
            original: input.to_string(),
            parsed: ParsedUnit::parse(input)?,
        })
    }

    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn parsed(&self) -> &ParsedUnit {
        &self.parsed
    }

    #[must_use]
    pub fn normalized(&self) -> String {
        self.parsed.normalized()
    }

    pub fn dimension(&self) -> Result<Dimension, ParseError> {
        self.parsed.dimension()
    }

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        self.dimension().is_ok_and(|d| d.is_dimensionless())
    }

    /// True when both units share a physical dimension.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        match (self.dimension(), other.dimension()) {
            (Ok(d1), Ok(d2)) => d1 == d2,
            _ => false,
        }
    }

    /// Product of two units, written in exponent notation.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        Self::from_parsed(self.parsed.multiply(&other.parsed))
    }

    #[must_use]
    pub fn divide(&self, other: &Self) -> Self {
        Self::from_parsed(self.parsed.divide(&other.parsed))
    }

    fn from_parsed(parsed: ParsedUnit) -> Self {
        Self {
            original: parsed.normalized(),
            parsed,
        }
    }

    /// The affine map taking values in `self` to values in `other`.
    pub fn conversion_to(&self, other: &Self) -> Result<Conversion, ConversionError> {
        if self.parsed == other.parsed {
            return Ok(Conversion::IDENTITY);
        }
        let dim_self = self.dimension()?;
        let dim_other = other.dimension()?;
        if dim_self != dim_other {
            return Err(ConversionError::IncompatibleDimensions {
                from: dim_self,
                to: dim_other,
                from_unit: self.original.clone(),
                to_unit: other.original.clone(),
            });
        }

        // si = v * f_self + o_self;  v_other = (si - o_other) / f_other
        let f_self = self.parsed.to_si_factor()?;
        let f_other = other.parsed.to_si_factor()?;
        let o_self = self.parsed.to_si_offset()?;
        let o_other = other.parsed.to_si_offset()?;
        Ok(Conversion {
            scale: f_self / f_other,
            shift: (o_self - o_other) / f_other,
        })
    }

    pub fn convert_value(&self, value: f64, other: &Self) -> Result<f64, ConversionError> {
        Ok(self.conversion_to(other)?.apply(value))
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for Unit {}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// True when both unit strings parse and share a dimension.
pub fn is_compatible(from: &str, to: &str) -> bool {
    match (Unit::parse(from), Unit::parse(to)) {
        (Ok(a), Ok(b)) => a.is_compatible(&b),
        _ => false,
    }
}

/// Converts every element of `values` from unit `from` to unit `to`.
pub fn convert(values: &ArrayD<f64>, from: &str, to: &str) -> Result<ArrayD<f64>, ConversionError> {
    let conversion = Unit::parse(from)?.conversion_to(&Unit::parse(to)?)?;
    Ok(conversion.apply_array(values))
}
