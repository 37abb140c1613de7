//! Time integration of tendency components.
//!
//! A [`TendencyStepper`] owns a [`PrognosticComposite`] and a
//! [`TimeScheme`]. Each step the scheme calls the composite, converts the
//! tendencies into "state units per second" and combines them with the state.
//!
//! Schemes are chosen in code or from configuration:
//!
//! ```
//! use resm_core::stepper::SchemeConfig;
//!
//! let config = SchemeConfig::from_toml_str(r#"
//!     scheme = "leapfrog"
//!     asselin_strength = 0.1
//! "#).unwrap();
//! let scheme = config.build().unwrap();
//! assert_eq!(scheme.name(), "leapfrog");
//! ```

mod adams_bashforth;
mod leapfrog;
mod ssp_runge_kutta;
mod tendency_stepper;

pub use adams_bashforth::AdamsBashforth;
pub use leapfrog::Leapfrog;
pub use ssp_runge_kutta::SSPRungeKutta;
pub use tendency_stepper::{TendencyStepper, TendencyStepperBuilder};

use crate::array::{DataArray, FloatValue};
use crate::component::ImplicitTendencyComponent;
use crate::composite::PrognosticComposite;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::state::{Fields, State};
use crate::time::seconds;
use crate::units::per_second;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A rule for advancing prognostic fields by one timestep.
pub trait TimeScheme {
    fn name(&self) -> &str;

    /// Returns `(diagnostics, stepped fields)`.
    ///
    /// Stepped fields keep the units and dimension order of the matching
    /// field in `state`. A scheme may write into `state` in place; such
    /// schemes document it.
    fn step(
        &mut self,
        prognostic: &mut PrognosticComposite,
        state: &mut State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)>;
}

/// Serialisable choice of [`TimeScheme`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SchemeConfig {
    AdamsBashforth {
        #[serde(default = "default_order")]
        order: usize,
    },
    Leapfrog {
        #[serde(default = "default_asselin_strength")]
        asselin_strength: FloatValue,
        #[serde(default = "default_alpha")]
        alpha: FloatValue,
    },
    SspRungeKutta {
        #[serde(default = "default_stages")]
        stages: usize,
    },
}

fn default_order() -> usize {
    3
}

fn default_asselin_strength() -> FloatValue {
    Leapfrog::DEFAULT_ASSELIN_STRENGTH
}

fn default_alpha() -> FloatValue {
    Leapfrog::DEFAULT_ALPHA
}

fn default_stages() -> usize {
    3
}

impl SchemeConfig {
    pub fn build(&self) -> RESMResult<Box<dyn TimeScheme>> {
        Ok(match *self {
            SchemeConfig::AdamsBashforth { order } => Box::new(AdamsBashforth::new(order)?),
            SchemeConfig::Leapfrog {
                asselin_strength,
                alpha,
            } => Box::new(Leapfrog::new(asselin_strength, alpha)?),
            SchemeConfig::SspRungeKutta { stages } => Box::new(SSPRungeKutta::new(stages)?),
        })
    }

    pub fn from_toml_str(toml_str: &str) -> RESMResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

/// Rejects a timestep that differs from the first one seen.
pub(crate) fn check_constant_timestep(
    first: &mut Option<Duration>,
    timestep: Duration,
) -> RESMResult<()> {
    match *first {
        Some(expected) if expected != timestep => Err(RESMError::TimestepMismatch {
            expected: seconds(&expected),
            got: seconds(&timestep),
        }),
        Some(_) => Ok(()),
        None => {
            *first = Some(timestep);
            Ok(())
        }
    }
}

/// Calls the prognostic components and converts every tendency to the units
/// of its field in `state` per second.
pub(crate) fn evaluate(
    prognostic: &mut PrognosticComposite,
    state: &State,
    timestep: Duration,
    ctx: &Context,
) -> RESMResult<(Fields, Fields)> {
    let (tendencies, diagnostics) = prognostic.call(state, timestep, ctx)?;
    let mut converted = Fields::with_capacity(tendencies.len());
    for (name, tendency) in tendencies {
        let field = state.require(&name)?;
        let units = per_second(field.units());
        let tendency = tendency.to_units_for(&name, &units)?;
        converted.insert(name, tendency);
    }
    Ok((diagnostics, converted))
}

/// `base + Σ wᵢ incrementᵢ` for every field of `names`.
///
/// Increments are tendencies in units of the base field per second, with
/// weights in seconds. A field missing from an increment contributes nothing.
pub(crate) fn advance<'n>(
    base: &Fields,
    increments: &[(FloatValue, &Fields)],
    names: impl IntoIterator<Item = &'n String>,
) -> RESMResult<Fields> {
    let mut out = Fields::new();
    for name in names {
        let field = require(base, name)?;
        let units = per_second(field.units());
        let mut values = field.values();
        for (weight, tendencies) in increments {
            let Some(tendency) = tendencies.get(name) else {
                continue;
            };
            let tendency = tendency.values_as(field.dims(), &units)?;
            if tendency.shape() != values.shape() {
                return Err(RESMError::dimension_mismatch(
                    name,
                    format!(
                        "tendency of shape {:?} cannot step a field of shape {:?}",
                        tendency.shape(),
                        values.shape()
                    ),
                ));
            }
            values.scaled_add(*weight, &tendency);
        }
        out.insert(
            name.clone(),
            DataArray::new(values, field.dims().to_vec(), field.units())?,
        );
    }
    Ok(out)
}

/// `wa·a + wb·b` for every field of `b`, in the units and order of `a`.
pub(crate) fn blend(
    a: &Fields,
    wa: FloatValue,
    b: &Fields,
    wb: FloatValue,
) -> RESMResult<Fields> {
    let mut out = Fields::with_capacity(b.len());
    for (name, b_field) in b {
        let a_field = require(a, name)?;
        let b_values = b_field.values_as(a_field.dims(), a_field.units())?;
        let mut values = a_field.values();
        if b_values.shape() != values.shape() {
            return Err(RESMError::dimension_mismatch(
                name,
                format!("cannot blend shapes {:?} and {:?}", values.shape(), b_values.shape()),
            ));
        }
        values.zip_mut_with(&b_values, |x, &y| *x = wa * *x + wb * y);
        out.insert(
            name.clone(),
            DataArray::new(values, a_field.dims().to_vec(), a_field.units())?,
        );
    }
    Ok(out)
}

/// `state` with `fields` replaced, keeping its time and other fields.
pub(crate) fn stage_state(state: &State, fields: Fields) -> RESMResult<State> {
    let mut stage = State::from_fields(state.time(), fields)?;
    stage.copy_untouched_from(state);
    Ok(stage)
}

fn require<'f>(fields: &'f Fields, name: &str) -> RESMResult<&'f DataArray> {
    fields.get(name).ok_or_else(|| RESMError::MissingInput {
        name: name.to_string(),
        component: None,
    })
}
