use chrono::Duration;
use resm_core::component::{ImplicitTendencyComponent, Stepper};
use resm_core::context::Context;
use resm_core::errors::{RESMError, RESMResult};
use resm_core::resolver::RawArrays;
use resm_core::schema::{FieldProperties, Schema};
use resm_core::state::{Fields, State};
use resm_core::time::seconds;
use resm_core::units::per_second;

/// Turns a [`Stepper`] into tendencies by first-order time differencing.
///
/// Every declared output `x` becomes the tendency `(x_next - x) / dt`, in the
/// output's units per second. The wrapped stepper's diagnostics pass through.
pub struct TimeDifferencingWrapper<S> {
    stepper: S,
    tendencies: Schema,
}

impl<S: Stepper> TimeDifferencingWrapper<S> {
    pub fn new(stepper: S) -> Self {
        let tendencies = stepper
            .output_properties()
            .iter()
            .map(|(name, properties)| {
                let mut tendency = FieldProperties::with_units(&per_second(&properties.units));
                tendency.dims = properties.dims.clone();
                tendency.dims_like = properties.dims_like.clone();
                (name.clone(), tendency)
            })
            .collect();
        Self {
            stepper,
            tendencies,
        }
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn into_inner(self) -> S {
        self.stepper
    }
}

impl<S: Stepper> ImplicitTendencyComponent for TimeDifferencingWrapper<S> {
    fn name(&self) -> &str {
        self.stepper.name()
    }

    fn input_properties(&self) -> &Schema {
        self.stepper.input_properties()
    }

    fn tendency_properties(&self) -> &Schema {
        &self.tendencies
    }

    fn diagnostic_properties(&self) -> &Schema {
        self.stepper.diagnostic_properties()
    }

    fn array_call(
        &mut self,
        _inputs: &RawArrays,
        _timestep: Duration,
    ) -> RESMResult<(RawArrays, RawArrays)> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.name().to_string(),
        })
    }

    fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        let (diagnostics, next_state) = self.stepper.call(state, timestep, ctx)?;
        let dt = seconds(&timestep);
        let mut tendencies = Fields::with_capacity(self.tendencies.len());
        for (name, properties) in &self.tendencies {
            let next = next_state.require(name)?;
            let current = state.get(name).ok_or_else(|| {
                RESMError::InvalidState(format!(
                    "cannot difference '{name}' because it is not in the input state"
                ))
            })?;
            let tendency = next
                .sub(current)?
                .scale(1.0 / dt)
                .with_units(&per_second(next.units()))?
                .to_units(&properties.units)?;
            tendencies.insert(name.clone(), tendency);
        }
        Ok((tendencies, diagnostics))
    }
}
