use super::TimeScheme;
use crate::combine::combine_properties;
use crate::component::{ImplicitTendencyComponent, Stepper, TendencyComponent};
use crate::composite::{merge_diagnostics, Prognostic, PrognosticComposite};
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::resolver::RawArrays;
use crate::schema::{FieldProperties, Schema};
use crate::state::{Fields, State};
use crate::time::seconds;
use crate::units::{per_second, times_seconds};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builder for a [`TendencyStepper`].
///
/// Created with [`TendencyStepper::new`].
pub struct TendencyStepperBuilder {
    scheme: Box<dyn TimeScheme>,
    ctx: Arc<Context>,
    components: Vec<Prognostic>,
    name: Option<String>,
    tendencies_in_diagnostics: bool,
}

impl TendencyStepperBuilder {
    pub fn with_component(mut self, component: impl TendencyComponent + 'static) -> Self {
        self.components
            .push(Prognostic::Explicit(Box::new(component)));
        self
    }

    /// Adds a component whose tendencies depend on the timestep.
    ///
    /// Such tendencies are usually the result of differencing a [`Stepper`],
    /// so the scheme's accuracy no longer holds for them.
    pub fn with_implicit_component(
        mut self,
        component: impl ImplicitTendencyComponent + 'static,
    ) -> Self {
        warn!(
            "{} is an implicit tendency component; stepping its tendencies with a \
             multistep or multistage scheme may not have the expected order of accuracy",
            component.name()
        );
        self.components
            .push(Prognostic::Implicit(Box::new(component)));
        self
    }

    /// Name used in `<field>_tendency_from_<name>` diagnostics.
    ///
    /// Defaults to the scheme's name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Also output the effective tendency of every stepped field.
    pub fn with_tendencies_in_diagnostics(mut self) -> Self {
        self.tendencies_in_diagnostics = true;
        self
    }

    /// Combines the component schemas and readies the stepper.
    pub fn build(self) -> RESMResult<TendencyStepper> {
        let name = self
            .name
            .unwrap_or_else(|| self.scheme.name().to_string());
        let prognostic = PrognosticComposite::new(self.components)?;
        let tendency_schema = prognostic.tendency_properties();

        // Tendencies read as inputs, so units and dims are checked against them
        let as_inputs: Schema = tendency_schema
            .iter()
            .map(|(field, properties)| {
                let units = times_seconds(&properties.units).map_err(|e| {
                    RESMError::InvalidPropertyDict(format!("tendency of '{field}': {e}"))
                })?;
                let mut properties = properties.clone();
                properties.units = units;
                Ok((field.clone(), properties))
            })
            .collect::<RESMResult<_>>()?;
        let inputs = combine_properties([prognostic.input_properties(), &as_inputs])?;

        let mut outputs = Schema::new();
        let mut tendency_diagnostics = Schema::new();
        for field in tendency_schema.names() {
            let input = inputs.get(field).ok_or_else(|| {
                RESMError::InvalidPropertyDict(format!("no input properties for '{field}'"))
            })?;
            let mut output = input.clone();
            output.alias = None;
            output.dims_like = None;
            output.match_dims_like = None;
            outputs.insert(field, output);

            if self.tendencies_in_diagnostics {
                let mut properties = FieldProperties::with_units(&per_second(&input.units));
                properties.dims = input.dims.clone();
                tendency_diagnostics.insert(&tendency_diagnostic_name(field, &name), properties);
            }
        }

        let mut diagnostics = prognostic.diagnostic_properties().clone();
        let mut shared: Vec<String> = tendency_diagnostics
            .names()
            .filter(|n| diagnostics.contains(n))
            .cloned()
            .collect();
        if !shared.is_empty() {
            shared.sort();
            return Err(RESMError::SharedKey { names: shared });
        }
        for (field, properties) in &tendency_diagnostics {
            diagnostics.insert(field, properties.clone());
        }

        debug!(
            "Built stepper {name} using {} with {} component(s)",
            self.scheme.name(),
            prognostic.components().len()
        );
        Ok(TendencyStepper {
            name,
            scheme: self.scheme,
            ctx: self.ctx,
            prognostic,
            inputs,
            outputs,
            diagnostics,
            tendencies_in_diagnostics: self.tendencies_in_diagnostics,
        })
    }
}

fn tendency_diagnostic_name(field: &str, stepper: &str) -> String {
    format!("{field}_tendency_from_{stepper}")
}

/// Advances a state by integrating the tendencies of its components with a
/// [`TimeScheme`].
///
/// ```
/// use resm_core::component::Stepper;
/// use resm_core::context::Context;
/// use resm_core::stepper::{AdamsBashforth, TendencyStepper};
/// use std::sync::Arc;
///
/// let stepper = TendencyStepper::new(
///     Box::new(AdamsBashforth::new(2).unwrap()),
///     Arc::new(Context::default()),
/// )
/// .with_name("dynamics")
/// .build()
/// .unwrap();
/// assert_eq!(stepper.name(), "dynamics");
/// ```
pub struct TendencyStepper {
    name: String,
    scheme: Box<dyn TimeScheme>,
    ctx: Arc<Context>,
    prognostic: PrognosticComposite,
    inputs: Schema,
    outputs: Schema,
    diagnostics: Schema,
    tendencies_in_diagnostics: bool,
}

impl TendencyStepper {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(scheme: Box<dyn TimeScheme>, ctx: Arc<Context>) -> TendencyStepperBuilder {
        TendencyStepperBuilder {
            scheme,
            ctx,
            components: Vec::new(),
            name: None,
            tendencies_in_diagnostics: false,
        }
    }

    pub fn scheme(&self) -> &dyn TimeScheme {
        self.scheme.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn prognostic(&self) -> &PrognosticComposite {
        &self.prognostic
    }

    /// Returns `(diagnostics, next_state)` one `timestep` after `state`.
    ///
    /// `next_state` has no time. Fields without a tendency are carried over
    /// sharing their buffers. Some schemes write into `state` in place (see
    /// [`Leapfrog`](super::Leapfrog)).
    pub fn step(&mut self, state: &mut State, timestep: Duration) -> RESMResult<(Fields, State)> {
        let ctx = Arc::clone(&self.ctx);
        self.step_with(state, timestep, &ctx)
    }

    fn step_with(
        &mut self,
        state: &mut State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, State)> {
        state.require_time()?;
        debug!("{} stepping with {}", self.name, self.scheme.name());
        let (mut diagnostics, stepped) =
            self.scheme
                .step(&mut self.prognostic, state, timestep, ctx)?;

        if self.tendencies_in_diagnostics {
            let tendencies = self.effective_tendencies(state, &stepped, timestep)?;
            merge_diagnostics(&mut diagnostics, tendencies)?;
        }

        let mut next_state = State::from_fields(None, stepped)?;
        next_state.copy_untouched_from(state);
        Ok((diagnostics, next_state))
    }

    /// `(next - state) / dt` in the declared input units per second.
    fn effective_tendencies(
        &self,
        state: &State,
        stepped: &Fields,
        timestep: Duration,
    ) -> RESMResult<Fields> {
        let dt = seconds(&timestep);
        let mut out = Fields::with_capacity(stepped.len());
        for (field, next) in stepped {
            let current = state.require(field)?;
            let difference = next.sub(current)?.scale(1.0 / dt);
            let tendency = difference.with_units(&per_second(next.units()))?;
            let units = self
                .diagnostics
                .get(&tendency_diagnostic_name(field, &self.name))
                .map(|p| p.units.clone())
                .unwrap_or_else(|| tendency.units().to_string());
            out.insert(
                tendency_diagnostic_name(field, &self.name),
                tendency.to_units_for(field, &units)?,
            );
        }
        Ok(out)
    }
}

impl Stepper for TendencyStepper {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostics
    }

    fn output_properties(&self) -> &Schema {
        &self.outputs
    }

    fn array_call(
        &mut self,
        _inputs: &RawArrays,
        _timestep: Duration,
    ) -> RESMResult<(RawArrays, RawArrays)> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.name.clone(),
        })
    }

    /// Steps a clone of `state` with `ctx`.
    ///
    /// The clone shares buffers with `state`, so in-place schemes still
    /// update it.
    fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, State)> {
        let mut state = state.clone();
        self.step_with(&mut state, timestep, ctx)
    }
}
