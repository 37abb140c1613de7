//! Component kinds and the default way each is called with a state.
//!
//! A component declares what it reads and writes as [`Schema`]s and computes
//! on raw arrays in `array_call`. The provided `call` methods do the rest:
//! extract the inputs from a [`State`], pack tracers, run `array_call`, check
//! that exactly the declared outputs came back and restore them into tagged
//! [`DataArray`](crate::array::DataArray)s.

use crate::array::SharedArray;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::resolver::{check_outputs, output_raw_name, PropertyResolver, RawArrays};
use crate::schema::{Dim, FieldProperties, Schema};
use crate::state::{Fields, State};
use crate::tracers::{TracerPacker, TRACERS};
use crate::units::per_second;
use chrono::Duration;
use tracing::debug;

/// Last path segment of a type name, without generic parameters.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Computes tendencies and diagnostics from a state, without knowing the time.
pub trait TendencyComponent {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    fn input_properties(&self) -> &Schema;

    /// Tendencies, in units per unit time.
    fn tendency_properties(&self) -> &Schema;

    fn diagnostic_properties(&self) -> &Schema;

    /// Pattern of the packed tracer block, if the component takes tracers.
    fn tracer_dims(&self) -> Option<&[Dim]> {
        None
    }

    /// Tracers packed ahead of the registered ones.
    fn prepend_tracers(&self) -> &[(String, String)] {
        &[]
    }

    /// Returns `(tendencies, diagnostics)` keyed by raw name.
    fn array_call(&self, inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)>;

    /// Returns `(tendencies, diagnostics)` for `state`.
    fn call(&self, state: &State, ctx: &Context) -> RESMResult<(Fields, Fields)> {
        call_tendency_component(self, state, ctx)
    }
}

/// A tendency component that also needs the timestep.
///
/// Tendencies obtained by differencing a [`Stepper`] are of this kind.
pub trait ImplicitTendencyComponent {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    fn input_properties(&self) -> &Schema;

    fn tendency_properties(&self) -> &Schema;

    fn diagnostic_properties(&self) -> &Schema;

    fn tracer_dims(&self) -> Option<&[Dim]> {
        None
    }

    fn prepend_tracers(&self) -> &[(String, String)] {
        &[]
    }

    fn array_call(
        &mut self,
        inputs: &RawArrays,
        timestep: Duration,
    ) -> RESMResult<(RawArrays, RawArrays)>;

    fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        call_implicit_tendency_component(self, state, timestep, ctx)
    }
}

/// Computes diagnostics from a state.
pub trait DiagnosticComponent {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    fn input_properties(&self) -> &Schema;

    fn diagnostic_properties(&self) -> &Schema;

    fn array_call(&self, inputs: &RawArrays) -> RESMResult<RawArrays>;

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<Fields> {
        call_diagnostic_component(self, state, ctx)
    }
}

/// Computes the next state directly from the current one.
///
/// A stepper may keep memory between calls, hence `&mut self`.
pub trait Stepper {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    fn input_properties(&self) -> &Schema;

    fn diagnostic_properties(&self) -> &Schema;

    /// Fields of the next state.
    fn output_properties(&self) -> &Schema;

    fn tracer_dims(&self) -> Option<&[Dim]> {
        None
    }

    fn prepend_tracers(&self) -> &[(String, String)] {
        &[]
    }

    /// Returns `(diagnostics, next_state)` keyed by raw name.
    fn array_call(
        &mut self,
        inputs: &RawArrays,
        timestep: Duration,
    ) -> RESMResult<(RawArrays, RawArrays)>;

    /// Returns `(diagnostics, next_state)`.
    ///
    /// The next state holds the outputs plus every field of `state` the
    /// stepper did not produce, sharing their buffers. Its time is unset.
    fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, State)> {
        call_stepper(self, state, timestep, ctx)
    }
}

/// A sink for model states, such as a plot or a file writer.
pub trait Monitor {
    fn store(&mut self, state: &State) -> RESMResult<()>;
}

/// Per-tracer input schema and packer for a tracer-enabled component.
struct TracerBlock {
    packer: TracerPacker,
    inputs: Schema,
}

impl TracerBlock {
    fn new(
        tracer_dims: Option<&[Dim]>,
        prepend: &[(String, String)],
        inputs: &Schema,
        ctx: &Context,
    ) -> RESMResult<Option<Self>> {
        let Some(tracer_dims) = tracer_dims else {
            return Ok(None);
        };
        let packer = TracerPacker::new(tracer_dims, prepend, ctx.tracers())?;
        let quantity_dims = packer.quantity_dims();
        let mut schema = Schema::new();
        for (name, units) in packer.tracers() {
            if inputs.contains(name) {
                return Err(RESMError::InvalidPropertyDict(format!(
                    "'{name}' is declared both as an input and as a tracer"
                )));
            }
            schema.insert(name, FieldProperties::new(quantity_dims.clone(), units));
        }
        Ok(Some(Self {
            packer,
            inputs: schema,
        }))
    }

    fn pack_into(
        &self,
        resolver: &PropertyResolver<'_>,
        state: &State,
        raw: &mut RawArrays,
    ) -> RESMResult<()> {
        let tracers = resolver.extract(state, &self.inputs)?;
        let block = self.packer.pack(&tracers)?;
        if raw.insert(TRACERS.to_string(), SharedArray::new(block)).is_some() {
            return Err(RESMError::InvalidPropertyDict(format!(
                "'{TRACERS}' is reserved for the packed tracer block"
            )));
        }
        Ok(())
    }

    /// Restores the unpacked tracers with units derived from their own.
    fn restore(
        &self,
        resolver: &PropertyResolver<'_>,
        raw: &RawArrays,
        state: &State,
        units: impl Fn(&str) -> String,
    ) -> RESMResult<Fields> {
        let Some(block) = raw.get(TRACERS) else {
            return Ok(Fields::new());
        };
        let unpacked = self.packer.unpack(&block.read())?;
        let quantity_dims = self.packer.quantity_dims();
        let schema: Schema = self
            .packer
            .tracers()
            .iter()
            .map(|(name, tracer_units)| {
                (
                    name.clone(),
                    FieldProperties::new(quantity_dims.clone(), &units(tracer_units)),
                )
            })
            .collect();
        resolver.restore(&unpacked, &schema, state, &self.inputs)
    }
}

fn expected_keys<'s>(outputs: &'s Schema, inputs: &'s Schema, tracers: bool) -> Vec<&'s str> {
    let mut keys: Vec<&str> = outputs
        .names()
        .map(|name| output_raw_name(name, outputs, inputs))
        .collect();
    if tracers {
        keys.push(TRACERS);
    }
    keys
}

fn extract_inputs(
    resolver: &PropertyResolver<'_>,
    state: &State,
    inputs: &Schema,
    tracers: Option<&TracerBlock>,
    component: &str,
) -> RESMResult<RawArrays> {
    let mut raw = resolver
        .extract(state, inputs)
        .map_err(|e| e.for_component(component))?;
    if let Some(tracers) = tracers {
        tracers
            .pack_into(resolver, state, &mut raw)
            .map_err(|e| e.for_component(component))?;
    }
    Ok(raw)
}

/// Restores raw tendencies, adding the unpacked tracer tendencies.
fn restore_tendencies(
    resolver: &PropertyResolver<'_>,
    raw: &RawArrays,
    outputs: &Schema,
    inputs: &Schema,
    tracers: Option<&TracerBlock>,
    state: &State,
) -> RESMResult<Fields> {
    let mut tendencies = resolver.restore(raw, outputs, state, inputs)?;
    if let Some(tracers) = tracers {
        tendencies.extend(tracers.restore(resolver, raw, state, per_second)?);
    }
    Ok(tendencies)
}

pub fn call_tendency_component<C: TendencyComponent + ?Sized>(
    component: &C,
    state: &State,
    ctx: &Context,
) -> RESMResult<(Fields, Fields)> {
    let name = component.name();
    let inputs = component.input_properties();
    let resolver = PropertyResolver::new(ctx);
    let tracers = TracerBlock::new(
        component.tracer_dims(),
        component.prepend_tracers(),
        inputs,
        ctx,
    )?;
    let raw = extract_inputs(&resolver, state, inputs, tracers.as_ref(), name)?;

    let (raw_tendencies, raw_diagnostics) = component.array_call(&raw)?;
    let tendency_schema = component.tendency_properties();
    let diagnostic_schema = component.diagnostic_properties();
    check_outputs(
        name,
        &raw_tendencies,
        expected_keys(tendency_schema, inputs, tracers.is_some()),
    )?;
    check_outputs(
        name,
        &raw_diagnostics,
        expected_keys(diagnostic_schema, inputs, false),
    )?;

    let tendencies = restore_tendencies(
        &resolver,
        &raw_tendencies,
        tendency_schema,
        inputs,
        tracers.as_ref(),
        state,
    )?;
    let diagnostics = resolver.restore(&raw_diagnostics, diagnostic_schema, state, inputs)?;
    Ok((tendencies, diagnostics))
}

pub fn call_implicit_tendency_component<C: ImplicitTendencyComponent + ?Sized>(
    component: &mut C,
    state: &State,
    timestep: Duration,
    ctx: &Context,
) -> RESMResult<(Fields, Fields)> {
    let name = component.name().to_string();
    let resolver = PropertyResolver::new(ctx);
    let tracers = TracerBlock::new(
        component.tracer_dims(),
        component.prepend_tracers(),
        component.input_properties(),
        ctx,
    )?;
    let raw = extract_inputs(
        &resolver,
        state,
        component.input_properties(),
        tracers.as_ref(),
        &name,
    )?;

    let (raw_tendencies, raw_diagnostics) = component.array_call(&raw, timestep)?;
    let inputs = component.input_properties();
    let tendency_schema = component.tendency_properties();
    let diagnostic_schema = component.diagnostic_properties();
    check_outputs(
        &name,
        &raw_tendencies,
        expected_keys(tendency_schema, inputs, tracers.is_some()),
    )?;
    check_outputs(
        &name,
        &raw_diagnostics,
        expected_keys(diagnostic_schema, inputs, false),
    )?;

    let tendencies = restore_tendencies(
        &resolver,
        &raw_tendencies,
        tendency_schema,
        inputs,
        tracers.as_ref(),
        state,
    )?;
    let diagnostics = resolver.restore(&raw_diagnostics, diagnostic_schema, state, inputs)?;
    Ok((tendencies, diagnostics))
}

pub fn call_diagnostic_component<C: DiagnosticComponent + ?Sized>(
    component: &C,
    state: &State,
    ctx: &Context,
) -> RESMResult<Fields> {
    state.require_time()?;
    let name = component.name();
    let inputs = component.input_properties();
    let resolver = PropertyResolver::new(ctx);
    let raw = extract_inputs(&resolver, state, inputs, None, name)?;

    let raw_diagnostics = component.array_call(&raw)?;
    let diagnostic_schema = component.diagnostic_properties();
    check_outputs(
        name,
        &raw_diagnostics,
        expected_keys(diagnostic_schema, inputs, false),
    )?;
    resolver.restore(&raw_diagnostics, diagnostic_schema, state, inputs)
}

pub fn call_stepper<S: Stepper + ?Sized>(
    stepper: &mut S,
    state: &State,
    timestep: Duration,
    ctx: &Context,
) -> RESMResult<(Fields, State)> {
    state.require_time()?;
    let name = stepper.name().to_string();
    let resolver = PropertyResolver::new(ctx);
    let tracers = TracerBlock::new(
        stepper.tracer_dims(),
        stepper.prepend_tracers(),
        stepper.input_properties(),
        ctx,
    )?;
    let raw = extract_inputs(
        &resolver,
        state,
        stepper.input_properties(),
        tracers.as_ref(),
        &name,
    )?;

    let (raw_diagnostics, raw_outputs) = stepper.array_call(&raw, timestep)?;
    let inputs = stepper.input_properties();
    let diagnostic_schema = stepper.diagnostic_properties();
    let output_schema = stepper.output_properties();
    check_outputs(
        &name,
        &raw_diagnostics,
        expected_keys(diagnostic_schema, inputs, false),
    )?;
    check_outputs(
        &name,
        &raw_outputs,
        expected_keys(output_schema, inputs, tracers.is_some()),
    )?;

    let diagnostics = resolver.restore(&raw_diagnostics, diagnostic_schema, state, inputs)?;
    let mut outputs = resolver.restore(&raw_outputs, output_schema, state, inputs)?;
    if let Some(tracers) = &tracers {
        outputs.extend(tracers.restore(&resolver, &raw_outputs, state, str::to_string)?);
    }
    let mut next_state = State::from_fields(None, outputs)?;
    next_state.copy_untouched_from(state);
    debug!("{name} produced {} next-state fields", next_state.len());
    Ok((diagnostics, next_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataArray;
    use crate::time::ModelTime;
    use ndarray::{arr1, Array, ArrayD};

    struct Warming {
        inputs: Schema,
        tendencies: Schema,
        diagnostics: Schema,
    }

    impl Warming {
        fn new() -> Self {
            Self {
                inputs: Schema::new().field("air_temperature", ["*"], "degK"),
                tendencies: Schema::new().field("air_temperature", ["*"], "degK s^-1"),
                diagnostics: Schema::new().field("warming_rate", ["*"], "degK day^-1"),
            }
        }
    }

    impl TendencyComponent for Warming {
        fn input_properties(&self) -> &Schema {
            &self.inputs
        }

        fn tendency_properties(&self) -> &Schema {
            &self.tendencies
        }

        fn diagnostic_properties(&self) -> &Schema {
            &self.diagnostics
        }

        fn array_call(&self, inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
            let t = inputs["air_temperature"].read();
            let rate = t.mapv(|v| (v - 290.0) / 100.0);
            let per_day = rate.mapv(|v| v * 86400.0);
            Ok((
                [("air_temperature".to_string(), SharedArray::new(rate))].into(),
                [("warming_rate".to_string(), SharedArray::new(per_day))].into(),
            ))
        }
    }

    fn temperature_state(values: &[f64]) -> State {
        let mut state = State::with_time(ModelTime::from_seconds(0));
        state
            .insert(
                "air_temperature",
                DataArray::new(arr1(values).into_dyn(), ["lat"], "degK").unwrap(),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Warming>(), "Warming");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
        assert_eq!(Warming::new().name(), "Warming");
    }

    #[test]
    fn test_call_restores_tendencies_and_diagnostics() {
        let ctx = Context::default();
        let state = temperature_state(&[300.0, 290.0]);
        let (tendencies, diagnostics) = Warming::new().call(&state, &ctx).unwrap();

        let tendency = &tendencies["air_temperature"];
        assert_eq!(tendency.units(), "degK s^-1");
        assert_eq!(tendency.dims(), &["lat".to_string()]);
        assert!((tendency.values()[[0]] - 0.1).abs() < 1e-12);
        assert!((diagnostics["warming_rate"].values()[[0]] - 8640.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_input_names_component() {
        let ctx = Context::default();
        match Warming::new().call(&State::new(), &ctx) {
            Err(RESMError::MissingInput { name, component }) => {
                assert_eq!(name, "air_temperature");
                assert_eq!(component.as_deref(), Some("Warming"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    struct Advection {
        inputs: Schema,
        tendencies: Schema,
        diagnostics: Schema,
        tracer_dims: Vec<Dim>,
    }

    impl TendencyComponent for Advection {
        fn input_properties(&self) -> &Schema {
            &self.inputs
        }

        fn tendency_properties(&self) -> &Schema {
            &self.tendencies
        }

        fn diagnostic_properties(&self) -> &Schema {
            &self.diagnostics
        }

        fn tracer_dims(&self) -> Option<&[Dim]> {
            Some(&self.tracer_dims)
        }

        fn array_call(&self, inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
            let block = inputs[TRACERS].read().mapv(|v| -v);
            Ok(([(TRACERS.to_string(), SharedArray::new(block))].into(), RawArrays::new()))
        }
    }

    #[test]
    fn test_tracers_are_packed_and_unpacked() {
        let mut ctx = Context::default();
        ctx.register_tracer("ozone", "kg/kg").unwrap();
        ctx.register_tracer("dust", "g/kg").unwrap();

        let mut state = State::with_time(ModelTime::from_seconds(0));
        state
            .insert("ozone", DataArray::new(arr1(&[1.0, 2.0]).into_dyn(), ["lat"], "kg/kg").unwrap())
            .unwrap();
        state
            .insert("dust", DataArray::new(arr1(&[3.0, 4.0]).into_dyn(), ["lat"], "g/kg").unwrap())
            .unwrap();

        let component = Advection {
            inputs: Schema::new(),
            tendencies: Schema::new(),
            diagnostics: Schema::new(),
            tracer_dims: vec![Dim::from("tracer"), Dim::Wildcard],
        };
        let (tendencies, diagnostics) = component.call(&state, &ctx).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(tendencies["ozone"].units(), "(kg/kg) s^-1");
        assert_eq!(tendencies["dust"].values(), arr1(&[-3.0, -4.0]).into_dyn());
    }

    #[test]
    fn test_tracer_block_without_tracers_is_empty() {
        let ctx = Context::default();
        let component = Advection {
            inputs: Schema::new(),
            tendencies: Schema::new(),
            diagnostics: Schema::new(),
            tracer_dims: vec![Dim::from("tracer"), Dim::Wildcard],
        };
        let (tendencies, _) = component.call(&State::new(), &ctx).unwrap();
        assert!(tendencies.is_empty());
    }

    struct Doubler {
        inputs: Schema,
        outputs: Schema,
        diagnostics: Schema,
        calls: usize,
    }

    impl Stepper for Doubler {
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
            inputs: &RawArrays,
            _timestep: Duration,
        ) -> RESMResult<(RawArrays, RawArrays)> {
            self.calls += 1;
            let doubled = inputs["air_temperature"].read().mapv(|v| 2.0 * v);
            Ok((
                RawArrays::new(),
                [("air_temperature".to_string(), SharedArray::new(doubled))].into(),
            ))
        }
    }

    #[test]
    fn test_stepper_call_carries_untouched_fields() {
        let ctx = Context::default();
        let mut state = temperature_state(&[1.0, 2.0]);
        let pressure = DataArray::new(ArrayD::zeros(vec![2]), ["lat"], "Pa").unwrap();
        state.insert("air_pressure", pressure.clone()).unwrap();

        let mut stepper = Doubler {
            inputs: Schema::new().field("air_temperature", ["*"], "degK"),
            outputs: Schema::new().field("air_temperature", ["*"], "degK"),
            diagnostics: Schema::new(),
            calls: 0,
        };
        let (diagnostics, next) = stepper.call(&state, Duration::seconds(1), &ctx).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(stepper.calls, 1);
        assert!(next.time().is_none());
        assert_eq!(next["air_temperature"].values(), arr1(&[2.0, 4.0]).into_dyn());
        assert!(next["air_pressure"].data().ptr_eq(pressure.data()));
    }

    #[test]
    fn test_stepper_requires_time() {
        let ctx = Context::default();
        let mut state = State::new();
        state
            .insert(
                "air_temperature",
                DataArray::new(Array::zeros(1).into_dyn(), ["lat"], "degK").unwrap(),
            )
            .unwrap();
        let mut stepper = Doubler {
            inputs: Schema::new().field("air_temperature", ["*"], "degK"),
            outputs: Schema::new().field("air_temperature", ["*"], "degK"),
            diagnostics: Schema::new(),
            calls: 0,
        };
        assert!(matches!(
            stepper.call(&state, Duration::seconds(1), &ctx),
            Err(RESMError::MissingTime)
        ));
        assert_eq!(stepper.calls, 0);
    }

    struct Mean {
        inputs: Schema,
        diagnostics: Schema,
    }

    impl DiagnosticComponent for Mean {
        fn input_properties(&self) -> &Schema {
            &self.inputs
        }

        fn diagnostic_properties(&self) -> &Schema {
            &self.diagnostics
        }

        fn array_call(&self, inputs: &RawArrays) -> RESMResult<RawArrays> {
            let mean = inputs["air_temperature"].read().mean().unwrap_or_default();
            Ok([(
                "mean_air_temperature".to_string(),
                SharedArray::new(ArrayD::from_elem(vec![], mean)),
            )]
            .into())
        }
    }

    fn mean() -> Mean {
        Mean {
            inputs: Schema::new().field("air_temperature", ["*"], "degK"),
            diagnostics: Schema::new().field("mean_air_temperature", [] as [&str; 0], "degK"),
        }
    }

    #[test]
    fn test_diagnostic_call() {
        let diagnostics = mean()
            .call(&temperature_state(&[290.0, 300.0]), &Context::default())
            .unwrap();
        assert_eq!(diagnostics["mean_air_temperature"].item().unwrap(), 295.0);
    }

    #[test]
    fn test_diagnostic_requires_time() {
        let state = State::from_fields(None, temperature_state(&[290.0]).into_fields()).unwrap();
        assert!(matches!(
            mean().call(&state, &Context::default()),
            Err(RESMError::MissingTime)
        ));
    }
}
