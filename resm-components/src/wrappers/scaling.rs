use chrono::Duration;
use resm_core::array::FloatValue;
use resm_core::component::{DiagnosticComponent, Stepper, TendencyComponent};
use resm_core::context::Context;
use resm_core::errors::{RESMError, RESMResult};
use resm_core::resolver::RawArrays;
use resm_core::schema::Schema;
use resm_core::state::{Fields, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Constant factors applied to named fields, per role.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleFactors {
    pub inputs: HashMap<String, FloatValue>,
    pub tendencies: HashMap<String, FloatValue>,
    pub diagnostics: HashMap<String, FloatValue>,
    /// Next-state fields of a stepper.
    pub outputs: HashMap<String, FloatValue>,
}

impl ScaleFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: &str, factor: FloatValue) -> Self {
        self.inputs.insert(name.to_string(), factor);
        self
    }

    pub fn tendency(mut self, name: &str, factor: FloatValue) -> Self {
        self.tendencies.insert(name.to_string(), factor);
        self
    }

    pub fn diagnostic(mut self, name: &str, factor: FloatValue) -> Self {
        self.diagnostics.insert(name.to_string(), factor);
        self
    }

    pub fn output(mut self, name: &str, factor: FloatValue) -> Self {
        self.outputs.insert(name.to_string(), factor);
        self
    }
}

/// Rejects factors for fields `schema` does not declare.
fn check(role: &str, factors: &HashMap<String, FloatValue>, schema: Option<&Schema>) -> RESMResult<()> {
    let mut unknown: Vec<&String> = factors
        .keys()
        .filter(|name| !schema.is_some_and(|s| s.contains(name)))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort();
    Err(RESMError::InvalidConfiguration(format!(
        "cannot scale {unknown:?}: not {role} of the wrapped component"
    )))
}

/// `state` with its scaled inputs replaced by scaled copies.
fn scale_state(state: &State, factors: &HashMap<String, FloatValue>) -> RESMResult<State> {
    let mut scaled = state.clone();
    for (name, factor) in factors {
        if let Some(field) = state.get(name) {
            scaled.insert(name.clone(), field.scale(*factor))?;
        }
    }
    Ok(scaled)
}

fn scale_fields(mut fields: Fields, factors: &HashMap<String, FloatValue>) -> Fields {
    for (name, factor) in factors {
        if let Some(field) = fields.get_mut(name) {
            *field = field.scale(*factor);
        }
    }
    fields
}

/// Scales inputs before, and outputs after, calling the wrapped component.
///
/// Scaled fields are new buffers; everything else is passed through shared.
/// Built with the constructor matching the component's kind, which checks
/// every factor names a field that component declares.
///
/// ```
/// use resm_components::components::{RelaxationParameters, RelaxationTendencyComponent};
/// use resm_components::wrappers::{ScaleFactors, ScalingWrapper};
///
/// let relaxation = RelaxationTendencyComponent::from_parameters(RelaxationParameters {
///     quantity: "air_temperature".to_string(),
///     units: "degK".to_string(),
///     equilibrium: Some(280.0),
///     timescale: Some(86400.0),
/// })
/// .unwrap();
/// let doubled = ScalingWrapper::for_tendency_component(
///     relaxation,
///     ScaleFactors::new().tendency("air_temperature", 2.0),
/// )
/// .unwrap();
/// ```
pub struct ScalingWrapper<C> {
    component: C,
    factors: ScaleFactors,
}

impl<C> ScalingWrapper<C> {
    pub fn factors(&self) -> &ScaleFactors {
        &self.factors
    }

    pub fn component(&self) -> &C {
        &self.component
    }
}

impl<C: TendencyComponent> ScalingWrapper<C> {
    pub fn for_tendency_component(component: C, factors: ScaleFactors) -> RESMResult<Self> {
        check("an input", &factors.inputs, Some(component.input_properties()))?;
        check("a tendency", &factors.tendencies, Some(component.tendency_properties()))?;
        check("a diagnostic", &factors.diagnostics, Some(component.diagnostic_properties()))?;
        check("an output", &factors.outputs, None)?;
        Ok(Self { component, factors })
    }
}

impl<C: DiagnosticComponent> ScalingWrapper<C> {
    pub fn for_diagnostic_component(component: C, factors: ScaleFactors) -> RESMResult<Self> {
        check("an input", &factors.inputs, Some(component.input_properties()))?;
        check("a tendency", &factors.tendencies, None)?;
        check("a diagnostic", &factors.diagnostics, Some(component.diagnostic_properties()))?;
        check("an output", &factors.outputs, None)?;
        Ok(Self { component, factors })
    }
}

impl<C: Stepper> ScalingWrapper<C> {
    pub fn for_stepper(component: C, factors: ScaleFactors) -> RESMResult<Self> {
        check("an input", &factors.inputs, Some(component.input_properties()))?;
        check("a tendency", &factors.tendencies, None)?;
        check("a diagnostic", &factors.diagnostics, Some(component.diagnostic_properties()))?;
        check("an output", &factors.outputs, Some(component.output_properties()))?;
        Ok(Self { component, factors })
    }
}

impl<C: TendencyComponent> TendencyComponent for ScalingWrapper<C> {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn input_properties(&self) -> &Schema {
        self.component.input_properties()
    }

    fn tendency_properties(&self) -> &Schema {
        self.component.tendency_properties()
    }

    fn diagnostic_properties(&self) -> &Schema {
        self.component.diagnostic_properties()
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.component.name().to_string(),
        })
    }

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<(Fields, Fields)> {
        let scaled = scale_state(state, &self.factors.inputs)?;
        let (tendencies, diagnostics) = self.component.call(&scaled, ctx)?;
        Ok((
            scale_fields(tendencies, &self.factors.tendencies),
            scale_fields(diagnostics, &self.factors.diagnostics),
        ))
    }
}

impl<C: DiagnosticComponent> DiagnosticComponent for ScalingWrapper<C> {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn input_properties(&self) -> &Schema {
        self.component.input_properties()
    }

    fn diagnostic_properties(&self) -> &Schema {
        self.component.diagnostic_properties()
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<RawArrays> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.component.name().to_string(),
        })
    }

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<Fields> {
        let scaled = scale_state(state, &self.factors.inputs)?;
        let diagnostics = self.component.call(&scaled, ctx)?;
        Ok(scale_fields(diagnostics, &self.factors.diagnostics))
    }
}

impl<C: Stepper> Stepper for ScalingWrapper<C> {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn input_properties(&self) -> &Schema {
        self.component.input_properties()
    }

    fn diagnostic_properties(&self) -> &Schema {
        self.component.diagnostic_properties()
    }

    fn output_properties(&self) -> &Schema {
        self.component.output_properties()
    }

    fn array_call(
        &mut self,
        _inputs: &RawArrays,
        _timestep: Duration,
    ) -> RESMResult<(RawArrays, RawArrays)> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.component.name().to_string(),
        })
    }

    fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, State)> {
        let scaled = scale_state(state, &self.factors.inputs)?;
        let (diagnostics, mut next_state) = self.component.call(&scaled, timestep, ctx)?;
        // Scaled inputs carried through untouched are put back as given
        for name in self.factors.inputs.keys() {
            if self.component.output_properties().contains(name) {
                continue;
            }
            if let Some(field) = state.get(name) {
                next_state.insert(name.clone(), field.clone())?;
            }
        }
        for (name, factor) in &self.factors.outputs {
            if let Some(field) = next_state.get(name) {
                let field = field.scale(*factor);
                next_state.insert(name.clone(), field)?;
            }
        }
        Ok((scale_fields(diagnostics, &self.factors.diagnostics), next_state))
    }
}
