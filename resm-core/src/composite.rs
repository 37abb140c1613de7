//! Several components of one kind presented as a single component.
//!
//! Input schemas are combined with [`combine_properties`]. Tendencies of the
//! same field are summed; a diagnostic produced by more than one member is a
//! [`RESMError::SharedKey`], detected from the schemas at construction and
//! again from the actual outputs at call time.
//!
//! Composites work on states only. Their `array_call` returns
//! [`RESMError::ArrayCallUnsupported`].

use crate::combine::{combine_properties, shared_names};
use crate::component::{DiagnosticComponent, ImplicitTendencyComponent, Monitor, TendencyComponent};
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::resolver::RawArrays;
use crate::schema::Schema;
use crate::state::{Fields, State};
use chrono::Duration;

/// Adds `tendencies` into `total`, converting into the units already there.
pub(crate) fn accumulate_tendencies(total: &mut Fields, tendencies: Fields) -> RESMResult<()> {
    for (name, tendency) in tendencies {
        let summed = match total.get(&name) {
            Some(existing) => existing.add(&tendency)?,
            None => tendency,
        };
        total.insert(name, summed);
    }
    Ok(())
}

/// Moves `diagnostics` into `total`, failing on a name already present.
pub(crate) fn merge_diagnostics(total: &mut Fields, diagnostics: Fields) -> RESMResult<()> {
    let mut shared: Vec<String> = diagnostics
        .keys()
        .filter(|name| total.contains_key(*name))
        .cloned()
        .collect();
    if !shared.is_empty() {
        shared.sort();
        return Err(RESMError::SharedKey { names: shared });
    }
    total.extend(diagnostics);
    Ok(())
}

fn check_unshared<'s>(schemas: impl IntoIterator<Item = &'s Schema>) -> RESMResult<()> {
    let shared = shared_names(schemas);
    if shared.is_empty() {
        Ok(())
    } else {
        Err(RESMError::SharedKey { names: shared })
    }
}

/// Tendency components summed into one.
pub struct TendencyComposite {
    components: Vec<Box<dyn TendencyComponent>>,
    inputs: Schema,
    tendencies: Schema,
    diagnostics: Schema,
}

impl TendencyComposite {
    pub fn new(components: Vec<Box<dyn TendencyComponent>>) -> RESMResult<Self> {
        let inputs = combine_properties(components.iter().map(|c| c.input_properties()))?;
        let tendencies = combine_properties(components.iter().map(|c| c.tendency_properties()))?;
        check_unshared(components.iter().map(|c| c.diagnostic_properties()))?;
        let diagnostics =
            combine_properties(components.iter().map(|c| c.diagnostic_properties()))?;
        Ok(Self {
            components,
            inputs,
            tendencies,
            diagnostics,
        })
    }

    pub fn components(&self) -> &[Box<dyn TendencyComponent>] {
        &self.components
    }
}

impl TendencyComponent for TendencyComposite {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn tendency_properties(&self) -> &Schema {
        &self.tendencies
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostics
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.name().to_string(),
        })
    }

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<(Fields, Fields)> {
        let mut tendencies = Fields::new();
        let mut diagnostics = Fields::new();
        for component in &self.components {
            let (t, d) = component.call(state, ctx)?;
            accumulate_tendencies(&mut tendencies, t)?;
            merge_diagnostics(&mut diagnostics, d)?;
        }
        Ok((tendencies, diagnostics))
    }
}

/// Diagnostic components merged into one.
pub struct DiagnosticComposite {
    components: Vec<Box<dyn DiagnosticComponent>>,
    inputs: Schema,
    diagnostics: Schema,
}

impl DiagnosticComposite {
    pub fn new(components: Vec<Box<dyn DiagnosticComponent>>) -> RESMResult<Self> {
        let inputs = combine_properties(components.iter().map(|c| c.input_properties()))?;
        check_unshared(components.iter().map(|c| c.diagnostic_properties()))?;
        let diagnostics =
            combine_properties(components.iter().map(|c| c.diagnostic_properties()))?;
        Ok(Self {
            components,
            inputs,
            diagnostics,
        })
    }
}

impl DiagnosticComponent for DiagnosticComposite {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostics
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<RawArrays> {
        Err(RESMError::ArrayCallUnsupported {
            component: self.name().to_string(),
        })
    }

    /// Calls every member with `state`, which must have a time.
    fn call(&self, state: &State, ctx: &Context) -> RESMResult<Fields> {
        state.require_time()?;
        let mut diagnostics = Fields::new();
        for component in &self.components {
            merge_diagnostics(&mut diagnostics, component.call(state, ctx)?)?;
        }
        Ok(diagnostics)
    }
}

/// Monitors fed the same states.
#[derive(Default)]
pub struct MonitorComposite {
    monitors: Vec<Box<dyn Monitor>>,
}

impl MonitorComposite {
    pub fn new(monitors: Vec<Box<dyn Monitor>>) -> Self {
        Self { monitors }
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl Monitor for MonitorComposite {
    fn store(&mut self, state: &State) -> RESMResult<()> {
        state.require_time()?;
        for monitor in &mut self.monitors {
            monitor.store(state)?;
        }
        Ok(())
    }
}

/// A tendency component that may or may not need the timestep.
pub enum Prognostic {
    Explicit(Box<dyn TendencyComponent>),
    Implicit(Box<dyn ImplicitTendencyComponent>),
}

impl Prognostic {
    pub fn name(&self) -> &str {
        match self {
            Prognostic::Explicit(c) => c.name(),
            Prognostic::Implicit(c) => c.name(),
        }
    }

    pub fn input_properties(&self) -> &Schema {
        match self {
            Prognostic::Explicit(c) => c.input_properties(),
            Prognostic::Implicit(c) => c.input_properties(),
        }
    }

    pub fn tendency_properties(&self) -> &Schema {
        match self {
            Prognostic::Explicit(c) => c.tendency_properties(),
            Prognostic::Implicit(c) => c.tendency_properties(),
        }
    }

    pub fn diagnostic_properties(&self) -> &Schema {
        match self {
            Prognostic::Explicit(c) => c.diagnostic_properties(),
            Prognostic::Implicit(c) => c.diagnostic_properties(),
        }
    }

    pub fn call(
        &mut self,
        state: &State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        match self {
            Prognostic::Explicit(c) => c.call(state, ctx),
            Prognostic::Implicit(c) => c.call(state, timestep, ctx),
        }
    }
}

/// The tendency components driven by a
/// [`TendencyStepper`](crate::stepper::TendencyStepper).
pub struct PrognosticComposite {
    components: Vec<Prognostic>,
    inputs: Schema,
    tendencies: Schema,
    diagnostics: Schema,
}

impl PrognosticComposite {
    pub fn new(components: Vec<Prognostic>) -> RESMResult<Self> {
        let inputs = combine_properties(components.iter().map(Prognostic::input_properties))?;
        let tendencies =
            combine_properties(components.iter().map(Prognostic::tendency_properties))?;
        check_unshared(components.iter().map(Prognostic::diagnostic_properties))?;
        let diagnostics =
            combine_properties(components.iter().map(Prognostic::diagnostic_properties))?;
        Ok(Self {
            components,
            inputs,
            tendencies,
            diagnostics,
        })
    }

    pub fn components(&self) -> &[Prognostic] {
        &self.components
    }
}

impl ImplicitTendencyComponent for PrognosticComposite {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn tendency_properties(&self) -> &Schema {
        &self.tendencies
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostics
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
        let mut tendencies = Fields::new();
        let mut diagnostics = Fields::new();
        for component in &mut self.components {
            let (t, d) = component.call(state, timestep, ctx)?;
            accumulate_tendencies(&mut tendencies, t)?;
            merge_diagnostics(&mut diagnostics, d)?;
        }
        Ok((tendencies, diagnostics))
    }
}
