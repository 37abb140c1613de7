use chrono::Duration;
use resm_core::component::{DiagnosticComponent, TendencyComponent};
use resm_core::context::Context;
use resm_core::errors::RESMResult;
use resm_core::resolver::RawArrays;
use resm_core::schema::{Dim, Schema};
use resm_core::state::{Fields, State};
use resm_core::time::ModelTime;
use std::cell::RefCell;
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone)]
struct Cached {
    time: ModelTime,
    tendencies: Fields,
    diagnostics: Fields,
}

/// Recomputes the wrapped component's output only once `interval` has passed.
///
/// Calls made earlier than `last_update + interval` return the cached output
/// of the last update, sharing its buffers. States must have a time.
pub struct UpdateFrequencyWrapper<C> {
    component: C,
    interval: Duration,
    cache: RefCell<Option<Cached>>,
}

impl<C> UpdateFrequencyWrapper<C> {
    pub fn new(component: C, interval: Duration) -> Self {
        Self {
            component,
            interval,
            cache: RefCell::new(None),
        }
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time of the last computed output.
    pub fn last_update(&self) -> Option<ModelTime> {
        self.cache.borrow().as_ref().map(|c| c.time)
    }

    /// The cached output if it is still current at `time`.
    fn cached_at(&self, time: ModelTime) -> Option<Cached> {
        let cache = self.cache.borrow();
        let cached = cache.as_ref()?;
        let due = cached.time + self.interval;
        match time.partial_cmp(&due) {
            Some(Ordering::Less) => Some(cached.clone()),
            _ => None,
        }
    }

    fn update(&self, time: ModelTime, tendencies: Fields, diagnostics: Fields) {
        debug!("Updated cached output at {time}");
        *self.cache.borrow_mut() = Some(Cached {
            time,
            tendencies,
            diagnostics,
        });
    }
}

impl<C: TendencyComponent> TendencyComponent for UpdateFrequencyWrapper<C> {
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

    fn tracer_dims(&self) -> Option<&[Dim]> {
        self.component.tracer_dims()
    }

    fn prepend_tracers(&self) -> &[(String, String)] {
        self.component.prepend_tracers()
    }

    fn array_call(&self, inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
        self.component.array_call(inputs)
    }

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<(Fields, Fields)> {
        let time = state.require_time()?;
        if let Some(cached) = self.cached_at(time) {
            return Ok((cached.tendencies, cached.diagnostics));
        }
        let (tendencies, diagnostics) = self.component.call(state, ctx)?;
        self.update(time, tendencies.clone(), diagnostics.clone());
        Ok((tendencies, diagnostics))
    }
}

impl<C: DiagnosticComponent> DiagnosticComponent for UpdateFrequencyWrapper<C> {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn input_properties(&self) -> &Schema {
        self.component.input_properties()
    }

    fn diagnostic_properties(&self) -> &Schema {
        self.component.diagnostic_properties()
    }

    fn array_call(&self, inputs: &RawArrays) -> RESMResult<RawArrays> {
        self.component.array_call(inputs)
    }

    fn call(&self, state: &State, ctx: &Context) -> RESMResult<Fields> {
        let time = state.require_time()?;
        if let Some(cached) = self.cached_at(time) {
            return Ok(cached.diagnostics);
        }
        let diagnostics = self.component.call(state, ctx)?;
        self.update(time, Fields::new(), diagnostics.clone());
        Ok(diagnostics)
    }
}
