//! Components returning fields fixed at construction.
//!
//! The fields are held by handle, not copied. Writing into one of their
//! buffers after construction changes what later calls return; replacing the
//! caller's own `DataArray` with another one does not.

use resm_core::component::{DiagnosticComponent, TendencyComponent};
use resm_core::context::Context;
use resm_core::errors::RESMResult;
use resm_core::resolver::RawArrays;
use resm_core::schema::{FieldProperties, Schema};
use resm_core::state::{Fields, State};

fn schema_of(fields: &Fields) -> Schema {
    fields
        .iter()
        .map(|(name, field)| (name.clone(), FieldProperties::new(field.dims(), field.units())))
        .collect()
}

fn raw_of(fields: &Fields) -> RawArrays {
    fields
        .iter()
        .map(|(name, field)| (name.clone(), field.data().clone()))
        .collect()
}

/// Prescribes the same tendencies and diagnostics on every call.
///
/// Tendencies are given per unit time, e.g. `degK s^-1`.
#[derive(Debug, Clone)]
pub struct ConstantTendencyComponent {
    tendencies: Fields,
    diagnostics: Fields,
    inputs: Schema,
    tendency_properties: Schema,
    diagnostic_properties: Schema,
}

impl ConstantTendencyComponent {
    pub fn new(tendencies: Fields, diagnostics: Fields) -> Self {
        Self {
            tendency_properties: schema_of(&tendencies),
            diagnostic_properties: schema_of(&diagnostics),
            inputs: Schema::new(),
            tendencies,
            diagnostics,
        }
    }
}

impl TendencyComponent for ConstantTendencyComponent {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn tendency_properties(&self) -> &Schema {
        &self.tendency_properties
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostic_properties
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
        Ok((raw_of(&self.tendencies), raw_of(&self.diagnostics)))
    }

    /// Returns the construction-time fields regardless of `state`.
    fn call(&self, _state: &State, _ctx: &Context) -> RESMResult<(Fields, Fields)> {
        Ok((self.tendencies.clone(), self.diagnostics.clone()))
    }
}

/// Yields the same diagnostics on every call.
#[derive(Debug, Clone)]
pub struct ConstantDiagnosticComponent {
    diagnostics: Fields,
    inputs: Schema,
    diagnostic_properties: Schema,
}

impl ConstantDiagnosticComponent {
    pub fn new(diagnostics: Fields) -> Self {
        Self {
            diagnostic_properties: schema_of(&diagnostics),
            inputs: Schema::new(),
            diagnostics,
        }
    }
}

impl DiagnosticComponent for ConstantDiagnosticComponent {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostic_properties
    }

    fn array_call(&self, _inputs: &RawArrays) -> RESMResult<RawArrays> {
        Ok(raw_of(&self.diagnostics))
    }

    fn call(&self, state: &State, _ctx: &Context) -> RESMResult<Fields> {
        state.require_time()?;
        Ok(self.diagnostics.clone())
    }
}
