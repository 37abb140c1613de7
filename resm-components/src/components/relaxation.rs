//! Newtonian relaxation of a single quantity.

use ndarray::{ArrayD, ArrayViewD, Zip};
use resm_core::array::{FloatValue, SharedArray};
use resm_core::component::TendencyComponent;
use resm_core::errors::{RESMError, RESMResult};
use resm_core::resolver::RawArrays;
use resm_core::schema::{FieldProperties, Schema};
use resm_core::units::per_second;
use serde::{Deserialize, Serialize};

/// Parameters for the relaxation component
///
/// A value left as `None` is read from the state on every call instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationParameters {
    /// Name of the relaxed quantity
    pub quantity: String,
    /// Units the relaxation is computed in
    pub units: String,
    /// Equilibrium value
    /// unit: `units`
    #[serde(default)]
    pub equilibrium: Option<FloatValue>,
    /// Relaxation timescale
    /// unit: s
    #[serde(default)]
    pub timescale: Option<FloatValue>,
}

/// Relaxes a quantity towards an equilibrium
///
/// $$ \frac{dx}{dt} = \frac{x_{eq} - x}{\tau} $$
///
/// Values not fixed by the parameters are read from the state as
/// `equilibrium_<quantity>` and `<quantity>_relaxation_timescale`. A
/// timescale field may be a scalar or match the quantity's dimensions.
#[derive(Debug, Clone)]
pub struct RelaxationTendencyComponent {
    parameters: RelaxationParameters,
    inputs: Schema,
    tendencies: Schema,
    diagnostics: Schema,
}

impl RelaxationTendencyComponent {
    pub fn from_parameters(parameters: RelaxationParameters) -> RESMResult<Self> {
        if parameters.timescale.is_some_and(|tau| tau <= 0.0) {
            return Err(RESMError::InvalidConfiguration(format!(
                "relaxation timescale of '{}' must be positive",
                parameters.quantity
            )));
        }
        let quantity = parameters.quantity.as_str();
        let mut inputs = Schema::new().field(quantity, ["*"], &parameters.units);
        if parameters.equilibrium.is_none() {
            inputs.insert(
                &equilibrium_name(quantity),
                FieldProperties::new(["*"], &parameters.units).with_match_dims_like(quantity),
            );
        }
        if parameters.timescale.is_none() {
            inputs.insert(&timescale_name(quantity), FieldProperties::new(["*"], "s"));
        }
        let tendencies = Schema::new().field(quantity, ["*"], &per_second(&parameters.units));
        Ok(Self {
            parameters,
            inputs,
            tendencies,
            diagnostics: Schema::new(),
        })
    }

    pub fn parameters(&self) -> &RelaxationParameters {
        &self.parameters
    }

    /// Tendency for raw `values`, given the equilibrium and timescale.
    pub fn calculate_tendency(
        &self,
        values: ArrayViewD<FloatValue>,
        equilibrium: ArrayViewD<FloatValue>,
        timescale: ArrayViewD<FloatValue>,
    ) -> RESMResult<ArrayD<FloatValue>> {
        let quantity = &self.parameters.quantity;
        let equilibrium = broadcast_to(quantity, "equilibrium", &equilibrium, &values)?;
        let timescale = broadcast_to(quantity, "timescale", &timescale, &values)?;
        Ok(Zip::from(&values)
            .and(&equilibrium)
            .and(&timescale)
            .map_collect(|x, eq, tau| (eq - x) / tau))
    }
}

fn broadcast_to<'a>(
    quantity: &str,
    what: &str,
    array: &'a ArrayViewD<'_, FloatValue>,
    like: &ArrayViewD<'_, FloatValue>,
) -> RESMResult<ArrayViewD<'a, FloatValue>> {
    array.broadcast(like.raw_dim()).ok_or_else(|| RESMError::DimensionMismatch {
        name: quantity.to_string(),
        reason: format!(
            "{what} of shape {:?} does not fit values of shape {:?}",
            array.shape(),
            like.shape()
        ),
    })
}

fn equilibrium_name(quantity: &str) -> String {
    format!("equilibrium_{quantity}")
}

fn timescale_name(quantity: &str) -> String {
    format!("{quantity}_relaxation_timescale")
}

fn raw<'r>(inputs: &'r RawArrays, name: &str) -> RESMResult<&'r SharedArray> {
    inputs.get(name).ok_or_else(|| RESMError::MissingInput {
        name: name.to_string(),
        component: Some("RelaxationTendencyComponent".to_string()),
    })
}

impl TendencyComponent for RelaxationTendencyComponent {
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
        let quantity = &self.parameters.quantity;
        let values = raw(inputs, quantity)?.read();

        let fixed = |value: Option<FloatValue>, name: String| -> RESMResult<ArrayD<FloatValue>> {
            match value {
                Some(v) => Ok(ArrayD::from_elem(vec![], v)),
                None => Ok(raw(inputs, &name)?.to_owned_array()),
            }
        };
        let equilibrium = fixed(self.parameters.equilibrium, equilibrium_name(quantity))?;
        let timescale = fixed(self.parameters.timescale, timescale_name(quantity))?;

        let tendency = self.calculate_tendency(values.view(), equilibrium.view(), timescale.view())?;
        Ok((
            [(quantity.clone(), SharedArray::new(tendency))].into(),
            RawArrays::new(),
        ))
    }
}
