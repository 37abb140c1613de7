use super::{advance, check_constant_timestep, evaluate, TimeScheme};
use crate::composite::PrognosticComposite;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::state::{Fields, State};
use crate::time::seconds;
use chrono::Duration;
use std::collections::VecDeque;
use tracing::debug;

/// Coefficients per order, newest tendency first.
static COEFFICIENTS: [&[f64]; 4] = [
    &[1.0],
    &[3.0 / 2.0, -1.0 / 2.0],
    &[23.0 / 12.0, -16.0 / 12.0, 5.0 / 12.0],
    &[55.0 / 24.0, -59.0 / 24.0, 37.0 / 24.0, -9.0 / 24.0],
];

/// Explicit Adams-Bashforth multistep scheme of order 1 to 4.
///
/// The `n`th call uses order `min(n, order)`: until enough tendencies have
/// been seen, the scheme runs at the highest order its history allows,
/// starting from forward Euler. The timestep must not change between calls.
#[derive(Debug, Clone)]
pub struct AdamsBashforth {
    order: usize,
    history: VecDeque<Fields>,
    timestep: Option<Duration>,
}

impl AdamsBashforth {
    pub const MAX_ORDER: usize = 4;

    pub fn new(order: usize) -> RESMResult<Self> {
        if !(1..=Self::MAX_ORDER).contains(&order) {
            return Err(RESMError::InvalidConfiguration(format!(
                "Adams-Bashforth order must be between 1 and {}, got {order}",
                Self::MAX_ORDER
            )));
        }
        Ok(Self {
            order,
            history: VecDeque::with_capacity(order),
            timestep: None,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Order the next call will use.
    pub fn effective_order(&self) -> usize {
        (self.history.len() + 1).min(self.order)
    }

    /// Coefficients of `order`, newest tendency first.
    pub fn coefficients(order: usize) -> Option<&'static [f64]> {
        order.checked_sub(1).and_then(|i| COEFFICIENTS.get(i)).copied()
    }
}

impl TimeScheme for AdamsBashforth {
    fn name(&self) -> &str {
        "adams_bashforth"
    }

    fn step(
        &mut self,
        prognostic: &mut PrognosticComposite,
        state: &mut State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        check_constant_timestep(&mut self.timestep, timestep)?;
        let (diagnostics, tendencies) = evaluate(prognostic, state, timestep, ctx)?;
        let order = self.effective_order();
        let coefficients = Self::coefficients(order).ok_or_else(|| {
            RESMError::InvalidConfiguration(format!("no coefficients for order {order}"))
        })?;
        debug!("Adams-Bashforth step using order {order}");

        let dt = seconds(&timestep);
        let increments: Vec<(f64, &Fields)> = coefficients
            .iter()
            .zip(std::iter::once(&tendencies).chain(&self.history))
            .map(|(c, tendencies)| (c * dt, tendencies))
            .collect();
        let stepped = advance(state.fields(), &increments, tendencies.keys())?;

        // History only grows once the step has succeeded
        self.history.push_front(tendencies);
        self.history.truncate(self.order - 1);
        Ok((diagnostics, stepped))
    }
}
