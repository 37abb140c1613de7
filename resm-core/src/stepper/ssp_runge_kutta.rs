use super::{advance, blend, evaluate, stage_state, TimeScheme};
use crate::composite::PrognosticComposite;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::state::{Fields, State};
use crate::time::seconds;
use chrono::Duration;
use tracing::debug;

/// Strong stability preserving Runge-Kutta scheme with 2 or 3 stages.
///
/// With `E(x) = x + dt T(x)`, two stages compute `x/2 + E(E(x))/2` and three
/// stages compute
///
/// ```text
/// x1  = E(x)
/// x2  = 3/4 x + 1/4 E(x1)
/// out = 1/3 x + 2/3 E(x2)
/// ```
///
/// Intermediate states carry the time they approximate. Diagnostics are those
/// of the first stage.
#[derive(Debug, Clone)]
pub struct SSPRungeKutta {
    stages: usize,
}

impl Default for SSPRungeKutta {
    fn default() -> Self {
        Self { stages: 3 }
    }
}

impl SSPRungeKutta {
    pub fn new(stages: usize) -> RESMResult<Self> {
        match stages {
            2 | 3 => Ok(Self { stages }),
            _ => Err(RESMError::InvalidConfiguration(format!(
                "SSP Runge-Kutta supports 2 or 3 stages, got {stages}"
            ))),
        }
    }

    pub fn stages(&self) -> usize {
        self.stages
    }
}

/// One forward Euler stage from `state`.
fn euler(
    prognostic: &mut PrognosticComposite,
    state: &State,
    timestep: Duration,
    ctx: &Context,
) -> RESMResult<(Fields, Fields)> {
    let (diagnostics, tendencies) = evaluate(prognostic, state, timestep, ctx)?;
    let stepped = advance(
        state.fields(),
        &[(seconds(&timestep), &tendencies)],
        tendencies.keys(),
    )?;
    Ok((diagnostics, stepped))
}

fn at_offset(state: &State, fields: Fields, offset: Duration) -> RESMResult<State> {
    let mut stage = stage_state(state, fields)?;
    if let Some(time) = state.time() {
        stage.set_time(time + offset);
    }
    Ok(stage)
}

impl TimeScheme for SSPRungeKutta {
    fn name(&self) -> &str {
        "ssp_runge_kutta"
    }

    fn step(
        &mut self,
        prognostic: &mut PrognosticComposite,
        state: &mut State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        let (diagnostics, x1) = euler(prognostic, state, timestep, ctx)?;
        let x1 = at_offset(state, x1, timestep)?;

        let stepped = if self.stages == 2 {
            let (_, e1) = euler(prognostic, &x1, timestep, ctx)?;
            blend(state.fields(), 0.5, &e1, 0.5)?
        } else {
            let (_, e1) = euler(prognostic, &x1, timestep, ctx)?;
            let x2 = blend(state.fields(), 0.75, &e1, 0.25)?;
            let x2 = at_offset(state, x2, timestep / 2)?;
            let (_, e2) = euler(prognostic, &x2, timestep, ctx)?;
            blend(state.fields(), 1.0 / 3.0, &e2, 2.0 / 3.0)?
        };
        debug!("SSP Runge-Kutta step with {} stages", self.stages);
        Ok((diagnostics, stepped))
    }
}
