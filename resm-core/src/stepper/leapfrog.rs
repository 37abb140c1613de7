use super::{advance, check_constant_timestep, evaluate, TimeScheme};
use crate::array::{DataArray, FloatValue};
use crate::composite::PrognosticComposite;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::state::{Fields, State};
use crate::time::seconds;
use chrono::Duration;
use ndarray::ArrayD;
use tracing::debug;

/// Leapfrog scheme with a Robert-Asselin-Williams time filter.
///
/// The first call is a forward Euler step. Later calls step from the
/// previous state over `2 dt` and filter the computational mode:
///
/// ```text
/// new = old + 2 dt T
/// f   = s/2 (old - 2 cur + new)
/// cur = cur + alpha f
/// new = new - (1 - alpha) f
/// ```
///
/// # In-place filtering
///
/// `cur` is the state passed to `step`. Its filtered values are written into
/// that state's buffers, so every handle sharing them (including earlier
/// `next_state`s returned by a stepper) sees the correction.
///
/// With `alpha = 1` this is the classic Robert-Asselin filter.
#[derive(Debug, Clone)]
pub struct Leapfrog {
    asselin_strength: FloatValue,
    alpha: FloatValue,
    previous: Option<Fields>,
    timestep: Option<Duration>,
}

impl Default for Leapfrog {
    fn default() -> Self {
        Self {
            asselin_strength: Self::DEFAULT_ASSELIN_STRENGTH,
            alpha: Self::DEFAULT_ALPHA,
            previous: None,
            timestep: None,
        }
    }
}

impl Leapfrog {
    pub const DEFAULT_ASSELIN_STRENGTH: FloatValue = 0.05;
    pub const DEFAULT_ALPHA: FloatValue = 0.5;

    pub fn new(asselin_strength: FloatValue, alpha: FloatValue) -> RESMResult<Self> {
        if !asselin_strength.is_finite() || asselin_strength < 0.0 {
            return Err(RESMError::InvalidConfiguration(format!(
                "Asselin filter strength must be non-negative, got {asselin_strength}"
            )));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RESMError::InvalidConfiguration(format!(
                "Williams alpha must be between 0 and 1, got {alpha}"
            )));
        }
        Ok(Self {
            asselin_strength,
            alpha,
            ..Default::default()
        })
    }

    pub fn asselin_strength(&self) -> FloatValue {
        self.asselin_strength
    }

    pub fn alpha(&self) -> FloatValue {
        self.alpha
    }

    /// Filter correction for `current`, in its dims and units, and the
    /// filtered new field. Nothing is written.
    fn filter(
        &self,
        name: &str,
        old: &DataArray,
        current: &DataArray,
        new: &DataArray,
    ) -> RESMResult<(ArrayD<FloatValue>, DataArray)> {
        let dims = current.dims();
        let units = current.units();
        let old = old.values_as(dims, units)?;
        let mut new = new.values_as(dims, units)?;
        let current_values = current.values();
        if old.shape() != current_values.shape() || new.shape() != current_values.shape() {
            return Err(RESMError::dimension_mismatch(
                name,
                format!(
                    "shape changed between steps: {:?}, {:?} and {:?}",
                    old.shape(),
                    current_values.shape(),
                    new.shape()
                ),
            ));
        }

        let mut correction = old;
        correction.zip_mut_with(&current_values, |o, &c| *o -= 2.0 * c);
        correction += &new;
        correction *= 0.5 * self.asselin_strength;

        new.scaled_add(-(1.0 - self.alpha), &correction);
        Ok((correction, DataArray::new(new, dims.to_vec(), units)?))
    }

    /// Filters every field of `unfiltered`, then writes the corrections into
    /// the matching buffers of `state`.
    ///
    /// Either every field is corrected or, on error, none is.
    fn filter_all(&self, old: &Fields, state: &State, unfiltered: &Fields) -> RESMResult<Fields> {
        let mut corrections = Vec::with_capacity(unfiltered.len());
        let mut stepped = Fields::with_capacity(unfiltered.len());
        for (name, new) in unfiltered {
            let current = state.require(name)?;
            let old_field = old.get(name).ok_or_else(|| {
                RESMError::InvalidState(format!(
                    "'{name}' has a tendency but was not stepped on the previous call"
                ))
            })?;
            let (correction, filtered) = self.filter(name, old_field, current, new)?;
            corrections.push((current, correction));
            stepped.insert(name.clone(), filtered);
        }
        for (current, correction) in corrections {
            current.data().write().scaled_add(self.alpha, &correction);
        }
        Ok(stepped)
    }
}

impl TimeScheme for Leapfrog {
    fn name(&self) -> &str {
        "leapfrog"
    }

    /// Steps `state`, filtering its prognostic fields in place after the
    /// first call.
    fn step(
        &mut self,
        prognostic: &mut PrognosticComposite,
        state: &mut State,
        timestep: Duration,
        ctx: &Context,
    ) -> RESMResult<(Fields, Fields)> {
        check_constant_timestep(&mut self.timestep, timestep)?;
        let (diagnostics, tendencies) = evaluate(prognostic, state, timestep, ctx)?;
        let dt = seconds(&timestep);

        let Some(old) = self.previous.take() else {
            debug!("First leapfrog step, using forward Euler");
            let stepped = advance(state.fields(), &[(dt, &tendencies)], tendencies.keys())?;
            self.previous = Some(snapshot(state, tendencies.keys())?);
            return Ok((diagnostics, stepped));
        };

        let unfiltered = advance(&old, &[(2.0 * dt, &tendencies)], tendencies.keys())?;
        let stepped = self.filter_all(&old, state, &unfiltered)?;
        self.previous = Some(snapshot(state, tendencies.keys())?);
        Ok((diagnostics, stepped))
    }
}

/// Caller-independent copies of the named fields.
fn snapshot<'n>(state: &State, names: impl IntoIterator<Item = &'n String>) -> RESMResult<Fields> {
    names
        .into_iter()
        .map(|name| Ok((name.clone(), state.require(name)?.deep_copy())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_parameters() {
        let leapfrog = Leapfrog::default();
        assert_eq!(leapfrog.asselin_strength(), 0.05);
        assert_eq!(leapfrog.alpha(), 0.5);
        assert!(Leapfrog::new(-0.1, 0.5).is_err());
        assert!(Leapfrog::new(0.1, 1.5).is_err());
    }

    #[test]
    fn test_filter_writes_current_in_place() {
        let leapfrog = Leapfrog::new(0.5, 1.0).unwrap();
        let field = |v: f64| DataArray::new(arr1(&[v]).into_dyn(), ["x"], "degK").unwrap();
        let old = field(273.0);
        let current = field(273.0);
        let alias = current.clone();
        let new = field(277.0);

        let state = State::from_fields(None, [("t".to_string(), current)].into()).unwrap();
        let old: Fields = [("t".to_string(), old)].into();
        let unfiltered: Fields = [("t".to_string(), new)].into();

        let filtered = leapfrog.filter_all(&old, &state, &unfiltered).unwrap();
        assert_eq!(filtered["t"].item().unwrap(), 277.0);
        assert_eq!(alias.item().unwrap(), 274.0);
    }

    #[test]
    fn test_williams_alpha_splits_correction() {
        let leapfrog = Leapfrog::new(0.5, 0.5).unwrap();
        let field = |v: f64| DataArray::new(arr1(&[v]).into_dyn(), ["x"], "degK").unwrap();
        let (correction, filtered) = leapfrog
            .filter("t", &field(273.0), &field(273.0), &field(277.0))
            .unwrap();
        assert_eq!(correction, arr1(&[1.0]).into_dyn());
        assert_eq!(filtered.item().unwrap(), 276.5);
    }

    #[test]
    fn test_failed_filter_leaves_state_untouched() {
        let leapfrog = Leapfrog::new(0.5, 1.0).unwrap();
        let field = |v: &[f64]| DataArray::new(arr1(v).into_dyn(), ["x"], "degK").unwrap();
        let state = State::from_fields(
            None,
            [
                ("a".to_string(), field(&[273.0])),
                ("b".to_string(), field(&[273.0])),
            ]
            .into(),
        )
        .unwrap();
        let old: Fields = [
            ("a".to_string(), field(&[273.0])),
            ("b".to_string(), field(&[273.0, 273.0])),
        ]
        .into();
        let unfiltered: Fields = [
            ("a".to_string(), field(&[277.0])),
            ("b".to_string(), field(&[277.0])),
        ]
        .into();

        let result = leapfrog.filter_all(&old, &state, &unfiltered);
        assert!(matches!(result, Err(RESMError::DimensionMismatch { .. })));
        assert_eq!(state["a"].item().unwrap(), 273.0);
        assert_eq!(state["b"].item().unwrap(), 273.0);
    }
}
