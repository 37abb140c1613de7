//! Property reconciliation and time stepping for component-based models.
//!
//! Components declare the fields they read and write as [`schema::Schema`]s.
//! The [`resolver`] translates between a [`state::State`] of named,
//! dimension-tagged arrays and the raw arrays a component computes on, and
//! the [`stepper`] integrates tendencies through time.

pub mod array;
pub mod combine;
pub mod component;
pub mod composite;
pub mod constants;
pub mod context;
pub mod resolver;
pub mod schema;
pub mod state;
pub mod stepper;
pub mod time;
pub mod tracers;
pub mod units;

pub mod errors;

pub use array::{DataArray, FloatValue, SharedArray};
pub use context::Context;
pub use errors::{RESMError, RESMResult};
pub use state::{Fields, State};
