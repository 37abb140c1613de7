//! Component-based Earth-system models built from reconciled field schemas.
//!
//! The engine lives in [`resm_core`], reusable components and wrappers in
//! [`resm_components`].

pub use ndarray;
pub use resm_components;
pub use resm_core;

pub use resm_core::{Context, DataArray, Fields, RESMError, RESMResult, State};
