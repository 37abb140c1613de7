//! Reusable components and wrappers for models built on `resm-core`.

pub mod components;
pub mod wrappers;
