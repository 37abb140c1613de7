//! Passive tracers.
//!
//! Components that transport many similar quantities opt into receiving them
//! as one packed array named [`TRACERS`] instead of one array per quantity.
//! The quantities to pack are the component's own `prepend_tracers` followed
//! by every tracer registered in the [`TracerRegistry`].

use crate::array::{FloatValue, SharedArray};
use crate::errors::{RESMError, RESMResult};
use crate::schema::Dim;
use crate::units::parse_unit;
use indexmap::IndexMap;
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::HashMap;
use tracing::debug;

/// Raw array name of the packed tracer block.
pub const TRACERS: &str = "tracers";

/// Reserved dimension that indexes tracers inside the packed block.
pub const TRACER_DIM: &str = "tracer";

/// Registered tracers and their units, in registration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TracerRegistry {
    tracers: IndexMap<String, String>,
}

impl TracerRegistry {
    /// Registers `name` with `units`, replacing any earlier units.
    pub fn register(&mut self, name: &str, units: &str) -> RESMResult<()> {
        parse_unit(units)?;
        debug!("Registering tracer {name} in {units}");
        self.tracers.insert(name.to_string(), units.to_string());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracers.clear();
    }

    pub fn units(&self, name: &str) -> Option<&str> {
        self.tracers.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.tracers.iter()
    }

    pub fn len(&self) -> usize {
        self.tracers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracers.is_empty()
    }

    /// A copy of the registry that later registrations do not affect.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// Packs per-tracer raw arrays into one block and unpacks them again.
#[derive(Debug, Clone, PartialEq)]
pub struct TracerPacker {
    tracers: Vec<(String, String)>,
    tracer_dims: Vec<Dim>,
    tracer_index: usize,
}

impl TracerPacker {
    /// Builds the packer for a component.
    ///
    /// `tracer_dims` must contain [`TRACER_DIM`] exactly once. `prepend` comes
    /// first in the packed block; registered tracers follow, skipping names
    /// already present.
    pub fn new(
        tracer_dims: &[Dim],
        prepend: &[(String, String)],
        registry: &TracerRegistry,
    ) -> RESMResult<Self> {
        let is_tracer_dim = |d: &Dim| d.as_str() == TRACER_DIM;
        let tracer_index = tracer_dims.iter().position(is_tracer_dim).ok_or_else(|| {
            RESMError::InvalidPropertyDict(format!(
                "tracer dims {tracer_dims:?} must include a dimension named '{TRACER_DIM}'"
            ))
        })?;
        if tracer_dims.iter().filter(|d| is_tracer_dim(d)).count() > 1 {
            return Err(RESMError::InvalidPropertyDict(format!(
                "tracer dims {tracer_dims:?} name '{TRACER_DIM}' more than once"
            )));
        }

        let mut tracers: Vec<(String, String)> = prepend.to_vec();
        for (name, units) in registry.iter() {
            if !tracers.iter().any(|(n, _)| n == name) {
                tracers.push((name.clone(), units.clone()));
            }
        }
        Ok(Self {
            tracers,
            tracer_dims: tracer_dims.to_vec(),
            tracer_index,
        })
    }

    /// Tracer names and units in packing order.
    pub fn tracers(&self) -> &[(String, String)] {
        &self.tracers
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracers.iter().map(|(n, _)| n.as_str())
    }

    /// Pattern of each individual tracer: the tracer dims without `tracer`.
    pub fn quantity_dims(&self) -> Vec<Dim> {
        self.tracer_dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.tracer_index)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// Stacks the named raw arrays along the tracer axis.
    ///
    /// With no tracers the block is empty along every axis.
    pub fn pack(&self, raw: &HashMap<String, SharedArray>) -> RESMResult<ArrayD<FloatValue>> {
        if self.tracers.is_empty() {
            return Ok(ArrayD::zeros(IxDyn(&vec![0; self.tracer_dims.len()])));
        }
        let arrays = self
            .names()
            .map(|name| {
                raw.get(name)
                    .map(SharedArray::to_owned_array)
                    .ok_or_else(|| RESMError::MissingInput {
                        name: name.to_string(),
                        component: None,
                    })
            })
            .collect::<RESMResult<Vec<_>>>()?;
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        ndarray::stack(Axis(self.tracer_index), &views).map_err(|e| {
            RESMError::dimension_mismatch(TRACERS, format!("cannot pack tracers: {e}"))
        })
    }

    /// Splits a packed block back into one raw array per tracer.
    pub fn unpack(&self, block: &ArrayD<FloatValue>) -> RESMResult<HashMap<String, SharedArray>> {
        let axis = Axis(self.tracer_index);
        if self.tracers.is_empty() {
            return Ok(HashMap::new());
        }
        if block.ndim() != self.tracer_dims.len() || block.len_of(axis) != self.tracers.len() {
            return Err(RESMError::dimension_mismatch(
                TRACERS,
                format!(
                    "packed block of shape {:?} does not hold {} tracers along axis {}",
                    block.shape(),
                    self.tracers.len(),
                    self.tracer_index
                ),
            ));
        }
        Ok(self
            .names()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.to_string(),
                    SharedArray::new(block.index_axis(axis, i).to_owned()),
                )
            })
            .collect())
    }
}
