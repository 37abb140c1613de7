use crate::array::DataArray;
use crate::errors::{RESMError, RESMResult};
use crate::time::ModelTime;
use std::collections::HashMap;
use std::ops::Index;

/// Named fields, as returned by components for tendencies and diagnostics.
pub type Fields = HashMap<String, DataArray>;

/// Name reserved for the time value of a state.
pub const TIME: &str = "time";

/// A snapshot of the model: named fields plus the time they describe.
///
/// The time is kept apart from the fields so that it can never be mistaken
/// for an array; inserting a field called `time` is an error.
///
/// Cloning a state shares every field buffer (see [`DataArray`]).
#[derive(Debug, Clone, Default)]
pub struct State {
    time: Option<ModelTime>,
    fields: Fields,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(time: impl Into<ModelTime>) -> Self {
        Self {
            time: Some(time.into()),
            fields: Fields::new(),
        }
    }

    /// Builds a state from fields, rejecting a field named `time`.
    pub fn from_fields(time: Option<ModelTime>, fields: Fields) -> RESMResult<Self> {
        let mut state = Self {
            time,
            fields: Fields::with_capacity(fields.len()),
        };
        for (name, field) in fields {
            state.insert(name, field)?;
        }
        Ok(state)
    }

    pub fn time(&self) -> Option<ModelTime> {
        self.time
    }

    pub fn set_time(&mut self, time: impl Into<ModelTime>) {
        self.time = Some(time.into());
    }

    /// The state's time, or [`RESMError::MissingTime`].
    pub fn require_time(&self) -> RESMResult<ModelTime> {
        self.time.ok_or(RESMError::MissingTime)
    }

    pub fn insert(&mut self, name: impl Into<String>, field: DataArray) -> RESMResult<Option<DataArray>> {
        let name = name.into();
        if name == TIME {
            return Err(RESMError::InvalidState(
                "'time' is reserved for the state's time value".to_string(),
            ));
        }
        Ok(self.fields.insert(name, field))
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.fields.get(name)
    }

    /// The named field, or [`RESMError::MissingInput`].
    pub fn require(&self, name: &str) -> RESMResult<&DataArray> {
        self.fields.get(name).ok_or_else(|| RESMError::MissingInput {
            name: name.to_string(),
            component: None,
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<DataArray> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataArray)> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// A copy of the state whose buffers are owned by the caller.
    pub fn deep_copy(&self) -> Self {
        Self {
            time: self.time,
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.deep_copy()))
                .collect(),
        }
    }

    /// Adds every field of `other` that this state lacks, sharing buffers.
    ///
    /// The time is not copied.
    pub fn copy_untouched_from(&mut self, other: &State) {
        for (name, field) in &other.fields {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| field.clone());
        }
    }
}

impl Index<&str> for State {
    type Output = DataArray;

    /// Panics if the field is absent; use [`State::require`] to get an error instead.
    fn index(&self, name: &str) -> &DataArray {
        &self.fields[name]
    }
}
