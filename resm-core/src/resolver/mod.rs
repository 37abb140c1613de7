//! Translation between states and the raw arrays components compute with.
//!
//! A component declares a [`Schema`] per role. Before the component runs,
//! [`PropertyResolver::extract`] pulls each declared input out of a
//! [`State`](crate::state::State), converts it to the declared units and
//! collapses its dimensions into the declared pattern. Afterwards
//! [`PropertyResolver::restore`] re-expands the raw outputs and tags them with
//! dimension names and units again.
//!
//! # Buffer sharing
//!
//! Extraction returns the state's own buffer when no conversion, transpose or
//! reshape is required, so a component writing into an input in place writes
//! into the state. Restoration likewise reuses a raw output buffer when its
//! layout already matches.

mod extract;
mod restore;
pub(crate) mod wildcard;

use crate::array::SharedArray;
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::schema::Schema;
use std::collections::HashMap;

/// Untagged arrays keyed by their raw name.
pub type RawArrays = HashMap<String, SharedArray>;

/// Resolves schemas against states using the registries of a [`Context`].
#[derive(Debug, Clone, Copy)]
pub struct PropertyResolver<'a> {
    ctx: &'a Context,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }
}

/// Dimensions matched by the wildcard entries of a schema over a state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WildcardMatches {
    /// Matched dimension names, in first-seen order.
    pub names: Vec<String>,
    /// Length of every dimension of every matched field.
    pub lengths: HashMap<String, usize>,
}

impl WildcardMatches {
    /// Number of elements in the collapsed wildcard axis.
    pub fn collapsed_len(&self) -> usize {
        self.names
            .iter()
            .map(|n| self.lengths.get(n).copied().unwrap_or(1))
            .product()
    }
}

/// Raw name an output is returned under.
///
/// The output's alias wins, then the alias of the same-named input.
pub fn output_raw_name<'s>(name: &'s str, outputs: &'s Schema, inputs: &'s Schema) -> &'s str {
    outputs
        .get(name)
        .and_then(|p| p.alias.as_deref())
        .or_else(|| inputs.get(name).and_then(|p| p.alias.as_deref()))
        .unwrap_or(name)
}

/// Checks that a component returned exactly the raw arrays it declared.
pub fn check_outputs<I, S>(component: &str, raw: &RawArrays, expected: I) -> RESMResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let expected: Vec<String> = expected.into_iter().map(|s| s.as_ref().to_string()).collect();

    let mut missing: Vec<String> = expected
        .iter()
        .filter(|name| !raw.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(RESMError::ComponentMissingOutput {
            component: component.to_string(),
            names: missing,
        });
    }

    let mut extra: Vec<String> = raw
        .keys()
        .filter(|name| !expected.contains(name))
        .cloned()
        .collect();
    if !extra.is_empty() {
        extra.sort();
        return Err(RESMError::ComponentExtraOutput {
            component: component.to_string(),
            names: extra,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldProperties;
    use ndarray::ArrayD;

    fn raw(names: &[&str]) -> RawArrays {
        names
            .iter()
            .map(|n| (n.to_string(), SharedArray::new(ArrayD::zeros(vec![1]))))
            .collect()
    }

    #[test]
    fn test_check_outputs() {
        check_outputs("c", &raw(&["a", "b"]), ["a", "b"]).unwrap();

        match check_outputs("c", &raw(&["a"]), ["a", "b"]) {
            Err(RESMError::ComponentMissingOutput { component, names }) => {
                assert_eq!(component, "c");
                assert_eq!(names, vec!["b"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        match check_outputs("c", &raw(&["a", "b", "c"]), ["a", "b"]) {
            Err(RESMError::ComponentExtraOutput { names, .. }) => assert_eq!(names, vec!["c"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_output_raw_name_prefers_output_alias() {
        let inputs = Schema::new().with_field(
            "air_temperature",
            FieldProperties::new(["*"], "degK").with_alias("T"),
        );
        let outputs = Schema::new()
            .field("air_temperature", ["*"], "degK s^-1")
            .with_field(
                "air_pressure",
                FieldProperties::new(["*"], "Pa").with_alias("p"),
            )
            .field("cloud_fraction", ["*"], "");

        assert_eq!(output_raw_name("air_temperature", &outputs, &inputs), "T");
        assert_eq!(output_raw_name("air_pressure", &outputs, &inputs), "p");
        assert_eq!(output_raw_name("cloud_fraction", &outputs, &inputs), "cloud_fraction");
    }

    #[test]
    fn test_collapsed_len() {
        let matches = WildcardMatches {
            names: vec!["lat".into(), "lon".into()],
            lengths: [("lat".to_string(), 3), ("lon".to_string(), 4)].into_iter().collect(),
        };
        assert_eq!(matches.collapsed_len(), 12);
    }
}
