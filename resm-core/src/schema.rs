//! Field schemas: what a component reads and writes.
//!
//! A [`Schema`] maps field names to [`FieldProperties`]: the dimension
//! pattern, the units and optional aliasing of each field. The
//! [`PropertyResolver`](crate::resolver::PropertyResolver) uses schemas to
//! translate between a [`State`](crate::state::State) and the raw arrays a
//! component computes with.
//!
//! # Dimension patterns
//!
//! Each entry of a pattern is a [`Dim`]:
//!
//! - `"*"` ([`Dim::Wildcard`]) matches every dimension of the field that no
//!   other entry claims, collapsed into a single axis
//! - `"x"`, `"y"`, `"z"` ([`Dim::Direction`]) match at most one dimension
//!   registered for that direction in the [`Context`](crate::context::Context);
//!   when none is present a length-1 axis is created
//! - any other name ([`Dim::Named`]) must be present in the field
//!
//! # Example
//!
//! ```
//! use resm_core::schema::{FieldProperties, Schema};
//!
//! let inputs = Schema::new()
//!     .field("air_temperature", ["*", "mid_levels"], "degK")
//!     .with_field(
//!         "air_pressure",
//!         FieldProperties::new(["*", "mid_levels"], "Pa").with_alias("p"),
//!     );
//! assert_eq!(inputs.raw_name("air_pressure"), "p");
//! ```

use crate::errors::{RESMError, RESMResult};
use crate::units::Unit;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial direction matched by the `x`, `y` and `z` pattern entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    X,
    Y,
    Z,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::X, Direction::Y, Direction::Z];

    pub fn letter(&self) -> &'static str {
        match self {
            Direction::X => "x",
            Direction::Y => "y",
            Direction::Z => "z",
        }
    }
}

/// One entry of a dimension pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dim {
    Wildcard,
    Direction(Direction),
    Named(String),
}

impl Dim {
    pub const WILDCARD: &'static str = "*";

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Dim::Wildcard)
    }

    /// True for entries that can match a varying set of dimensions.
    pub fn is_flexible(&self) -> bool {
        !matches!(self, Dim::Named(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Dim::Wildcard => Self::WILDCARD,
            Dim::Direction(d) => d.letter(),
            Dim::Named(name) => name,
        }
    }
}

impl From<&str> for Dim {
    fn from(value: &str) -> Self {
        match value {
            "*" => Dim::Wildcard,
            "x" => Dim::Direction(Direction::X),
            "y" => Dim::Direction(Direction::Y),
            "z" => Dim::Direction(Direction::Z),
            other => Dim::Named(other.to_string()),
        }
    }
}

impl From<String> for Dim {
    fn from(value: String) -> Self {
        Dim::from(value.as_str())
    }
}

impl From<&String> for Dim {
    fn from(value: &String) -> Self {
        Dim::from(value.as_str())
    }
}

impl From<Dim> for String {
    fn from(value: Dim) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared properties of one field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldProperties {
    /// Dimension pattern. Outputs may omit it when they restore like an input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<Vec<Dim>>,
    pub units: String,
    /// Name of the raw array seen by the component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Restore this output with the shape and dimension order of the named input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims_like: Option<String>,
    /// Wildcard matches must equal those of the named field in the same schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_dims_like: Option<String>,
}

impl FieldProperties {
    pub fn new<I, D>(dims: I, units: &str) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dim>,
    {
        Self {
            dims: Some(dims.into_iter().map(Into::into).collect()),
            units: units.to_string(),
            ..Default::default()
        }
    }

    /// Properties without a dimension pattern.
    pub fn with_units(units: &str) -> Self {
        Self {
            units: units.to_string(),
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_dims_like(mut self, other: &str) -> Self {
        self.dims_like = Some(other.to_string());
        self
    }

    pub fn with_match_dims_like(mut self, other: &str) -> Self {
        self.match_dims_like = Some(other.to_string());
        self
    }

    pub fn has_wildcard(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().any(Dim::is_wildcard))
    }
}

/// Ordered map from field name to [`FieldProperties`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, FieldProperties>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field with a dimension pattern and units.
    pub fn field<I, D>(self, name: &str, dims: I, units: &str) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dim>,
    {
        self.with_field(name, FieldProperties::new(dims, units))
    }

    pub fn with_field(mut self, name: &str, properties: FieldProperties) -> Self {
        self.insert(name, properties);
        self
    }

    pub fn insert(&mut self, name: &str, properties: FieldProperties) -> Option<FieldProperties> {
        self.fields.insert(name.to_string(), properties)
    }

    pub fn get(&self, name: &str) -> Option<&FieldProperties> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldProperties)> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The raw array name of a field: its alias if it has one.
    pub fn raw_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.fields
            .get(name)
            .and_then(|p| p.alias.as_deref())
            .unwrap_or(name)
    }

    /// Checks units, patterns and references within this schema.
    pub fn validate(&self) -> RESMResult<()> {
        for (name, properties) in &self.fields {
            Unit::parse(&properties.units).map_err(|e| {
                RESMError::InvalidPropertyDict(format!(
                    "'{name}' has invalid units '{}': {e}",
                    properties.units
                ))
            })?;
            if let Some(dims) = &properties.dims {
                if dims.iter().filter(|d| d.is_wildcard()).count() > 1 {
                    return Err(RESMError::InvalidPropertyDict(format!(
                        "'{name}' uses more than one wildcard"
                    )));
                }
                for (i, dim) in dims.iter().enumerate() {
                    if dims[..i].contains(dim) {
                        return Err(RESMError::InvalidPropertyDict(format!(
                            "'{name}' lists dimension '{dim}' more than once"
                        )));
                    }
                }
            }
            if let Some(other) = &properties.match_dims_like {
                if !self.fields.contains_key(other) {
                    return Err(RESMError::InvalidPropertyDict(format!(
                        "'{name}' should match dims like '{other}', which is not in the same schema"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, FieldProperties)> for Schema {
    fn from_iter<T: IntoIterator<Item = (String, FieldProperties)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a String, &'a FieldProperties);
    type IntoIter = indexmap::map::Iter<'a, String, FieldProperties>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_tokens() {
        assert_eq!(Dim::from("*"), Dim::Wildcard);
        assert_eq!(Dim::from("z"), Dim::Direction(Direction::Z));
        assert_eq!(Dim::from("mid_levels"), Dim::Named("mid_levels".into()));
        assert_eq!(Dim::from("lat").to_string(), "lat");
    }

    #[test]
    fn test_builder_preserves_order() {
        let schema = Schema::new()
            .field("b", ["*"], "m")
            .field("a", ["*"], "m")
            .field("c", ["*"], "m");
        let names: Vec<_> = schema.names().cloned().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_validate_rejects_bad_units() {
        let schema = Schema::new().field("a", ["*"], "not_a_unit");
        assert!(matches!(
            schema.validate(),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_validate_rejects_two_wildcards() {
        let schema = Schema::new().field("a", ["*", "lat", "*"], "m");
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_match_dims_like() {
        let schema = Schema::new().with_field(
            "a",
            FieldProperties::new(["*"], "m").with_match_dims_like("b"),
        );
        assert!(matches!(
            schema.validate(),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_serde_json_round_trip() {
        let schema = Schema::new()
            .with_field(
                "air_temperature",
                FieldProperties::new(["*", "z"], "degK").with_alias("T"),
            )
            .with_field("surface_temperature", FieldProperties::with_units("degK"));

        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains(r#""dims":["*","z"]"#));
        let restored: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, schema);
    }

    #[test]
    fn test_toml_schema() {
        let toml_str = r#"
            [air_temperature]
            dims = ["*", "mid_levels"]
            units = "degK"

            [air_pressure]
            dims = ["*", "mid_levels"]
            units = "Pa"
            match_dims_like = "air_temperature"
        "#;
        let schema: Schema = toml::from_str(toml_str).unwrap();
        assert_eq!(schema.len(), 2);
        let pressure = schema.get("air_pressure").unwrap();
        assert_eq!(
            pressure.dims.as_deref(),
            Some(&[Dim::Wildcard, Dim::Named("mid_levels".into())][..])
        );
        assert_eq!(pressure.match_dims_like.as_deref(), Some("air_temperature"));
        schema.validate().unwrap();
    }
}
