use super::wildcard::{collapse, flexible_matches, match_pattern, Groups};
use super::{PropertyResolver, RawArrays, WildcardMatches};
use crate::array::DataArray;
use crate::errors::{RESMError, RESMResult};
use crate::schema::{Dim, FieldProperties, Schema};
use crate::state::State;
use indexmap::IndexMap;
use std::collections::HashMap;

/// A state field matched against its declared pattern.
pub(crate) struct Matched<'s> {
    pub field: &'s DataArray,
    pub pattern: Vec<Dim>,
    pub groups: Groups,
}

impl<'a> PropertyResolver<'a> {
    /// Raw arrays for every field of `schema`, keyed by alias or name.
    ///
    /// Fields are converted to the declared units and reshaped to the
    /// declared pattern. Every wildcard axis collapses the same dimensions in
    /// the same order, broadcasting those a field lacks. A field needing no
    /// change is returned as a shared handle to the state's buffer.
    pub fn extract(&self, state: &State, schema: &Schema) -> RESMResult<RawArrays> {
        let matched = self.match_fields(state, schema)?;
        let wildcard = wildcard_matches_of(&matched);
        let mut raw = RawArrays::with_capacity(matched.len());
        for (name, m) in &matched {
            let units = schema
                .get(name)
                .map(|p| p.units.as_str())
                .unwrap_or_default();
            let converted = m.field.to_units_for(name, units)?;
            let array = collapse(&converted, &m.groups, &wildcard.lengths)?;
            let raw_name = schema.raw_name(name);
            if raw.insert(raw_name.to_string(), array).is_some() {
                return Err(RESMError::InvalidPropertyDict(format!(
                    "raw name '{raw_name}' is used by more than one field"
                )));
            }
        }
        Ok(raw)
    }

    /// The wildcard matches and dimension lengths of `state` under `schema`.
    pub fn wildcard_matches(&self, state: &State, schema: &Schema) -> RESMResult<WildcardMatches> {
        let matched = self.match_fields(state, schema)?;
        Ok(wildcard_matches_of(&matched))
    }

    /// Matches every field of `schema` present in `state` to its pattern.
    pub(crate) fn match_fields<'s>(
        &self,
        state: &'s State,
        schema: &Schema,
    ) -> RESMResult<IndexMap<String, Matched<'s>>> {
        check_dim_lengths(state, schema)?;

        let mut matched: IndexMap<String, Matched<'s>> = IndexMap::with_capacity(schema.len());
        for name in extraction_order(schema)? {
            let Some(properties) = schema.get(name) else {
                continue;
            };
            let pattern = properties.dims.clone().ok_or_else(|| {
                RESMError::InvalidPropertyDict(format!("input '{name}' does not declare dims"))
            })?;
            let field = lookup(state, name, properties)?;

            let required: Option<HashMap<Dim, Vec<String>>> = match &properties.match_dims_like {
                Some(other) if other != name => {
                    let target = matched.get(other).ok_or_else(|| {
                        RESMError::InvalidPropertyDict(format!(
                            "'{name}' should match dims like '{other}', which is not in the same schema"
                        ))
                    })?;
                    Some(flexible_matches(&target.pattern, &target.groups))
                }
                _ => None,
            };

            let groups = match_pattern(name, field.dims(), &pattern, self.ctx, required.as_ref())?;
            matched.insert(
                name.clone(),
                Matched {
                    field,
                    pattern,
                    groups,
                },
            );
        }

        // All wildcards of a schema collapse the union of their matches.
        let shared = wildcard_matches_of(&matched);
        for m in matched.values_mut() {
            let Some(i) = m.pattern.iter().position(Dim::is_wildcard) else {
                continue;
            };
            let claimed: Vec<String> = m
                .groups
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, group)| group.iter().cloned())
                .collect();
            m.groups[i] = shared
                .names
                .iter()
                .filter(|d| !claimed.contains(*d))
                .cloned()
                .collect();
        }
        Ok(matched)
    }
}

pub(crate) fn wildcard_matches_of(matched: &IndexMap<String, Matched<'_>>) -> WildcardMatches {
    let mut matches = WildcardMatches::default();
    for m in matched.values() {
        for (dim, len) in m.field.dims().iter().zip(m.field.shape()) {
            matches.lengths.entry(dim.clone()).or_insert(len);
        }
        let wildcard_group = m
            .pattern
            .iter()
            .position(Dim::is_wildcard)
            .map(|i| &m.groups[i]);
        for dim in wildcard_group.into_iter().flatten() {
            if !matches.names.contains(dim) {
                matches.names.push(dim.clone());
            }
        }
    }
    matches
}

fn lookup<'s>(state: &'s State, name: &str, properties: &FieldProperties) -> RESMResult<&'s DataArray> {
    state
        .get(name)
        .or_else(|| properties.alias.as_deref().and_then(|alias| state.get(alias)))
        .ok_or_else(|| RESMError::MissingInput {
            name: name.to_string(),
            component: None,
        })
}

/// Every dimension name must have one length across the schema's fields.
fn check_dim_lengths(state: &State, schema: &Schema) -> RESMResult<()> {
    let mut lengths: HashMap<&str, (usize, &str)> = HashMap::new();
    for (name, properties) in schema {
        let Ok(field) = lookup(state, name, properties) else {
            continue;
        };
        for (dim, len) in field.dims().iter().zip(field.shape()) {
            match lengths.get(dim.as_str()) {
                Some((seen, other)) if *seen != len => {
                    return Err(RESMError::dimension_mismatch(
                        name,
                        format!("dimension '{dim}' has length {len}, but {seen} in '{other}'"),
                    ));
                }
                Some(_) => {}
                None => {
                    lengths.insert(dim.as_str(), (len, name.as_str()));
                }
            }
        }
    }
    Ok(())
}

/// Field names with `match_dims_like` targets ahead of their dependents.
fn extraction_order(schema: &Schema) -> RESMResult<Vec<&String>> {
    let mut order: Vec<&String> = Vec::with_capacity(schema.len());
    while order.len() < schema.len() {
        let before = order.len();
        for (name, properties) in schema {
            if order.contains(&name) {
                continue;
            }
            let ready = match &properties.match_dims_like {
                Some(other) if other != name => {
                    if !schema.contains(other) {
                        return Err(RESMError::InvalidPropertyDict(format!(
                            "'{name}' should match dims like '{other}', which is not in the same schema"
                        )));
                    }
                    order.iter().any(|n| *n == other)
                }
                _ => true,
            };
            if ready {
                order.push(name);
            }
        }
        if order.len() == before {
            return Err(RESMError::InvalidPropertyDict(
                "match_dims_like references form a cycle".to_string(),
            ));
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::schema::Direction;
    use ndarray::{arr1, Array};

    fn state_with(fields: Vec<(&str, DataArray)>) -> State {
        let mut state = State::new();
        for (name, field) in fields {
            state.insert(name, field).unwrap();
        }
        state
    }

    #[test]
    fn test_extract_shares_buffer_when_unchanged() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[300.0, 301.0]).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t.clone())]);
        let schema = Schema::new().field("air_temperature", ["*"], "degK");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert!(raw["air_temperature"].ptr_eq(t.data()));
    }

    #[test]
    fn test_extract_converts_into_new_buffer() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[0.0, 10.0]).into_dyn(), ["lat"], "degC").unwrap();
        let state = state_with(vec![("air_temperature", t.clone())]);
        let schema = Schema::new().field("air_temperature", ["*"], "degK");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        let values = raw["air_temperature"].to_owned_array();
        assert!(!raw["air_temperature"].ptr_eq(t.data()));
        assert!((values[[0]] - 273.15).abs() < 1e-12);
        assert!((values[[1]] - 283.15).abs() < 1e-12);
    }

    #[test]
    fn test_extract_incompatible_units() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[1.0]).into_dyn(), ["lat"], "m").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let schema = Schema::new().field("air_temperature", ["*"], "degK");
        assert!(matches!(
            PropertyResolver::new(&ctx).extract(&state, &schema),
            Err(RESMError::IncompatibleUnits { .. })
        ));
    }

    #[test]
    fn test_extract_missing_input() {
        let ctx = Context::default();
        let schema = Schema::new().field("air_temperature", ["*"], "degK");
        match PropertyResolver::new(&ctx).extract(&State::new(), &schema) {
            Err(RESMError::MissingInput { name, component }) => {
                assert_eq!(name, "air_temperature");
                assert!(component.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extract_uses_alias_as_key_and_fallback() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[1.0]).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("T", t)]);
        let schema = Schema::new().with_field(
            "air_temperature",
            FieldProperties::new(["*"], "degK").with_alias("T"),
        );
        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert!(raw.contains_key("T"));
        assert!(!raw.contains_key("air_temperature"));
    }

    #[test]
    fn test_extract_requires_dims() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[1.0]).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let schema = Schema::new().with_field("air_temperature", FieldProperties::with_units("degK"));
        assert!(matches!(
            PropertyResolver::new(&ctx).extract(&state, &schema),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_extract_collapses_wildcard_and_keeps_literal_position() {
        let mut ctx = Context::default();
        ctx.set_direction_names(Direction::Z, &["mid_levels"]);
        // (lat=2, mid_levels=3, lon=4)
        let values = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (100 * i + 10 * j + k) as f64);
        let q = DataArray::new(values.into_dyn(), ["lat", "mid_levels", "lon"], "kg/kg").unwrap();
        let state = state_with(vec![("specific_humidity", q)]);
        let schema = Schema::new().field("specific_humidity", ["*", "z"], "kg/kg");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        let array = raw["specific_humidity"].to_owned_array();
        assert_eq!(array.shape(), &[8, 3]);
        // wildcard index = lat * 4 + lon
        assert_eq!(array[[5, 2]], 121.0);
        assert_eq!(array[[7, 0]], 103.0);
    }

    #[test]
    fn test_extract_scalar_field() {
        let ctx = Context::default();
        let state = state_with(vec![("co2", DataArray::scalar(400.0, "ppm").unwrap())]);
        let schema = Schema::new().field("co2", Vec::<&str>::new(), "ppm");
        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert_eq!(raw["co2"].ndim(), 0);
    }

    #[test]
    fn test_conflicting_dim_lengths() {
        let ctx = Context::default();
        let a = DataArray::new(Array::zeros(3).into_dyn(), ["lat"], "m").unwrap();
        let b = DataArray::new(Array::zeros(4).into_dyn(), ["lat"], "m").unwrap();
        let state = state_with(vec![("a", a), ("b", b)]);
        let schema = Schema::new().field("a", ["*"], "m").field("b", ["*"], "m");
        assert!(matches!(
            PropertyResolver::new(&ctx).extract(&state, &schema),
            Err(RESMError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_match_dims_like_uses_target_order() {
        let ctx = Context::default();
        let a = DataArray::new(
            Array::from_shape_fn((2, 3), |(i, j)| (10 * i + j) as f64).into_dyn(),
            ["lon", "lat"],
            "m",
        )
        .unwrap();
        let b = DataArray::new(
            Array::from_shape_fn((3, 2), |(j, i)| (10 * i + j) as f64).into_dyn(),
            ["lat", "lon"],
            "m",
        )
        .unwrap();
        let state = state_with(vec![("a", a), ("b", b)]);
        let schema = Schema::new()
            .with_field("b", FieldProperties::new(["*"], "m").with_match_dims_like("a"))
            .field("a", ["*"], "m");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert_eq!(raw["a"].to_owned_array(), raw["b"].to_owned_array());
    }

    #[test]
    fn test_match_dims_like_cycle() {
        let schema = Schema::new()
            .with_field("a", FieldProperties::new(["*"], "m").with_match_dims_like("b"))
            .with_field("b", FieldProperties::new(["*"], "m").with_match_dims_like("a"));
        assert!(matches!(
            extraction_order(&schema),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_wildcard_matches_union_in_order() {
        let ctx = Context::default();
        let a = DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lat", "lon"], "m").unwrap();
        let b = DataArray::new(Array::zeros((3, 5)).into_dyn(), ["lon", "levels"], "m").unwrap();
        let state = state_with(vec![("a", a), ("b", b)]);
        let schema = Schema::new()
            .field("a", ["*"], "m")
            .field("b", ["*", "levels"], "m");
        let matches = PropertyResolver::new(&ctx)
            .wildcard_matches(&state, &schema)
            .unwrap();
        assert_eq!(matches.names, vec!["lat", "lon"]);
        assert_eq!(matches.lengths["levels"], 5);
        assert_eq!(matches.collapsed_len(), 6);
    }

    #[test]
    fn test_wildcards_collapse_in_one_order() {
        let ctx = Context::default();
        let values = Array::from_shape_fn((2, 3), |(i, j)| (10 * i + j) as f64);
        let a = DataArray::new(values.into_dyn(), ["lat", "lon"], "m").unwrap();
        let transposed = Array::from_shape_fn((3, 2), |(j, i)| (10 * i + j) as f64);
        let c = DataArray::new(transposed.into_dyn(), ["lon", "lat"], "m").unwrap();
        let state = state_with(vec![("a", a), ("c", c)]);
        let schema = Schema::new().field("a", ["*"], "m").field("c", ["*"], "m");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert_eq!(raw["a"].to_owned_array(), raw["c"].to_owned_array());
        assert_eq!(
            raw["c"].to_owned_array().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]
        );
    }

    #[test]
    fn test_wildcard_broadcasts_missing_dimensions() {
        let ctx = Context::default();
        let a = DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lat", "lon"], "m").unwrap();
        let b = DataArray::new(arr1(&[1.0, 2.0]).into_dyn(), ["lat"], "m").unwrap();
        let state = state_with(vec![("a", a), ("b", b.clone())]);
        let schema = Schema::new().field("a", ["*"], "m").field("b", ["*"], "m");

        let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
        assert_eq!(raw["a"].shape(), vec![6]);
        assert_eq!(raw["b"].shape(), vec![6]);
        assert!(!raw["b"].ptr_eq(b.data()));
        assert_eq!(
            raw["b"].to_owned_array().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }
}
