use super::extract::{wildcard_matches_of, Matched};
use super::wildcard::reshape;
use super::{output_raw_name, PropertyResolver, RawArrays, WildcardMatches};
use crate::array::{DataArray, FloatValue, SharedArray};
use crate::errors::{RESMError, RESMResult};
use crate::schema::{Dim, FieldProperties, Schema};
use crate::state::{Fields, State};
use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};
use tracing::trace;

impl<'a> PropertyResolver<'a> {
    /// Tags raw outputs with dimensions and units again.
    ///
    /// An output restores like its reference input (`dims_like`, or the
    /// same-named input when it declares no other dims): collapsed axes are
    /// expanded to the dimensions the reference matched and put back in the
    /// reference's own order. Other outputs use their declared dims, with the
    /// wildcard expanded to the wildcard matches of `reference_schema` over
    /// `reference_state`. The declared units are attached without conversion.
    pub fn restore(
        &self,
        raw: &RawArrays,
        schema: &Schema,
        reference_state: &State,
        reference_schema: &Schema,
    ) -> RESMResult<Fields> {
        let matched = self.match_fields(reference_state, reference_schema)?;
        let wildcard = wildcard_matches_of(&matched);

        let mut out = Fields::with_capacity(schema.len());
        for (name, properties) in schema {
            let raw_name = output_raw_name(name, schema, reference_schema);
            let array = raw.get(raw_name).ok_or_else(|| {
                RESMError::InvalidPropertyDict(format!(
                    "no raw output '{raw_name}' to restore '{name}' from"
                ))
            })?;

            let restored = match reference_for(name, properties, reference_schema, &matched)? {
                Some(reference) => restore_like(name, array, reference, &wildcard)?,
                None => restore_with_dims(name, array, properties, &wildcard)?,
            };
            let (data, dims) = restored;
            out.insert(name.clone(), DataArray::from_shared(data, dims, &properties.units)?);
        }
        Ok(out)
    }
}

fn reference_for<'m, 's>(
    name: &str,
    properties: &FieldProperties,
    reference_schema: &Schema,
    matched: &'m IndexMap<String, Matched<'s>>,
) -> RESMResult<Option<&'m Matched<'s>>> {
    if let Some(other) = &properties.dims_like {
        return matched.get(other).map(Some).ok_or_else(|| {
            RESMError::InvalidPropertyDict(format!(
                "'{name}' has dims like '{other}', which is not an input"
            ))
        });
    }
    let same_pattern = match (&properties.dims, reference_schema.get(name)) {
        (None, _) => true,
        (Some(dims), Some(input)) => input.dims.as_ref() == Some(dims),
        (Some(_), None) => false,
    };
    Ok(if same_pattern { matched.get(name) } else { None })
}

/// Expands `array` to the dimensions matched by `reference`.
///
/// The result takes the reference's own dimension order, followed by any
/// dimensions the reference was broadcast along.
fn restore_like(
    name: &str,
    array: &SharedArray,
    reference: &Matched<'_>,
    wildcard: &WildcardMatches,
) -> RESMResult<(SharedArray, Vec<String>)> {
    let field = reference.field;
    let expanded: Vec<&String> = reference.groups.iter().flatten().collect();
    let expanded_shape: Vec<usize> = expanded
        .iter()
        .map(|d| {
            field
                .dim_len(d)
                .or_else(|| wildcard.lengths.get(d.as_str()).copied())
                .unwrap_or(1)
        })
        .collect();
    let mut target_dims = field.dims().to_vec();
    for d in &expanded {
        if !target_dims.contains(*d) {
            target_dims.push((*d).clone());
        }
    }

    let raw_shape = array.shape();
    let in_order = expanded.iter().map(|d| d.as_str()).eq(target_dims.iter().map(String::as_str));
    if in_order && raw_shape == expanded_shape {
        trace!("Restoring '{name}' on its raw buffer");
        return Ok((array.clone(), target_dims));
    }

    let expected: usize = expanded_shape.iter().product();
    let found: usize = raw_shape.iter().product();
    if expected != found {
        return Err(RESMError::InvalidPropertyDict(format!(
            "'{name}' has shape {raw_shape:?}, which cannot be restored to {expanded_shape:?} \
             dimensions {expanded:?}"
        )));
    }

    let values: Vec<FloatValue> = array.read().iter().copied().collect();
    let laid_out = ArrayD::from_shape_vec(IxDyn(&expanded_shape), values)
        .map_err(|e| RESMError::InvalidPropertyDict(format!("cannot restore '{name}': {e}")))?;
    let permutation: Vec<usize> = target_dims
        .iter()
        .filter_map(|d| expanded.iter().position(|e| *e == d))
        .collect();
    let restored = laid_out
        .permuted_axes(permutation)
        .as_standard_layout()
        .into_owned();
    Ok((SharedArray::new(restored), target_dims))
}

/// Lays `array` out with the output's own declared dims.
fn restore_with_dims(
    name: &str,
    array: &SharedArray,
    properties: &FieldProperties,
    wildcard: &WildcardMatches,
) -> RESMResult<(SharedArray, Vec<String>)> {
    let pattern = properties.dims.as_ref().ok_or_else(|| {
        RESMError::InvalidPropertyDict(format!(
            "output '{name}' declares no dims and has no input to restore like"
        ))
    })?;
    let raw_shape = array.shape();
    if raw_shape.len() != pattern.len() {
        return Err(RESMError::InvalidPropertyDict(format!(
            "'{name}' has shape {raw_shape:?}, which does not fit dims [{}]",
            super::wildcard::pattern_string(pattern)
        )));
    }

    let mut dims: Vec<String> = Vec::with_capacity(pattern.len());
    let mut shape: Vec<usize> = Vec::with_capacity(pattern.len());
    for (dim, len) in pattern.iter().zip(&raw_shape) {
        match dim {
            Dim::Wildcard => {
                for matched in &wildcard.names {
                    dims.push(matched.clone());
                    shape.push(wildcard.lengths.get(matched).copied().unwrap_or(1));
                }
                if wildcard.collapsed_len() != *len {
                    return Err(RESMError::InvalidPropertyDict(format!(
                        "'{name}' has {len} values along '*', but the inputs matched {:?} ({} values)",
                        wildcard.names,
                        wildcard.collapsed_len()
                    )));
                }
            }
            other => {
                let dim_name = other.as_str();
                if let Some(expected) = wildcard.lengths.get(dim_name) {
                    if expected != len {
                        return Err(RESMError::InvalidPropertyDict(format!(
                            "dimension '{dim_name}' of '{name}' has length {len}, but {expected} in the inputs"
                        )));
                    }
                }
                dims.push(dim_name.to_string());
                shape.push(*len);
            }
        }
    }

    if shape == raw_shape {
        return Ok((array.clone(), dims));
    }
    let values: Vec<FloatValue> = array.read().iter().copied().collect();
    Ok((reshape(values, &shape, "restore")?, dims))
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
    fn test_restore_round_trip_transposed() {
        let mut ctx = Context::default();
        ctx.set_direction_names(Direction::Z, &["mid_levels"]);
        let values = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (100 * i + 10 * j + k) as f64);
        let q = DataArray::new(values.into_dyn(), ["lat", "mid_levels", "lon"], "kg/kg").unwrap();
        let state = state_with(vec![("specific_humidity", q.clone())]);
        let schema = Schema::new().field("specific_humidity", ["*", "z"], "kg/kg");

        let resolver = PropertyResolver::new(&ctx);
        let raw = resolver.extract(&state, &schema).unwrap();
        let restored = resolver.restore(&raw, &schema, &state, &schema).unwrap();
        let restored = &restored["specific_humidity"];
        assert_eq!(restored.dims(), q.dims());
        assert_eq!(restored.values(), q.values());
        assert_eq!(restored.units(), "kg/kg");
    }

    #[test]
    fn test_restore_shares_raw_buffer() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[1.0, 2.0]).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let inputs = Schema::new().field("air_temperature", ["*"], "degK");
        let outputs = Schema::new().field("air_temperature", ["*"], "degK s^-1");

        let raw: RawArrays = [(
            "air_temperature".to_string(),
            SharedArray::new(arr1(&[0.1, 0.2]).into_dyn()),
        )]
        .into_iter()
        .collect();
        let restored = PropertyResolver::new(&ctx)
            .restore(&raw, &outputs, &state, &inputs)
            .unwrap();
        assert!(restored["air_temperature"]
            .data()
            .ptr_eq(&raw["air_temperature"]));
        assert_eq!(restored["air_temperature"].units(), "degK s^-1");
    }

    #[test]
    fn test_restore_dims_like() {
        let ctx = Context::default();
        let t = DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lon", "lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let inputs = Schema::new().field("air_temperature", ["*"], "degK");
        let outputs = Schema::new().with_field(
            "heating_rate",
            FieldProperties::with_units("degK day^-1").with_dims_like("air_temperature"),
        );
        let raw: RawArrays = [(
            "heating_rate".to_string(),
            SharedArray::new(Array::from_shape_fn(6, |i| i as f64).into_dyn()),
        )]
        .into_iter()
        .collect();

        let restored = PropertyResolver::new(&ctx)
            .restore(&raw, &outputs, &state, &inputs)
            .unwrap();
        let heating = &restored["heating_rate"];
        assert_eq!(heating.dims(), &["lon".to_string(), "lat".to_string()]);
        assert_eq!(heating.shape(), vec![2, 3]);
        assert_eq!(heating.values()[[1, 0]], 3.0);
    }

    #[test]
    fn test_restore_size_mismatch() {
        let ctx = Context::default();
        let t = DataArray::new(Array::zeros(3).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let inputs = Schema::new().field("air_temperature", ["*"], "degK");
        let raw: RawArrays = [(
            "air_temperature".to_string(),
            SharedArray::new(Array::zeros(4).into_dyn()),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            PropertyResolver::new(&ctx).restore(&raw, &inputs, &state, &inputs),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_restore_new_output_with_wildcard() {
        let ctx = Context::default();
        let t = DataArray::new(Array::zeros((2, 3, 5)).into_dyn(), ["lat", "lon", "levels"], "degK")
            .unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let inputs = Schema::new().field("air_temperature", ["*", "levels"], "degK");
        let outputs = Schema::new().field("surface_flux", ["*"], "W m^-2");
        let raw: RawArrays = [(
            "surface_flux".to_string(),
            SharedArray::new(Array::zeros(6).into_dyn()),
        )]
        .into_iter()
        .collect();

        let restored = PropertyResolver::new(&ctx)
            .restore(&raw, &outputs, &state, &inputs)
            .unwrap();
        let flux = &restored["surface_flux"];
        assert_eq!(flux.dims(), &["lat".to_string(), "lon".to_string()]);
        assert_eq!(flux.shape(), vec![2, 3]);
    }

    #[test]
    fn test_restore_requires_dims_or_reference() {
        let ctx = Context::default();
        let outputs = Schema::new().with_field("surface_flux", FieldProperties::with_units("W m^-2"));
        let raw: RawArrays = [(
            "surface_flux".to_string(),
            SharedArray::new(Array::zeros(6).into_dyn()),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            PropertyResolver::new(&ctx).restore(&raw, &outputs, &State::new(), &Schema::new()),
            Err(RESMError::InvalidPropertyDict(_))
        ));
    }

    #[test]
    fn test_restore_uses_input_alias() {
        let ctx = Context::default();
        let t = DataArray::new(arr1(&[1.0]).into_dyn(), ["lat"], "degK").unwrap();
        let state = state_with(vec![("air_temperature", t)]);
        let inputs = Schema::new().with_field(
            "air_temperature",
            FieldProperties::new(["*"], "degK").with_alias("T"),
        );
        let outputs = Schema::new().field("air_temperature", ["*"], "degK s^-1");
        let raw: RawArrays = [("T".to_string(), SharedArray::new(arr1(&[0.5]).into_dyn()))]
            .into_iter()
            .collect();
        let restored = PropertyResolver::new(&ctx)
            .restore(&raw, &outputs, &state, &inputs)
            .unwrap();
        assert_eq!(restored["air_temperature"].item().unwrap(), 0.5);
    }

    #[test]
    fn test_restore_like_broadcast_input() {
        let ctx = Context::default();
        let a = DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lat", "lon"], "m").unwrap();
        let b = DataArray::new(arr1(&[1.0, 2.0]).into_dyn(), ["lon"], "m").unwrap();
        let state = state_with(vec![("a", a), ("b", b)]);
        let schema = Schema::new().field("a", ["*"], "m").field("b", ["*"], "m");

        let resolver = PropertyResolver::new(&ctx);
        let err = resolver.extract(&state, &schema);
        assert!(matches!(err, Err(RESMError::DimensionMismatch { .. })));

        let b = DataArray::new(arr1(&[1.0, 2.0, 3.0]).into_dyn(), ["lon"], "m").unwrap();
        let state = state_with(vec![
            ("a", DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lat", "lon"], "m").unwrap()),
            ("b", b),
        ]);
        let raw = resolver.extract(&state, &schema).unwrap();
        let restored = resolver.restore(&raw, &schema, &state, &schema).unwrap();
        let b = &restored["b"];
        assert_eq!(b.dims(), &["lon".to_string(), "lat".to_string()]);
        assert_eq!(b.shape(), vec![3, 2]);
        assert_eq!(b.values()[[2, 1]], 3.0);
    }
}
