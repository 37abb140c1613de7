//! Matching field dimensions against dimension patterns.

use crate::array::{DataArray, FloatValue, SharedArray};
use crate::context::Context;
use crate::errors::{RESMError, RESMResult};
use crate::schema::Dim;
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::HashMap;
use tracing::trace;

/// The field dimensions claimed by each entry of a pattern, in collapse order.
pub(crate) type Groups = Vec<Vec<String>>;

/// Assigns every dimension of a field to one entry of `pattern`.
///
/// Named entries are matched first, then directions, then the wildcard takes
/// whatever is left in the field's own order. When `required` is given, the
/// flexible entries it lists must claim the same set of dimensions, and take
/// its ordering.
pub(crate) fn match_pattern(
    name: &str,
    field_dims: &[String],
    pattern: &[Dim],
    ctx: &Context,
    required: Option<&HashMap<Dim, Vec<String>>>,
) -> RESMResult<Groups> {
    let mut groups: Groups = vec![Vec::new(); pattern.len()];
    let mut claimed: Vec<&str> = Vec::new();

    for (i, dim) in pattern.iter().enumerate() {
        if let Dim::Named(dim_name) = dim {
            if !field_dims.contains(dim_name) {
                return Err(RESMError::dimension_mismatch(
                    name,
                    format!("required dimension '{dim_name}' is absent from {field_dims:?}"),
                ));
            }
            groups[i].push(dim_name.clone());
            claimed.push(dim_name);
        }
    }

    for (i, dim) in pattern.iter().enumerate() {
        if let Dim::Direction(direction) = dim {
            let names = ctx.direction_names(*direction);
            let matches: Vec<&String> = field_dims
                .iter()
                .filter(|d| names.contains(d) && !claimed.contains(&d.as_str()))
                .collect();
            if matches.len() > 1 {
                return Err(RESMError::dimension_mismatch(
                    name,
                    format!("dimensions {matches:?} all match direction '{dim}'"),
                ));
            }
            for m in matches {
                groups[i].push(m.clone());
                claimed.push(m);
            }
        }
    }

    let rest: Vec<String> = field_dims
        .iter()
        .filter(|d| !claimed.contains(&d.as_str()))
        .cloned()
        .collect();
    match pattern.iter().position(Dim::is_wildcard) {
        Some(i) => groups[i] = rest,
        None if !rest.is_empty() => {
            return Err(RESMError::dimension_mismatch(
                name,
                format!(
                    "dimension(s) {rest:?} are not allowed by the pattern [{}]",
                    pattern_string(pattern)
                ),
            ));
        }
        None => {}
    }

    if let Some(required) = required {
        for (i, dim) in pattern.iter().enumerate() {
            let Some(expected) = required.get(dim) else {
                continue;
            };
            let same_set = expected.len() == groups[i].len()
                && expected.iter().all(|d| groups[i].contains(d));
            if !same_set {
                return Err(RESMError::dimension_mismatch(
                    name,
                    format!(
                        "'{dim}' matches {:?}, which differs from the {expected:?} it must match",
                        groups[i]
                    ),
                ));
            }
            groups[i] = expected.clone();
        }
    }
    Ok(groups)
}

/// Flexible pattern entries and the dimensions they matched.
pub(crate) fn flexible_matches(pattern: &[Dim], groups: &Groups) -> HashMap<Dim, Vec<String>> {
    pattern
        .iter()
        .zip(groups)
        .filter(|(dim, _)| dim.is_flexible())
        .map(|(dim, group)| (dim.clone(), group.clone()))
        .collect()
}

pub(crate) fn pattern_string(pattern: &[Dim]) -> String {
    pattern
        .iter()
        .map(Dim::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reorders and reshapes `field` so each group becomes one axis.
///
/// Group dimensions the field lacks are broadcast, taking their length from
/// `lengths`. The field's own buffer is returned when it already has the
/// target layout.
pub(crate) fn collapse(
    field: &DataArray,
    groups: &Groups,
    lengths: &HashMap<String, usize>,
) -> RESMResult<SharedArray> {
    let len_of = |d: &str| {
        field
            .dim_len(d)
            .or_else(|| lengths.get(d).copied())
            .unwrap_or(1)
    };
    let order: Vec<&String> = groups.iter().flatten().collect();
    let full_shape: Vec<usize> = order.iter().map(|d| len_of(d.as_str())).collect();
    let shape: Vec<usize> = groups
        .iter()
        .map(|group| group.iter().map(|d| len_of(d.as_str())).product())
        .collect();

    let in_order = order.iter().map(|d| d.as_str()).eq(field.dims().iter().map(String::as_str));
    if in_order && shape == field.shape() {
        trace!("Sharing buffer of {:?} without copying", field.dims());
        return Ok(field.data().clone());
    }

    let permutation: Vec<usize> = order
        .iter()
        .filter_map(|d| field.dims().iter().position(|own| own == *d))
        .collect();
    let data = field.data().read();
    let mut view = data.view().permuted_axes(permutation);
    for (axis, d) in order.iter().enumerate() {
        if field.dim_len(d).is_none() {
            view = view.insert_axis(Axis(axis));
        }
    }
    let broadcast = view.broadcast(IxDyn(&full_shape)).ok_or_else(|| {
        RESMError::InvalidPropertyDict(format!(
            "cannot broadcast {:?} to {order:?}",
            field.dims()
        ))
    })?;
    let values: Vec<FloatValue> = broadcast.iter().copied().collect();
    reshape(values, &shape, "collapse")
}

/// Lays `values` (in logical order) out with `shape`.
pub(crate) fn reshape(values: Vec<FloatValue>, shape: &[usize], what: &str) -> RESMResult<SharedArray> {
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(RESMError::InvalidPropertyDict(format!(
            "cannot {what} {} values into shape {shape:?}",
            values.len()
        )));
    }
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map(SharedArray::new)
        .map_err(|e| RESMError::InvalidPropertyDict(format!("cannot {what} into {shape:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Direction;
    use ndarray::Array;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn pattern(names: &[&str]) -> Vec<Dim> {
        names.iter().map(|n| Dim::from(*n)).collect()
    }

    #[test]
    fn test_wildcard_takes_remaining_in_field_order() {
        let ctx = Context::default();
        let groups = match_pattern(
            "q",
            &dims(&["lat", "mid_levels", "lon"]),
            &pattern(&["*", "mid_levels"]),
            &ctx,
            None,
        )
        .unwrap();
        assert_eq!(groups, vec![dims(&["lat", "lon"]), dims(&["mid_levels"])]);
    }

    #[test]
    fn test_missing_literal_dimension() {
        let ctx = Context::default();
        let err = match_pattern("q", &dims(&["lat"]), &pattern(&["*", "mid_levels"]), &ctx, None)
            .unwrap_err();
        assert!(matches!(err, RESMError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_unmatched_dimension_without_wildcard() {
        let ctx = Context::default();
        let err = match_pattern("q", &dims(&["lat", "lon"]), &pattern(&["lat"]), &ctx, None)
            .unwrap_err();
        assert!(matches!(err, RESMError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_direction_matches_registered_name_or_nothing() {
        let mut ctx = Context::default();
        ctx.set_direction_names(Direction::Z, &["mid_levels", "interface_levels"]);

        let groups =
            match_pattern("q", &dims(&["mid_levels"]), &pattern(&["*", "z"]), &ctx, None).unwrap();
        assert_eq!(groups, vec![dims(&[]), dims(&["mid_levels"])]);

        let groups = match_pattern("q", &dims(&["lat"]), &pattern(&["*", "z"]), &ctx, None).unwrap();
        assert_eq!(groups, vec![dims(&["lat"]), dims(&[])]);

        let err = match_pattern(
            "q",
            &dims(&["mid_levels", "interface_levels"]),
            &pattern(&["z"]),
            &ctx,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RESMError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_required_matches_impose_order() {
        let ctx = Context::default();
        let required: HashMap<Dim, Vec<String>> =
            [(Dim::Wildcard, dims(&["lon", "lat"]))].into_iter().collect();
        let groups = match_pattern(
            "q",
            &dims(&["lat", "lon"]),
            &pattern(&["*"]),
            &ctx,
            Some(&required),
        )
        .unwrap();
        assert_eq!(groups, vec![dims(&["lon", "lat"])]);

        let err = match_pattern("q", &dims(&["lat"]), &pattern(&["*"]), &ctx, Some(&required))
            .unwrap_err();
        assert!(matches!(err, RESMError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_collapse_transposes_then_flattens() {
        // dims (mid_levels=2, lat=3)
        let values = Array::from_shape_vec((2, 3), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0])
            .unwrap()
            .into_dyn();
        let field = DataArray::new(values, ["mid_levels", "lat"], "m").unwrap();
        let groups = vec![dims(&["lat"]), dims(&["mid_levels"])];
        let raw = collapse(&field, &groups, &HashMap::new()).unwrap();
        assert!(!raw.ptr_eq(field.data()));
        assert_eq!(raw.shape(), vec![3, 2]);
        assert_eq!(
            raw.to_owned_array().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]
        );
    }

    #[test]
    fn test_collapse_shares_when_layout_matches() {
        let field = DataArray::new(Array::zeros((2, 3)).into_dyn(), ["lat", "lon"], "m").unwrap();
        let raw = collapse(&field, &vec![dims(&["lat"]), dims(&["lon"])], &HashMap::new()).unwrap();
        assert!(raw.ptr_eq(field.data()));
    }

    #[test]
    fn test_collapse_inserts_length_one_axis() {
        let field = DataArray::new(Array::zeros(4).into_dyn(), ["lat"], "m").unwrap();
        let raw = collapse(&field, &vec![dims(&["lat"]), dims(&[])], &HashMap::new()).unwrap();
        assert_eq!(raw.shape(), vec![4, 1]);
    }

    #[test]
    fn test_collapse_broadcasts_missing_dimensions() {
        let field = DataArray::new(ndarray::arr1(&[1.0, 2.0]).into_dyn(), ["lat"], "m").unwrap();
        let lengths: HashMap<String, usize> = [("lon".to_string(), 3)].into();
        let raw = collapse(&field, &vec![dims(&["lon", "lat"])], &lengths).unwrap();
        assert_eq!(raw.shape(), vec![6]);
        assert_eq!(
            raw.to_owned_array().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
        );
    }
}
