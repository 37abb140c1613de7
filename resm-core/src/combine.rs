//! Merging the schemas of several components into one.

use crate::errors::{RESMError, RESMResult};
use crate::schema::{Dim, Schema};
use crate::units::Unit;
use tracing::warn;

/// A pattern both `a` and `b` can be extracted with.
///
/// - Equal patterns combine to themselves.
/// - Two wildcard patterns combine to `*` followed by the union of their other entries.
/// - A wildcard pattern combines with a wildcard-free one when its other entries
///   are a subset of it, giving the wildcard-free pattern.
/// - Two wildcard-free patterns must list the same entries.
pub fn combine_dims(a: &[Dim], b: &[Dim]) -> RESMResult<Vec<Dim>> {
    if a == b {
        return Ok(a.to_vec());
    }
    let fixed = |dims: &[Dim]| -> Vec<Dim> {
        dims.iter().filter(|d| !d.is_wildcard()).cloned().collect()
    };
    let subset = |small: &[Dim], large: &[Dim]| small.iter().all(|d| large.contains(d));
    let incompatible = || {
        RESMError::InvalidPropertyDict(format!(
            "dims {a:?} and {b:?} cannot be combined"
        ))
    };

    let a_wild = a.iter().any(Dim::is_wildcard);
    let b_wild = b.iter().any(Dim::is_wildcard);
    match (a_wild, b_wild) {
        (true, true) => {
            let mut combined = vec![Dim::Wildcard];
            for dim in fixed(a).into_iter().chain(fixed(b)) {
                if !combined.contains(&dim) {
                    combined.push(dim);
                }
            }
            Ok(combined)
        }
        (true, false) if subset(&fixed(a), b) => Ok(b.to_vec()),
        (false, true) if subset(&fixed(b), a) => Ok(a.to_vec()),
        (false, false) if a.len() == b.len() && subset(a, b) => Ok(a.to_vec()),
        _ => Err(incompatible()),
    }
}

/// Union of `schemas`, first declaration first.
///
/// A field declared more than once keeps its first units and alias; later
/// declarations must have compatible units and combinable dims.
pub fn combine_properties<'s, I>(schemas: I) -> RESMResult<Schema>
where
    I: IntoIterator<Item = &'s Schema>,
{
    let mut combined = Schema::new();
    for schema in schemas {
        for (name, properties) in schema {
            let Some(existing) = combined.get(name) else {
                combined.insert(name, properties.clone());
                continue;
            };
            if !units_compatible(&existing.units, &properties.units) {
                return Err(RESMError::InvalidPropertyDict(format!(
                    "'{name}' is declared in incompatible units '{}' and '{}'",
                    existing.units, properties.units
                )));
            }
            let dims = match (&existing.dims, &properties.dims) {
                (Some(a), Some(b)) => Some(combine_dims(a, b).map_err(|e| {
                    RESMError::InvalidPropertyDict(format!("'{name}': {e}"))
                })?),
                (Some(a), None) => Some(a.clone()),
                (None, b) => b.clone(),
            };
            let mut merged = existing.clone();
            merged.dims = dims;
            combined.insert(name, merged);
        }
    }
    Ok(combined)
}

/// Names declared in more than one of `schemas`, sorted.
pub fn shared_names<'s, I>(schemas: I) -> Vec<String>
where
    I: IntoIterator<Item = &'s Schema>,
{
    let mut seen: Vec<&String> = Vec::new();
    let mut shared: Vec<String> = Vec::new();
    for schema in schemas {
        for name in schema.names() {
            if seen.contains(&name) {
                if !shared.contains(name) {
                    shared.push(name.clone());
                }
            } else {
                seen.push(name);
            }
        }
    }
    shared.sort();
    shared
}

fn units_compatible(a: &str, b: &str) -> bool {
    match (Unit::parse(a), Unit::parse(b)) {
        (Ok(a), Ok(b)) => a.is_compatible(&b),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot compare units '{a}' and '{b}': {e}");
            false
        }
    }
}
