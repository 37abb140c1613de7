//! Property resolution seen through component calls.

use ndarray::{arr1, Array, ArrayD, IxDyn};
use proptest::prelude::*;
use resm_core::component::TendencyComponent;
use resm_core::context::Context;
use resm_core::errors::{RESMError, RESMResult};
use resm_core::resolver::{PropertyResolver, RawArrays};
use resm_core::schema::{Direction, FieldProperties, Schema};
use resm_core::time::ModelTime;
use resm_core::{DataArray, SharedArray, State};

/// Returns zero tendencies under a fixed set of raw names.
struct Returns {
    inputs: Schema,
    tendencies: Schema,
    diagnostics: Schema,
    keys: Vec<&'static str>,
}

impl Returns {
    fn new(keys: &[&'static str]) -> Self {
        Self {
            inputs: Schema::new().field("air_temperature", ["*"], "degK"),
            tendencies: Schema::new()
                .field("air_temperature", ["*"], "degK s^-1")
                .field("eastward_wind", ["*"], "m s^-2"),
            diagnostics: Schema::new(),
            keys: keys.to_vec(),
        }
    }
}

impl TendencyComponent for Returns {
    fn input_properties(&self) -> &Schema {
        &self.inputs
    }

    fn tendency_properties(&self) -> &Schema {
        &self.tendencies
    }

    fn diagnostic_properties(&self) -> &Schema {
        &self.diagnostics
    }

    fn array_call(&self, inputs: &RawArrays) -> RESMResult<(RawArrays, RawArrays)> {
        let shape = inputs["air_temperature"].shape();
        let tendencies = self
            .keys
            .iter()
            .map(|k| (k.to_string(), SharedArray::new(ArrayD::zeros(shape.clone()))))
            .collect();
        Ok((tendencies, RawArrays::new()))
    }
}

fn state() -> State {
    let mut state = State::with_time(ModelTime::from_seconds(0));
    state
        .insert(
            "air_temperature",
            DataArray::new(arr1(&[280.0, 290.0, 300.0]).into_dyn(), ["lat"], "degK").unwrap(),
        )
        .unwrap();
    state
        .insert(
            "eastward_wind",
            DataArray::new(arr1(&[1.0, 2.0, 3.0]).into_dyn(), ["lat"], "m s^-1").unwrap(),
        )
        .unwrap();
    state
}

#[test]
fn test_missing_output_is_reported() {
    let ctx = Context::default();
    let result = Returns::new(&["air_temperature"]).call(&state(), &ctx);
    match result {
        Err(RESMError::ComponentMissingOutput { component, names }) => {
            assert_eq!(component, "Returns");
            assert_eq!(names, vec!["eastward_wind"]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_extra_output_is_reported() {
    let ctx = Context::default();
    let result = Returns::new(&["air_temperature", "eastward_wind", "surprise"]).call(&state(), &ctx);
    match result {
        Err(RESMError::ComponentExtraOutput { names, .. }) => assert_eq!(names, vec!["surprise"]),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_missing_input_names_component() {
    let ctx = Context::default();
    let mut state = State::with_time(ModelTime::from_seconds(0));
    state
        .insert(
            "eastward_wind",
            DataArray::new(arr1(&[1.0]).into_dyn(), ["lat"], "m s^-1").unwrap(),
        )
        .unwrap();
    match Returns::new(&[]).call(&state, &ctx) {
        Err(RESMError::MissingInput { name, component }) => {
            assert_eq!(name, "air_temperature");
            assert_eq!(component.as_deref(), Some("Returns"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_extraction_aliasing() {
    let ctx = Context::default();
    let state = state();
    let resolver = PropertyResolver::new(&ctx);

    let same = Schema::new().field("air_temperature", ["*"], "degK");
    let raw = resolver.extract(&state, &same).unwrap();
    assert!(raw["air_temperature"].ptr_eq(state["air_temperature"].data()));

    // A write through the raw array is a write into the state
    raw["air_temperature"].write()[[0]] = 0.0;
    assert_eq!(state["air_temperature"].values()[[0]], 0.0);

    let converted = Schema::new().field("air_temperature", ["*"], "degC");
    let raw = resolver.extract(&state, &converted).unwrap();
    assert!(!raw["air_temperature"].ptr_eq(state["air_temperature"].data()));
}

#[test]
fn test_extraction_by_alias() {
    let ctx = Context::default();
    let schema = Schema::new().with_field(
        "air_temperature",
        FieldProperties::new(["*"], "degK").with_alias("T"),
    );
    let raw = PropertyResolver::new(&ctx).extract(&state(), &schema).unwrap();
    assert!(raw.contains_key("T"));
    assert!(!raw.contains_key("air_temperature"));
}

#[test]
fn test_match_dims_like_mismatch() {
    let ctx = Context::default();
    let mut state = State::new();
    state
        .insert(
            "air_temperature",
            DataArray::new(Array::zeros(3).into_dyn(), ["lat"], "degK").unwrap(),
        )
        .unwrap();
    state
        .insert(
            "air_pressure",
            DataArray::new(Array::zeros(4).into_dyn(), ["lon"], "Pa").unwrap(),
        )
        .unwrap();
    let schema = Schema::new()
        .field("air_temperature", ["*"], "degK")
        .with_field(
            "air_pressure",
            FieldProperties::new(["*"], "Pa").with_match_dims_like("air_temperature"),
        );
    let result = PropertyResolver::new(&ctx).extract(&state, &schema);
    assert!(matches!(result, Err(RESMError::DimensionMismatch { .. })));
}

#[test]
fn test_direction_token_collapses_registered_names() {
    let mut ctx = Context::default();
    ctx.set_direction_names(Direction::Z, &["mid_levels"]);
    let mut state = State::new();
    let values = Array::from_shape_fn((2, 3), |(i, j)| (10 * i + j) as f64);
    state
        .insert(
            "air_temperature",
            DataArray::new(values.into_dyn(), ["mid_levels", "lat"], "degK").unwrap(),
        )
        .unwrap();
    let schema = Schema::new().field("air_temperature", ["*", "z"], "degK");
    let raw = PropertyResolver::new(&ctx).extract(&state, &schema).unwrap();
    let t = raw["air_temperature"].to_owned_array();
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t[[2, 1]], 12.0);
}

proptest! {
    #[test]
    fn extract_restore_round_trip(
        shape in prop::collection::vec(1usize..4, 1..=4),
        named in 0usize..4,
    ) {
        let ctx = Context::default();
        let ndim = shape.len();
        let dims: Vec<String> = (0..ndim).map(|i| format!("d{i}")).collect();
        let size: usize = shape.iter().product();
        let values = ArrayD::from_shape_vec(IxDyn(&shape), (0..size).map(|i| i as f64).collect())
            .unwrap();
        let field = DataArray::new(values, dims.clone(), "m").unwrap();
        let mut state = State::new();
        state.insert("height", field.clone()).unwrap();

        // Trailing dims named in reverse order, the wildcard takes the rest
        let named = named % ndim;
        let mut pattern = vec!["*".to_string()];
        pattern.extend(dims.iter().rev().take(named).cloned());
        let schema = Schema::new().field("height", pattern, "m");

        let resolver = PropertyResolver::new(&ctx);
        let raw = resolver.extract(&state, &schema).unwrap();
        prop_assert_eq!(raw["height"].ndim(), named + 1);

        let outputs = Schema::new().with_field("height", FieldProperties::with_units("m"));
        let restored = resolver.restore(&raw, &outputs, &state, &schema).unwrap();
        prop_assert_eq!(restored["height"].dims(), field.dims());
        prop_assert_eq!(restored["height"].values(), field.values());
    }
}
