use thiserror::Error;

/// Error type for invalid operations.
///
/// Every failure is a programming or configuration error raised before any
/// partial result is produced.
#[derive(Error, Debug)]
pub enum RESMError {
    #[error("Missing input quantity '{name}'{}", in_component(.component))]
    MissingInput {
        name: String,
        component: Option<String>,
    },
    #[error("Cannot convert '{name}' from '{from}' to '{to}'")]
    IncompatibleUnits {
        name: String,
        from: String,
        to: String,
    },
    #[error("Dimension mismatch for '{name}': {reason}")]
    DimensionMismatch { name: String, reason: String },
    #[error("Component {component} did not compute output(s) {}", .names.join(", "))]
    ComponentMissingOutput {
        component: String,
        names: Vec<String>,
    },
    #[error("Component {component} computed undeclared output(s) {}", .names.join(", "))]
    ComponentExtraOutput {
        component: String,
        names: Vec<String>,
    },
    #[error("Invalid property dictionary: {0}")]
    InvalidPropertyDict(String),
    #[error("Quantities are output by more than one component: {}", .names.join(", "))]
    SharedKey { names: Vec<String> },
    #[error("State has no time value")]
    MissingTime,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid unit '{unit}': {reason}")]
    InvalidUnit { unit: String, reason: String },
    #[error("Timestep changed from {expected}s to {got}s; this scheme requires a constant timestep")]
    TimestepMismatch { expected: f64, got: f64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Component {component} does not implement array_call; call it with a state instead")]
    ArrayCallUnsupported { component: String },
    #[error("Could not read configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn in_component(component: &Option<String>) -> String {
    match component {
        Some(name) => format!(" for component {name}"),
        None => String::new(),
    }
}

impl RESMError {
    pub(crate) fn dimension_mismatch(name: &str, reason: impl Into<String>) -> Self {
        RESMError::DimensionMismatch {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Attributes a missing input to `component`.
    pub(crate) fn for_component(self, component: &str) -> Self {
        match self {
            RESMError::MissingInput { name, component: None } => RESMError::MissingInput {
                name,
                component: Some(component.to_string()),
            },
            other => other,
        }
    }
}

/// Convenience type for `Result<T, RESMError>`.
pub type RESMResult<T> = Result<T, RESMError>;
