mod constant;
pub mod relaxation;

pub use constant::{ConstantDiagnosticComponent, ConstantTendencyComponent};
pub use relaxation::{RelaxationParameters, RelaxationTendencyComponent};
