//! The AIR (abstract intermediate representation).

pub mod compiler;
pub mod node;

pub use compiler::Compiler;
pub use node::{AirNode, CaptureSource, ClosureTemplate, ShortCircuitKind, SwitchArmAir};
