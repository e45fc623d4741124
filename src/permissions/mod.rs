pub mod gate;

pub use gate::{GateStatus, PermissionGate};
