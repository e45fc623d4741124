pub mod coordinator;
pub mod debounce;
pub mod state;

pub use coordinator::MonitoringCoordinator;
pub use debounce::Debouncer;
pub use state::{MonitoringState, OperationClock};
