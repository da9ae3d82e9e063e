pub mod periodic_executor;
pub use periodic_executor::{PeriodicExecutor, TaskControl, TaskHandle};
