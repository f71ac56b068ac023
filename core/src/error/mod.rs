pub mod executor;
pub mod kind;
pub mod task;

pub use executor::ExecutorError;
pub use kind::ErrorKind;
pub use task::{TaskError, TaskErrorInfo};
