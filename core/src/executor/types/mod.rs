pub mod options;
pub mod result;
pub mod task;

pub use options::*;
pub use result::*;
pub use task::*;
