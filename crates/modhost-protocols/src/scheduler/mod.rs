//! Scheduler protocol definitions.
//!
//! Modules schedule work against a virtual tick clock. The concrete driver
//! lives in `modhost-scheduler`; this module only defines the contract and
//! the shared task record.

mod handle;
mod task;
mod traits;

pub use handle::*;
pub use task::*;
pub use traits::*;
