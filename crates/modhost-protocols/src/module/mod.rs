//! Module protocol definitions.
//!
//! Modules are the independently packaged units the host loads and drives.

mod context;
mod descriptor;
mod handle;
mod state;
mod traits;

pub use context::*;
pub use descriptor::*;
pub use handle::*;
pub use state::*;
pub use traits::*;
