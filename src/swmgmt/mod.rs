//! LwM2M Software Management Module
//!
//! Shares the hooks of software management object instances between the
//! subsystems that take part in them.

mod agent;
mod object;
mod registry;

pub use agent::Agent;
pub use object::{set_activate_state, set_pkg_name, set_pkg_version};
pub use registry::Registry;
