//! Software Management Shared Types
//!
//! This crate provides the object definitions, error types and install state
//! machine shared between the LwM2M software management registry, the engine
//! abstraction and the hardware-specific firmware drivers.

pub mod error;
pub mod state_machine;

pub use error::{EngineError, SwMgmtError};

/// LwM2M object id of the Software Management object
pub const SOFTWARE_MANAGEMENT_OBJECT_ID: u16 = 9;

/// Resource ids of the Software Management object used by this crate
pub mod resource {
    /// Package name (string)
    pub const PKG_NAME: u16 = 0;
    /// Package version (string)
    pub const PKG_VERSION: u16 = 1;
    /// Package (write-only opaque payload)
    pub const PACKAGE: u16 = 2;
    /// Install (execute)
    pub const INSTALL: u16 = 4;
    /// Uninstall (execute)
    pub const UNINSTALL: u16 = 6;
    /// Update state (integer)
    pub const UPDATE_STATE: u16 = 7;
    /// Update result (integer)
    pub const UPDATE_RESULT: u16 = 9;
    /// Activate (execute)
    pub const ACTIVATE: u16 = 10;
    /// Deactivate (execute)
    pub const DEACTIVATE: u16 = 11;
    /// Activation state (boolean)
    pub const ACTIVATION_STATE: u16 = 12;
}

/// Build the path of a resource on a software management instance, e.g. `9/3/12`
pub fn resource_path(obj_inst: u16, res_id: u16) -> String {
    format!("{}/{}/{}", SOFTWARE_MANAGEMENT_OBJECT_ID, obj_inst, res_id)
}

/// Build the path of a resource instance, e.g. `9/3/1/0`
pub fn resource_instance_path(obj_inst: u16, res_id: u16, res_inst: u16) -> String {
    format!(
        "{}/{}/{}/{}",
        SOFTWARE_MANAGEMENT_OBJECT_ID, obj_inst, res_id, res_inst
    )
}

/// Events delivered to software management agents.
///
/// Each one corresponds to an executable resource of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwMgmtEvent {
    Activate,
    Deactivate,
    Install,
    Uninstall,
}

impl SwMgmtEvent {
    /// All events, in resource order
    pub const ALL: [SwMgmtEvent; 4] = [
        SwMgmtEvent::Activate,
        SwMgmtEvent::Deactivate,
        SwMgmtEvent::Install,
        SwMgmtEvent::Uninstall,
    ];

    /// Executable resource that raises this event
    pub fn resource_id(self) -> u16 {
        match self {
            SwMgmtEvent::Activate => resource::ACTIVATE,
            SwMgmtEvent::Deactivate => resource::DEACTIVATE,
            SwMgmtEvent::Install => resource::INSTALL,
            SwMgmtEvent::Uninstall => resource::UNINSTALL,
        }
    }
}

impl std::fmt::Display for SwMgmtEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwMgmtEvent::Activate => write!(f, "activate"),
            SwMgmtEvent::Deactivate => write!(f, "deactivate"),
            SwMgmtEvent::Install => write!(f, "install"),
            SwMgmtEvent::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Errno values used for status codes returned to the engine.
///
/// Status codes are `0` on success and the negated errno on failure.
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENOEXEC: i32 = 8;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ENOTSUP: i32 = 134;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_paths() {
        assert_eq!(resource_path(3, resource::ACTIVATION_STATE), "9/3/12");
        assert_eq!(resource_path(0, resource::PKG_NAME), "9/0/0");
        assert_eq!(resource_instance_path(7, resource::PKG_VERSION, 0), "9/7/1/0");
    }

    #[test]
    fn test_event_resources() {
        assert_eq!(SwMgmtEvent::Install.resource_id(), 4);
        assert_eq!(SwMgmtEvent::Uninstall.resource_id(), 6);
        assert_eq!(SwMgmtEvent::Activate.to_string(), "activate");
    }
}
