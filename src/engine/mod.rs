//! LwM2M Engine Abstraction
//!
//! The registry and drivers only talk to the protocol engine through the
//! [`Lwm2mEngine`] trait. Hooks are invoked synchronously from the engine's
//! own processing context.

mod local;

pub use local::{InstallReport, LocalEngine, ResourceValue};

use swmgmt_shared::{EngineError, SwMgmtError, SwMgmtEvent};
use std::sync::Arc;

/// Execute hook: `(obj_inst, args) -> status`
pub type ExecuteHook = Arc<dyn Fn(u16, &[u8]) -> i32 + Send + Sync>;

/// Package version read hook: `obj_inst -> version bytes`
pub type ReadHook = Arc<dyn Fn(u16) -> Option<Vec<u8>> + Send + Sync>;

/// Package write hook: `(obj_inst, data, last_block, total_size)`
pub type WriteHook = Arc<dyn Fn(u16, &[u8], bool, usize) -> Result<(), SwMgmtError> + Send + Sync>;

/// Operations consumed from the LwM2M engine
pub trait Lwm2mEngine: Send + Sync {
    /// Create an instance of `obj_id`
    fn create_object_instance(&self, obj_id: u16, obj_inst: u16) -> Result<(), EngineError>;

    /// Create a resource instance at `path` (e.g. `9/0/1/0`)
    fn create_resource_instance(&self, path: &str) -> Result<(), EngineError>;

    /// Set the hook run when the executable resource for `event` is executed
    fn set_execute_hook(
        &self,
        obj_inst: u16,
        event: SwMgmtEvent,
        hook: ExecuteHook,
    ) -> Result<(), EngineError>;

    /// Set the hook run when the package version is read
    fn set_read_hook(&self, obj_inst: u16, hook: ReadHook) -> Result<(), EngineError>;

    /// Set the hook run for every block of a package write
    fn set_write_hook(&self, obj_inst: u16, hook: WriteHook) -> Result<(), EngineError>;

    /// Write a string resource
    fn set_string(&self, path: &str, value: &str) -> Result<(), EngineError>;

    /// Write a boolean resource
    fn set_bool(&self, path: &str, value: bool) -> Result<(), EngineError>;

    /// Report the outcome of an install; `status` is 0 or a negative errno
    fn install_completed(&self, obj_inst: u16, status: i32);
}
