//! Loopback LwM2M engine
//!
//! Keeps object 9 instances, their resources and hooks in memory and plays
//! the management server's part (execute, read, block-wise write) directly
//! against the installed hooks. Used by the binary's demo session and by tests.

use super::{ExecuteHook, Lwm2mEngine, ReadHook, WriteHook};
use swmgmt_shared::{
    resource, resource_path, EngineError, SwMgmtError, SwMgmtEvent,
    SOFTWARE_MANAGEMENT_OBJECT_ID,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Object 9 update state values
pub mod update_state {
    pub const INITIAL: i64 = 0;
    pub const DOWNLOAD_STARTED: i64 = 1;
    pub const DELIVERED: i64 = 3;
    pub const INSTALLED: i64 = 4;
}

/// Object 9 update result values
pub mod update_result {
    pub const INITIAL: i64 = 0;
    pub const DOWNLOADING: i64 = 1;
    pub const INSTALLED: i64 = 2;
    pub const DOWNLOADED_VERIFIED: i64 = 3;
    pub const DEVICE_ERROR: i64 = 57;
    pub const INSTALL_FAILURE: i64 = 58;
}

/// Value stored in a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

/// One call to [`Lwm2mEngine::install_completed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    pub obj_inst: u16,
    pub status: i32,
}

#[derive(Default)]
struct InstanceHooks {
    execute: HashMap<SwMgmtEvent, ExecuteHook>,
    read: Option<ReadHook>,
    write: Option<WriteHook>,
}

#[derive(Default)]
struct EngineState {
    instances: HashMap<u16, InstanceHooks>,
    resources: HashMap<String, ResourceValue>,
    reports: Vec<InstallReport>,
}

/// In-memory engine holding software management instances
#[derive(Default)]
pub struct LocalEngine {
    state: Mutex<EngineState>,
}

impl LocalEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a resource value
    pub fn resource(&self, path: &str) -> Option<ResourceValue> {
        self.lock().resources.get(path).cloned()
    }

    /// Whether an instance of object 9 exists
    #[cfg(test)]
    pub fn has_instance(&self, obj_inst: u16) -> bool {
        self.lock().instances.contains_key(&obj_inst)
    }

    /// All install outcomes reported so far
    pub fn install_reports(&self) -> Vec<InstallReport> {
        self.lock().reports.clone()
    }

    /// Current update state resource of an instance
    pub fn update_state(&self, obj_inst: u16) -> Option<i64> {
        match self.resource(&resource_path(obj_inst, resource::UPDATE_STATE)) {
            Some(ResourceValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// Current update result resource of an instance
    pub fn update_result(&self, obj_inst: u16) -> Option<i64> {
        match self.resource(&resource_path(obj_inst, resource::UPDATE_RESULT)) {
            Some(ResourceValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    fn set_update(&self, obj_inst: u16, state: Option<i64>, result: Option<i64>) {
        let mut guard = self.lock();
        if let Some(state) = state {
            guard.resources.insert(
                resource_path(obj_inst, resource::UPDATE_STATE),
                ResourceValue::Int(state),
            );
        }
        if let Some(result) = result {
            guard.resources.insert(
                resource_path(obj_inst, resource::UPDATE_RESULT),
                ResourceValue::Int(result),
            );
        }
    }

    /// Execute an executable resource, as the management server would
    pub fn execute(&self, obj_inst: u16, event: SwMgmtEvent) -> i32 {
        let hook = {
            let guard = self.lock();
            match guard.instances.get(&obj_inst) {
                Some(hooks) => hooks.execute.get(&event).cloned(),
                None => {
                    warn!("[ENGINE] Execute {} on missing instance {}", event, obj_inst);
                    return -swmgmt_shared::errno::ENOENT;
                }
            }
        };

        let status = match hook {
            Some(hook) => hook(obj_inst, &[]),
            None => 0,
        };
        debug!("[ENGINE] Execute {} on 9/{} -> {}", event, obj_inst, status);

        if status == 0 && event == SwMgmtEvent::Uninstall {
            self.set_update(
                obj_inst,
                Some(update_state::INITIAL),
                Some(update_result::INITIAL),
            );
        }
        status
    }

    /// Read the package version through the read hook
    pub fn read_package_version(&self, obj_inst: u16) -> Option<Vec<u8>> {
        let hook = self.lock().instances.get(&obj_inst)?.read.clone()?;
        hook(obj_inst)
    }

    /// Deliver one block of a package write through the write hook
    pub fn write_package(
        &self,
        obj_inst: u16,
        data: &[u8],
        last_block: bool,
        total_size: usize,
    ) -> Result<(), SwMgmtError> {
        let hook = {
            let guard = self.lock();
            let hooks = guard
                .instances
                .get(&obj_inst)
                .ok_or_else(|| EngineError::NotFound(format!("9/{}", obj_inst)))?;
            hooks.write.clone()
        };
        let hook = hook.ok_or(SwMgmtError::NotExecutable(obj_inst))?;

        self.set_update(
            obj_inst,
            Some(update_state::DOWNLOAD_STARTED),
            Some(update_result::DOWNLOADING),
        );

        match hook(obj_inst, data, last_block, total_size) {
            Ok(()) => {
                if last_block {
                    self.set_update(
                        obj_inst,
                        Some(update_state::DELIVERED),
                        Some(update_result::DOWNLOADED_VERIFIED),
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.set_update(
                    obj_inst,
                    Some(update_state::INITIAL),
                    Some(update_result::DEVICE_ERROR),
                );
                Err(e)
            }
        }
    }
}

/// Split `9/<inst>/...` and return the instance id
fn parse_instance(path: &str) -> Result<u16, EngineError> {
    let mut parts = path.split('/');
    let obj = parts.next().and_then(|p| p.parse::<u16>().ok());
    let inst = parts.next().and_then(|p| p.parse::<u16>().ok());
    match (obj, inst) {
        (Some(SOFTWARE_MANAGEMENT_OBJECT_ID), Some(inst)) => Ok(inst),
        _ => Err(EngineError::InvalidPath(path.to_string())),
    }
}

impl Lwm2mEngine for LocalEngine {
    fn create_object_instance(&self, obj_id: u16, obj_inst: u16) -> Result<(), EngineError> {
        if obj_id != SOFTWARE_MANAGEMENT_OBJECT_ID {
            return Err(EngineError::NotFound(format!("{}", obj_id)));
        }

        let mut guard = self.lock();
        if guard.instances.contains_key(&obj_inst) {
            return Err(EngineError::AlreadyExists(format!("{}/{}", obj_id, obj_inst)));
        }
        guard.instances.insert(obj_inst, InstanceHooks::default());

        let defaults = [
            (resource::PKG_NAME, ResourceValue::Str(String::new())),
            (resource::PKG_VERSION, ResourceValue::Str(String::new())),
            (resource::UPDATE_STATE, ResourceValue::Int(update_state::INITIAL)),
            (resource::UPDATE_RESULT, ResourceValue::Int(update_result::INITIAL)),
            (resource::ACTIVATION_STATE, ResourceValue::Bool(false)),
        ];
        for (res_id, value) in defaults {
            guard.resources.insert(resource_path(obj_inst, res_id), value);
        }

        info!("[ENGINE] Created object instance {}/{}", obj_id, obj_inst);
        Ok(())
    }

    fn create_resource_instance(&self, path: &str) -> Result<(), EngineError> {
        let obj_inst = parse_instance(path)?;
        let mut guard = self.lock();
        if !guard.instances.contains_key(&obj_inst) {
            return Err(EngineError::NotFound(path.to_string()));
        }
        if guard.resources.contains_key(path) {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        guard
            .resources
            .insert(path.to_string(), ResourceValue::Str(String::new()));
        Ok(())
    }

    fn set_execute_hook(
        &self,
        obj_inst: u16,
        event: SwMgmtEvent,
        hook: ExecuteHook,
    ) -> Result<(), EngineError> {
        let mut guard = self.lock();
        let hooks = guard
            .instances
            .get_mut(&obj_inst)
            .ok_or_else(|| EngineError::NotFound(resource_path(obj_inst, event.resource_id())))?;
        hooks.execute.insert(event, hook);
        Ok(())
    }

    fn set_read_hook(&self, obj_inst: u16, hook: ReadHook) -> Result<(), EngineError> {
        let mut guard = self.lock();
        let hooks = guard
            .instances
            .get_mut(&obj_inst)
            .ok_or_else(|| EngineError::NotFound(resource_path(obj_inst, resource::PKG_VERSION)))?;
        hooks.read = Some(hook);
        Ok(())
    }

    fn set_write_hook(&self, obj_inst: u16, hook: WriteHook) -> Result<(), EngineError> {
        let mut guard = self.lock();
        let hooks = guard
            .instances
            .get_mut(&obj_inst)
            .ok_or_else(|| EngineError::NotFound(resource_path(obj_inst, resource::PACKAGE)))?;
        hooks.write = Some(hook);
        Ok(())
    }

    fn set_string(&self, path: &str, value: &str) -> Result<(), EngineError> {
        let mut guard = self.lock();
        match guard.resources.get_mut(path) {
            Some(ResourceValue::Str(s)) => {
                *s = value.to_string();
                Ok(())
            }
            Some(_) => Err(EngineError::TypeMismatch(path.to_string())),
            None => Err(EngineError::NotFound(path.to_string())),
        }
    }

    fn set_bool(&self, path: &str, value: bool) -> Result<(), EngineError> {
        let mut guard = self.lock();
        match guard.resources.get_mut(path) {
            Some(ResourceValue::Bool(b)) => {
                *b = value;
                Ok(())
            }
            Some(_) => Err(EngineError::TypeMismatch(path.to_string())),
            None => Err(EngineError::NotFound(path.to_string())),
        }
    }

    fn install_completed(&self, obj_inst: u16, status: i32) {
        info!("[ENGINE] Install completed on 9/{}: status={}", obj_inst, status);
        self.lock().reports.push(InstallReport { obj_inst, status });
        if status == 0 {
            self.set_update(
                obj_inst,
                Some(update_state::INSTALLED),
                Some(update_result::INSTALLED),
            );
        } else {
            self.set_update(obj_inst, None, Some(update_result::INSTALL_FAILURE));
        }
    }
}
