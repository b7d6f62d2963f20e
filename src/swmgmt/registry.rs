//! Callback registry for software management object instances
//!
//! Several subsystems may take part in one object instance. The engine only
//! knows one set of hooks per instance, so every hook installed by
//! [`Registry::create_instance`] is a trampoline into this registry, which
//! fans events out to every agent of the instance and routes version reads
//! and package writes to the agent that created it.

use super::agent::{Agent, DownloadDataCallback, EventCallback, ReadVersionCallback};
use crate::engine::{ExecuteHook, Lwm2mEngine, ReadHook, WriteHook};
use swmgmt_shared::{
    error::status_code, resource, resource_instance_path, SwMgmtError, SwMgmtEvent,
    SOFTWARE_MANAGEMENT_OBJECT_ID,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Ordered collection of agents, guarded by one lock
#[derive(Debug, Default)]
pub struct Registry {
    agents: Mutex<Vec<Arc<Agent>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn agents(&self) -> MutexGuard<'_, Vec<Arc<Agent>>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an instance of object 9 owned by `agent`.
    ///
    /// All three callbacks of `agent` are required. Its version read and
    /// package write callbacks become the only ones used for this instance.
    /// Engine-side steps already done are not rolled back when a later one
    /// fails.
    pub fn create_instance(
        self: &Arc<Self>,
        engine: &dyn Lwm2mEngine,
        obj_inst: u16,
        agent: Arc<Agent>,
    ) -> Result<(), SwMgmtError> {
        if let Some(missing) = agent.missing_owner_callback() {
            warn!("[SWMGMT] Cannot create 9/{}: missing {}", obj_inst, missing);
            return Err(SwMgmtError::InvalidArgument(missing));
        }

        engine.create_object_instance(SOFTWARE_MANAGEMENT_OBJECT_ID, obj_inst)?;
        engine.create_resource_instance(&resource_instance_path(
            obj_inst,
            resource::PKG_VERSION,
            0,
        ))?;

        for event in SwMgmtEvent::ALL {
            engine.set_execute_hook(obj_inst, event, self.execute_trampoline(event))?;
        }
        engine.set_read_hook(obj_inst, self.read_trampoline())?;
        engine.set_write_hook(obj_inst, self.write_trampoline())?;

        agent.set_obj_inst(obj_inst);
        self.agents().push(agent);

        info!("[SWMGMT] Created software management instance 9/{}", obj_inst);
        Ok(())
    }

    fn execute_trampoline(self: &Arc<Self>, event: SwMgmtEvent) -> ExecuteHook {
        let registry = self.clone();
        Arc::new(move |obj_inst, _args| registry.dispatch_event(obj_inst, event))
    }

    fn read_trampoline(self: &Arc<Self>) -> ReadHook {
        let registry = self.clone();
        Arc::new(move |obj_inst| registry.dispatch_read_version(obj_inst))
    }

    fn write_trampoline(self: &Arc<Self>) -> WriteHook {
        let registry = self.clone();
        Arc::new(move |obj_inst, data, last_block, total_size| {
            registry.dispatch_write_chunk(obj_inst, data, last_block, total_size)
        })
    }

    /// Register an agent for the events of an instance.
    ///
    /// Any number of agents may listen. Version read and package write
    /// ownership stays with the agent that created the instance.
    pub fn register_event_callback(&self, obj_inst: u16, agent: Arc<Agent>) {
        let mut agents = self.agents();
        agent.set_obj_inst(obj_inst);
        agents.push(agent);
        debug!(
            "[SWMGMT] Registered agent for 9/{} (total agents: {})",
            obj_inst,
            agents.len()
        );
    }

    /// Remove a previously registered agent. Unknown agents are ignored.
    pub fn unregister_event_callback(&self, obj_inst: u16, agent: &Arc<Agent>) {
        let mut agents = self.agents();
        if let Some(pos) = agents.iter().position(|a| Arc::ptr_eq(a, agent)) {
            agents.remove(pos);
            debug!("[SWMGMT] Unregistered agent for 9/{}", obj_inst);
        }
    }

    /// Event callbacks currently registered for an instance, in order
    pub fn listeners(&self, obj_inst: u16) -> Vec<EventCallback> {
        self.agents()
            .iter()
            .filter(|a| a.obj_inst() == obj_inst)
            .filter_map(|a| a.event_callback.clone())
            .collect()
    }

    /// Number of registered agents across all instances
    pub fn agent_count(&self) -> usize {
        self.agents().len()
    }

    /// Deliver an event to every agent of the instance.
    ///
    /// Returns the bitwise OR of all status codes, so a single failing
    /// listener makes the result non-zero but its exact errno may be lost.
    /// Callbacks run after the lock is released.
    pub fn dispatch_event(&self, obj_inst: u16, event: SwMgmtEvent) -> i32 {
        let listeners = self.listeners(obj_inst);
        debug!(
            "[SWMGMT] Dispatching {} on 9/{} to {} agent(s)",
            event,
            obj_inst,
            listeners.len()
        );

        listeners
            .iter()
            .map(|cb| {
                let result = cb(event);
                if let Err(e) = &result {
                    debug!("[SWMGMT] {} on 9/{} rejected: {}", event, obj_inst, e);
                }
                status_code(&result)
            })
            .fold(0, |acc, status| acc | status)
    }

    /// First agent of the instance with an event callback: the creator
    fn owner(&self, obj_inst: u16) -> Option<Arc<Agent>> {
        self.agents()
            .iter()
            .find(|a| a.event_callback.is_some() && a.obj_inst() == obj_inst)
            .cloned()
    }

    /// Read the package version from the instance owner
    pub fn dispatch_read_version(&self, obj_inst: u16) -> Option<Vec<u8>> {
        let cb: Option<ReadVersionCallback> =
            self.owner(obj_inst).and_then(|a| a.read_ver_callback.clone());
        cb.and_then(|cb| cb())
    }

    /// Hand a package block to the instance owner
    pub fn dispatch_write_chunk(
        &self,
        obj_inst: u16,
        data: &[u8],
        last_block: bool,
        total_size: usize,
    ) -> Result<(), SwMgmtError> {
        let cb: Option<DownloadDataCallback> = self
            .owner(obj_inst)
            .and_then(|a| a.download_data_callback.clone());
        match cb {
            Some(cb) => cb(data, last_block, total_size),
            None => {
                warn!("[SWMGMT] No package writer for 9/{}", obj_inst);
                Err(SwMgmtError::NotExecutable(obj_inst))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use swmgmt_shared::errno;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn owner_agent(tag: &'static str, writes: Arc<AtomicUsize>) -> Arc<Agent> {
        Arc::new(Agent::owner(
            |_| Ok(()),
            move || Some(tag.as_bytes().to_vec()),
            move |_, _, _| {
                writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))
    }

    #[test]
    fn test_create_requires_all_callbacks() {
        let engine = LocalEngine::new();
        let registry = Registry::new();

        let agent = Arc::new(Agent::listener(|_| Ok(())));
        let err = registry.create_instance(&engine, 1, agent).unwrap_err();
        assert!(matches!(err, SwMgmtError::InvalidArgument("read_ver_callback")));
        assert_eq!(registry.agent_count(), 0);
        assert!(!engine.has_instance(1));

        let mut agent = Agent::owner(|_| Ok(()), || None, |_, _, _| Ok(()));
        agent.event_callback = None;
        let agent = Arc::new(agent);
        let err = registry.create_instance(&engine, 1, agent).unwrap_err();
        assert!(matches!(err, SwMgmtError::InvalidArgument("event_callback")));
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn test_create_instance_installs_hooks() {
        let engine = LocalEngine::new();
        let registry = Registry::new();
        let writes = Arc::new(AtomicUsize::new(0));
        let agent = owner_agent("1.2.3", writes.clone());

        registry.create_instance(&engine, 3, agent.clone()).unwrap();
        assert_eq!(agent.obj_inst(), 3);
        assert!(engine.resource("9/3/1/0").is_some());

        assert_eq!(engine.read_package_version(3), Some(b"1.2.3".to_vec()));
        engine.write_package(3, &[0xAA], true, 1).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(engine.execute(3, SwMgmtEvent::Install), 0);
    }

    #[test]
    fn test_create_engine_failure_not_registered() {
        let engine = LocalEngine::new();
        let registry = Registry::new();
        let writes = Arc::new(AtomicUsize::new(0));

        registry
            .create_instance(&engine, 0, owner_agent("a", writes.clone()))
            .unwrap();
        let err = registry
            .create_instance(&engine, 0, owner_agent("b", writes))
            .unwrap_err();
        assert!(matches!(err, SwMgmtError::Engine(_)));
        assert_eq!(registry.agent_count(), 1);
    }

    #[test]
    fn test_listener_set_tracks_registration() {
        let registry = Registry::new();
        let a = Arc::new(Agent::listener(|_| Ok(())));
        let b = Arc::new(Agent::listener(|_| Ok(())));
        let c = Arc::new(Agent::listener(|_| Ok(())));
        let silent = Arc::new(Agent::default());

        registry.register_event_callback(1, a.clone());
        registry.register_event_callback(1, b.clone());
        registry.register_event_callback(2, c.clone());
        registry.register_event_callback(1, silent.clone());
        assert_eq!(registry.listeners(1).len(), 2);
        assert_eq!(registry.listeners(2).len(), 1);

        registry.unregister_event_callback(1, &a);
        assert_eq!(registry.listeners(1).len(), 1);

        // Removal is by identity and tolerates unknown agents
        registry.unregister_event_callback(1, &a);
        registry.unregister_event_callback(1, &c);
        assert_eq!(registry.listeners(2).len(), 0);
        assert_eq!(registry.agent_count(), 2);
    }

    #[test]
    fn test_dispatch_event_fans_out_and_ors() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        registry.register_event_callback(
            5,
            Arc::new(Agent::listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        );
        let counter = calls.clone();
        registry.register_event_callback(
            5,
            Arc::new(Agent::listener(move |event| {
                counter.fetch_add(1, Ordering::SeqCst);
                match event {
                    SwMgmtEvent::Activate => Err(SwMgmtError::NotSupported(event)),
                    _ => Ok(()),
                }
            })),
        );
        registry.register_event_callback(6, Arc::new(Agent::listener(|e| {
            Err(SwMgmtError::NotSupported(e))
        })));

        assert_eq!(registry.dispatch_event(5, SwMgmtEvent::Install), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(
            registry.dispatch_event(5, SwMgmtEvent::Activate),
            -errno::ENOTSUP
        );
        assert_eq!(registry.dispatch_event(7, SwMgmtEvent::Install), 0);
    }

    #[test]
    fn test_dispatch_event_combines_codes() {
        let registry = Registry::new();
        registry.register_event_callback(
            1,
            Arc::new(Agent::listener(|e| Err(SwMgmtError::NotSupported(e)))),
        );
        registry.register_event_callback(
            1,
            Arc::new(Agent::listener(|_| Err(SwMgmtError::Modem("busy".into())))),
        );

        let status = registry.dispatch_event(1, SwMgmtEvent::Install);
        assert_eq!(status, -errno::ENOTSUP | -errno::EIO);
        assert!(status < 0);
    }

    #[test]
    fn test_owner_is_first_appended() {
        let engine = LocalEngine::new();
        let registry = Registry::new();
        let creator_writes = Arc::new(AtomicUsize::new(0));
        let late_writes = Arc::new(AtomicUsize::new(0));

        registry
            .create_instance(&engine, 0, owner_agent("creator", creator_writes.clone()))
            .unwrap();
        registry.register_event_callback(0, Arc::new(Agent::listener(|_| Ok(()))));
        registry.register_event_callback(0, owner_agent("late", late_writes.clone()));

        registry.dispatch_write_chunk(0, &[1, 2, 3], false, 10).unwrap();
        assert_eq!(creator_writes.load(Ordering::SeqCst), 1);
        assert_eq!(late_writes.load(Ordering::SeqCst), 0);
        assert_eq!(registry.dispatch_read_version(0), Some(b"creator".to_vec()));
    }

    #[test]
    fn test_write_without_owner() {
        let registry = Registry::new();
        let err = registry.dispatch_write_chunk(4, &[1], true, 1).unwrap_err();
        assert!(matches!(err, SwMgmtError::NotExecutable(4)));
        assert_eq!(err.code(), -errno::ENOEXEC);
        assert_eq!(registry.dispatch_read_version(4), None);

        // A listener without a writer does not make the instance writable
        registry.register_event_callback(4, Arc::new(Agent::listener(|_| Ok(()))));
        assert!(matches!(
            registry.dispatch_write_chunk(4, &[1], true, 1),
            Err(SwMgmtError::NotExecutable(4))
        ));
        assert_eq!(registry.dispatch_read_version(4), None);
    }

    #[test]
    fn test_callbacks_may_reenter_registry() {
        let registry = Registry::new();
        let inner = registry.clone();
        registry.register_event_callback(
            1,
            Arc::new(Agent::listener(move |_| {
                inner.register_event_callback(2, Arc::new(Agent::listener(|_| Ok(()))));
                Ok(())
            })),
        );

        assert_eq!(registry.dispatch_event(1, SwMgmtEvent::Uninstall), 0);
        assert_eq!(registry.listeners(2).len(), 1);
    }
}
