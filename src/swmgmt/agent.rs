//! Software management agent record

use swmgmt_shared::{SwMgmtError, SwMgmtEvent};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Called for activate/deactivate/install/uninstall executes
pub type EventCallback = Arc<dyn Fn(SwMgmtEvent) -> Result<(), SwMgmtError> + Send + Sync>;

/// Returns the installed package version
pub type ReadVersionCallback = Arc<dyn Fn() -> Option<Vec<u8>> + Send + Sync>;

/// Receives one package block: `(data, last_block, total_size)`
pub type DownloadDataCallback =
    Arc<dyn Fn(&[u8], bool, usize) -> Result<(), SwMgmtError> + Send + Sync>;

/// One subsystem's callbacks for a software management object instance.
///
/// The agent that creates the instance must provide all three callbacks and
/// becomes the only reader of the package version and the only writer of the
/// package. Agents registered afterwards only receive events.
#[derive(Default)]
pub struct Agent {
    obj_inst: AtomicU16,
    pub event_callback: Option<EventCallback>,
    pub read_ver_callback: Option<ReadVersionCallback>,
    pub download_data_callback: Option<DownloadDataCallback>,
}

impl Agent {
    /// Agent providing all callbacks, used to create an instance
    pub fn owner(
        event: impl Fn(SwMgmtEvent) -> Result<(), SwMgmtError> + Send + Sync + 'static,
        read_ver: impl Fn() -> Option<Vec<u8>> + Send + Sync + 'static,
        download_data: impl Fn(&[u8], bool, usize) -> Result<(), SwMgmtError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            obj_inst: AtomicU16::new(0),
            event_callback: Some(Arc::new(event)),
            read_ver_callback: Some(Arc::new(read_ver)),
            download_data_callback: Some(Arc::new(download_data)),
        }
    }

    /// Agent that only listens for events
    pub fn listener(
        event: impl Fn(SwMgmtEvent) -> Result<(), SwMgmtError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_callback: Some(Arc::new(event)),
            ..Default::default()
        }
    }

    /// Object instance this agent serves
    pub fn obj_inst(&self) -> u16 {
        self.obj_inst.load(Ordering::Acquire)
    }

    pub(super) fn set_obj_inst(&self, obj_inst: u16) {
        self.obj_inst.store(obj_inst, Ordering::Release);
    }

    /// Name of the first missing owner callback
    pub(super) fn missing_owner_callback(&self) -> Option<&'static str> {
        if self.event_callback.is_none() {
            Some("event_callback")
        } else if self.read_ver_callback.is_none() {
            Some("read_ver_callback")
        } else if self.download_data_callback.is_none() {
            Some("download_data_callback")
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("obj_inst", &self.obj_inst())
            .field("event_callback", &self.event_callback.is_some())
            .field("read_ver_callback", &self.read_ver_callback.is_some())
            .field("download_data_callback", &self.download_data_callback.is_some())
            .finish()
    }
}
