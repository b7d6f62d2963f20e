//! Simulated HL7800 modem
//!
//! Reads the staged image through [`Storage`], streams `FotaCount` progress,
//! then reports `Install` and `Complete` (or `FileError` for a missing or
//! empty image) after short delays.

use super::{FotaState, ModemDriver, ModemEvent};
use crate::storage::Storage;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// Bytes reported per progress event
const PROGRESS_BLOCK: u64 = 4096;

struct SimState {
    version: String,
    subscribers: Vec<mpsc::UnboundedSender<ModemEvent>>,
    update_requests: Vec<PathBuf>,
}

/// Modem stand-in used by the demo binary and tests
pub struct SimModem {
    state: Arc<Mutex<SimState>>,
    storage: Arc<dyn Storage>,
    next_version: String,
    step_delay: Duration,
    busy: Arc<AtomicBool>,
    fail_trigger: AtomicBool,
    runtime: Handle,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn broadcast(state: &Mutex<SimState>, event: ModemEvent) {
    let mut guard = lock(state);
    guard.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
}

impl SimModem {
    /// Create a modem running `version` that upgrades to `next_version`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        version: impl Into<String>,
        next_version: impl Into<String>,
        storage: Arc<dyn Storage>,
        step_delay: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                version: version.into(),
                subscribers: Vec::new(),
                update_requests: Vec::new(),
            })),
            storage,
            next_version: next_version.into(),
            step_delay,
            busy: Arc::new(AtomicBool::new(false)),
            fail_trigger: AtomicBool::new(false),
            runtime: Handle::current(),
        }
    }

    /// Make the next update trigger fail synchronously
    #[cfg(test)]
    pub fn fail_next_trigger(&self) {
        self.fail_trigger.store(true, Ordering::SeqCst);
    }

    /// Paths passed to every `update_firmware` call
    #[cfg(test)]
    pub fn update_requests(&self) -> Vec<PathBuf> {
        lock(&self.state).update_requests.clone()
    }

    /// Whether an update is being applied
    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl ModemDriver for SimModem {
    fn update_firmware(&self, path: &Path) -> Result<()> {
        lock(&self.state).update_requests.push(path.to_path_buf());

        if self.fail_trigger.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("AT+WDSI rejected"));
        }
        let size = self.storage.file_size(path)?.unwrap_or(0);
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("Firmware update already in progress"));
        }
        info!("[MODEM] Applying {} ({} bytes)", path.display(), size);

        let state = self.state.clone();
        let busy = self.busy.clone();
        let next_version = self.next_version.clone();
        let step = self.step_delay;

        self.runtime.spawn(async move {
            broadcast(&state, ModemEvent::FotaState(FotaState::Start));

            if size == 0 {
                sleep(step).await;
                broadcast(&state, ModemEvent::FotaState(FotaState::FileError));
                busy.store(false, Ordering::SeqCst);
                return;
            }

            let mut written = 0u64;
            while written < size {
                sleep(step).await;
                written = (written + PROGRESS_BLOCK).min(size);
                broadcast(&state, ModemEvent::FotaCount(written as u32));
            }

            sleep(step).await;
            broadcast(&state, ModemEvent::FotaState(FotaState::Install));
            sleep(step).await;

            lock(&state).version = next_version;
            busy.store(false, Ordering::SeqCst);
            broadcast(&state, ModemEvent::FotaState(FotaState::Complete));
            debug!("[MODEM] Firmware update finished");
        });

        Ok(())
    }

    fn firmware_version(&self) -> String {
        lock(&self.state).version.clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ModemEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).subscribers.push(tx);
        rx
    }
}
