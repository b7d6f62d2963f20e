//! HL7800 firmware download and install driver
//!
//! Package blocks arrive in arbitrary sizes and are appended to a staging
//! file. A block that pushes the running total past the announced package
//! size starts a new download. Install is deferred onto the work queue so
//! the engine's execute returns immediately; the modem reports the outcome
//! later through FOTA events.

use super::Hl7800Config;
use crate::engine::Lwm2mEngine;
use crate::modem::{FotaState, ModemDriver, ModemEvent};
use crate::storage::Storage;
use crate::swmgmt::{set_activate_state, set_pkg_name, set_pkg_version, Agent, Registry};
use crate::workqueue::{DelayedWork, WorkQueue};
use swmgmt_shared::{
    errno,
    state_machine::{InstallEvent, InstallState, InstallStateMachine, TransitionResult},
    SwMgmtError, SwMgmtEvent,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct DownloadState {
    /// Bytes received for the download in progress
    bytes_downloaded: usize,
    /// Size of the last completed download
    update_file_size: usize,
}

/// Software management driver for the HL7800 modem firmware
pub struct Hl7800SwMgmt {
    config: Hl7800Config,
    update_file: PathBuf,
    engine: Arc<dyn Lwm2mEngine>,
    storage: Arc<dyn Storage>,
    modem: Arc<dyn ModemDriver>,
    queue: WorkQueue,
    download: Mutex<DownloadState>,
    fsm: Mutex<InstallStateMachine>,
    install_work: DelayedWork,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply(fsm: &mut InstallStateMachine, event: InstallEvent) -> bool {
    let from = fsm.state();
    match fsm.process_event(event) {
        TransitionResult::Success(to) => {
            if from != to {
                info!("[HL7800] Package state: {:?} -> {:?}", from, to);
            }
            true
        }
        TransitionResult::Invalid { from, event } => {
            warn!("[HL7800] Rejected {:?} in {:?}", event, from);
            false
        }
    }
}

fn percent(done: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        done * 100 / total
    }
}

impl Hl7800SwMgmt {
    /// Set up the HL7800 software management instance.
    ///
    /// Subscribes to modem events, creates the object instance with this
    /// driver as owner, publishes the package name, marks the package active
    /// and removes a staging file left over from a previous run.
    pub fn init(
        config: Hl7800Config,
        registry: &Arc<Registry>,
        engine: Arc<dyn Lwm2mEngine>,
        storage: Arc<dyn Storage>,
        modem: Arc<dyn ModemDriver>,
        queue: WorkQueue,
    ) -> Result<Arc<Self>, SwMgmtError> {
        let obj_inst = config.obj_inst;

        let driver = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let install_work = DelayedWork::new(queue.clone(), move || {
                if let Some(driver) = weak.upgrade() {
                    driver.start_fw_update();
                }
            });

            Self {
                update_file: config.update_file_path(),
                config,
                engine,
                storage,
                modem,
                queue,
                download: Mutex::new(DownloadState::default()),
                fsm: Mutex::new(InstallStateMachine::new()),
                install_work,
            }
        });

        driver.subscribe_modem_events();

        let agent = Arc::new(driver.agent());
        registry
            .create_instance(driver.engine.as_ref(), obj_inst, agent)
            .inspect_err(|e| error!("[HL7800] Create obj [{}]", e))?;

        set_pkg_name(driver.engine.as_ref(), obj_inst, &driver.config.pkg_name)
            .inspect_err(|e| error!("[HL7800] Set sw mgmt pkg name [{}]", e))?;

        // The modem firmware is always active
        set_activate_state(driver.engine.as_ref(), obj_inst, true)
            .inspect_err(|e| error!("[HL7800] Set sw mgmt active [{}]", e))?;

        if let Err(e) = driver.delete_update_file() {
            warn!("[HL7800] Could not remove stale update file [{}]", e);
        }
        driver.publish_version();

        debug!("[HL7800] Software management initialized on 9/{}", obj_inst);
        Ok(driver)
    }

    /// Owner agent whose callbacks route into this driver
    fn agent(self: &Arc<Self>) -> Agent {
        let obj_inst = self.config.obj_inst;
        let on_event = Arc::downgrade(self);
        let on_read = Arc::downgrade(self);
        let on_write = Arc::downgrade(self);

        Agent::owner(
            move |event| match on_event.upgrade() {
                Some(driver) => driver.handle_event(event),
                None => Err(SwMgmtError::NotExecutable(obj_inst)),
            },
            move || on_read.upgrade().map(|driver| driver.read_version()),
            move |data, last_block, total_size| match on_write.upgrade() {
                Some(driver) => driver.download_data(data, last_block, total_size),
                None => Err(SwMgmtError::NotExecutable(obj_inst)),
            },
        )
    }

    /// Forward modem events onto the work queue
    fn subscribe_modem_events(self: &Arc<Self>) {
        let mut events = self.modem.subscribe();
        let weak = Arc::downgrade(self);
        let queue = self.queue.clone();

        self.queue.runtime().spawn(async move {
            while let Some(event) = events.recv().await {
                let weak = weak.clone();
                let queued = queue.submit(move || {
                    if let Some(driver) = weak.upgrade() {
                        driver.handle_modem_event(event);
                    }
                });
                if !queued {
                    break;
                }
            }
            debug!("[HL7800] Modem event stream closed");
        });
    }

    /// Current package lifecycle state
    pub fn state(&self) -> InstallState {
        lock(&self.fsm).state()
    }

    /// Bytes received for the download in progress
    pub fn bytes_downloaded(&self) -> usize {
        lock(&self.download).bytes_downloaded
    }

    /// Size of the last completed download
    pub fn update_file_size(&self) -> usize {
        lock(&self.download).update_file_size
    }

    /// Path of the staging file
    pub fn update_file_path(&self) -> &Path {
        &self.update_file
    }

    /// Apply an event to the package state. Returns false if it was rejected.
    fn transition(&self, event: InstallEvent) -> bool {
        apply(&mut lock(&self.fsm), event)
    }

    fn handle_event(&self, event: SwMgmtEvent) -> Result<(), SwMgmtError> {
        debug!("[HL7800] event {}", event);
        match event {
            SwMgmtEvent::Install => {
                if !self.transition(InstallEvent::InstallRequested) {
                    return Err(SwMgmtError::Busy(self.config.obj_inst));
                }
                self.install_work.reschedule(self.config.install_delay);
                info!(
                    "[HL7800] Install scheduled in {:?}",
                    self.config.install_delay
                );
                Ok(())
            }
            SwMgmtEvent::Uninstall => {
                // Resets the object state machine so another install can
                // follow. Nothing on the modem is removed.
                if self.install_work.cancel() {
                    info!("[HL7800] Pending install cancelled");
                }
                self.transition(InstallEvent::Reset);
                Ok(())
            }
            SwMgmtEvent::Activate | SwMgmtEvent::Deactivate => {
                Err(SwMgmtError::NotSupported(event))
            }
        }
    }

    fn read_version(&self) -> Vec<u8> {
        self.modem.firmware_version().into_bytes()
    }

    /// Mirror the running firmware version into the package version resource
    fn publish_version(&self) {
        let version = self.modem.firmware_version();
        if let Err(e) = set_pkg_version(self.engine.as_ref(), self.config.obj_inst, &version) {
            warn!("[HL7800] Set sw mgmt pkg version [{}]", e);
        }
    }

    fn download_data(
        &self,
        data: &[u8],
        last_block: bool,
        total_size: usize,
    ) -> Result<(), SwMgmtError> {
        // Held for the whole block so an install cannot start mid-write
        let mut fsm = lock(&self.fsm);
        if fsm.state() == InstallState::Installing {
            warn!("[HL7800] Dropping block, modem is applying the package");
            return Err(SwMgmtError::Busy(self.config.obj_inst));
        }

        let mut download = lock(&self.download);

        download.bytes_downloaded += data.len();
        if download.bytes_downloaded > total_size {
            // Starting a new download
            download.bytes_downloaded = data.len();
            self.delete_update_file()
                .inspect_err(|e| error!("[HL7800] Could not delete file [{}]", e))?;
        }

        self.storage
            .append(&self.config.mount_point, &self.config.file_name, data)
            .map_err(|e| SwMgmtError::storage(self.update_file.display().to_string(), e))
            .inspect_err(|e| error!("[HL7800] Could not write file [{}]", e))?;

        info!(
            "[HL7800] Download {}/{} ({}%)",
            download.bytes_downloaded,
            total_size,
            percent(download.bytes_downloaded, total_size)
        );

        let event = if last_block {
            download.update_file_size = download.bytes_downloaded;
            download.bytes_downloaded = 0;
            InstallEvent::DownloadComplete
        } else {
            InstallEvent::ChunkWritten
        };
        drop(download);
        apply(&mut fsm, event);
        Ok(())
    }

    /// Delete the staging file if it holds any data. A file whose size
    /// cannot be read is treated as absent.
    fn delete_update_file(&self) -> Result<(), SwMgmtError> {
        let path = &self.update_file;
        let size = match self.storage.file_size(path) {
            Ok(size) => size,
            Err(e) => {
                debug!("[HL7800] No size for {} [{}]", path.display(), e);
                None
            }
        };

        match size {
            Some(size) if size > 0 => self
                .storage
                .delete(path)
                .map_err(|e| SwMgmtError::storage(path.display().to_string(), e)),
            _ => Ok(()),
        }
    }

    /// Delayed install job, runs on the work queue
    fn start_fw_update(&self) {
        if !self.transition(InstallEvent::InstallStarted) {
            // The package changed or was reset after the install was queued
            let err = SwMgmtError::NotExecutable(self.config.obj_inst);
            warn!("[HL7800] Install skipped [{}]", err);
            self.engine.install_completed(self.config.obj_inst, err.code());
            return;
        }
        info!("[HL7800] Starting firmware update from {}", self.update_file.display());

        if let Err(e) = self.modem.update_firmware(&self.update_file) {
            let err = SwMgmtError::Modem(e.to_string());
            error!("[HL7800] Could not start firmware update [{}]", err);
            self.transition(InstallEvent::InstallFailed);
            self.engine.install_completed(self.config.obj_inst, err.code());
        }
    }

    /// Modem event handler, runs on the work queue
    fn handle_modem_event(&self, event: ModemEvent) {
        match event {
            ModemEvent::FotaState(FotaState::Complete) => {
                self.engine.install_completed(self.config.obj_inst, 0);
                if let Err(e) = self.delete_update_file() {
                    warn!("[HL7800] Could not delete update file [{}]", e);
                }
                lock(&self.download).bytes_downloaded = 0;
                self.transition(InstallEvent::InstallSucceeded);
                self.publish_version();
                info!("[HL7800] HL7800 firmware update complete");
            }
            ModemEvent::FotaState(FotaState::FileError) => {
                error!("[HL7800] Modem rejected the update file");
                self.engine.install_completed(self.config.obj_inst, -errno::EIO);
                self.transition(InstallEvent::InstallFailed);
            }
            ModemEvent::FotaState(FotaState::Install) => {
                info!("[HL7800] Installing HL7800 firmware");
            }
            ModemEvent::FotaState(state) => {
                debug!("[HL7800] FOTA state {:?}", state);
            }
            ModemEvent::FotaCount(written) => {
                let total = self.update_file_size();
                info!(
                    "[HL7800] Firmware write {}/{} ({}%)",
                    written,
                    total,
                    percent(written as usize, total)
                );
            }
        }
    }
}
