//! Modem Driver Abstraction
//!
//! Firmware-over-the-air support of a cellular modem: a synchronous trigger
//! to apply a staged image, the live firmware version, and an asynchronous
//! event stream reporting FOTA progress and outcome.

mod sim;

pub use sim::SimModem;

use anyhow::Result;
use std::path::Path;
use tokio::sync::mpsc;

/// FOTA state reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FotaState {
    /// Image transfer to the modem started
    Start,
    /// Staged image was rejected by the modem
    FileError,
    /// Modem is installing the image
    Install,
    /// New firmware is running
    Complete,
}

/// Events emitted by the modem driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// FOTA state change
    FotaState(FotaState),
    /// Number of image bytes written to the modem so far
    FotaCount(u32),
}

/// Operations consumed from the modem driver
pub trait ModemDriver: Send + Sync {
    /// Start applying the firmware image at `path`.
    ///
    /// Only the trigger is synchronous; the outcome arrives as events.
    fn update_firmware(&self, path: &Path) -> Result<()>;

    /// Firmware version currently reported by the modem
    fn firmware_version(&self) -> String;

    /// Subscribe to modem events
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ModemEvent>;
}
