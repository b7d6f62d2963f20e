//! HL7800 software management configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the HL7800 software management instance
#[derive(Debug, Clone)]
pub struct Hl7800Config {
    /// Object 9 instance served by the driver
    pub obj_inst: u16,
    /// Package name published on the instance
    pub pkg_name: String,
    /// Delay between the install execute and the start of the update
    pub install_delay: Duration,
    /// Directory holding the staging file
    pub mount_point: PathBuf,
    /// Staging file name
    pub file_name: String,
}

impl Default for Hl7800Config {
    fn default() -> Self {
        Self {
            obj_inst: 0,
            pkg_name: "HL7800".into(),
            install_delay: Duration::from_secs(5),
            mount_point: PathBuf::from("/lfs"),
            file_name: "hl7800_update.ua".into(),
        }
    }
}

impl Hl7800Config {
    /// Full path of the staging file
    pub fn update_file_path(&self) -> PathBuf {
        self.mount_point.join(&self.file_name)
    }
}
