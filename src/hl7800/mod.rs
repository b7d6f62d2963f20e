//! HL7800 Software Management
//!
//! Exposes the HL7800 modem firmware as a software management package:
//! the package is downloaded to a staging file, installed through the
//! modem's FOTA support, and the outcome is reported back to the engine.

mod config;
mod driver;

pub use config::Hl7800Config;
pub use driver::Hl7800SwMgmt;
