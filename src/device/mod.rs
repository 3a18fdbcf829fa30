//! Device transport abstraction.
//!
//! A trait-based seam over the live HTTP controller and a mock
//! implementation, enabling engine tests without a device on the network.

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use std::path::Path;

use crate::error::Result;

/// The device-side name of the main preset document.
pub const PRESETS_FILE: &str = "presets.json";

/// Seconds the controller typically needs to come back after a reset.
pub const RECONNECT_DELAY_SECS: u64 = 10;

/// Sidecar file name for a local palette slot (0-9).
pub fn palette_file(slot: u16) -> String {
    format!("palette{slot}.json")
}

/// Sidecar file name for a ledmap slot (0-9).
pub fn ledmap_file(slot: u16) -> String {
    format!("ledmap{slot}.json")
}

/// Outcome of a device fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Found(String),
    NotFound,
}

/// Synchronous device I/O.
///
/// File naming is significant to the receiving device: uploads must use the
/// reserved names above so the controller routes them to the right slot.
pub trait Transport {
    /// Fetches a named document from the device.
    fn fetch(&self, name: &str) -> Result<Fetched>;

    /// Uploads a local file under its device-routing name.
    fn upload(&self, name: &str, path: &Path) -> Result<()>;

    /// Asks the device to reset/reboot.
    fn reboot(&self) -> Result<()>;
}
