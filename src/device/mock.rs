//! Mock transport for engine tests.
//!
//! Serves documents from an in-memory map and records uploads and reset
//! requests so tests can assert on the exact device traffic.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use super::{Fetched, Transport};
use crate::error::{LibrarianError, Result};

#[derive(Debug, Default)]
pub struct MockTransport {
    /// Documents the mock device will serve, by name.
    documents: RefCell<HashMap<String, String>>,
    /// `(name, body)` pairs in upload order.
    uploads: RefCell<Vec<(String, String)>>,
    reboots: Cell<u32>,
    /// When set, every request fails as unreachable.
    offline: Cell<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document the device will serve.
    pub fn serve(&self, name: &str, body: &str) {
        self.documents
            .borrow_mut()
            .insert(name.to_string(), body.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.borrow().clone()
    }

    pub fn reboot_count(&self) -> u32 {
        self.reboots.get()
    }

    fn check_online(&self, name: &str) -> Result<()> {
        if self.offline.get() {
            return Err(LibrarianError::DeviceUnreachable {
                url: format!("mock://{name}"),
                attempts: 3,
            });
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn fetch(&self, name: &str) -> Result<Fetched> {
        self.check_online(name)?;
        Ok(self
            .documents
            .borrow()
            .get(name)
            .map_or(Fetched::NotFound, |body| Fetched::Found(body.clone())))
    }

    fn upload(&self, name: &str, path: &Path) -> Result<()> {
        self.check_online(name)?;
        let body = std::fs::read_to_string(path).map_err(|e| LibrarianError::DocumentRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.uploads.borrow_mut().push((name.to_string(), body));
        Ok(())
    }

    fn reboot(&self) -> Result<()> {
        self.check_online("reset")?;
        self.reboots.set(self.reboots.get() + 1);
        Ok(())
    }
}
