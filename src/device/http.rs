//! Live HTTP transport to the controller.
//!
//! All calls are synchronous with a small fixed retry count and a fixed
//! inter-retry delay; retry exhaustion is a hard error surfaced to the
//! calling handler. HTTP 404 means the named document does not exist on the
//! device and is not retried.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Fetched, Transport};
use crate::error::{LibrarianError, Result};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(750);

/// ureq-backed transport bound to one controller host.
pub struct HttpTransport {
    agent: ureq::Agent,
    base: String,
}

impl HttpTransport {
    pub fn new(host: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(7))
            .timeout_write(Duration::from_secs(7))
            .build();
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{host}")
        };
        Self { agent, base }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.base)
    }

    /// Runs one request closure with the fixed retry policy.
    fn with_retry<T, F>(&self, url: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, ureq::Error>,
    {
        for attempt in 1..=RETRY_ATTEMPTS {
            match operation() {
                Ok(value) => return Ok(value),
                Err(ureq::Error::Status(status, _)) => {
                    // The device answered; retrying the same request will not
                    // change its mind.
                    return Err(LibrarianError::DeviceStatus {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(ureq::Error::Transport(t)) => {
                    warn!(url, attempt, error = %t, "Device request failed");
                    if attempt < RETRY_ATTEMPTS {
                        thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }
        Err(LibrarianError::DeviceUnreachable {
            url: url.to_string(),
            attempts: RETRY_ATTEMPTS,
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, name: &str) -> Result<Fetched> {
        let url = self.url(name);
        debug!(%url, "Fetching document from device");
        let result = self.with_retry(&url, || self.agent.get(&url).call());
        match result {
            Ok(response) => {
                let body = response
                    .into_string()
                    .map_err(|e| LibrarianError::Other(format!("reading {url}: {e}")))?;
                Ok(Fetched::Found(body))
            }
            Err(LibrarianError::DeviceStatus { status: 404, .. }) => Ok(Fetched::NotFound),
            Err(e) => Err(e),
        }
    }

    fn upload(&self, name: &str, path: &Path) -> Result<()> {
        let url = format!("{}/upload/{name}", self.base);
        let body = std::fs::read_to_string(path).map_err(|e| LibrarianError::DocumentRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(%url, bytes = body.len(), "Uploading document to device");
        self.with_retry(&url, || {
            self.agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&body)
        })?;
        Ok(())
    }

    fn reboot(&self) -> Result<()> {
        let url = self.url("reset");
        debug!(%url, "Requesting device reset");
        self.with_retry(&url, || self.agent.post(&url).send_string(""))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let t = HttpTransport::new("10.0.0.5");
        assert_eq!(t.url("presets.json"), "http://10.0.0.5/presets.json");

        let t = HttpTransport::new("http://led.local/");
        assert_eq!(t.url("reset"), "http://led.local/reset");
    }
}
