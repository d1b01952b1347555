//! Kernel synchronization settings.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! recv_buffer_size: 262144
//! ipv6: true
//! link_detect: false
//! command_timeout: 10   # seconds, or null to wait forever
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::netlink::{DEFAULT_COMMAND_TIMEOUT, Error, Result, groups};

/// Settings for [`KernelSync`](crate::kernel::KernelSync).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Event socket receive buffer size in bytes. 0 keeps the kernel default.
    pub recv_buffer_size: u32,
    /// Dump and listen for IPv6 addresses and routes.
    pub ipv6: bool,
    /// Treat an interface as operative only while it has carrier.
    pub link_detect: bool,
    /// Bound on the wait for each command reply; `None` waits forever.
    #[serde(with = "secs")]
    pub command_timeout: Option<Duration>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 0,
            ipv6: true,
            link_detect: false,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

impl KernelConfig {
    /// Parse a YAML document. An empty document gives the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Multicast groups the event socket binds to.
    pub fn event_groups(&self) -> u32 {
        groups::event_groups(self.ipv6)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
