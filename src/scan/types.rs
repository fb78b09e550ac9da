use std::fmt;
use std::time::Duration;

use crate::scan::capability::Capability;

/// Platform identity of a peripheral, as reported by the Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peripheral sighted during the current scan session. Never mutated after
/// creation; the whole list is discarded when a new session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(id: DeviceId, name: Option<String>) -> Self {
        DiscoveredDevice { id, name }
    }

    /// The row shown in the result list: `name (address)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name.as_deref().unwrap_or("Unknown"), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSession {
    Idle,
    Scanning { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting(DeviceId),
    Connected(DeviceId),
    Disconnected(DeviceId),
}

/// Side effect requested by the controller. The harness (gui or a test)
/// executes these; the controller itself never touches the Bluetooth stack,
/// timers or the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start the backend scan, filtered to advertisements carrying this name.
    StartDiscovery { name_filter: String },
    StopDiscovery,
    Connect { device_id: DeviceId },
    /// One-shot timer; deliver `on_scan_timeout(generation)` after the delay.
    /// The timer is never cancelled, the generation makes late firings inert.
    ScheduleTimeout { generation: u64, after: Duration },
    RequestPermissions(Vec<Capability>),
    RequestAdapterEnable,
    /// Transient, non-blocking message for the user.
    Notice(String),
}
