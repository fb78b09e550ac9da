use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;

/// Named capabilities the controller depends on. On Android these were the
/// BLUETOOTH_SCAN / BLUETOOTH_CONNECT runtime permissions; on desktop the
/// platform driver learns them from the Bluetooth backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Scan,
    Connect,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Scan => "bluetooth-scan",
            Capability::Connect => "bluetooth-connect",
        };
        write!(f, "{}", name)
    }
}

/// Result of a batch permission request: granted flag per capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityGrants {
    pub scan: bool,
    pub connect: bool,
}

impl CapabilityGrants {
    pub fn granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scan => self.scan,
            Capability::Connect => self.connect,
        }
    }

    pub fn denied(&self) -> Vec<Capability> {
        [Capability::Scan, Capability::Connect]
            .into_iter()
            .filter(|capability| !self.granted(*capability))
            .collect()
    }
}

/// Queries are synchronous snapshots; a request is an explicit asynchronous
/// operation whose result is delivered later.
pub trait PermissionAuthority: Send + Sync {
    fn granted(&self, capability: Capability) -> bool;
    fn request(&self, capabilities: &[Capability]) -> BoxFuture<'static, CapabilityGrants>;
}

pub trait AdapterStatus: Send + Sync {
    fn enabled(&self) -> bool;
    fn request_enable(&self) -> BoxFuture<'static, bool>;
}

/// Snapshot shared between the platform driver (writer) and the sync queries
/// above (readers). Scan and connect start out granted; the driver revokes
/// them when the backend reports a permission failure.
#[derive(Debug)]
pub struct CapabilityState {
    adapter_enabled: AtomicBool,
    scan_granted: AtomicBool,
    connect_granted: AtomicBool,
}

impl Default for CapabilityState {
    fn default() -> Self {
        CapabilityState {
            adapter_enabled: AtomicBool::new(false),
            scan_granted: AtomicBool::new(true),
            connect_granted: AtomicBool::new(true),
        }
    }
}

impl CapabilityState {
    pub fn adapter_enabled(&self) -> bool {
        self.adapter_enabled.load(Ordering::SeqCst)
    }

    pub fn set_adapter_enabled(&self, enabled: bool) {
        self.adapter_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::Scan => self.scan_granted.load(Ordering::SeqCst),
            Capability::Connect => self.connect_granted.load(Ordering::SeqCst),
        }
    }

    pub fn set_granted(&self, capability: Capability, granted: bool) {
        match capability {
            Capability::Scan => self.scan_granted.store(granted, Ordering::SeqCst),
            Capability::Connect => self.connect_granted.store(granted, Ordering::SeqCst),
        }
    }

    pub fn grants(&self) -> CapabilityGrants {
        CapabilityGrants {
            scan: self.granted(Capability::Scan),
            connect: self.granted(Capability::Connect),
        }
    }
}
