use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::debug;

use crate::error::ScanError;
use crate::scan::capability::{
    AdapterStatus, Capability, CapabilityGrants, PermissionAuthority,
};
use crate::scan::constants::{SCAN_PERIOD_SECS, TARGET_DEVICE_NAME};
use crate::scan::types::{Action, ConnectionPhase, DeviceId, DiscoveredDevice, ScanSession};

/// The scan & connect lifecycle. Owns the scan session, the deduplicated
/// first-seen-ordered device list and the single connection attempt.
///
/// Every operation is a plain state transition returning the side effects
/// the harness must execute, so the whole lifecycle runs headless in tests.
pub struct ScanController {
    authority: Arc<dyn PermissionAuthority>,
    adapter: Arc<dyn AdapterStatus>,

    target_name: String,
    scan_period: Duration,

    session: ScanSession,
    // key is the device identifier, so each identifier appears at most once
    // and iteration order is first-seen order
    devices: IndexMap<DeviceId, DiscoveredDevice>,
    connection: ConnectionPhase,
    generation: u64,
}

impl ScanController {
    pub fn new(authority: Arc<dyn PermissionAuthority>, adapter: Arc<dyn AdapterStatus>) -> Self {
        ScanController {
            authority,
            adapter,
            target_name: TARGET_DEVICE_NAME.to_string(),
            scan_period: Duration::from_secs(SCAN_PERIOD_SECS),
            session: ScanSession::Idle,
            devices: IndexMap::new(),
            connection: ConnectionPhase::Idle,
            generation: 0,
        }
    }

    pub fn set_target_name(&mut self, name: String) {
        self.target_name = name;
    }

    pub fn set_scan_period(&mut self, period: Duration) {
        self.scan_period = period;
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.session, ScanSession::Scanning { .. })
    }

    pub fn session(&self) -> ScanSession {
        self.session
    }

    pub fn connection(&self) -> &ConnectionPhase {
        &self.connection
    }

    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Explicit startup: fire the asynchronous adapter-enable and permission
    /// batch requests. Their results arrive later through
    /// `on_adapter_enable_resolved` / `on_permissions_resolved`.
    pub fn init(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.adapter.enabled() {
            actions.push(Action::RequestAdapterEnable);
        }
        actions.push(Action::RequestPermissions(vec![Capability::Scan, Capability::Connect]));
        actions
    }

    /// Explicit teardown counterpart of `init`.
    pub fn shutdown(&mut self) -> Vec<Action> {
        if self.is_scanning() {
            self.session = ScanSession::Idle;
            vec![Action::StopDiscovery]
        } else {
            vec![]
        }
    }

    pub fn toggle_scan(&mut self) -> Vec<Action> {
        if self.is_scanning() {
            self.stop_scan()
        } else {
            self.start_scan()
        }
    }

    /// Clears the previous results, starts a backend scan filtered to the
    /// target name and arms the one-shot auto-stop timer. A disabled adapter
    /// is a silent no-op; a missing scan capability is surfaced as a notice.
    pub fn start_scan(&mut self) -> Vec<Action> {
        if self.is_scanning() {
            return vec![];
        }
        if !self.adapter.enabled() {
            debug!("Scan requested while the adapter is disabled");
            return vec![];
        }
        if !self.authority.granted(Capability::Scan) {
            return vec![Action::Notice(ScanError::PermissionDenied(Capability::Scan).to_string())];
        }

        self.devices.clear();
        self.generation += 1;
        self.session = ScanSession::Scanning { generation: self.generation };

        vec![
            Action::StartDiscovery { name_filter: self.target_name.clone() },
            Action::ScheduleTimeout { generation: self.generation, after: self.scan_period },
        ]
    }

    /// No-op when already idle. When the scan capability has been revoked the
    /// backend subscription cannot be torn down, so the session stays active
    /// and the user is told once.
    pub fn stop_scan(&mut self) -> Vec<Action> {
        if !self.is_scanning() {
            return vec![];
        }
        if !self.authority.granted(Capability::Scan) {
            return vec![Action::Notice(ScanError::PermissionDenied(Capability::Scan).to_string())];
        }

        self.session = ScanSession::Idle;
        vec![Action::StopDiscovery]
    }

    /// The auto-stop timer fired. The timer is never cancelled; a firing for
    /// an already-idle or restarted session does nothing.
    pub fn on_scan_timeout(&mut self, generation: u64) -> Vec<Action> {
        match self.session {
            ScanSession::Scanning { generation: current } if current == generation => {
                self.stop_scan()
            },
            _ => {
                debug!("Ignoring stale scan timeout (generation {})", generation);
                vec![]
            },
        }
    }

    /// An advertisement sighting from the backend. Deduplicates by identifier;
    /// the first sighting of an identifier is recorded and displayable at
    /// once. Sightings outside an active session are dropped.
    pub fn on_advertisement(&mut self, id: DeviceId, name: Option<String>) -> Vec<Action> {
        if !self.is_scanning() {
            debug!("Ignoring advertisement from {} while idle", id);
            return vec![];
        }
        if self.devices.contains_key(&id) {
            return vec![];
        }

        self.devices.insert(id.clone(), DiscoveredDevice::new(id, name));
        vec![]
    }

    /// Connect to the device at `index` in the displayed list. Any active scan
    /// session ends here unconditionally, even with a revoked scan capability;
    /// if the backend teardown then fails, the worker reports a fault. A stale
    /// index or a missing connect capability aborts with a notice.
    pub fn connect_to_device(&mut self, index: usize) -> Vec<Action> {
        let Some(device) = self.devices.get_index(index).map(|(_, device)| device.clone()) else {
            return vec![Action::Notice(ScanError::InvalidSelection { index }.to_string())];
        };

        let mut actions = Vec::new();
        if self.is_scanning() {
            self.session = ScanSession::Idle;
            actions.push(Action::StopDiscovery);
        }

        if !self.authority.granted(Capability::Connect) {
            actions.push(Action::Notice(ScanError::PermissionDenied(Capability::Connect).to_string()));
            return actions;
        }

        self.connection = ConnectionPhase::Connecting(device.id.clone());
        actions.push(Action::Connect { device_id: device.id.clone() });
        actions.push(Action::Notice(format!("Connecting to {}", device.label())));
        actions
    }

    /// Connection state change from the backend. Only the device of the
    /// current attempt is of interest; there is no retry, the phase simply
    /// tracks what the stack reported.
    pub fn on_connection_change(&mut self, id: DeviceId, connected: bool) -> Vec<Action> {
        let current = match &self.connection {
            ConnectionPhase::Connecting(device_id)
            | ConnectionPhase::Connected(device_id)
            | ConnectionPhase::Disconnected(device_id) => device_id,
            ConnectionPhase::Idle => {
                debug!("Ignoring connection change for {} without an attempt", id);
                return vec![];
            },
        };
        if *current != id {
            debug!("Ignoring connection change for unrelated device {}", id);
            return vec![];
        }

        let label = self.device_label(&id);
        if connected {
            self.connection = ConnectionPhase::Connected(id);
            vec![Action::Notice(format!("Connected to {}", label))]
        } else {
            self.connection = ConnectionPhase::Disconnected(id);
            vec![Action::Notice(format!("Disconnected from {}", label))]
        }
    }

    /// A backend-reported failure. The affected operation is aborted and the
    /// user is told once; nothing is retried.
    pub fn on_fault(&mut self, error: ScanError) -> Vec<Action> {
        match &error {
            ScanError::PermissionDenied(Capability::Connect) => {
                if matches!(self.connection, ConnectionPhase::Connecting(_)) {
                    self.connection = ConnectionPhase::Idle;
                }
            },
            _ => {
                if self.is_scanning() {
                    self.session = ScanSession::Idle;
                } else if matches!(self.connection, ConnectionPhase::Connecting(_)) {
                    self.connection = ConnectionPhase::Idle;
                }
            },
        }
        vec![Action::Notice(error.to_string())]
    }

    /// Completion of the permission batch request issued by `init`. Each
    /// denied capability produces one notice.
    pub fn on_permissions_resolved(&mut self, grants: CapabilityGrants) -> Vec<Action> {
        grants
            .denied()
            .into_iter()
            .map(|capability| {
                Action::Notice(ScanError::PermissionDenied(capability).to_string())
            })
            .collect()
    }

    /// Completion of the adapter-enable request issued by `init`.
    pub fn on_adapter_enable_resolved(&mut self, enabled: bool) -> Vec<Action> {
        if enabled {
            vec![]
        } else {
            vec![Action::Notice(ScanError::AdapterDisabled.to_string())]
        }
    }

    fn device_label(&self, id: &DeviceId) -> String {
        self.devices
            .get(id)
            .map(|device| device.label())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future;
    use futures::FutureExt;

    use super::*;

    #[derive(Default)]
    struct FakeAuthority {
        deny_scan: AtomicBool,
        deny_connect: AtomicBool,
    }

    impl PermissionAuthority for FakeAuthority {
        fn granted(&self, capability: Capability) -> bool {
            match capability {
                Capability::Scan => !self.deny_scan.load(Ordering::SeqCst),
                Capability::Connect => !self.deny_connect.load(Ordering::SeqCst),
            }
        }

        fn request(&self, _capabilities: &[Capability]) -> futures::future::BoxFuture<'static, CapabilityGrants> {
            let grants = CapabilityGrants {
                scan: self.granted(Capability::Scan),
                connect: self.granted(Capability::Connect),
            };
            future::ready(grants).boxed()
        }
    }

    #[derive(Default)]
    struct FakeAdapter {
        disabled: AtomicBool,
    }

    impl AdapterStatus for FakeAdapter {
        fn enabled(&self) -> bool {
            !self.disabled.load(Ordering::SeqCst)
        }

        fn request_enable(&self) -> futures::future::BoxFuture<'static, bool> {
            future::ready(self.enabled()).boxed()
        }
    }

    fn controller() -> (ScanController, Arc<FakeAuthority>, Arc<FakeAdapter>) {
        let authority = Arc::new(FakeAuthority::default());
        let adapter = Arc::new(FakeAdapter::default());
        let controller = ScanController::new(authority.clone(), adapter.clone());
        (controller, authority, adapter)
    }

    fn current_generation(controller: &ScanController) -> u64 {
        match controller.session() {
            ScanSession::Scanning { generation } => generation,
            ScanSession::Idle => panic!("expected an active scan session"),
        }
    }

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s)
    }

    #[test]
    fn start_scan_clears_results_and_arms_timer() {
        let (mut controller, _, _) = controller();

        let actions = controller.start_scan();
        assert!(controller.is_scanning());
        assert_eq!(actions[0], Action::StartDiscovery { name_filter: "fastrec".to_string() });
        assert!(matches!(actions[1], Action::ScheduleTimeout { generation: 1, .. }));

        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        assert_eq!(controller.device_count(), 1);

        controller.stop_scan();
        controller.start_scan();
        assert_eq!(controller.device_count(), 0, "a new session starts with an empty list");
    }

    #[test]
    fn advertisements_are_deduplicated_in_first_seen_order() {
        let (mut controller, _, _) = controller();
        controller.start_scan();

        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        controller.on_advertisement(id("BB:02"), Some("fastrec".to_string()));
        controller.on_advertisement(id("AA:01"), None);

        let ids: Vec<&str> = controller.devices().map(|device| device.id.as_str()).collect();
        assert_eq!(ids, vec!["AA:01", "BB:02"]);
    }

    #[test]
    fn advertisement_while_idle_is_dropped() {
        let (mut controller, _, _) = controller();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        assert_eq!(controller.device_count(), 0);
    }

    #[test]
    fn toggle_starts_then_stops() {
        let (mut controller, _, _) = controller();

        let actions = controller.toggle_scan();
        assert!(controller.is_scanning());
        assert!(matches!(actions[0], Action::StartDiscovery { .. }));

        let actions = controller.toggle_scan();
        assert!(!controller.is_scanning());
        assert_eq!(actions, vec![Action::StopDiscovery]);
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let (mut controller, _, _) = controller();
        assert_eq!(controller.stop_scan(), vec![]);
        assert_eq!(controller.session(), ScanSession::Idle);
    }

    #[test]
    fn timeout_stops_the_session_it_was_armed_for() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        let generation = current_generation(&controller);

        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        let actions = controller.on_scan_timeout(generation);
        assert_eq!(actions, vec![Action::StopDiscovery]);
        assert_eq!(controller.session(), ScanSession::Idle);
        assert_eq!(controller.device_count(), 1, "timeout leaves the list untouched");
    }

    #[test]
    fn stale_timeout_is_a_safe_noop() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        let first = current_generation(&controller);
        controller.stop_scan();

        // the timer of the stopped session is still pending
        assert_eq!(controller.on_scan_timeout(first), vec![]);

        controller.start_scan();
        let second = current_generation(&controller);
        assert_ne!(first, second);

        // the stale timer must not kill the new session
        assert_eq!(controller.on_scan_timeout(first), vec![]);
        assert!(controller.is_scanning());
    }

    #[test]
    fn scan_without_permission_is_refused_with_a_notice() {
        let (mut controller, authority, _) = controller();
        authority.deny_scan.store(true, Ordering::SeqCst);

        let actions = controller.start_scan();
        assert!(!controller.is_scanning());
        assert_eq!(actions, vec![Action::Notice("Permission denied: bluetooth-scan".to_string())]);
    }

    #[test]
    fn scan_with_disabled_adapter_is_a_silent_noop() {
        let (mut controller, _, adapter) = controller();
        adapter.disabled.store(true, Ordering::SeqCst);

        assert_eq!(controller.start_scan(), vec![]);
        assert!(!controller.is_scanning());
    }

    #[test]
    fn stop_with_a_revoked_permission_keeps_the_session_with_one_notice() {
        let (mut controller, authority, _) = controller();
        controller.start_scan();
        authority.deny_scan.store(true, Ordering::SeqCst);

        let actions = controller.stop_scan();
        assert_eq!(actions, vec![Action::Notice("Permission denied: bluetooth-scan".to_string())]);
        assert!(controller.is_scanning(), "the backend subscription cannot be torn down");
    }

    #[test]
    fn adapter_enable_refusal_is_surfaced_as_a_notice() {
        let (mut controller, _, _) = controller();

        assert_eq!(controller.on_adapter_enable_resolved(true), vec![]);
        assert_eq!(controller.on_adapter_enable_resolved(false), vec![
            Action::Notice("Bluetooth is not enabled".to_string()),
        ]);
    }

    #[test]
    fn stale_index_does_not_initiate_a_connection() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));

        let actions = controller.connect_to_device(5);
        assert_eq!(actions, vec![Action::Notice("No device is listed at position 5".to_string())]);
        assert_eq!(*controller.connection(), ConnectionPhase::Idle);
        assert!(controller.is_scanning(), "a stale selection leaves the scan running");
    }

    #[test]
    fn connect_force_stops_the_scan() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));

        let actions = controller.connect_to_device(0);
        assert!(!controller.is_scanning());
        assert_eq!(actions[0], Action::StopDiscovery);
        assert_eq!(actions[1], Action::Connect { device_id: id("AA:01") });
        assert!(matches!(&actions[2], Action::Notice(text) if text.starts_with("Connecting to")));
        assert_eq!(*controller.connection(), ConnectionPhase::Connecting(id("AA:01")));
    }

    #[test]
    fn connect_ends_the_session_even_with_a_revoked_scan_permission() {
        let (mut controller, authority, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        authority.deny_scan.store(true, Ordering::SeqCst);

        let actions = controller.connect_to_device(0);
        assert!(!controller.is_scanning(), "a connection attempt always ends the session");
        assert_eq!(actions[0], Action::StopDiscovery);
        assert_eq!(*controller.connection(), ConnectionPhase::Connecting(id("AA:01")));
    }

    #[test]
    fn connect_without_permission_aborts_after_stopping_the_scan() {
        let (mut controller, authority, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        authority.deny_connect.store(true, Ordering::SeqCst);

        let actions = controller.connect_to_device(0);
        assert_eq!(actions, vec![
            Action::StopDiscovery,
            Action::Notice("Permission denied: bluetooth-connect".to_string()),
        ]);
        assert_eq!(*controller.connection(), ConnectionPhase::Idle);
    }

    #[test]
    fn connection_changes_are_reported_for_the_current_attempt() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        controller.connect_to_device(0);

        let actions = controller.on_connection_change(id("AA:01"), true);
        assert_eq!(*controller.connection(), ConnectionPhase::Connected(id("AA:01")));
        assert_eq!(actions, vec![Action::Notice("Connected to fastrec (AA:01)".to_string())]);

        let actions = controller.on_connection_change(id("AA:01"), false);
        assert_eq!(*controller.connection(), ConnectionPhase::Disconnected(id("AA:01")));
        assert_eq!(actions, vec![Action::Notice("Disconnected from fastrec (AA:01)".to_string())]);
    }

    #[test]
    fn connection_changes_for_unrelated_devices_are_ignored() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        controller.connect_to_device(0);

        assert_eq!(controller.on_connection_change(id("CC:03"), true), vec![]);
        assert_eq!(*controller.connection(), ConnectionPhase::Connecting(id("AA:01")));
    }

    #[test]
    fn fault_during_scan_returns_to_idle_with_one_notice() {
        let (mut controller, _, _) = controller();
        controller.start_scan();

        let actions = controller.on_fault(ScanError::PermissionDenied(Capability::Scan));
        assert!(!controller.is_scanning());
        assert_eq!(actions, vec![Action::Notice("Permission denied: bluetooth-scan".to_string())]);
    }

    #[test]
    fn fault_during_connect_aborts_the_attempt() {
        let (mut controller, _, _) = controller();
        controller.start_scan();
        controller.on_advertisement(id("AA:01"), Some("fastrec".to_string()));
        controller.connect_to_device(0);

        controller.on_fault(ScanError::Backend("peripheral vanished".to_string()));
        assert_eq!(*controller.connection(), ConnectionPhase::Idle);
    }

    #[test]
    fn init_requests_enable_and_permissions() {
        let (mut controller, _, adapter) = controller();
        adapter.disabled.store(true, Ordering::SeqCst);

        let actions = controller.init();
        assert_eq!(actions, vec![
            Action::RequestAdapterEnable,
            Action::RequestPermissions(vec![Capability::Scan, Capability::Connect]),
        ]);
    }

    #[test]
    fn denied_permission_results_are_surfaced_once_each() {
        let (mut controller, _, _) = controller();
        let actions = controller.on_permissions_resolved(CapabilityGrants { scan: false, connect: false });
        assert_eq!(actions, vec![
            Action::Notice("Permission denied: bluetooth-scan".to_string()),
            Action::Notice("Permission denied: bluetooth-connect".to_string()),
        ]);

        let actions = controller.on_permissions_resolved(CapabilityGrants { scan: true, connect: true });
        assert_eq!(actions, vec![]);
    }

    #[test]
    fn shutdown_stops_an_active_scan() {
        let (mut controller, _, _) = controller();
        assert_eq!(controller.shutdown(), vec![]);

        controller.start_scan();
        assert_eq!(controller.shutdown(), vec![Action::StopDiscovery]);
        assert!(!controller.is_scanning());
    }
}
