use std::sync::Arc;

use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::warn;

use crate::scan::capability::{
    AdapterStatus, Capability, CapabilityGrants, CapabilityState, PermissionAuthority,
};

/// Checks whether the machine has a usable bluetooth adapter and records the
/// result in the shared snapshot.
async fn probe_adapter(state: &CapabilityState) -> bool {
    let enabled = match Manager::new().await {
        Ok(manager) => match manager.adapters().await {
            Ok(adapters) => !adapters.is_empty(),
            Err(err) => {
                warn!("Failed to enumerate bluetooth adapters: {:?}", err);
                false
            },
        },
        Err(err) => {
            warn!("Failed to create bluetooth manager: {:?}", err);
            false
        },
    };

    state.set_adapter_enabled(enabled);
    enabled
}

/// Permission authority backed by the bluetooth stack. Desktop platforms have
/// no upfront permission prompt; a request probes the adapter and a denial
/// only becomes visible when the stack refuses an operation, at which point
/// the worker revokes the capability in the shared snapshot.
pub struct SystemAuthority {
    state: Arc<CapabilityState>,
}

impl SystemAuthority {
    pub fn new(state: Arc<CapabilityState>) -> Self {
        SystemAuthority { state }
    }
}

impl PermissionAuthority for SystemAuthority {
    fn granted(&self, capability: Capability) -> bool {
        self.state.granted(capability)
    }

    fn request(&self, _capabilities: &[Capability]) -> BoxFuture<'static, CapabilityGrants> {
        let state = self.state.clone();

        async move {
            probe_adapter(&state).await;
            state.grants()
        }
        .boxed()
    }
}

pub struct SystemAdapter {
    state: Arc<CapabilityState>,
}

impl SystemAdapter {
    pub fn new(state: Arc<CapabilityState>) -> Self {
        SystemAdapter { state }
    }
}

impl AdapterStatus for SystemAdapter {
    fn enabled(&self) -> bool {
        self.state.adapter_enabled()
    }

    fn request_enable(&self) -> BoxFuture<'static, bool> {
        let state = self.state.clone();
        async move { probe_adapter(&state).await }.boxed()
    }
}
