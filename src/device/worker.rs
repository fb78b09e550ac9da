use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::channel::mpsc::{Receiver, Sender};
use futures::stream::BoxStream;
use futures::{future, stream, SinkExt, StreamExt};
use iced::subscription::{self, Subscription};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::device::types::{ScanEvent, WorkerCommand};
use crate::error::{DeviceError, ScanError};
use crate::scan::capability::{Capability, CapabilityState};
use crate::scan::constants::EVENT_CHANNEL_CAPACITY;
use crate::scan::types::DeviceId;

/// The gui creates the command channel; the receiving half is handed to the
/// worker through this slot once the iced runtime starts the subscription.
pub type CommandReceiverSlot = Arc<Mutex<Option<Receiver<WorkerCommand>>>>;

async fn ensure_adapter(
    manager: &Manager,
    slot: &mut Option<Adapter>,
    events: &mut BoxStream<'static, CentralEvent>,
    caps: &CapabilityState,
) -> Result<(), DeviceError> {
    if slot.is_none() {
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(DeviceError::NoAdapter)?;

        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        *events = adapter.events().await?;
        *slot = Some(adapter);
        caps.set_adapter_enabled(true);
    }

    Ok(())
}

/// Resolve a sighted peripheral to an advertisement event. btleplug scan
/// filters cover service uuids only, so the name filter is applied here.
async fn sighting(
    central: &Adapter,
    peripheral_id: &PeripheralId,
    name_filter: &str,
) -> Result<Option<(DeviceId, Option<String>)>, DeviceError> {
    let peripheral = central.peripheral(peripheral_id).await?;

    let Some(properties) = peripheral.properties().await? else {
        debug!("Peripheral has no properties");
        return Ok(None);
    };

    match properties.local_name {
        Some(name) if name == name_filter => {
            Ok(Some((DeviceId::new(properties.address.to_string()), Some(name))))
        },
        _ => Ok(None),
    }
}

fn device_id_for(known: &HashMap<DeviceId, PeripheralId>, peripheral_id: &PeripheralId) -> Option<DeviceId> {
    known
        .iter()
        .find(|(_, candidate)| *candidate == peripheral_id)
        .map(|(device_id, _)| device_id.clone())
}

async fn report_fault(
    sender: &mut Sender<ScanEvent>,
    caps: &CapabilityState,
    error: DeviceError,
    capability: Capability,
) {
    warn!("Bluetooth operation failed: {:?}", error);

    let scan_error = error.as_scan_error(capability);
    match &scan_error {
        ScanError::PermissionDenied(capability) => caps.set_granted(*capability, false),
        ScanError::AdapterDisabled => caps.set_adapter_enabled(false),
        _ => {},
    }

    sender.send(ScanEvent::Fault(scan_error)).await.expect("Failed to send ScanEvent");
}

async fn run_worker(
    cancel: CancellationToken,
    mut commands: Receiver<WorkerCommand>,
    mut sender: Sender<ScanEvent>,
    caps: Arc<CapabilityState>,
) -> Infallible {
    let manager = Manager::new().await.expect("Failed to create bluetooth manager");

    let mut adapter: Option<Adapter> = None;
    let mut events: BoxStream<'static, CentralEvent> = stream::pending().boxed();
    let mut scanning = false;
    let mut name_filter = String::new();
    // peripherals reported during the current scan, by our identifier
    let mut known: HashMap<DeviceId, PeripheralId> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if scanning {
                    scanning = false;
                    if let Some(central) = adapter.as_ref() {
                        if let Err(err) = central.stop_scan().await {
                            warn!("Failed to stop scan on shutdown: {:?}", err);
                        }
                    }
                }
                info!("Bluetooth worker stopped");
                // note: subscription::channel expects the future to never resolve
                future::pending::<()>().await;
            },
            Some(command) = commands.next() => match command {
                WorkerCommand::StartScan { name_filter: filter } => {
                    name_filter = filter;

                    if let Err(err) = ensure_adapter(&manager, &mut adapter, &mut events, &caps).await {
                        report_fault(&mut sender, &caps, err, Capability::Scan).await;
                        continue;
                    }
                    let Some(central) = adapter.as_ref() else { continue };

                    match central.start_scan(ScanFilter::default()).await {
                        Ok(()) => {
                            known.clear();
                            scanning = true;
                            caps.set_granted(Capability::Scan, true);
                            info!("Scanning for \"{}\"...", name_filter);
                        },
                        Err(err) => {
                            report_fault(&mut sender, &caps, DeviceError::from(err), Capability::Scan).await;
                        },
                    }
                },
                WorkerCommand::StopScan => {
                    if scanning {
                        scanning = false;
                        info!("Scan stopped");
                        if let Some(central) = adapter.as_ref() {
                            if let Err(err) = central.stop_scan().await {
                                warn!("Failed to stop scan: {:?}", err);
                            }
                        }
                    }
                },
                WorkerCommand::Connect { device_id } => {
                    let Some(peripheral_id) = known.get(&device_id).cloned() else {
                        warn!("Connect requested for unknown device {}", device_id);
                        continue;
                    };
                    let Some(central) = adapter.as_ref() else { continue };

                    match central.peripheral(&peripheral_id).await {
                        Ok(peripheral) => {
                            info!("Connecting to {}...", device_id);
                            if let Err(err) = peripheral.connect().await {
                                report_fault(&mut sender, &caps, DeviceError::from(err), Capability::Connect).await;
                            }
                            // the state change itself arrives as a CentralEvent
                        },
                        Err(err) => {
                            report_fault(&mut sender, &caps, DeviceError::from(err), Capability::Connect).await;
                        },
                    }
                },
            },
            Some(event) = events.next() => match event {
                CentralEvent::DeviceDiscovered(peripheral_id) | CentralEvent::DeviceUpdated(peripheral_id) => {
                    if !scanning {
                        continue;
                    }
                    if known.values().any(|candidate| *candidate == peripheral_id) {
                        continue;
                    }
                    let Some(central) = adapter.as_ref() else { continue };

                    match sighting(central, &peripheral_id, &name_filter).await {
                        Ok(Some((device_id, name))) => {
                            info!("Sighted {} {:?}", device_id, name);
                            known.insert(device_id.clone(), peripheral_id);
                            sender.send(ScanEvent::Advertisement { device_id, name }).await
                                .expect("Failed to send ScanEvent");
                        },
                        Ok(None) => {},
                        Err(err) => {
                            warn!("Could not inspect peripheral: {:?}", err);
                        },
                    }
                },
                CentralEvent::DeviceConnected(peripheral_id) => {
                    if let Some(device_id) = device_id_for(&known, &peripheral_id) {
                        info!("Connected to {}", device_id);
                        sender.send(ScanEvent::Connection { device_id, connected: true }).await
                            .expect("Failed to send ScanEvent");
                    }
                },
                CentralEvent::DeviceDisconnected(peripheral_id) => {
                    if let Some(device_id) = device_id_for(&known, &peripheral_id) {
                        info!("Disconnected from {}", device_id);
                        sender.send(ScanEvent::Connection { device_id, connected: false }).await
                            .expect("Failed to send ScanEvent");
                    }
                },
                _ => {},
            },
        }
    }
}

pub fn scan_worker_subscription(
    cancel: CancellationToken,
    commands: CommandReceiverSlot,
    caps: Arc<CapabilityState>,
) -> Subscription<ScanEvent> {
    struct Worker;

    subscription::channel(
        std::any::TypeId::of::<Worker>(),
        EVENT_CHANNEL_CAPACITY,
        move |sender| {
            let cancel = cancel.clone();
            let commands = commands.clone();
            let caps = caps.clone();

            async move {
                let receiver = commands.lock().expect("Failed to lock worker command slot").take();
                match receiver {
                    Some(receiver) => run_worker(cancel, receiver, sender, caps).await,
                    // the runtime restarted the subscription; the first worker
                    // kept the receiving half of the channel
                    None => future::pending().await,
                }
            }
        },
    )
}
