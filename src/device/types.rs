use crate::error::ScanError;
use crate::scan::types::DeviceId;

/// Commands sent from the gui to the btleplug worker.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    StartScan { name_filter: String },
    StopScan,
    Connect { device_id: DeviceId },
}

/// Events emitted by the btleplug worker.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// An advertisement matching the name filter was sighted.
    Advertisement { device_id: DeviceId, name: Option<String> },
    /// The connection state of a previously sighted peripheral changed.
    Connection { device_id: DeviceId, connected: bool },
    /// A command could not be carried out.
    Fault(ScanError),
}
