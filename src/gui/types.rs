use iced::Event;

use crate::config::types::Config;
use crate::device::types::ScanEvent;
use crate::scan::capability::CapabilityGrants;

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ConfigLoadComplete((Config, Option<String>)),
    WorkerCommandSent(()),
    ScanButtonPressed,
    DeviceRowPressed(usize),
    ScanTimeout(u64),
    ScanEvent(ScanEvent),
    PermissionsResolved(CapabilityGrants),
    AdapterEnableResolved(bool),
    NoticeExpired(u64),
}
