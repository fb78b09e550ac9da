use std::time::Duration;

/**
 * The advertised device name that discovery filters on, unless overridden by
 * the config file.
 */
pub const TARGET_DEVICE_NAME: &str = "fastrec";

/**
 * How long (seconds) a scan session runs before it is stopped automatically.
 */
pub const SCAN_PERIOD_SECS: u64 = 10;

/**
 * How long a transient notice stays visible.
 */
pub const NOTICE_LINGER: Duration = Duration::from_secs(4);

/**
 * Capacity of the scan event channel (worker -> gui).
 */
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/**
 * Capacity of the worker command channel (gui -> worker).
 */
pub const COMMAND_CHANNEL_CAPACITY: usize = 8;
