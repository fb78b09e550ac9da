use std::env;

use fastrec_scan::error::{error_msgbox, AppRunError, ConfigError};
use fastrec_scan::{init_logging, run};
use log::info;
use msgbox::IconType;

#[cfg(target_os = "windows")]
fn windows_init() {
    fastrec_scan::os::windows::hide_console_window();
}

#[cfg(not(target_os = "windows"))]
fn windows_init() {}

fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("FastRec Scan ", env!("CARGO_PKG_VERSION")));

    windows_init();

    let args = env::args();

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            msgbox::create(
                concat!("FastRec Scan ", env!("CARGO_PKG_VERSION")),
                "This application has already been started",
                IconType::Error,
            ).expect("Could not create msgbox");
            Ok(())
        },
        Err(err) => {
            error_msgbox("Unexpected error", &err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
