pub mod capability;
pub mod constants;
pub mod controller;
pub mod types;
