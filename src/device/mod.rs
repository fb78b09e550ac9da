pub mod system;
pub mod types;
pub mod worker;
