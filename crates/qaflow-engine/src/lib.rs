pub mod backend;
pub mod cli;
pub mod config;
pub mod executor;
pub mod runner;
pub mod suite;
pub mod totp;

pub use qaflow_common::formatter;
pub use qaflow_common::locator;
pub use qaflow_common::protocol;
pub use qaflow_common::report;
