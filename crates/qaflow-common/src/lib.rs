pub mod error;
pub mod formatter;
pub mod locator;
pub mod protocol;
pub mod report;
