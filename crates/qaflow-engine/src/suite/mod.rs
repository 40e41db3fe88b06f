pub mod check;
pub mod loader;
pub mod runner;

pub use check::{ReferenceIssue, check_references};
pub use loader::{SuiteError, SuiteFile, SuiteLoader};
pub use runner::{PlannedCase, ProviderFactory, run_parallel, run_sequential};
