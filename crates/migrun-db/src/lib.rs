pub mod runner;
pub mod version_store;

pub use runner::{MigrationReport, Outcome, Runner, StatusLine};
pub use version_store::VersionStore;
