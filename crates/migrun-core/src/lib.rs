pub mod id;
pub mod migration;
pub mod parser;
pub mod source;
pub mod statements;
pub mod status;
pub mod template;

pub use migration::Migration;
pub use parser::{MigrationParser, parse_migration};
pub use source::{FileReader, FsReader, MigrationLocator};
pub use status::{AppliedIdSource, AppliedIds};
