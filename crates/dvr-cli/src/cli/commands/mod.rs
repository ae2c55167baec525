//! CLI command handlers. Each command is in its own file.

mod checksum;
mod extract;
mod fetch;
mod grab;
mod probe;

pub use checksum::run_checksum;
pub use extract::run_extract;
pub use fetch::run_fetch;
pub use grab::run_grab;
pub use probe::run_probe;
