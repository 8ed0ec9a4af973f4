//! CLI command handlers. Each command is in its own file.

mod config;
mod connect;
mod get;
mod list;
mod serve;
mod size;

pub use config::run_config;
pub use get::run_get;
pub use list::run_list;
pub use serve::run_serve;
pub use size::run_size;
