//! CLI command handlers. Each command is in its own file.

mod cancel;
mod download;
mod fetch;
mod jobs;
mod list;
mod serve;
mod start;
mod watch;

pub use cancel::run_cancel;
pub use download::run_download;
pub use fetch::run_fetch;
pub use jobs::run_jobs;
pub use list::run_list;
pub use serve::run_serve;
pub use start::run_start;
pub use watch::run_watch;
