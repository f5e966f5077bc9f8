//! Process automation: drives interactive CLIs through a pseudo-terminal.

mod exec;
mod locate;

pub use exec::{execute, AutoResponse, ExecOutcome, ExecRequest};
pub use locate::locate;
