//! Logger initialization over the `log` facade.
//!
//! Library code only logs through `log` macros; binaries call
//! [`init_logging`] once to install `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig};
