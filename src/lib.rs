pub mod cleanup;
pub mod cli;
pub mod conf;
pub mod config;
pub mod editor;
pub mod health;
pub mod log;
pub mod logger;
pub mod paths;
pub mod ports;
pub mod process;
pub mod runner;
pub mod template;
pub mod version;
pub mod watch;

pub use cleanup::{CleanupStack, ExitHooks};
pub use conf::{Conf, Context, Directive, parse};
pub use editor::{Lookup, PatchError, PatchOperation};
pub use log::{AccessLog, ErrorLog};
pub use logger::{Logger, NoopLogger, SharedLogger, TracingLogger};
pub use runner::{
    BinaryResolver, ConfigSource, NginxOptions, NginxServer, RunnerError, start_nginx,
};
pub use version::{ModuleFlag, VersionInfo, nginx_version_info};
