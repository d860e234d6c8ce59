use crate::config::Settings;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WATCH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(
    name = "start-nginx",
    about = "Start nginx server with the given config",
    after_help = "Placeholders __PORT__, __PORT_1__, ..., __PORT_9__, __ADDRESS__, __CONFDIR__, \
                  __CWD__ and __WORKDIR__ in the config are substituted before nginx is started."
)]
pub struct Cli {
    /// Path of the nginx configuration file
    #[arg(value_name = "CONF_FILE")]
    pub conf_file: PathBuf,

    /// Name or path of the nginx binary to start [default: $NGINX_BIN or nginx]
    #[arg(short = 'b', long, value_name = "FILE")]
    pub bin_path: Option<PathBuf>,

    /// Hostname or IP address to bind the port(s) on [default: 127.0.0.1]
    #[arg(short = 'A', long, value_name = "HOST")]
    pub bind_address: Option<String>,

    /// Port number for the __PORT__ placeholders, repeat for more ports [default: random]
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Directory passed to nginx as the prefix [default: a temporary directory]
    #[arg(short = 'd', long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Milliseconds to wait for nginx to respond to the health check [default: 1000]
    #[arg(short = 'T', long, value_name = "MSEC")]
    pub start_timeout: Option<u64>,

    /// Watch a file or directory (recursively) and reload nginx on changes;
    /// CONF_FILE is watched implicitly
    #[arg(short = 'w', long = "watch", value_name = "PATH")]
    pub watch: Vec<PathBuf>,

    /// Delay between reloads in milliseconds [default: 200]
    #[arg(short = 'D', long, value_name = "MSEC")]
    pub watch_delay: Option<u64>,

    /// TOML file with defaults for the options above
    #[arg(short = 's', long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

/// Options after merging the command line over the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub conf_file: PathBuf,
    pub bin_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub ports: Vec<u16>,
    pub preferred_ports: Vec<u16>,
    pub work_dir: Option<PathBuf>,
    pub start_timeout: Option<Duration>,
    pub watch: Vec<PathBuf>,
    pub watch_delay: Duration,
}

impl Cli {
    pub fn merge(self, settings: Settings) -> RunOptions {
        let ports = if self.ports.is_empty() {
            settings.ports.unwrap_or_default()
        } else {
            self.ports
        };
        let mut watch = settings.watch.unwrap_or_default();
        watch.extend(self.watch);

        RunOptions {
            conf_file: self.conf_file,
            bin_path: self.bin_path.or(settings.bin_path),
            bind_address: self.bind_address.or(settings.bind_address),
            ports,
            preferred_ports: settings.preferred_ports.unwrap_or_default(),
            work_dir: self.work_dir.or(settings.work_dir),
            start_timeout: self
                .start_timeout
                .or(settings.start_timeout)
                .map(Duration::from_millis),
            watch,
            watch_delay: self
                .watch_delay
                .or(settings.watch_delay)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WATCH_DELAY),
        }
    }
}
