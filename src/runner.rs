use crate::cleanup::{CleanupStack, ExitHooks};
use crate::conf::{self, ParseError};
use crate::editor::{PatchError, PatchOperation};
use crate::health::{self, PROBE_INTERVAL, ProbeError, ProbeTarget};
use crate::log::{AccessLog, ErrorLog, LogBuffer, LogKind, LogSink, LogTailer, TAIL_POLL_INTERVAL};
use crate::logger::{self, Logger, SharedLogger};
use crate::paths::{self, Paths};
use crate::ports::{self, PortError};
use crate::process::{self, DEFAULT_KILL_TIMEOUT, NginxProcess, ProcessError, SPAWN_GRACE_PERIOD, StderrMode};
use crate::template::{self, TemplateParams};
use crate::version::{self, VersionError, VersionInfo};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(1000);
pub const ACCESS_LOG_FILE: &str = "access.log";

/// A patch operation applied only when `if_module` is compiled in statically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPatchEntry {
    pub op: PatchOperation,
    pub if_module: Option<&'static str>,
}

impl ConfigPatchEntry {
    fn new(op: PatchOperation) -> Self {
        Self { op, if_module: None }
    }

    fn if_module(op: PatchOperation, module: &'static str) -> Self {
        Self {
            op,
            if_module: Some(module),
        }
    }

    pub fn applies_to(&self, info: &VersionInfo) -> bool {
        self.if_module.is_none_or(|m| info.has_static_module(m))
    }
}

/// Applied to every config before it's handed to nginx: keeps nginx in the
/// foreground, logging to stderr, and writing all its files into the
/// working directory.
pub static CONFIG_PATCH: LazyLock<Vec<ConfigPatchEntry>> = LazyLock::new(|| {
    vec![
        ConfigPatchEntry::new(PatchOperation::set("/daemon", "off")),
        ConfigPatchEntry::new(PatchOperation::set("/pid", "nginx.pid")),
        // Without this, the process we spawn is not the one serving requests.
        ConfigPatchEntry::new(PatchOperation::default("/master_process", "off")),
        ConfigPatchEntry::new(PatchOperation::default("/error_log", "stderr info")),
        ConfigPatchEntry::new(PatchOperation::default("/http/access_log", ACCESS_LOG_FILE)),
        ConfigPatchEntry::new(PatchOperation::default(
            "/http/client_body_temp_path",
            "client_body_temp",
        )),
        ConfigPatchEntry::if_module(
            PatchOperation::default("/http/proxy_temp_path", "proxy_temp"),
            "http_proxy",
        ),
        ConfigPatchEntry::if_module(
            PatchOperation::default("/http/fastcgi_temp_path", "fastcgi_temp"),
            "http_fastcgi",
        ),
        ConfigPatchEntry::if_module(
            PatchOperation::default("/http/uwsgi_temp_path", "uwsgi_temp"),
            "http_uwsgi",
        ),
        ConfigPatchEntry::if_module(
            PatchOperation::default("/http/scgi_temp_path", "scgi_temp"),
            "http_scgi",
        ),
    ]
});

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("either config or config_path must be provided")]
    MissingConfig,
    #[error(
        "no __PORT__ placeholder found in nginx config and options ports and preferred_ports are empty"
    )]
    NoPorts,
    #[error("failed to create working directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read nginx config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write nginx config {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("nginx version {0} was requested, but no binary resolver is set")]
    NoResolver(String),
    #[error("failed to resolve nginx binary for version {version}: {source}")]
    Resolve {
        version: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("invalid nginx config: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to adjust nginx config: {0}")]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Ports(#[from] PortError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("failed to start nginx, no response on port {port}")]
    NotResponding { port: u16 },
    #[error("nginx cannot be reloaded when master_process is off")]
    MasterProcessOff,
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("this function is available only when the option {0} is Buffer")]
    LogNotBuffered(LogKind),
    #[error("nginx has been stopped")]
    Stopped,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Provides an nginx executable for a version requirement, e.g. by
/// downloading it.
pub trait BinaryResolver: Send + Sync {
    fn resolve<'a>(&'a self, version: &'a str) -> BoxFuture<'a, Result<PathBuf, BoxError>>;
}

#[derive(Clone)]
pub struct NginxOptions {
    /// Config text. Takes precedence over `config_path`.
    pub config: Option<String>,
    /// Config file. The rendered config is written next to it as `.<name>~`.
    pub config_path: Option<PathBuf>,
    /// Defaults to `$NGINX_BIN` or `nginx`. Ignored when `version` is set.
    pub bin_path: Option<PathBuf>,
    /// Version requirement passed to `resolver`.
    pub version: Option<String>,
    pub resolver: Option<Arc<dyn BinaryResolver>>,
    pub bind_address: String,
    /// Used as given for `__PORT__`, `__PORT_1__`, ...
    pub ports: Vec<u16>,
    /// Tried first for the ports not given in `ports`.
    pub preferred_ports: Vec<u16>,
    /// nginx prefix directory. A temporary one is created (and removed on
    /// stop) when not set.
    pub work_dir: Option<PathBuf>,
    pub error_log: ErrorLog,
    pub access_log: AccessLog,
    /// How long to wait for nginx to answer the health check.
    pub start_timeout: Duration,
    /// How long to wait after SIGTERM before killing nginx.
    pub kill_timeout: Duration,
    pub logger: SharedLogger,
    /// When set, the server is also stopped by `ExitHooks::run`.
    pub exit_hooks: Option<ExitHooks>,
    pub paths: Paths,
}

impl Default for NginxOptions {
    fn default() -> Self {
        Self {
            config: None,
            config_path: None,
            bin_path: None,
            version: None,
            resolver: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            ports: Vec::new(),
            preferred_ports: Vec::new(),
            work_dir: None,
            error_log: ErrorLog::default(),
            access_log: AccessLog::default(),
            start_timeout: DEFAULT_START_TIMEOUT,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            logger: logger::noop(),
            exit_hooks: None,
            paths: Paths::new(),
        }
    }
}

impl NginxOptions {
    pub fn with_config(config: impl Into<String>) -> Self {
        Self {
            config: Some(config.into()),
            ..Self::default()
        }
    }

    pub fn with_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// New config for [`NginxServer::reload`] and [`NginxServer::restart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Text(String),
    Path(PathBuf),
}

impl ConfigSource {
    async fn read(&self) -> Result<String, RunnerError> {
        match self {
            ConfigSource::Text(text) => Ok(text.clone()),
            ConfigSource::Path(path) => read_config(path).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Config adjustment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParams {
    pub bind_address: String,
    /// Where the rendered config is written; its directory is `__CONFDIR__`.
    pub config_path: PathBuf,
    pub cwd: PathBuf,
    pub work_dir: PathBuf,
    pub ports: Vec<u16>,
    pub version_info: VersionInfo,
}

/// Substitutes the placeholders and applies [`CONFIG_PATCH`].
///
/// Operations on `/http/...` are skipped when the config has no `http`
/// block, e.g. a `stream`-only config.
pub fn adjust_config(config: &str, params: &ConfigParams) -> Result<String, RunnerError> {
    let config_dir = params.config_path.parent().unwrap_or(Path::new(""));
    let template_params = TemplateParams::new(
        &params.bind_address,
        config_dir,
        &params.cwd,
        &params.work_dir,
        &params.ports,
    );
    let rendered = template::render(config, &template_params);

    let mut conf = conf::parse(&rendered)?;
    let has_http = conf.context("/http")?.is_some();
    let patch: Vec<&PatchOperation> = CONFIG_PATCH
        .iter()
        .filter(|entry| entry.applies_to(&params.version_info))
        .filter(|entry| has_http || !entry.op.path().starts_with("/http/"))
        .map(|entry| &entry.op)
        .collect();
    conf.apply_patch(patch)?;

    Ok(conf.to_string())
}

/// Whether the last `master_process` directive is anything but `off`.
pub fn is_master_process_enabled(config: &str) -> bool {
    let value = conf::parse(config)
        .ok()
        .and_then(|conf| conf.get("/master_process").ok())
        .and_then(|lookup| lookup.last());
    value.as_deref() != Some("off")
}

async fn read_config(path: &Path) -> Result<String, RunnerError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RunnerError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_config(path: &Path, config: &str, logger: &dyn Logger) -> Result<(), RunnerError> {
    logger.debug(&format!(
        "writing config to {}:\n-----BEGIN CONFIG-----\n{config}\n-----END CONFIG-----",
        path.display()
    ));
    tokio::fs::write(path, config)
        .await
        .map_err(|source| RunnerError::WriteConfig {
            path: path.to_path_buf(),
            source,
        })
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

type ProcessSlot = Arc<Mutex<Option<NginxProcess>>>;

struct Launcher {
    bin: PathBuf,
    config_path: PathBuf,
    work_dir: PathBuf,
    bind_address: String,
    port: u16,
    stderr: StderrMode,
    error_buffer: Option<LogBuffer>,
    start_timeout: Duration,
    logger: SharedLogger,
}

impl Launcher {
    /// Spawns nginx into `slot` and waits for it to respond. The process
    /// stays in the slot on failure, so the cleanup stack terminates it.
    async fn launch(&self, slot: &ProcessSlot) -> Result<u32, RunnerError> {
        let mut guard = slot.lock().await;
        let process = guard.insert(process::spawn_nginx(
            &self.bin,
            &self.config_path,
            &self.work_dir,
            &self.stderr,
            self.logger.clone(),
        )?);
        let pid = process.pid();

        // Fail fast if nginx cannot run at all, e.g. a broken binary.
        if let Err(e) = process.wait_for_spawn_error(SPAWN_GRACE_PERIOD).await {
            let _ = tokio::time::timeout(Duration::from_millis(100), process.drain_stderr()).await;
            self.dump_error_log();
            return Err(e.into());
        }
        drop(guard);

        let target = ProbeTarget::new(self.bind_address.clone(), self.port);
        let probe = health::wait_for_http_port_open(
            &target,
            self.start_timeout,
            PROBE_INTERVAL,
            self.logger.as_ref(),
        );
        let ready = tokio::select! {
            ready = probe => ready,
            status = wait_for_exit(slot) => {
                self.dump_error_log();
                return Err(ProcessError::EarlyExit {
                    bin: self.bin.clone(),
                    status,
                }
                .into());
            }
        };

        match ready {
            Ok(true) => Ok(pid),
            Ok(false) => {
                self.dump_error_log();
                Err(RunnerError::NotResponding { port: self.port })
            }
            Err(e) => {
                self.dump_error_log();
                Err(e.into())
            }
        }
    }

    fn dump_error_log(&self) {
        if let Some(buf) = &self.error_buffer {
            let msg = buf.peek_string();
            if !msg.is_empty() {
                self.logger.error(msg.trim_end());
            }
        }
    }
}

/// Resolves once the process in `slot` has exited.
async fn wait_for_exit(slot: &ProcessSlot) -> ExitStatus {
    loop {
        tokio::time::sleep(PROBE_INTERVAL).await;
        if let Some(status) = slot.lock().await.as_mut().and_then(NginxProcess::exit_status) {
            return status;
        }
    }
}

// ---------------------------------------------------------------------------
// start_nginx
// ---------------------------------------------------------------------------

/// Starts nginx with the given config and waits until it responds on the
/// first port.
///
/// On failure, everything created so far is removed and the process is
/// terminated before the error is returned.
pub async fn start_nginx(options: NginxOptions) -> Result<NginxServer, RunnerError> {
    if options.config.is_none() && options.config_path.is_none() {
        return Err(RunnerError::MissingConfig);
    }

    let logger = options.logger.clone();
    let cleanup = match &options.exit_hooks {
        Some(hooks) => CleanupStack::with_exit_hook(logger.clone(), hooks),
        None => CleanupStack::new(logger.clone()),
    };

    match start(options, cleanup.clone()).await {
        Ok(server) => Ok(server),
        Err(e) => {
            cleanup.run_all().await;
            Err(e)
        }
    }
}

async fn start(options: NginxOptions, cleanup: CleanupStack) -> Result<NginxServer, RunnerError> {
    let logger = options.logger.clone();

    // Working directory

    let work_dir = match &options.work_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| RunnerError::WorkDir {
                    path: dir.clone(),
                    source,
                })?;
            dir.clone()
        }
        None => {
            let dir = options
                .paths
                .create_temp_dir()
                .map_err(|source| RunnerError::WorkDir {
                    path: options.paths.temp_base().to_path_buf(),
                    source,
                })?;
            let to_remove = dir.clone();
            cleanup.register(move || async move {
                ignore_not_found(tokio::fs::remove_dir_all(&to_remove).await)
            });
            dir
        }
    };

    // Binary and its modules

    let bin = match (&options.version, &options.resolver) {
        (Some(version), Some(resolver)) => {
            resolver
                .resolve(version)
                .await
                .map_err(|source| RunnerError::Resolve {
                    version: version.clone(),
                    source,
                })?
        }
        (Some(version), None) => return Err(RunnerError::NoResolver(version.clone())),
        (None, _) => options.bin_path.clone().unwrap_or_else(paths::default_bin),
    };
    let version_info = version::nginx_version_info(&bin, logger.as_ref()).await?;

    // Config

    let source = match (&options.config, &options.config_path) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => read_config(path).await?,
        (None, None) => return Err(RunnerError::MissingConfig),
    };

    let needed = template::count_needed_ports(&source);
    if needed == 0 && options.ports.is_empty() && options.preferred_ports.is_empty() {
        return Err(RunnerError::NoPorts);
    }
    let mut ports = options.ports.clone();
    let needed = needed.max(1);
    if ports.len() < needed {
        let preferred: Vec<u16> = options
            .preferred_ports
            .iter()
            .copied()
            .filter(|p| !ports.contains(p))
            .collect();
        let allocated =
            ports::allocate_ports(&options.bind_address, needed - ports.len(), &preferred).await?;
        ports.extend(allocated);
    }

    let config_path = match &options.config_path {
        Some(path) => paths::temp_config_path(path).map_err(|source| RunnerError::WriteConfig {
            path: path.clone(),
            source,
        })?,
        None => work_dir.join("nginx.conf"),
    };

    let params = ConfigParams {
        bind_address: options.bind_address.clone(),
        config_path: config_path.clone(),
        cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        work_dir: work_dir.clone(),
        ports: ports.clone(),
        version_info: version_info.clone(),
    };
    let config = adjust_config(&source, &params)?;

    write_config(&config_path, &config, logger.as_ref()).await?;
    {
        let to_remove = config_path.clone();
        cleanup.register(move || async move {
            ignore_not_found(tokio::fs::remove_file(&to_remove).await)
        });
    }

    // nginx process

    let error_buffer = matches!(options.error_log, ErrorLog::Buffer).then(LogBuffer::new);
    let stderr = match (&options.error_log, &error_buffer) {
        (ErrorLog::Ignore, _) => StderrMode::Ignore,
        (ErrorLog::Inherit, _) => StderrMode::Inherit,
        (ErrorLog::Writer(w), _) => StderrMode::Sink(LogSink::Writer(w.clone())),
        (ErrorLog::Buffer, Some(buf)) => StderrMode::Sink(LogSink::Buffer(buf.clone())),
        (ErrorLog::Buffer, None) => StderrMode::Ignore,
    };

    let slot: ProcessSlot = Arc::new(Mutex::new(None));
    {
        let slot = Arc::clone(&slot);
        let logger = logger.clone();
        let kill_timeout = options.kill_timeout;
        cleanup.register(move || async move {
            if let Some(mut process) = slot.lock().await.take() {
                process.terminate(kill_timeout, logger.as_ref()).await;
            }
            Ok::<(), Infallible>(())
        });
    }

    logger.info(&format!(
        "starting nginx {} on port(s): {}",
        version_info.version,
        ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let launcher = Launcher {
        bin,
        config_path: config_path.clone(),
        work_dir: work_dir.clone(),
        bind_address: options.bind_address.clone(),
        port: ports[0],
        stderr,
        error_buffer: error_buffer.clone(),
        start_timeout: options.start_timeout,
        logger: logger.clone(),
    };
    let pid = launcher.launch(&slot).await?;

    // Access log

    let access_sink = match &options.access_log {
        AccessLog::Buffer => Some(LogSink::Buffer(LogBuffer::new())),
        AccessLog::Ignore => None,
        AccessLog::Writer(w) => Some(LogSink::Writer(w.clone())),
    };
    let access_buffer = match &access_sink {
        Some(LogSink::Buffer(buf)) => Some(buf.clone()),
        _ => None,
    };
    let access_tailer = access_sink.map(|sink| {
        let tailer = Arc::new(Mutex::new(LogTailer::start(
            work_dir.join(ACCESS_LOG_FILE),
            sink,
            TAIL_POLL_INTERVAL,
            logger.clone(),
        )));
        let to_stop = Arc::clone(&tailer);
        cleanup.register(move || async move { to_stop.lock().await.stop().await });
        tailer
    });

    Ok(NginxServer {
        config,
        params,
        pid,
        launcher,
        slot,
        error_buffer,
        access_buffer,
        access_tailer,
        cleanup,
        logger,
        kill_timeout: options.kill_timeout,
        stopped: false,
    })
}

// ---------------------------------------------------------------------------
// NginxServer
// ---------------------------------------------------------------------------

/// A running nginx. Call [`NginxServer::stop`] when done; dropping it kills
/// the process but leaves the working directory behind.
pub struct NginxServer {
    config: String,
    params: ConfigParams,
    pid: u32,
    launcher: Launcher,
    slot: ProcessSlot,
    error_buffer: Option<LogBuffer>,
    access_buffer: Option<LogBuffer>,
    access_tailer: Option<Arc<Mutex<LogTailer>>>,
    cleanup: CleanupStack,
    logger: SharedLogger,
    kill_timeout: Duration,
    stopped: bool,
}

impl NginxServer {
    /// The config nginx was started with, after placeholder substitution and
    /// patching.
    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The first port, the one used for the health check.
    pub fn port(&self) -> u16 {
        self.params.ports[0]
    }

    pub fn ports(&self) -> &[u16] {
        &self.params.ports
    }

    pub fn work_dir(&self) -> &Path {
        &self.params.work_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.params.config_path
    }

    pub fn bin_path(&self) -> &Path {
        &self.launcher.bin
    }

    pub fn version_info(&self) -> &VersionInfo {
        &self.params.version_info
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub async fn is_running(&self) -> bool {
        match self.slot.lock().await.as_mut() {
            Some(process) => process.is_running(),
            None => false,
        }
    }

    /// Access log lines written since the previous call.
    pub async fn read_access_log(&self) -> Result<String, RunnerError> {
        let (Some(buf), Some(tailer)) = (&self.access_buffer, &self.access_tailer) else {
            return Err(RunnerError::LogNotBuffered(LogKind::Access));
        };
        if let Err(e) = tailer.lock().await.poll().await {
            self.logger.warn(&format!("failed to read access log: {e}"));
        }
        Ok(buf.take_string())
    }

    /// Error log output written since the previous call.
    pub fn read_error_log(&self) -> Result<String, RunnerError> {
        match &self.error_buffer {
            Some(buf) => Ok(buf.take_string()),
            None => Err(RunnerError::LogNotBuffered(LogKind::Error)),
        }
    }

    /// Reloads the config with SIGHUP, optionally replacing it first.
    ///
    /// Requires `master_process on`; the default config patch turns it off.
    pub async fn reload(&mut self, new_config: Option<ConfigSource>) -> Result<(), RunnerError> {
        self.ensure_not_stopped()?;
        if cfg!(not(unix)) {
            return Err(RunnerError::Unsupported("reload"));
        }
        if !is_master_process_enabled(&self.config) {
            return Err(RunnerError::MasterProcessOff);
        }
        self.logger.info("reloading nginx");

        if let Some(source) = new_config {
            self.rewrite_config(source).await?;
        }
        self.send_reload_signal().await
    }

    /// Terminates nginx and starts it again on the same ports, optionally
    /// with a new config.
    pub async fn restart(&mut self, new_config: Option<ConfigSource>) -> Result<(), RunnerError> {
        self.ensure_not_stopped()?;
        self.logger.info("restarting nginx");

        let previous = self.slot.lock().await.take();
        if let Some(mut process) = previous {
            process.terminate(self.kill_timeout, self.logger.as_ref()).await;
        }

        if let Some(source) = new_config {
            self.rewrite_config(source).await?;
        }

        self.logger.debug("starting new nginx process");
        self.pid = self.launcher.launch(&self.slot).await?;
        Ok(())
    }

    /// Renders `source` with the same parameters and overwrites the config
    /// file. nginx picks it up on the next reload or restart.
    pub async fn rewrite_config(&mut self, source: ConfigSource) -> Result<(), RunnerError> {
        self.ensure_not_stopped()?;
        let text = source.read().await?;
        let config = adjust_config(&text, &self.params)?;
        write_config(&self.params.config_path, &config, self.logger.as_ref()).await?;
        self.config = config;
        Ok(())
    }

    /// Sends SIGHUP to nginx regardless of `master_process`. nginx in
    /// single-process mode re-reads its config on SIGHUP as well.
    pub async fn send_reload_signal(&self) -> Result<(), RunnerError> {
        self.ensure_not_stopped()?;
        let guard = self.slot.lock().await;
        let process = guard.as_ref().ok_or(RunnerError::Stopped)?;
        self.logger.debug(&format!("sending SIGHUP to nginx ({})", process.pid()));
        process.reload()?;
        Ok(())
    }

    /// Stops nginx and removes everything created for it. Errors are logged,
    /// calling it again does nothing.
    pub async fn stop(&mut self) {
        if !self.stopped {
            self.logger.info("stopping nginx");
        }
        self.stopped = true;
        self.cleanup.run_all().await;
    }

    fn ensure_not_stopped(&self) -> Result<(), RunnerError> {
        if self.stopped {
            Err(RunnerError::Stopped)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
