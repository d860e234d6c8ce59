use crate::logger::Logger;
use regex::Regex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^nginx version: nginx/(\S+)").expect("valid regex"));

static CONFIGURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^configure arguments: (.*)").expect("valid regex"));

static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--(with(?:out)?)-(\w+)_module(?:=(\w+))?\b").expect("valid regex")
});

/// How an optional module was configured at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFlag {
    /// `--with-<name>_module`
    With,
    /// `--with-<name>_module=dynamic`
    WithDynamic,
    /// `--without-<name>_module`
    Without,
}

/// Parsed output of `nginx -V`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// e.g. `1.24.0`; empty if the output didn't contain it.
    pub version: String,
    /// Module name without the `_module` suffix, e.g. `http_ssl`.
    pub modules: BTreeMap<String, ModuleFlag>,
}

impl VersionInfo {
    /// Whether `module` is compiled in statically. Modules not mentioned in
    /// the configure arguments are assumed to be built in.
    pub fn has_static_module(&self, module: &str) -> bool {
        !matches!(
            self.modules.get(module),
            Some(ModuleFlag::Without | ModuleFlag::WithDynamic)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("failed to execute {bin} -V: {source}")]
    Spawn {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{bin} -V did not finish within {timeout:?}")]
    Timeout { bin: PathBuf, timeout: Duration },
    #[error("{bin} -V exited with {status}: {output}")]
    Failed {
        bin: PathBuf,
        status: std::process::ExitStatus,
        output: String,
    },
}

pub fn parse_version_output(output: &str) -> VersionInfo {
    let version = VERSION_RE
        .captures(output)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let configure = CONFIGURE_RE
        .captures(output)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    let modules = MODULE_RE
        .captures_iter(&configure)
        .map(|c| {
            let flag = match (&c[1], c.get(3).map(|m| m.as_str())) {
                ("without", _) => ModuleFlag::Without,
                (_, Some("dynamic")) => ModuleFlag::WithDynamic,
                _ => ModuleFlag::With,
            };
            (c[2].to_string(), flag)
        })
        .collect();

    VersionInfo { version, modules }
}

/// Runs `<bin> -V` and parses its output (nginx prints it to stderr).
pub async fn nginx_version_info(bin: &Path, logger: &dyn Logger) -> Result<VersionInfo, VersionError> {
    logger.debug(&format!("executing '{} -V'", bin.display()));

    let child = Command::new(bin)
        .arg("-V")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| VersionError::Spawn {
            bin: bin.to_path_buf(),
            source,
        })?;

    let output = tokio::time::timeout(VERSION_QUERY_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| VersionError::Timeout {
            bin: bin.to_path_buf(),
            timeout: VERSION_QUERY_TIMEOUT,
        })?
        .map_err(|source| VersionError::Spawn {
            bin: bin.to_path_buf(),
            source,
        })?;

    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));

    if !output.status.success() {
        return Err(VersionError::Failed {
            bin: bin.to_path_buf(),
            status: output.status,
            output: text.trim().to_string(),
        });
    }

    logger.debug(&format!("nginx -V: {}", text.trim()));
    Ok(parse_version_output(&text))
}
