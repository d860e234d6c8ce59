use std::io;
use std::path::{Path, PathBuf};

pub const TEMP_DIR_PREFIX: &str = "nginx-testing-";
pub const DEFAULT_BIN: &str = "nginx";

/// Where temporary working directories are created.
#[derive(Debug, Clone)]
pub struct Paths {
    temp_base: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// `$NGINX_TESTING_TMPDIR`, else `<cache dir>/nginx-testing`, else the
    /// OS temp directory.
    pub fn new() -> Self {
        if let Some(path) = std::env::var_os("NGINX_TESTING_TMPDIR")
            && !path.is_empty()
        {
            return Self {
                temp_base: PathBuf::from(path),
            };
        }
        let temp_base = match dirs::cache_dir() {
            Some(base) => base.join("nginx-testing"),
            None => std::env::temp_dir(),
        };
        Self { temp_base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { temp_base: base }
    }

    pub fn temp_base(&self) -> &Path {
        &self.temp_base
    }

    /// Creates a fresh `nginx-testing-XXXXXX` directory. The caller owns it
    /// and is responsible for removing it.
    pub fn create_temp_dir(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.temp_base)?;
        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&self.temp_base)?;
        Ok(dir.keep())
    }
}

/// `<dir>/.<file>~` next to `config_path`, where the rendered config goes.
pub fn temp_config_path(config_path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(config_path)?;
    let Some(file_name) = absolute.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a file path", config_path.display()),
        ));
    };
    let mut name = std::ffi::OsString::from(".");
    name.push(file_name);
    name.push("~");
    Ok(absolute.with_file_name(name))
}

/// `$NGINX_BIN`, or `nginx` looked up in `PATH`.
pub fn default_bin() -> PathBuf {
    match std::env::var_os("NGINX_BIN") {
        Some(bin) if !bin.is_empty() => PathBuf::from(bin),
        _ => PathBuf::from(DEFAULT_BIN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_base_is_set() {
        let paths = Paths::new();
        assert!(!paths.temp_base().as_os_str().is_empty());
    }

    #[test]
    fn test_create_temp_dir() {
        let base = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(base.path().join("nested"));

        let first = paths.create_temp_dir().unwrap();
        let second = paths.create_temp_dir().unwrap();

        assert!(first.is_dir());
        assert_ne!(first, second);
        assert!(first.starts_with(paths.temp_base()));
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(TEMP_DIR_PREFIX), "got: {name}");
    }

    #[test]
    fn test_temp_config_path() {
        let path = temp_config_path(Path::new("/etc/nginx/nginx.conf")).unwrap();
        assert_eq!(path, PathBuf::from("/etc/nginx/.nginx.conf~"));
    }

    #[test]
    fn test_temp_config_path_relative() {
        let path = temp_config_path(Path::new("test.conf")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with(".test.conf~"));
        assert_eq!(path.parent(), Some(std::env::current_dir().unwrap().as_path()));
    }

    #[test]
    fn test_temp_config_path_rejects_dir_only() {
        assert!(temp_config_path(Path::new("/")).is_err());
    }
}
