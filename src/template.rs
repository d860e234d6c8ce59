use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

static PORT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b__PORT(?:_(\d))?__\b").expect("valid regex"));

static NAMED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b__([A-Z_]+)__\b").expect("valid regex"));

/// Values substituted into the config placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    /// `__ADDRESS__`
    pub bind_address: String,
    /// `__CONFDIR__`
    pub config_dir: String,
    /// `__CWD__`
    pub cwd: String,
    /// `__WORKDIR__`
    pub work_dir: String,
    /// `__PORT__`, `__PORT_0__` .. `__PORT_9__`
    pub ports: Vec<u16>,
}

impl TemplateParams {
    pub fn new(bind_address: &str, config_dir: &Path, cwd: &Path, work_dir: &Path, ports: &[u16]) -> Self {
        Self {
            bind_address: bind_address.to_string(),
            config_dir: unix_path(config_dir),
            cwd: unix_path(cwd),
            work_dir: unix_path(work_dir),
            ports: ports.to_vec(),
        }
    }

    fn named(&self, name: &str) -> Option<&str> {
        match name {
            "ADDRESS" => Some(&self.bind_address),
            "CONFDIR" => Some(&self.config_dir),
            "CWD" => Some(&self.cwd),
            "WORKDIR" => Some(&self.work_dir),
            _ => None,
        }
    }
}

/// nginx wants forward slashes, even on Windows.
pub fn unix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Replaces port placeholders first, then the named ones. Placeholders
/// without a value are left as they are.
pub fn render(config: &str, params: &TemplateParams) -> String {
    let config = PORT_PLACEHOLDER.replace_all(config, |caps: &Captures| {
        let index = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        match params.ports.get(index) {
            Some(port) => port.to_string(),
            None => caps[0].to_string(),
        }
    });

    NAMED_PLACEHOLDER
        .replace_all(&config, |caps: &Captures| match params.named(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Number of ports the config refers to: the highest port placeholder index
/// plus one, or zero when there is none.
pub fn count_needed_ports(config: &str) -> usize {
    PORT_PLACEHOLDER
        .captures_iter(config)
        .map(|caps| {
            caps.get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(0)
                + 1
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params() -> TemplateParams {
        TemplateParams::new(
            "127.0.0.2",
            Path::new("/home/joe/project"),
            Path::new("/home/joe"),
            Path::new("/tmp/nginx-testing"),
            &[8080, 8081, 8090],
        )
    }

    #[test]
    fn test_positional_ports() {
        let p = TemplateParams {
            ports: vec![8080, 8081],
            ..Default::default()
        };
        assert_eq!(
            render("listen __PORT__; listen __PORT_1__;", &p),
            "listen 8080; listen 8081;"
        );
    }

    #[test]
    fn test_placeholders() {
        let cases = [
            ("__ADDRESS__:__PORT__", "127.0.0.2:8080"),
            ("__CONFDIR__", "/home/joe/project"),
            ("__CWD__", "/home/joe"),
            ("__WORKDIR__", "/tmp/nginx-testing"),
            ("__WORKDIR__/__WORKDIR__", "/tmp/nginx-testing//tmp/nginx-testing"),
            ("__WORKDIR__/root", "/tmp/nginx-testing/root"),
            ("__PORT__", "8080"),
            ("127.0.0.1:__PORT__", "127.0.0.1:8080"),
            ("__PORT_0__", "8080"),
            ("__PORT_1__", "8081"),
            ("__PORT_2__", "8090"),
        ];
        for (placeholder, expected) in cases {
            let input = format!("http {{\n  directive {placeholder};\n}}\n");
            let output = render(&input, &params());
            assert!(
                output.contains(&format!("directive {expected};")),
                "{placeholder} -> {output}"
            );
        }
    }

    #[test]
    fn test_unknown_and_unmatched_placeholders_kept() {
        let p = params();
        assert_eq!(render("root __FOO__;", &p), "root __FOO__;");
        assert_eq!(render("listen __PORT_5__;", &p), "listen __PORT_5__;");
        assert_eq!(render("x__PORT__;", &p), "x__PORT__;");
        assert_eq!(render("listen __PORT_12__;", &p), "listen __PORT_12__;");
    }

    #[test]
    fn test_windows_separators_normalized() {
        let p = TemplateParams::new(
            "127.0.0.1",
            &PathBuf::from(r"C:\conf"),
            Path::new("/"),
            &PathBuf::from(r"C:\work\dir"),
            &[80],
        );
        assert_eq!(render("root __WORKDIR__;", &p), "root C:/work/dir;");
        assert_eq!(render("include __CONFDIR__/x;", &p), "include C:/conf/x;");
    }

    #[test]
    fn test_count_needed_ports() {
        assert_eq!(count_needed_ports("daemon off;"), 0);
        assert_eq!(count_needed_ports("listen __PORT__;"), 1);
        assert_eq!(count_needed_ports("listen __PORT_0__;"), 1);
        assert_eq!(count_needed_ports("listen __PORT__; listen __PORT_2__;"), 3);
        assert_eq!(count_needed_ports("listen __PORT_9__;"), 10);
    }
}
