use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn start_nginx(tmp_base: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("start-nginx").into();
    cmd.env("NGINX_TESTING_TMPDIR", tmp_base);
    cmd.env("RUST_LOG", "info");
    cmd.timeout(Duration::from_secs(30));
    cmd
}

fn write_conf(dir: &Path) -> std::path::PathBuf {
    let conf = dir.join("nginx.conf");
    std::fs::write(
        &conf,
        "events {\n}\nhttp {\n  server {\n    listen __ADDRESS__:__PORT__;\n  }\n}\n",
    )
    .unwrap();
    conf
}

fn is_empty_dir(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    start_nginx(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--bind-address"))
        .stdout(predicate::str::contains("--watch-delay"));
}

#[test]
fn test_missing_conf_file_argument() {
    let dir = TempDir::new().unwrap();
    start_nginx(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONF_FILE"));
}

#[test]
fn test_invalid_port() {
    let dir = TempDir::new().unwrap();
    start_nginx(dir.path())
        .args(["-p", "not-a-port", "nginx.conf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-a-port"));
}

#[test]
fn test_nonexistent_binary() {
    let dir = TempDir::new().unwrap();
    let tmp_base = dir.path().join("tmp");
    let conf = write_conf(dir.path());

    start_nginx(&tmp_base)
        .arg("-b")
        .arg("/does/not/exist/nginx")
        .arg(&conf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("/does/not/exist/nginx"));

    assert!(is_empty_dir(&tmp_base));
    assert!(!dir.path().join(".nginx.conf~").exists());
}

#[test]
fn test_missing_conf_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.conf");

    start_nginx(dir.path())
        .arg("-b")
        .arg("/does/not/exist/nginx")
        .arg(&missing)
        .assert()
        .failure();
}

#[test]
fn test_unknown_settings_field() {
    let dir = TempDir::new().unwrap();
    let conf = write_conf(dir.path());
    let settings = dir.path().join("start-nginx.toml");
    std::fs::write(&settings, "bogus_option = true\n").unwrap();

    start_nginx(dir.path())
        .arg("--settings")
        .arg(&settings)
        .arg(&conf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus_option"));
}

#[cfg(unix)]
#[test]
fn test_failing_nginx_reports_binary() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let tmp_base = dir.path().join("tmp");
    let conf = write_conf(dir.path());
    let bin = dir.path().join("fake-nginx");
    std::fs::write(
        &bin,
        "#!/bin/sh\n\
         if [ \"$1\" = \"-V\" ]; then echo 'nginx version: nginx/1.99.0' >&2; exit 0; fi\n\
         echo 'nginx: [emerg] fake failure' >&2\n\
         exit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

    // Settings provide the binary, relative to the settings file.
    let settings = dir.path().join("start-nginx.toml");
    std::fs::write(&settings, "bin_path = \"./fake-nginx\"\n").unwrap();

    start_nginx(&tmp_base)
        .arg("-s")
        .arg(&settings)
        .arg(&conf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("fake-nginx"))
        .stderr(predicate::str::contains("fake failure"));

    assert!(is_empty_dir(&tmp_base));
    assert!(!dir.path().join(".nginx.conf~").exists());
}
