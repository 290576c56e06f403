use std::fs;
use std::path::Path;
use std::process::Command;

fn mapeo(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mapeo"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .args(["--verbose", "--log-format", "compact", "--log-dir", "logs"]);
    cmd
}

fn file_logs(dir: &Path) -> String {
    fs::read_dir(dir.join("logs"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| fs::read_to_string(entry.path()).unwrap())
        .collect()
}

#[test]
fn detect_run_flushes_file_log_on_exit() {
    let dir = tempfile::tempdir().unwrap();
    let output = mapeo(dir.path())
        .args(["detect", "--synthetic", "--duration", "1", "--no-keyboard"])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let logs = file_logs(dir.path());
    assert!(
        logs.contains("mapeo exited with code: 0"),
        "last lines missing from file log: {logs:?}"
    );
}

#[test]
fn invalid_config_exits_nonzero_with_logged_reason() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mapeo.toml"), "[detection]\ntarget_fps = 0\n").unwrap();

    let output = mapeo(dir.path()).arg("--validate-config").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let logs = file_logs(dir.path());
    assert!(
        logs.contains("Configuration validation failed"),
        "validation error missing from file log: {logs:?}"
    );
}
