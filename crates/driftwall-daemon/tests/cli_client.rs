use std::process::Command;

use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_driftwall"))
}

#[test]
fn reports_not_running_when_no_daemon_is_active() {
    let runtime_dir = TempDir::new().unwrap();

    for args in [
        vec!["kill"],
        vec!["next"],
        vec!["pause"],
        vec!["resume"],
        vec!["current"],
        vec!["status"],
        vec!["set", "0"],
    ] {
        let output = cli()
            .env("XDG_RUNTIME_DIR", runtime_dir.path())
            .args(&args)
            .output()
            .unwrap_or_else(|err| panic!("failed to run `driftwall {}`: {err}", args.join(" ")));

        assert!(
            !output.status.success(),
            "`driftwall {}` unexpectedly succeeded with no daemon running",
            args.join(" ")
        );
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("not running"),
            "`driftwall {}` stderr did not mention the daemon being stopped: {stderr}",
            args.join(" ")
        );
    }
}

#[test]
fn version_flag_succeeds_without_a_daemon() {
    let status = cli().arg("--version").status().unwrap();
    assert!(status.success());
}

#[test]
fn refuses_to_start_a_second_daemon_against_a_stale_live_pid() {
    let runtime_dir = TempDir::new().unwrap();
    // Our own pid is always alive, so writing it into the pid file simulates
    // a second `driftwall` invocation finding a running instance.
    let pid_file = runtime_dir.path().join("driftwall.pid");
    std::fs::write(&pid_file, std::process::id().to_string()).unwrap();

    let output = cli()
        .env("XDG_RUNTIME_DIR", runtime_dir.path())
        .arg("--foreground")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("already running"),
        "expected an already-running error, got: {stderr}"
    );
}
