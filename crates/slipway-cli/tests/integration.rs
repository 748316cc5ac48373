use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn slipway(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("slipway").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("slipway.yaml"), yaml).unwrap();
}

/// An environment pointing at a port nothing listens on, so client calls
/// fail fast instead of reaching a cluster.
const UNREACHABLE: &str = r#"
name: my-project
environments:
  staging:
    nomad_url: http://127.0.0.1:1
deployments:
  web: {}
"#;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

#[test]
fn missing_config_file_fails_fast() {
    let dir = TempDir::new().unwrap();
    slipway(&dir)
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("slipway.yaml"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "name: ab\n");
    slipway(&dir)
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid config"));
}

// ---------------------------------------------------------------------------
// slipway build
// ---------------------------------------------------------------------------

#[test]
fn build_runs_configured_scripts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("build.sh"), "echo built > artifact.txt\n").unwrap();
    write_config(
        &dir,
        r#"
name: my-project
environments:
  staging:
    nomad_url: http://127.0.0.1:1
deployments:
  web:
    builds:
      app:
        script: ./build.sh
"#,
    );

    slipway(&dir).arg("build").assert().success();
    assert!(dir.path().join("artifact.txt").exists());
}

#[test]
fn failing_build_script_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("build.sh"), "exit 7\n").unwrap();
    write_config(
        &dir,
        r#"
name: my-project
environments:
  staging:
    nomad_url: http://127.0.0.1:1
deployments:
  web:
    builds:
      app:
        script: ./build.sh
"#,
    );

    slipway(&dir).arg("build").assert().code(1);
}

#[test]
fn one_failing_unit_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ok.sh"), "echo ok > ok.txt\n").unwrap();
    std::fs::write(dir.path().join("bad.sh"), "exit 1\n").unwrap();
    write_config(
        &dir,
        r#"
name: my-project
concurrent: true
environments:
  staging:
    nomad_url: http://127.0.0.1:1
deployments:
  web:
    builds:
      good:
        script: ./ok.sh
      bad:
        script: ./bad.sh
"#,
    );

    slipway(&dir).arg("build").assert().code(1);
    assert!(dir.path().join("ok.txt").exists());
}

// ---------------------------------------------------------------------------
// slipway deploy
// ---------------------------------------------------------------------------

#[test]
fn deploy_requires_the_env_flag() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir).arg("deploy").assert().failure();
}

#[test]
fn deploy_rejects_an_unknown_environment() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["deploy", "--env", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown environment 'nope'"));
}

#[test]
fn deploy_missing_template_is_a_unit_failure() {
    // The unreachable cluster makes parse fail for any unit that gets that
    // far; the missing template fails first and alone decides the outcome.
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["deploy", "--env", "staging"])
        .assert()
        .code(1);
}

// ---------------------------------------------------------------------------
// slipway destroy
// ---------------------------------------------------------------------------

#[test]
fn destroy_without_force_asks_and_aborts() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["destroy", "--env", "staging"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Are you sure?"));
}

#[test]
fn destroy_aborts_on_empty_answer() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["destroy", "--env", "staging"])
        .write_stdin("\n")
        .assert()
        .success();
}

#[test]
fn forced_destroy_with_missing_template_fails() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["destroy", "--env", "staging", "--force"])
        .assert()
        .code(1);
}

#[test]
fn destroy_rejects_an_unknown_environment() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, UNREACHABLE);
    slipway(&dir)
        .args(["destroy", "--env", "nope", "--force"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown environment"));
}
