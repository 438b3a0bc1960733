use std::process::Command;

use eyre::Context as _;
use predicates::prelude::*;

#[test]
fn doctor_json_runs_and_returns_valid_json() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("cmarket");

    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    let out = Command::new(exe)
        .env("CMARKET_CONFIG_DIR", cfg_dir.path())
        .env("CMARKET_DATA_DIR", data_dir.path())
        .env_remove("CMARKET_CHAIN_ID")
        .env_remove("CMARKET_PRIVATE_KEY")
        .args(["doctor", "--json"])
        .output()
        .context("run cmarket doctor --json")?;

    assert!(
        out.status.success(),
        "doctor exited non-zero: status={:?}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parse doctor json")?;
    assert_eq!(v.get("ok").and_then(serde_json::Value::as_bool), Some(true));
    assert!(v.get("version").and_then(|x| x.as_str()).is_some());
    assert!(v.get("paths").and_then(|x| x.as_object()).is_some());
    assert_eq!(
        v.pointer("/wallet/mode").and_then(|x| x.as_str()),
        Some("read_only")
    );
    assert_eq!(
        v.pointer("/network/ok").and_then(serde_json::Value::as_bool),
        Some(false)
    );
    Ok(())
}

#[test]
fn doctor_reports_a_malformed_key_without_echoing_it() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("cmarket");
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    let bogus = "0xnot-a-real-key-but-still-secret";

    let out = Command::new(exe)
        .env("CMARKET_CONFIG_DIR", cfg_dir.path())
        .env("CMARKET_DATA_DIR", data_dir.path())
        .env_remove("CMARKET_CHAIN_ID")
        .env("CMARKET_PRIVATE_KEY", bogus)
        .args(["doctor", "--json"])
        .output()
        .context("run cmarket doctor --json")?;
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains(bogus));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parse doctor json")?;
    assert_eq!(
        v.pointer("/wallet/key_set").and_then(serde_json::Value::as_bool),
        Some(true)
    );
    assert_eq!(
        v.pointer("/wallet/valid").and_then(serde_json::Value::as_bool),
        Some(false)
    );
    Ok(())
}

#[test]
fn networks_lists_builtin_chains() -> eyre::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let cfg_dir = tempfile::tempdir()?;
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("cmarket"))
        .env("CMARKET_CONFIG_DIR", cfg_dir.path())
        .env("CMARKET_DATA_DIR", data_dir.path())
        .arg("networks")
        .assert()
        .success()
        .stdout(
            predicates::str::contains("\"avalanche\"")
                .and(predicates::str::contains("43114"))
                .and(predicates::str::contains("\"moonbeam\"")),
        );
    Ok(())
}
