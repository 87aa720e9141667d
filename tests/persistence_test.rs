#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

mod common;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: open an account and deposit
    let csv1 = common::write_csv(&[
        &["open", "abc123", "", "", "", "secret", "", "", "Ann", "ann@example.com"],
        &["create_pin", "abc123", "", "1234", "", "secret"],
        &["deposit", "abc123", "", "1234", "", "", "100"],
    ]);

    let output1 = Command::new(cargo_bin!("bankcore"))
        .arg(csv1.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("abc123,100,true"));

    // 2. Second run: the account, its PIN and its owner survive the restart
    let csv2 = common::write_csv(&[
        &["deposit", "abc123", "", "1234", "", "", "500"],
        &["update_pin", "abc123", "", "1234", "5678", "secret"],
    ]);

    let output2 = Command::new(cargo_bin!("bankcore"))
        .arg(csv2.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    let stderr2 = String::from_utf8_lossy(&output2.stderr);

    assert!(stdout2.contains("abc123,600,true"), "stdout: {stdout2}");
    assert!(!stderr2.contains("Error processing operation"), "stderr: {stderr2}");
}
