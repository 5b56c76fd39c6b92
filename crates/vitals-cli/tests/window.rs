use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

#[test]
fn window_returns_sorted_signals_and_assessment() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;

    let json = run_json(&[
        "window",
        "--config",
        &sample_path("test_data/vitals.toml"),
        "--database",
        db.to_str().expect("utf8 path"),
        "--patient",
        &patient,
        "--step",
        "0",
    ])?;
    let ecg: Vec<f64> = serde_json::from_value(json["ecg"].clone())?;
    assert_eq!(ecg, vec![0.0, 0.1, 0.2, 0.8, 0.3, 0.3]);
    let resp: Vec<f64> = serde_json::from_value(json["resp"].clone())?;
    assert_eq!(resp, vec![0.5, 0.6, 0.55]);
    assert_eq!(json["effective_step"], 0);
    assert_close(json["assessment"]["margin"].as_f64().unwrap(), 150.0, 1e-6);
    assert_eq!(json["assessment"]["is_anomalous"], false);
    assert_eq!(json["status"], "normal");
    assert!(json.get("figures").is_none());
    Ok(())
}

#[test]
fn manual_margin_flags_and_records_detection() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;
    let db_arg = db.to_str().expect("utf8 path");

    let json = run_json(&[
        "window",
        "--config",
        &sample_path("test_data/vitals.toml"),
        "--database",
        db_arg,
        "--patient",
        &patient,
        "--step",
        "0",
        "--margin",
        "100",
        "--record",
        "--figure",
    ])?;
    assert_eq!(json["status"], "anomalous");
    assert_eq!(json["anomalous_pairs"], serde_json::json!([2, 3]));
    assert_eq!(json["detection"]["patient_id"], patient.as_str());
    assert_eq!(json["figures"].as_array().map(Vec::len), Some(2));

    let output = cargo_bin_cmd!("vitals")
        .args(["detections", "--database", db_arg, "--patient", &patient])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines = String::from_utf8(output)?;
    assert_eq!(lines.lines().count(), 1);
    Ok(())
}

#[test]
fn window_before_any_sample_is_empty() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;

    let json = run_json(&[
        "window",
        "--config",
        &sample_path("test_data/vitals.toml"),
        "--database",
        db.to_str().expect("utf8 path"),
        "--patient",
        &patient,
        "--step",
        "-100000",
    ])?;
    assert_eq!(json["ecg"], serde_json::json!([]));
    assert_eq!(json["resp"], serde_json::json!([]));
    assert_eq!(json["assessment"]["margin"].as_f64(), Some(0.0));
    assert_eq!(json["status"], "normal");
    Ok(())
}

#[test]
fn clamped_config_pins_negative_step_to_origin() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;

    let json = run_json(&[
        "window",
        "--config",
        &sample_path("test_data/vitals_clamped.toml"),
        "--database",
        db.to_str().expect("utf8 path"),
        "--patient",
        &patient,
        "--step",
        "-100000",
    ])?;
    assert_eq!(json["step"], -100000);
    assert_eq!(json["effective_step"], 0);
    assert_eq!(json["ecg"].as_array().map(Vec::len), Some(6));
    Ok(())
}

#[test]
fn missing_database_reports_data_unavailable() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("absent.db");
    let output = cargo_bin_cmd!("vitals")
        .args([
            "window",
            "--config",
            &sample_path("test_data/vitals.toml"),
            "--database",
            db.to_str().expect("utf8 path"),
            "--patient",
            "0da28d88-932c-4e16-bb3d-82aad9de4e51",
        ])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output)?;
    assert_eq!(json["status"], "data_unavailable");
    assert_eq!(json["step"], 1875);
    Ok(())
}

#[test]
fn extent_reports_stored_range() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;
    let json = run_json(&[
        "extent",
        "--database",
        db.to_str().expect("utf8 path"),
        "--patient",
        &patient,
        "--channel",
        "ecg",
    ])?;
    assert_eq!(json["count"], 6);
    assert!(json["first"]
        .as_str()
        .map(|s| s.starts_with("2024-12-14T22:04:51.76"))
        .unwrap_or(false));
    Ok(())
}

#[test]
fn ingest_refuses_unstorable_timestamps() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("vitals.db");
    let patient = seed(&db)?;
    let csv = dir.path().join("early.csv");
    std::fs::write(&csv, "timestamp,value\n1600-01-01T00:00:00Z,0.5\n")?;
    cargo_bin_cmd!("vitals")
        .args([
            "ingest",
            "--database",
            db.to_str().expect("utf8 path"),
            "--patient",
            &patient,
            "--channel",
            "ecg",
            "--csv",
            csv.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure();
    let json = run_json(&[
        "extent",
        "--database",
        db.to_str().expect("utf8 path"),
        "--patient",
        &patient,
    ])?;
    assert_eq!(json["count"], 6);
    Ok(())
}

/// Create a database with one patient, six ECG rows and three respiration rows.
fn seed(db: &Path) -> Result<String, Box<dyn Error>> {
    let db_arg = db.to_str().expect("utf8 path");
    cargo_bin_cmd!("vitals")
        .args(["init", "--database", db_arg])
        .assert()
        .success();
    let patient = run_json(&[
        "patient-add",
        "--database",
        db_arg,
        "--first-name",
        "Baby",
        "--last-name",
        "Doe",
        "--birth-date",
        "2024-12-10",
        "--gender",
        "other",
    ])?;
    let id = patient["id"].as_str().expect("patient id").to_string();
    cargo_bin_cmd!("vitals")
        .args([
            "ingest",
            "--database",
            db_arg,
            "--patient",
            &id,
            "--channel",
            "ecg",
            "--csv",
            &sample_path("test_data/ecg_window.csv"),
        ])
        .assert()
        .success();
    cargo_bin_cmd!("vitals")
        .args([
            "ingest",
            "--config",
            &sample_path("test_data/vitals.toml"),
            "--database",
            db_arg,
            "--patient",
            &id,
            "--channel",
            "resp",
            "--values",
            &sample_path("test_data/resp_values.txt"),
            "--start",
            "2024-12-14T22:04:51.760Z",
        ])
        .assert()
        .success();
    Ok(id)
}

fn run_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let output = cargo_bin_cmd!("vitals")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    Ok(serde_json::from_slice(&output)?)
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(
        diff <= tol,
        "diff {} exceeded tol {} ({} vs {})",
        diff,
        tol,
        a,
        b
    );
}

fn sample_path(relative: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
        .to_string_lossy()
        .to_string()
}
