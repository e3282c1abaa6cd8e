//! CLI test cases.
//!
//! Anything touching a real OCR backend is `#[ignore]`d, because it needs
//! either local tools (tesseract, ollama) or live API credentials. The
//! non-ignored tests exercise the dispatcher and output plumbing through the
//! `dummy` engine.

use std::{fs, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("ocr-bench").unwrap();
    // Tests must not pick up real credentials from the developer's
    // environment.
    for var in [
        "GEMINI_API_KEY",
        "MISTRAL_OCR_ENDPOINT",
        "MISTRAL_OCR_TOKEN",
        "AZURE_OPENAI_ENDPOINT",
        "AZURE_OPENAI_API_KEY",
        "AZURE_OPENAI_DEPLOYMENT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_list_shows_engines() {
    cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("tesseract"))
        .stdout(predicate::str::contains("remote_api"));
}

#[test]
fn test_schema_describes_record() {
    cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("line_count"))
        .stdout(predicate::str::contains("backend_latency_ms"));
}

#[test]
fn test_run_dummy_engine() {
    let tmpdir = tempfile::tempdir().unwrap();
    let input = tmpdir.path().join("doc.png");
    fs::write(&input, b"not a real image, the dummy engine does not care").unwrap();

    cmd()
        .arg("run")
        .arg(&input)
        .args(["--model", "dummy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dummy output for doc.png"))
        .stdout(predicate::str::contains("\"line_count\": 1"));
}

#[test]
fn test_run_unknown_engine_fails() {
    let tmpdir = tempfile::tempdir().unwrap();
    let input = tmpdir.path().join("doc.png");
    fs::write(&input, b"bytes").unwrap();

    cmd()
        .arg("run")
        .arg(&input)
        .args(["--model", "no-such-engine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown engine"));
}

#[test]
fn test_bench_reports_every_engine() {
    let tmpdir = tempfile::tempdir().unwrap();
    let input = tmpdir.path().join("doc.png");
    fs::write(&input, b"not a real image").unwrap();
    let output = tmpdir.path().join("results.json");

    cmd()
        .arg("bench")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let results = results.as_object().unwrap();

    // One slot per registered engine, no matter what failed.
    for engine in ["dummy", "tesseract", "glm-ocr", "gemini", "mistral", "gpt"] {
        assert!(results.contains_key(engine), "missing engine {}", engine);
    }

    // The dummy engine succeeds; the unconfigured remote engines carry an
    // error field instead of content.
    assert!(results["dummy"]["error"].is_null());
    assert!(
        results["gemini"]["error"]
            .as_str()
            .unwrap()
            .contains("GEMINI_API_KEY")
    );
    assert!(results["mistral"]["error"].is_string());
    assert!(results["gpt"]["error"].is_string());
}

#[test]
#[ignore = "Needs the tesseract CLI tool installed"]
fn test_run_tesseract() {
    let tmpdir = tempfile::tempdir().unwrap();
    let input = tmpdir.path().join("doc.png");
    // A blank white image: tesseract should succeed and find nothing.
    let img = image::DynamicImage::new_rgb8(200, 100);
    img.save(&input).unwrap();

    cmd()
        .arg("run")
        .arg(&input)
        .args(["--model", "tesseract"])
        .assert()
        .success();
}
