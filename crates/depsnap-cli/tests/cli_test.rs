//! CLI integration tests using assert_cmd
//!
//! These tests run the `depsnap` binary end-to-end against the local host.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command instance for the depsnap binary
fn depsnap_cmd() -> Command {
    Command::cargo_bin("depsnap").expect("Failed to find depsnap binary")
}

/// Project directory with a small Maven pom
fn create_maven_fixture() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pom = r"<project>
  <groupId>com.example</groupId>
  <artifactId>demo</artifactId>
  <version>0.1.0</version>
  <dependencies>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
      <version>2.0.9</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>
";
    fs::write(temp_dir.path().join("pom.xml"), pom).unwrap();
    temp_dir
}

#[test]
fn test_help_command() {
    depsnap_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot installed dependencies"));
}

#[test]
fn test_version_command() {
    depsnap_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("depsnap"));
}

#[test]
fn test_docker_requires_identifier() {
    depsnap_cmd()
        .arg("docker")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("container identifier"));
}

#[test]
fn test_unknown_probe_rejected() {
    depsnap_cmd()
        .args(["host", "--select", "pip,invalid1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid1"))
        .stderr(predicate::str::contains("Available probes"));
}

#[test]
fn test_missing_working_dir() {
    depsnap_cmd()
        .args(["host", "--working-dir", "/definitely/not/here"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Working directory does not exist"));
}

#[test]
fn test_maven_project_on_host() {
    let fixture = create_maven_fixture();

    let output = depsnap_cmd()
        .args(["host", "--select", "maven", "--working-dir"])
        .arg(fixture.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["source"]["type"], "host");
    assert_eq!(json["maven"]["scope"], "project");
    let deps = json["maven"]["dependencies"].as_object().unwrap();
    assert_eq!(deps["org.slf4j:slf4j-api"]["version"], "2.0.9");
    assert!(!deps.contains_key("junit:junit"));
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["maven", "source"]);
}

#[test]
fn test_skip_hash_collection_and_output_file() {
    let fixture = create_maven_fixture();
    let out_dir = TempDir::new().unwrap();
    let out_file = out_dir.path().join("report.json");

    depsnap_cmd()
        .args(["--select", "maven", "--skip-hash-collection", "--pretty-print"])
        .arg("--working-dir")
        .arg(fixture.path())
        .arg("--output")
        .arg(&out_file)
        .assert()
        .success();

    let content = fs::read_to_string(&out_file).unwrap();
    assert!(content.contains("slf4j-api"));
    assert!(!content.contains("\"hash\""));
}

#[test]
fn test_only_container_info() {
    depsnap_cmd()
        .args(["host", "--only-container-info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source\""))
        .stdout(predicate::str::contains("\"dependencies\"").not());
}

#[test]
fn test_markdown_format() {
    let fixture = create_maven_fixture();

    depsnap_cmd()
        .args(["--select", "maven", "--format", "markdown", "--working-dir"])
        .arg(fixture.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("# Dependency Snapshot"))
        .stdout(predicate::str::contains("| maven | project |"));
}

#[test]
fn test_config_file_selection() {
    let fixture = create_maven_fixture();
    let config = fixture.path().join("depsnap.json");
    fs::write(&config, r#"{"select": ["maven"], "skip-hash-collection": true}"#).unwrap();

    let output = depsnap_cmd()
        .arg("--config")
        .arg(&config)
        .arg("--working-dir")
        .arg(fixture.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json.get("maven").is_some());
    assert!(json["maven"].get("hash").is_none());
}

#[test]
fn test_batch_file() {
    let fixture = create_maven_fixture();
    let batch = fixture.path().join("batch.json");
    let requests = serde_json::json!([
        {"target": {"type": "host"}, "working_dir": fixture.path()},
        {"target": {"type": "host"}, "working_dir": "/definitely/not/here"}
    ]);
    fs::write(&batch, requests.to_string()).unwrap();

    let output = depsnap_cmd()
        .args(["--select", "maven", "--batch"])
        .arg(&batch)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(results[0]["success"], true);
    assert!(results[0]["report"]["maven"].is_object());
    assert_eq!(results[1]["success"], false);
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 requests failed"));
}
