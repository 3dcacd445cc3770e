use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docharbor_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docharbor");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let ingress = root.join("ingress");
    fs::create_dir_all(ingress.join("letters")).unwrap();
    fs::write(
        ingress.join("alpha.txt"),
        "Alpha document about Rust programming, cargo and crates.",
    )
    .unwrap();
    fs::write(
        ingress.join("letters/beta.txt"),
        "Beta letter discussing the annual insurance renewal.",
    )
    .unwrap();
    fs::write(ingress.join("archive.zip"), "PK").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docharbor.sqlite"

[ingress]
root = "{root}/ingress"
interval_minutes = 10

[documents]
root = "{root}/documents"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docharbor.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docharbor(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docharbor_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docharbor binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn first_id(latest_stdout: &str) -> String {
    latest_stdout
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().next())
        .expect("latest printed no documents")
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docharbor(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docharbor.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docharbor(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docharbor(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_registers_supported_files() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docharbor(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("3 scanned"), "stdout: {}", stdout);
    assert!(stdout.contains("2 registered"), "stdout: {}", stdout);
    assert!(stdout.contains("1 skipped"), "stdout: {}", stdout);

    let root = tmp.path();
    assert!(root.join("documents/New/alpha.txt").exists());
    assert!(root.join("documents/New/beta.txt").exists());
    assert!(!root.join("ingress/alpha.txt").exists());
    assert!(!root.join("ingress/letters").exists());
    assert!(root.join("ingress/archive.zip").exists());
}

#[test]
fn test_search_and_get() {
    let (_tmp, config_path) = setup_test_env();
    run_docharbor(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_docharbor(&config_path, &["search", "insurance"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("beta.txt"), "stdout: {}", stdout);
    assert!(stdout.contains("1 total"));

    let (stdout, _, _) = run_docharbor(&config_path, &["search", "annual insurance renewal"]);
    assert!(stdout.contains("beta.txt"), "phrase search: {}", stdout);

    let (stdout, _, _) = run_docharbor(&config_path, &["search", "nonexistentxyz"]);
    assert!(stdout.contains("No results"));

    let (latest, _, _) = run_docharbor(&config_path, &["latest"]);
    assert!(latest.contains("2 total"), "latest: {}", latest);
    let id = first_id(&latest);

    let (stdout, stderr, success) = run_docharbor(&config_path, &["get", &id]);
    assert!(success, "get failed: stderr={}", stderr);
    assert!(stdout.contains(&format!("id:       {}", id)));
    assert!(stdout.contains("/document/view/"));
}

#[test]
fn test_get_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_docharbor(&config_path, &["init"]);

    let (_, stderr, success) = run_docharbor(&config_path, &["get", "missing-id"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_empty_search_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_docharbor(&config_path, &["init"]);

    let (_, stderr, success) = run_docharbor(&config_path, &["search", "   "]);
    assert!(!success);
    assert!(stderr.contains("must not be empty"));
}

#[test]
fn test_clean_requeues_orphan_and_purges_missing() {
    let (tmp, config_path) = setup_test_env();
    run_docharbor(&config_path, &["ingest"]);

    let root = tmp.path();
    fs::remove_file(root.join("documents/New/alpha.txt")).unwrap();
    fs::create_dir_all(root.join("documents/Old")).unwrap();
    fs::write(root.join("documents/Old/forgotten.txt"), "forgotten text").unwrap();

    let (stdout, stderr, success) = run_docharbor(&config_path, &["clean"]);
    assert!(success, "clean failed: stderr={}", stderr);
    assert!(stdout.contains("1 purged"), "stdout: {}", stdout);
    assert!(stdout.contains("1 orphans moved"), "stdout: {}", stdout);
    assert!(root.join("ingress/Old/forgotten.txt").exists());

    let (stdout, _, _) = run_docharbor(&config_path, &["clean"]);
    assert!(stdout.contains("0 purged"));
    assert!(stdout.contains("0 orphans moved"));

    let (stdout, _, _) = run_docharbor(&config_path, &["search", "alpha"]);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_add_and_reindex() {
    let (tmp, config_path) = setup_test_env();
    let outside = tmp.path().join("outside.txt");
    fs::write(&outside, "standalone manual addition").unwrap();

    let (stdout, stderr, success) = run_docharbor(
        &config_path,
        &["add", outside.to_str().unwrap(), "--path", "manual"],
    );
    assert!(success, "add failed: stderr={}", stderr);
    assert!(stdout.contains("Registered outside.txt"));
    assert!(outside.exists(), "the original file is left alone");

    let (stdout, _, success) = run_docharbor(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains("Reindexed 1 documents"));

    let (stdout, _, _) = run_docharbor(&config_path, &["search", "standalone"]);
    assert!(stdout.contains("outside.txt"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("interval_minutes = 10", "interval_minutes = 0");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_docharbor(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("interval_minutes"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let (_, stderr, success) =
        run_docharbor(Path::new("/nonexistent/docharbor.toml"), &["init"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
