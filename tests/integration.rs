use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rag-backend"))
}

/// Temp workspace with a config using in-process backends and embeddings
/// switched off, so no command needs the network.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    fs::write(files_dir.join("notes.txt"), "Some notes.\n\nMore notes.").unwrap();
    fs::write(files_dir.join("diagram.png"), b"\x89PNG\r\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/backend.sqlite"

[server]
bind = "127.0.0.1:0"

[embedding]
provider = "disabled"

[vector_store]
provider = "memory"

[memory]
provider = "memory"
"#,
        root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("DATABASE_URL")
        .env_remove("REDIS_URL")
        .env_remove("PINECONE_HOST")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/backend.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_documents_empty() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);

    let (stdout, stderr, success) = run(&config_path, &["documents"]);
    assert!(success, "documents failed: {}", stderr);
    assert!(stdout.contains("documents: 0 total"));
}

#[test]
fn test_ingest_rejects_unsupported_file() {
    let (tmp, config_path) = setup_test_env();
    let png = tmp.path().join("files/diagram.png");

    let (_, stderr, success) = run(&config_path, &["ingest", png.to_str().unwrap()]);
    assert!(!success);
    assert!(
        stderr.contains("Only .pdf and .txt files are supported"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_ingest_needs_embeddings() {
    let (tmp, config_path) = setup_test_env();
    let notes = tmp.path().join("files/notes.txt");

    let (_, stderr, success) = run(&config_path, &["ingest", notes.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    // Nothing is recorded when embedding fails.
    let (stdout, _, _) = run(&config_path, &["documents"]);
    assert!(stdout.contains("documents: 0 total"));
}

#[test]
fn test_history_for_unknown_session() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run(&config_path, &["history", "nobody"]);
    assert!(success, "history failed: {}", stderr);
    assert!(stdout.contains("No messages for session nobody"));

    let (stdout, _, success) = run(&config_path, &["history", "nobody", "--clear"]);
    assert!(success);
    assert!(stdout.contains("Chat history cleared"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[chunking]\ndefault_size = 100\noverlap = 200\n").unwrap();

    let (_, stderr, success) = run(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
