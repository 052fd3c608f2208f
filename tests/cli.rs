//! End-to-end tests driving the `askdocs` binary.
//!
//! Embeddings use the offline `hashing` provider; generation is either
//! disabled or pointed at a mockito server speaking the OpenAI chat API.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn askdocs_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askdocs");
    path
}

/// Write a config and a small document tree. `generation` is spliced in as
/// the `[generation]` table body.
fn setup_test_env(generation: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("ops")).unwrap();
    fs::write(
        files_dir.join("rust.md"),
        "# Rust Notes\n\nCargo builds crates and resolves dependencies from the registry.\n\nThe borrow checker enforces ownership at compile time.",
    )
    .unwrap();
    fs::write(
        files_dir.join("ml.txt"),
        "Python is popular for machine learning.\n\nPyTorch and deep learning frameworks train neural networks.",
    )
    .unwrap();
    fs::write(
        files_dir.join("ops/deploy.html"),
        "<html><head><style>p { color: red }</style></head><body><h1>Deploy</h1><p>Kubernetes rolls out Docker containers &amp; services.</p></body></html>",
    )
    .unwrap();
    fs::write(files_dir.join("ops/ignored.bin"), [0u8, 159, 146, 150]).unwrap();

    let config_content = format!(
        r#"[store]
dir = "{}/data"

[retrieval]
top_k = 3
score_threshold = 0.3

[embedding]
provider = "hashing"
dims = 256

[generation]
{}
"#,
        root.display(),
        generation
    );

    let config_path = config_dir.join("askdocs.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

fn run_askdocs(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_askdocs_env(config_path, args, &[])
}

fn run_askdocs_env(config_path: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let binary = askdocs_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .envs(env.iter().copied())
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdocs binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingest_all(config_path: &Path) {
    let dir = files_dir(config_path);
    let (stdout, stderr, success) = run_askdocs(config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let (stdout, stderr, success) = run_askdocs(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Initialized store"));
    assert!(tmp.path().join("data/askdocs.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let (_, _, first) = run_askdocs(&config_path, &["init"]);
    assert!(first, "first init failed");
    let (_, _, second) = run_askdocs(&config_path, &["init"]);
    assert!(second, "second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory_and_list() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let dir = files_dir(&config_path);

    let (stdout, stderr, success) = run_askdocs(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok       rust.md"));
    assert!(stdout.contains("ok       ops/deploy.html"));
    assert!(!stdout.contains("ignored.bin"));
    assert!(stdout.contains("3 file(s)"));

    let (stdout, _, success) = run_askdocs(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("ml.txt"));
    assert!(stdout.contains("ops/deploy.html"));
    assert!(stdout.contains("3 document(s)"));
}

#[test]
fn test_reingest_replaces_by_default() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    ingest_all(&config_path);
    let (before, _, _) = run_askdocs(&config_path, &["stats"]);

    let (stdout, _, success) = run_askdocs(
        &config_path,
        &["ingest", files_dir(&config_path).join("rust.md").to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("replaced"));

    let (after, _, _) = run_askdocs(&config_path, &["stats"]);
    let chunks = |s: &str| {
        s.lines()
            .find(|l| l.contains("Chunks:"))
            .map(|l| l.trim().to_string())
    };
    assert_eq!(chunks(&before), chunks(&after));
}

#[test]
fn test_ingest_fails_when_every_file_fails() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let bad = tmp.path().join("broken.docx");
    fs::write(&bad, b"this is not a zip archive").unwrap();

    let (stdout, _, success) = run_askdocs(&config_path, &["ingest", bad.to_str().unwrap()]);
    assert!(!success, "ingest should fail when every file fails");
    assert!(stdout.contains("failed   broken.docx"));
}

#[test]
fn test_unknown_binary_file_reports_unsupported_format() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let blob = tmp.path().join("blob.xyz");
    fs::write(&blob, [0xc3u8, 0x28, 0xa0, 0xa1]).unwrap();
    let text = tmp.path().join("notes.xyz");
    fs::write(&text, "valid utf-8 text in an unknown extension").unwrap();

    let (stdout, _, success) = run_askdocs(
        &config_path,
        &["ingest", blob.to_str().unwrap(), text.to_str().unwrap()],
    );
    assert!(success, "one file succeeded so the batch succeeds");
    assert!(stdout.contains("unsupported format for 'blob.xyz'"));
    assert!(stdout.contains("ok       notes.xyz (1 chunks)"));
}

#[test]
fn test_empty_file_yields_zero_chunks() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let empty = tmp.path().join("empty.txt");
    fs::write(&empty, "").unwrap();

    let (stdout, stderr, success) = run_askdocs(&config_path, &["ingest", empty.to_str().unwrap()]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok       empty.txt (0 chunks)"));
}

#[test]
fn test_search_semantic_and_text() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    ingest_all(&config_path);

    let (stdout, _, success) =
        run_askdocs(&config_path, &["search", "borrow checker ownership", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("rust.md"));
    assert!(!stdout.contains("2. "));

    let (stdout, _, success) = run_askdocs(&config_path, &["search", "KUBERNETES", "--text"]);
    assert!(success);
    assert!(stdout.contains("ops/deploy.html"));
    assert!(stdout.contains("Kubernetes rolls out Docker containers & services."));
    assert!(!stdout.contains("color: red"));

    let (stdout, _, _) = run_askdocs(&config_path, &["search", "zzzz-not-there", "--text"]);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ask_without_relevant_context_skips_generation() {
    // Generation is disabled: reaching it would fail the command.
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    ingest_all(&config_path);

    let (stdout, stderr, success) =
        run_askdocs(&config_path, &["ask", "quantum chromodynamics gluon flux"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Unable to find matching results"));
    assert!(!stdout.contains("Sources:"));
}

#[test]
fn test_ask_empty_question_errors() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let (_, stderr, success) = run_askdocs(&config_path, &["ask", "   "]);
    assert!(!success);
    assert!(stderr.contains("question must not be empty"));
}

#[test]
fn test_ask_generates_answer_with_sources() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Cargo builds crates."}}]}"#)
        .expect(1)
        .create();

    let generation = format!(
        "provider = \"openai\"\nmodel = \"gpt-4o-mini\"\nbase_url = \"{}\"",
        server.url()
    );
    let (_tmp, config_path) = setup_test_env(&generation);
    ingest_all(&config_path);

    let (stdout, stderr, success) = run_askdocs_env(
        &config_path,
        &["ask", "cargo builds crates and resolves dependencies from the registry"],
        &[("OPENAI_API_KEY", "test-key")],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Cargo builds crates."));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("[1] rust.md"));
    assert!(!stdout.contains("test-key"));
    assert!(!stderr.contains("test-key"));
    mock.assert();
}

#[test]
fn test_ask_generation_failure_shows_retrieved_sources() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"bad key"}}"#)
        .expect(1)
        .create();

    let generation = format!(
        "provider = \"openai\"\nbase_url = \"{}\"\nmax_retries = 3",
        server.url()
    );
    let (_tmp, config_path) = setup_test_env(&generation);
    ingest_all(&config_path);

    let (stdout, stderr, success) = run_askdocs_env(
        &config_path,
        &["ask", "cargo builds crates and resolves dependencies from the registry"],
        &[("OPENAI_API_KEY", "wrong")],
    );
    assert!(!success);
    assert!(stdout.contains("Retrieved context"));
    assert!(stdout.contains("rust.md"));
    assert!(stderr.contains("answer generation failed (status 401)"));
    mock.assert();
}

#[test]
fn test_stats_and_clear() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    ingest_all(&config_path);

    let (stdout, _, success) = run_askdocs(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("hashing-v1 (256 dims)"));

    // Declining the prompt keeps everything.
    let mut child = Command::new(askdocs_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("clear")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"n\n").unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(String::from_utf8_lossy(&out.stdout).contains("Aborted."));

    let (stdout, _, success) = run_askdocs(&config_path, &["clear", "--yes"]);
    assert!(success);
    assert!(stdout.contains("Cleared"));

    let (stdout, _, _) = run_askdocs(&config_path, &["stats"]);
    assert!(stdout.contains("Documents:   0"));
    assert!(stdout.contains("Embeddings:  none"));
}

#[test]
fn test_dimension_change_is_rejected() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    ingest_all(&config_path);

    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, content.replace("dims = 256", "dims = 64")).unwrap();

    let (stdout, _, success) = run_askdocs(
        &config_path,
        &["ingest", files_dir(&config_path).join("ml.txt").to_str().unwrap()],
    );
    assert!(!success);
    assert!(stdout.contains("dimension mismatch"));
    assert!(stdout.contains("askdocs clear"));

    let (_, stderr, success) = run_askdocs(&config_path, &["ask", "machine learning"]);
    assert!(!success);
    assert!(stderr.contains("dimension mismatch"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "nope""#);
    let (_, stderr, success) = run_askdocs(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown generation provider"));
}
