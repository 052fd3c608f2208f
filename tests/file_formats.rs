//! Integration tests for multi-format ingestion through the binary.
//!
//! Each test writes a small file of one format, ingests it with the offline
//! `hashing` embedder and checks the extracted text is searchable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdocs_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("askdocs");
    path
}

/// Minimal valid PDF containing the text "pdf test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects: [&[u8]; 5] = [
        b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n",
        b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n",
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n",
        b"4 0 obj << /Length 43 >> stream\nBT /F1 12 Tf 100 700 Td (pdf test phrase) Tj ET\nendstream endobj\n",
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    ];
    for obj in objects {
        offsets.push(out.len());
        out.extend_from_slice(obj);
    }
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Build a ZIP archive from (entry name, contents) pairs.
fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn docx_with_text(phrase: &str) -> Vec<u8> {
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
        phrase
    );
    zip_of(&[("word/document.xml", &xml)])
}

fn pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let xmls: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect();
    let entries: Vec<(&str, &str)> = xmls.iter().map(|(n, b)| (n.as_str(), b.as_str())).collect();
    zip_of(&entries)
}

fn xlsx_with_cells() -> Vec<u8> {
    zip_of(&[
        (
            "xl/sharedStrings.xml",
            "<sst><si><t>region</t></si><si><t>spreadsheet test phrase</t></si></sst>",
        ),
        (
            "xl/worksheets/sheet1.xml",
            "<worksheet><sheetData><row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row><row r=\"2\"><c r=\"A2\"><v>42</v></c></row></sheetData></worksheet>",
        ),
    ])
}

fn setup_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let files = root.join("files");
    fs::create_dir_all(&files).unwrap();

    let config_path = root.join("askdocs.toml");
    fs::write(
        &config_path,
        format!(
            "[store]\ndir = \"{}/data\"\n\n[embedding]\nprovider = \"hashing\"\n\n[generation]\nprovider = \"disabled\"\n",
            root.display()
        ),
    )
    .unwrap();
    (tmp, config_path, files)
}

fn run_askdocs(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = askdocs_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdocs binary at {:?}: {}", binary, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Ingest `bytes` as `name` and assert `phrase` is found by text search.
fn assert_ingested_and_found(name: &str, bytes: &[u8], phrase: &str) {
    let (_tmp, config_path, files) = setup_env();
    let path = files.join(name);
    fs::write(&path, bytes).unwrap();

    let (stdout, stderr, success) = run_askdocs(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(success, "ingest {} failed: stdout={}, stderr={}", name, stdout, stderr);
    assert!(stdout.contains(&format!("ok       {}", name)), "stdout={}", stdout);

    let (stdout, _, success) = run_askdocs(&config_path, &["search", phrase, "--text"]);
    assert!(success);
    assert!(
        stdout.contains(name),
        "'{}' not found in {}: {}",
        phrase,
        name,
        stdout
    );
}

#[test]
fn pdf_ingest_and_search() {
    assert_ingested_and_found("doc.pdf", &minimal_pdf_with_phrase(), "pdf test phrase");
}

#[test]
fn docx_ingest_and_search() {
    assert_ingested_and_found("doc.docx", &docx_with_text("office test phrase"), "office test phrase");
}

#[test]
fn pptx_ingest_and_search() {
    assert_ingested_and_found(
        "deck.pptx",
        &pptx_with_slides(&["first slide", "slide test phrase"]),
        "slide test phrase",
    );
}

#[test]
fn xlsx_ingest_and_search() {
    assert_ingested_and_found("sheet.xlsx", &xlsx_with_cells(), "spreadsheet test phrase");
}

#[test]
fn csv_ingest_and_search() {
    assert_ingested_and_found(
        "table.csv",
        b"name,role\nAda,csv test phrase\n",
        "role: csv test phrase",
    );
}

#[test]
fn json_ingest_and_search() {
    assert_ingested_and_found(
        "data.json",
        br#"{"service": {"owner": "json test phrase"}}"#,
        "json test phrase",
    );
}

#[test]
fn utf16_text_ingest_and_search() {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "utf16 test phrase".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    assert_ingested_and_found("wide.txt", &bytes, "utf16 test phrase");
}

#[test]
fn corrupt_pdf_reports_extraction_failure() {
    let (_tmp, config_path, files) = setup_env();
    let path = files.join("bad.pdf");
    fs::write(&path, b"%PDF-1.4 garbage").unwrap();

    let (stdout, _, success) = run_askdocs(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("failed to extract text from 'bad.pdf'"));
}

#[test]
fn oversized_upload_is_refused() {
    let (_tmp, config_path, files) = setup_env();
    let mut cfg = fs::read_to_string(&config_path).unwrap();
    cfg.push_str("\n[upload]\nmax_bytes = 16\n");
    fs::write(&config_path, cfg).unwrap();

    let path = files.join("big.txt");
    fs::write(&path, "this file is longer than sixteen bytes").unwrap();
    let (stdout, _, success) = run_askdocs(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("over the 16 byte upload limit"));
}
