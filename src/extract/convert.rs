//! Legacy Office formats (`.doc`, `.ppt`, `.xls`) via LibreOffice.
//!
//! The upload is written into a fresh scratch directory, converted with
//! `soffice --headless --convert-to <ext>`, and the OOXML result is read
//! back. The scratch directory is a [`tempfile::TempDir`], so it is removed
//! when this function returns, errors, or unwinds.

use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::{ExtractError, LoaderOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn convert_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Convert(e.to_string())
}

/// Convert `bytes` (a `from` file) into `to` and return the converted bytes.
pub fn convert_legacy(
    bytes: &[u8],
    from: &str,
    to: &str,
    options: &LoaderOptions,
) -> Result<Vec<u8>, ExtractError> {
    let scratch = match &options.scratch_dir {
        Some(parent) => tempfile::Builder::new()
            .prefix("askdocs-convert-")
            .tempdir_in(parent),
        None => tempfile::Builder::new().prefix("askdocs-convert-").tempdir(),
    }
    .map_err(convert_err)?;

    let input = scratch.path().join(format!("input.{from}"));
    fs::write(&input, bytes).map_err(convert_err)?;

    run_soffice(&scratch, &input, to, options)?;

    let output = scratch.path().join(format!("input.{to}"));
    let converted = fs::read(&output).map_err(|e| {
        ExtractError::Convert(format!("{} produced no .{to} output: {e}", options.soffice))
    })?;
    debug!(from, to, bytes = converted.len(), "converted legacy document");
    Ok(converted)
}

fn run_soffice(
    scratch: &TempDir,
    input: &std::path::Path,
    to: &str,
    options: &LoaderOptions,
) -> Result<(), ExtractError> {
    let mut child = Command::new(&options.soffice)
        .arg("--headless")
        .arg("--convert-to")
        .arg(to)
        .arg("--outdir")
        .arg(scratch.path())
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            ExtractError::Convert(format!(
                "could not run '{}' (is LibreOffice installed?): {e}",
                options.soffice
            ))
        })?;

    let deadline = Instant::now() + options.convert_timeout;
    loop {
        match child.try_wait().map_err(convert_err)? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                return Err(ExtractError::Convert(format!(
                    "{} exited with {status}",
                    options.soffice
                )))
            }
            None if Instant::now() >= deadline => {
                warn!(soffice = %options.soffice, "conversion timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExtractError::Convert(format!(
                    "timed out after {}s",
                    options.convert_timeout.as_secs()
                )));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}
