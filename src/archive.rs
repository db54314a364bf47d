//! Result archives
//!
//! Zips job results for download. Building an archive reads the results
//! folder synchronously; callers on the runtime use `spawn_blocking`.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::jobs::JobRecord;

/// Archive errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("No valid results found for selected jobs")]
    NothingToArchive,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    job_name: &'a str,
    kind: &'a str,
    device: &'a str,
    mode: &'a str,
    outputs: Vec<ManifestOutput<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestOutput<'a> {
    input: &'a str,
    out: String,
    pages_sel: &'a str,
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Zip one job: every file of its results folder plus `manifest.json`.
///
/// A job without results still yields an archive holding the manifest.
pub fn job_results_zip(job: &JobRecord, results_dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    if results_dir.is_dir() {
        add_dir(&mut zip, results_dir, "")?;
    }

    let manifest = Manifest {
        job_name: &job.name,
        kind: &job.kind,
        device: &job.device,
        mode: job.mode.as_str(),
        outputs: job
            .files
            .iter()
            .map(|f| ManifestOutput {
                input: &f.name,
                out: format!("{}.md", f.stem()),
                pages_sel: &f.pages_sel,
            })
            .collect(),
    };
    zip.start_file("manifest.json", options())?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

/// Zip several jobs, one folder per job named after it.
///
/// `jobs` pairs each job name with its results folder. Jobs whose folder
/// does not exist are skipped.
pub fn batch_zip(jobs: &[(String, PathBuf)]) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();
    let mut archived = 0;

    for (name, results_dir) in jobs {
        if !results_dir.is_dir() {
            tracing::debug!(job = %name, "No results folder, skipping");
            continue;
        }

        let folder = unique_folder(&mut used, &sanitize_name(name));
        add_dir(&mut zip, results_dir, &format!("{}/", folder))?;
        archived += 1;
    }

    if archived == 0 {
        return Err(ArchiveError::NothingToArchive);
    }
    Ok(zip.finish()?.into_inner())
}

/// Add every file under `dir`, recursively, at `prefix` + relative path
fn add_dir<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
) -> Result<(), ArchiveError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            add_dir(zip, &path, &format!("{}{}/", prefix, name))?;
        } else {
            zip.start_file(format!("{}{}", prefix, name), options())?;
            zip.write_all(&std::fs::read(&path)?)?;
        }
    }
    Ok(())
}

fn unique_folder(used: &mut HashSet<String>, base: &str) -> String {
    let mut folder = base.to_string();
    let mut n = 2;
    while !used.insert(folder.clone()) {
        folder = format!("{} ({})", base, n);
        n += 1;
    }
    folder
}

/// Keep alphanumerics, space, `-` and `_`; falls back to `results`
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "results".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Download name of a job archive
pub fn job_zip_filename(job_name: &str) -> String {
    format!("{}_results.zip", sanitize_name(job_name))
}

/// Download name of a batch archive
pub fn batch_zip_filename() -> String {
    format!("batch_results_{}.zip", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}
