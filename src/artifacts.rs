//! Scratch storage for uploaded spreadsheets.
//!
//! Layout: `<root>/<artifact id>/upload.<ext>` plus a `meta.json` sidecar.
//! Each artifact owns its directory, so the sweep works per directory.

use crate::error::{ImportError, Result};
use crate::sheet::SheetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use uuid::Uuid;
use zip::ZipArchive;

const META_FILE: &str = "meta.json";
const UPLOAD_STEM: &str = "upload";
const PARTIAL_SUFFIX: &str = ".partial";
const OLE2_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub removed_dirs: usize,
    pub removed_files: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgedEntry {
    pub name: String,
    pub age_hours: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScratchStats {
    pub artifact_count: usize,
    pub total_size_bytes: u64,
    pub oldest: Option<AgedEntry>,
    pub newest: Option<AgedEntry>,
}

pub struct ArtifactManager {
    root: PathBuf,
}

impl ArtifactManager {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ArtifactManager { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and persist an upload under a fresh id.
    pub fn store(&self, bytes: &[u8], original_name: &str) -> Result<ArtifactMeta> {
        let original_name = Path::new(original_name)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let kind = SheetKind::from_name(&original_name)
            .ok_or_else(|| ImportError::UnsupportedFileType(original_name.clone()))?;
        validate_content(kind, bytes, &original_name)?;

        let id = Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir)?;

        let stored_name = format!("{}.{}", UPLOAD_STEM, kind.extension());
        write_atomic(&dir.join(&stored_name), bytes)?;

        let meta = ArtifactMeta {
            id,
            original_name,
            stored_name,
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            uploaded_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ImportError::Io(std::io::Error::other(e)))?;
        write_atomic(&dir.join(META_FILE), &meta_json)?;

        info!(artifact_id = %meta.id, name = %meta.original_name, size = meta.size, "artifact stored");
        Ok(meta)
    }

    /// On-disk location of an artifact's spreadsheet.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let meta = self.meta(id)?;
        let path = self.root.join(&meta.id).join(&meta.stored_name);
        if !path.is_file() {
            return Err(ImportError::ArtifactNotFound(id.to_string()));
        }
        Ok(path)
    }

    /// Reads the sidecar; if it is missing but the upload survived, metadata
    /// is rebuilt from the file itself.
    pub fn meta(&self, id: &str) -> Result<ArtifactMeta> {
        let dir = self.artifact_dir(id)?;
        match fs::read(dir.join(META_FILE)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|_| ImportError::ArtifactNotFound(id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => rebuild_meta(id, &dir),
            Err(e) => Err(e.into()),
        }
    }

    /// Every artifact still on disk, oldest upload first.
    pub fn list(&self) -> Result<Vec<ArtifactMeta>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for ent in entries {
            let ent = ent?;
            let Some(name) = ent.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if Uuid::parse_str(&name).is_err() || !ent.path().is_dir() {
                continue;
            }
            match self.meta(&name) {
                Ok(m) => out.push(m),
                Err(e) => warn!(artifact_id = %name, error = %e, "skipping unreadable artifact"),
            }
        }
        out.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.artifact_dir(id)?;
        fs::remove_dir_all(&dir)?;
        info!(artifact_id = id, "artifact deleted");
        Ok(())
    }

    /// Remove every scratch directory older than `max_age_hours`. Per-entry
    /// failures are collected and the sweep moves on.
    pub fn sweep(&self, max_age_hours: u64) -> SweepReport {
        self.sweep_with(max_age_hours, |dir| fs::remove_dir_all(dir))
    }

    /// [`sweep`](Self::sweep) with the removal of each expired directory
    /// delegated to `remove`.
    pub fn sweep_with<F>(&self, max_age_hours: u64, mut remove: F) -> SweepReport
    where
        F: FnMut(&Path) -> std::io::Result<()>,
    {
        let max_age = Duration::from_secs(max_age_hours.saturating_mul(3600));
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                report.errors.push(
                    ImportError::SweepEntryFailed {
                        entry: self.root.to_string_lossy().to_string(),
                        cause: e.to_string(),
                    }
                    .to_string(),
                );
                return report;
            }
        };

        for ent in entries {
            let ent = match ent {
                Ok(v) => v,
                Err(e) => {
                    report.errors.push(
                        ImportError::SweepEntryFailed {
                            entry: self.root.to_string_lossy().to_string(),
                            cause: e.to_string(),
                        }
                        .to_string(),
                    );
                    continue;
                }
            };
            let name = ent.file_name().to_string_lossy().to_string();
            match sweep_entry(&ent.path(), now, max_age, &mut remove) {
                Ok(Some(files)) => {
                    report.removed_dirs += 1;
                    report.removed_files += files;
                    info!(entry = %name, files, "expired scratch directory removed");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(entry = %name, error = %e, "scratch sweep entry failed");
                    report.errors.push(
                        ImportError::SweepEntryFailed {
                            entry: name,
                            cause: e.to_string(),
                        }
                        .to_string(),
                    );
                }
            }
        }
        report
    }

    pub fn stats(&self) -> Result<ScratchStats> {
        let mut stats = ScratchStats::default();
        let entries = match fs::read_dir(&self.root) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();
        let mut oldest: Option<(SystemTime, String)> = None;
        let mut newest: Option<(SystemTime, String)> = None;

        for ent in entries {
            let ent = ent?;
            let path = ent.path();
            let Ok(md) = fs::symlink_metadata(&path) else {
                continue;
            };
            if !md.is_dir() {
                continue;
            }
            let name = ent.file_name().to_string_lossy().to_string();
            stats.artifact_count += 1;
            stats.total_size_bytes += dir_size(&path);
            let Ok(mtime) = md.modified() else {
                continue;
            };
            if oldest.as_ref().map(|(t, _)| mtime < *t).unwrap_or(true) {
                oldest = Some((mtime, name.clone()));
            }
            if newest.as_ref().map(|(t, _)| mtime > *t).unwrap_or(true) {
                newest = Some((mtime, name));
            }
        }

        let aged = |(t, name): (SystemTime, String)| AgedEntry {
            name,
            age_hours: age_hours(now, t),
        };
        stats.oldest = oldest.map(aged);
        stats.newest = newest.map(aged);
        Ok(stats)
    }

    fn artifact_dir(&self, id: &str) -> Result<PathBuf> {
        let parsed = Uuid::parse_str(id).map_err(|_| ImportError::ArtifactNotFound(id.to_string()))?;
        let dir = self.root.join(parsed.to_string());
        if !dir.is_dir() {
            return Err(ImportError::ArtifactNotFound(id.to_string()));
        }
        Ok(dir)
    }
}

fn validate_content(kind: SheetKind, bytes: &[u8], name: &str) -> Result<()> {
    let ok = match kind {
        SheetKind::Xlsx => match ZipArchive::new(Cursor::new(bytes)) {
            Ok(mut archive) => {
                let found = archive.by_name("xl/workbook.xml").is_ok();
                found
            }
            Err(_) => false,
        },
        SheetKind::Xls => bytes.starts_with(&OLE2_SIGNATURE),
        SheetKind::Csv => true,
    };
    if !ok {
        return Err(ImportError::UnsupportedFileType(format!(
            "{name}: content is not a valid .{} file",
            kind.extension()
        )));
    }
    Ok(())
}

/// Write to a sibling temp file, then rename into place.
fn write_atomic(dst: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = dst.as_os_str().to_owned();
    tmp.push(PARTIAL_SUFFIX);
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, dst)
}

fn rebuild_meta(id: &str, dir: &Path) -> Result<ArtifactMeta> {
    for ent in fs::read_dir(dir)? {
        let ent = ent?;
        let name = ent.file_name().to_string_lossy().to_string();
        if !name.starts_with(UPLOAD_STEM) || name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        if SheetKind::from_name(&name).is_none() {
            continue;
        }
        let bytes = fs::read(ent.path())?;
        let uploaded_at = ent
            .metadata()?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        warn!(artifact_id = id, "artifact metadata missing, rebuilt from file");
        return Ok(ArtifactMeta {
            id: id.to_string(),
            original_name: name.clone(),
            stored_name: name,
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&bytes)),
            uploaded_at,
        });
    }
    Err(ImportError::ArtifactNotFound(id.to_string()))
}

/// `Ok(Some(files_removed))` when the entry was expired and removed.
fn sweep_entry(
    path: &Path,
    now: SystemTime,
    max_age: Duration,
    remove: &mut impl FnMut(&Path) -> std::io::Result<()>,
) -> std::io::Result<Option<usize>> {
    let md = fs::symlink_metadata(path)?;
    if !md.is_dir() {
        return Ok(None);
    }
    let age = now.duration_since(md.modified()?).unwrap_or_default();
    if age <= max_age {
        return Ok(None);
    }
    let files = count_files(path)?;
    remove(path)?;
    Ok(Some(files))
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut n = 0;
    for ent in fs::read_dir(dir)? {
        let ent = ent?;
        let ft = ent.file_type()?;
        if ft.is_dir() {
            n += count_files(&ent.path())?;
        } else {
            n += 1;
        }
    }
    Ok(n)
}

/// Unreadable entries count as zero bytes.
fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| match e.file_type() {
            Ok(ft) if ft.is_dir() => dir_size(&e.path()),
            Ok(_) => e.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}

fn age_hours(now: SystemTime, then: SystemTime) -> f64 {
    let secs = now.duration_since(then).unwrap_or_default().as_secs_f64();
    (secs / 3600.0 * 100.0).round() / 100.0
}
