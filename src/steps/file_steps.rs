//! Filesystem helpers as steps. I/O problems are logged and never abort a run.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::Step;
use crate::error::{BotError, Result};
use crate::runs::{timestamp, Outcome};
use crate::session::SessionContext;

/// Copy a file, creating the destination folder
#[derive(Debug, Clone)]
pub struct CopyFile {
    source: PathBuf,
    destination: PathBuf,
    preserve_metadata: bool,
}

impl CopyFile {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            preserve_metadata: true,
        }
    }

    pub fn preserve_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }
}

#[async_trait]
impl Step for CopyFile {
    fn name(&self) -> &'static str {
        "CopyFile"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        if !self.source.exists() {
            ctx.log()
                .failure(format!("Source file does not exist: {}", self.source.display()));
            return Ok(ctx);
        }

        match copy_file(&self.source, &self.destination, self.preserve_metadata) {
            Ok(()) => ctx.log().record(
                Outcome::File,
                format!("Copied {} to {}", file_name(&self.source), self.destination.display()),
            ),
            Err(e) => contain(&ctx, "copying", e),
        }
        Ok(ctx)
    }
}

/// Move a file, falling back to copy and delete across filesystems
#[derive(Debug, Clone)]
pub struct MoveFile {
    source: PathBuf,
    destination: PathBuf,
}

impl MoveFile {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl Step for MoveFile {
    fn name(&self) -> &'static str {
        "MoveFile"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        if !self.source.exists() {
            ctx.log()
                .failure(format!("Source file does not exist: {}", self.source.display()));
            return Ok(ctx);
        }

        match move_file(&self.source, &self.destination) {
            Ok(()) => ctx.log().record(
                Outcome::Moved,
                format!("Moved {} to {}", file_name(&self.source), self.destination.display()),
            ),
            Err(e) => contain(&ctx, "moving", e),
        }
        Ok(ctx)
    }
}

/// Delete a file; `force` clears the read-only flag first
#[derive(Debug, Clone)]
pub struct DeleteFile {
    path: PathBuf,
    force: bool,
}

impl DeleteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[async_trait]
impl Step for DeleteFile {
    fn name(&self) -> &'static str {
        "DeleteFile"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        if !self.path.exists() {
            ctx.log()
                .warn(format!("File does not exist: {}", self.path.display()));
            return Ok(ctx);
        }
        if !self.path.is_file() {
            ctx.log()
                .failure(format!("Path is not a file: {}", self.path.display()));
            return Ok(ctx);
        }

        match delete_file(&self.path, self.force) {
            Ok(()) => ctx
                .log()
                .record(Outcome::Deleted, format!("Deleted {}", file_name(&self.path))),
            Err(e) => contain(&ctx, "deleting", e),
        }
        Ok(ctx)
    }
}

/// Copy the newest file with an extension from the download folders
#[derive(Debug, Clone)]
pub struct CopyLatestFile {
    extension: String,
    destination_dir: PathBuf,
    name_contains: Option<String>,
    new_name: Option<String>,
    search_paths: Option<Vec<PathBuf>>,
}

impl CopyLatestFile {
    pub fn new(extension: &str, destination_dir: impl Into<PathBuf>) -> Result<Self> {
        let extension = extension.trim().trim_start_matches('.').to_lowercase();
        if extension.is_empty() {
            return Err(BotError::Configuration(
                "copy_latest_file requires an extension".to_string(),
            ));
        }
        Ok(Self {
            extension,
            destination_dir: destination_dir.into(),
            name_contains: None,
            new_name: None,
            search_paths: None,
        })
    }

    /// Only consider files whose name contains `fragment` (case-insensitive)
    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into()).filter(|f: &String| !f.trim().is_empty());
        self
    }

    pub fn renamed(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into()).filter(|n: &String| !n.is_empty());
        self
    }

    /// Search these folders instead of the user's download folders
    pub fn search_in(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// `<new_name|file>_<timestamp>.<ext>`
    pub fn destination_name(&self, timestamp: &str) -> String {
        format!(
            "{}_{}.{}",
            self.new_name.as_deref().unwrap_or("file"),
            timestamp,
            self.extension
        )
    }
}

#[async_trait]
impl Step for CopyLatestFile {
    fn name(&self) -> &'static str {
        "CopyLatestFile"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let search_paths = self
            .search_paths
            .clone()
            .unwrap_or_else(default_download_dirs);

        let Some(latest) = find_latest_file(&self.extension, self.name_contains.as_deref(), &search_paths) else {
            ctx.log()
                .failure(format!("No file found with extension .{}", self.extension));
            return Ok(ctx);
        };

        let destination = self.destination_dir.join(self.destination_name(&timestamp()));
        match copy_file(&latest, &destination, true) {
            Ok(()) => ctx.log().record(
                Outcome::File,
                format!("Copied {} to {}", file_name(&latest), destination.display()),
            ),
            Err(e) => contain(&ctx, "copying", e),
        }
        Ok(ctx)
    }
}

fn contain(ctx: &SessionContext, action: &str, err: io::Error) {
    tracing::warn!("File step failed while {}: {}", action, err);
    ctx.log().failure(format!("Error {} file: {}", action, err));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Copy contents and permissions, plus the modification time when `preserve_metadata`
fn copy_file(source: &Path, destination: &Path, preserve_metadata: bool) -> io::Result<()> {
    ensure_parent(destination)?;
    fs::copy(source, destination)?;

    if preserve_metadata {
        let modified = fs::metadata(source)?.modified()?;
        // Read-only copies cannot be opened for writing; the timestamp is best effort there
        if let Ok(file) = fs::File::options().write(true).open(destination) {
            file.set_modified(modified)?;
        }
    }
    Ok(())
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    ensure_parent(destination)?;
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    copy_file(source, destination, true)?;
    fs::remove_file(source)
}

fn delete_file(path: &Path, force: bool) -> io::Result<()> {
    if force {
        let mut permissions = fs::metadata(path)?.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)?;
        }
    }
    fs::remove_file(path)
}

/// The user's download folders that exist: the platform download dir plus
/// `~/Downloads` and `~/Descargas`
pub fn default_download_dirs() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = dirs::download_dir().into_iter().collect();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("Downloads"));
        candidates.push(home.join("Descargas"));
    }

    let mut found: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if candidate.is_dir() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// Newest file with `extension` in `search_paths` or their immediate subfolders
pub fn find_latest_file(extension: &str, name_contains: Option<&str>, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let extension = extension.trim_start_matches('.').to_lowercase();
    let fragment = name_contains.map(str::to_lowercase);

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    let mut consider = |path: PathBuf| {
        let matches_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(&extension));
        if !matches_extension {
            return;
        }
        if let Some(fragment) = &fragment {
            if !file_name(&path).to_lowercase().contains(fragment.as_str()) {
                return;
            }
        }
        let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
            return;
        };
        if latest.as_ref().map_or(true, |(newest, _)| modified > *newest) {
            latest = Some((modified, path));
        }
    };

    for root in search_paths {
        let Ok(entries) = fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                consider(path);
            } else if path.is_dir() {
                if let Ok(children) = fs::read_dir(&path) {
                    for child in children.flatten() {
                        if child.path().is_file() {
                            consider(child.path());
                        }
                    }
                }
            }
        }
    }

    latest.map(|(_, path)| path)
}
