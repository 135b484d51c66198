use anyhow::{Context, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{DirEntry, EntryKind, EntryMetadata, FileSystem};
use crate::error::ToolError;
use crate::sandbox::SandboxedPath;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The local disk, accessed through `tokio::fs`.
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub const fn new() -> Self {
        Self
    }
}

fn io_error(err: io::Error, action: &str, path: &SandboxedPath) -> anyhow::Error {
    if err.kind() == io::ErrorKind::NotFound {
        return ToolError::not_found(format!("'{path}' does not exist")).into();
    }
    anyhow::Error::new(err).context(format!("Failed to {action} '{path}'"))
}

fn kind_of(meta: &std::fs::Metadata) -> EntryKind {
    if meta.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

/// A scratch file next to a write target, removed on drop unless it was renamed into place.
struct PendingWrite {
    path: PathBuf,
    committed: bool,
}

impl PendingWrite {
    fn next_to(target: &Path) -> Self {
        Self {
            path: temp_sibling(target),
            committed: false,
        }
    }

    async fn commit(mut self, target: &Path) -> io::Result<()> {
        tokio::fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {err}", self.path.display());
            }
        }
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.toolhost-{}-{n}.tmp", std::process::id()))
}

/// Copies `from` to `to`. Nested symlinks are copied as the file they point at, and only when
/// that file lies under `root`; links to directories are refused.
fn copy_recursively(root: &Path, from: &Path, to: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(from)?;
    if meta.file_type().is_symlink() {
        let target = from.canonicalize()?;
        if !target.starts_with(root) {
            return Err(ToolError::out_of_bounds(format!(
                "'{}' links outside the project root",
                from.display()
            ))
            .into());
        }
        if target.is_dir() {
            return Err(ToolError::invalid_input(format!(
                "'{}' links to a directory; copy the directory itself",
                from.display()
            ))
            .into());
        }
        std::fs::copy(&target, to)?;
        return Ok(());
    }
    if !meta.is_dir() {
        std::fs::copy(from, to)?;
        return Ok(());
    }
    std::fs::create_dir(to)?;
    let mut entries: Vec<_> = std::fs::read_dir(from)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);
    for entry in entries {
        copy_recursively(root, &entry.path(), &to.join(entry.file_name()))?;
    }
    Ok(())
}

fn remove_partial(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(err) = result {
        log::warn!("Failed to clean up partial copy {}: {err}", path.display());
    }
}

async fn ensure_absent(path: &SandboxedPath) -> Result<()> {
    match tokio::fs::symlink_metadata(path.absolute()).await {
        Ok(_) => Err(ToolError::invalid_input(format!("'{path}' already exists")).into()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error(err, "inspect", path)),
    }
}

async fn ensure_parent(path: &SandboxedPath) -> Result<()> {
    if let Some(parent) = path.absolute().parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create parent directories of '{path}'"))?;
    }
    Ok(())
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &SandboxedPath) -> Result<String> {
        path.ensure_physically_contained()?;
        tokio::fs::read_to_string(path.absolute())
            .await
            .map_err(|err| io_error(err, "read", path))
    }

    async fn write(&self, path: &SandboxedPath, contents: &str) -> Result<()> {
        path.ensure_physically_contained()?;
        let target = path.absolute();
        if tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_dir()) {
            return Err(ToolError::invalid_input(format!("'{path}' is a directory")).into());
        }
        ensure_parent(path).await?;

        let pending = PendingWrite::next_to(&target);
        tokio::fs::write(&pending.path, contents)
            .await
            .with_context(|| format!("Failed to write '{path}'"))?;
        pending
            .commit(&target)
            .await
            .map_err(|err| io_error(err, "replace", path))
    }

    async fn create_dir(&self, path: &SandboxedPath) -> Result<()> {
        path.ensure_physically_contained()?;
        tokio::fs::create_dir_all(path.absolute())
            .await
            .map_err(|err| io_error(err, "create directory", path))
    }

    async fn list_dir(&self, path: &SandboxedPath) -> Result<Vec<DirEntry>> {
        path.ensure_physically_contained()?;
        let mut reader = tokio::fs::read_dir(path.absolute())
            .await
            .map_err(|err| io_error(err, "list", path))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| io_error(err, "list", path))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follows symlinks; a dangling link is listed as a file.
            let kind = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => kind_of(&meta),
                Err(_) => EntryKind::File,
            };
            entries.push(DirEntry { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn copy(&self, from: &SandboxedPath, to: &SandboxedPath) -> Result<()> {
        from.ensure_physically_contained()?;
        to.ensure_physically_contained()?;
        ensure_absent(to).await?;
        if to.root_name() == from.root_name() && to.relative().starts_with(from.relative()) {
            return Err(ToolError::invalid_input(format!(
                "Cannot copy '{from}' into itself ('{to}')"
            ))
            .into());
        }
        ensure_parent(to).await?;

        let root = from
            .root_path()
            .canonicalize()
            .map_err(|err| io_error(err, "resolve root of", from))?;
        let source = from
            .absolute()
            .canonicalize()
            .map_err(|err| io_error(err, "copy", from))?;
        let dest = to.absolute();
        let result = tokio::task::spawn_blocking(move || {
            let result = copy_recursively(&root, &source, &dest);
            if result.is_err() {
                remove_partial(&dest);
            }
            result
        })
        .await
        .context("copy task panicked")?;
        result.map_err(|err| match err.downcast::<io::Error>() {
            Ok(io) => io_error(io, "copy", from),
            Err(other) => other,
        })
    }

    async fn rename(&self, from: &SandboxedPath, to: &SandboxedPath) -> Result<()> {
        from.ensure_physically_contained()?;
        to.ensure_physically_contained()?;
        if from.is_root() {
            return Err(ToolError::invalid_input("Cannot move a project root").into());
        }
        ensure_absent(to).await?;
        ensure_parent(to).await?;
        tokio::fs::rename(from.absolute(), to.absolute())
            .await
            .map_err(|err| io_error(err, "move", from))
    }

    async fn remove(&self, path: &SandboxedPath) -> Result<()> {
        path.ensure_physically_contained()?;
        let target = path.absolute();
        let meta = tokio::fs::symlink_metadata(&target)
            .await
            .map_err(|err| io_error(err, "inspect", path))?;
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        result.map_err(|err| io_error(err, "delete", path))
    }

    async fn metadata(&self, path: &SandboxedPath) -> Result<Option<EntryMetadata>> {
        path.ensure_physically_contained()?;
        match tokio::fs::metadata(path.absolute()).await {
            Ok(meta) => Ok(Some(EntryMetadata {
                kind: kind_of(&meta),
                len: meta.len(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(err, "inspect", path)),
        }
    }

    async fn walk_files(&self, dir: &SandboxedPath) -> Result<Vec<SandboxedPath>> {
        dir.ensure_physically_contained()?;
        let base = dir.absolute();
        let rels = tokio::task::spawn_blocking(move || {
            let mut builder = WalkBuilder::new(&base);
            builder
                .hidden(false)
                .require_git(false)
                .follow_links(false)
                .filter_entry(|entry| entry.file_name() != ".git");
            let mut rels = Vec::new();
            for entry in builder.build() {
                let entry = match entry {
                    Ok(value) => value,
                    Err(err) => {
                        log::debug!("walk: skipping entry: {err}");
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&base) {
                    rels.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
            rels
        })
        .await
        .context("walk task panicked")?;

        let mut files = rels
            .iter()
            .map(|rel| dir.join(rel))
            .collect::<crate::error::Result<Vec<_>>>()?;
        files.sort_by_key(SandboxedPath::display_path);
        Ok(files)
    }
}
