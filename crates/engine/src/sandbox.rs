//! Project-root containment for every path an agent hands us.
//!
//! Agent paths are relative and usually start with the name of a project root
//! (`app/src/main.rs` for a root named `app`). A path whose first component does not name a
//! root is interpreted against the primary (first) root. Containment is decided lexically:
//! absolute paths and any `..` that climbs above the chosen root are rejected before a
//! handler ever sees the path.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ToolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    name: String,
    path: PathBuf,
}

impl ProjectRoot {
    /// Root named after the final component of `path`. `path` must be absolute.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Project root '{}' has no name", path.display()))?;
        Self::with_name(name, path)
    }

    pub fn with_name(name: impl Into<String>, path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let name = name.into();
        let path = path.into();
        if !path.is_absolute() {
            anyhow::bail!("Project root '{}' must be absolute", path.display());
        }
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            anyhow::bail!("Invalid project root name {name:?}");
        }
        Ok(Self { name, path })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The configured project roots. The first root is the primary one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRoots {
    roots: Vec<ProjectRoot>,
}

impl ProjectRoots {
    pub fn new(roots: Vec<ProjectRoot>) -> anyhow::Result<Self> {
        for (idx, root) in roots.iter().enumerate() {
            if roots[..idx].iter().any(|other| other.name == root.name) {
                anyhow::bail!("Duplicate project root name '{}'", root.name);
            }
        }
        Ok(Self { roots })
    }

    pub fn single(root: ProjectRoot) -> Self {
        Self { roots: vec![root] }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectRoot> {
        self.roots.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ProjectRoot> {
        self.roots.iter().find(|root| root.name == name)
    }

    pub fn primary(&self) -> Option<&ProjectRoot> {
        self.roots.first()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// A path proven to stay inside exactly one project root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxedPath {
    root_name: String,
    root_path: PathBuf,
    relative: PathBuf,
}

impl SandboxedPath {
    pub fn root(root: &ProjectRoot) -> Self {
        Self {
            root_name: root.name.clone(),
            root_path: root.path.clone(),
            relative: PathBuf::new(),
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Path relative to the root; empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn absolute(&self) -> PathBuf {
        self.root_path.join(&self.relative)
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Project-style display path: `<root>/<relative>` with forward slashes.
    pub fn display_path(&self) -> String {
        if self.is_root() {
            return self.root_name.clone();
        }
        let rel = self.relative.to_string_lossy().replace('\\', "/");
        format!("{}/{rel}", self.root_name)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            root_name: self.root_name.clone(),
            root_path: self.root_path.clone(),
            relative: self.relative.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    /// Child entry by single file name, as reported by a directory listing.
    pub fn child(&self, file_name: &str) -> Result<Self> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(Self {
                root_name: self.root_name.clone(),
                root_path: self.root_path.clone(),
                relative: self.relative.join(file_name),
            }),
            _ => Err(ToolError::out_of_bounds(format!(
                "'{file_name}' is not a plain entry name"
            ))),
        }
    }

    /// Relative descendant of this path, re-validated against this path's root.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let normalized = normalize_components(relative)?;
        let mut joined: Vec<String> = self
            .relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        for component in normalized {
            if component == ".." {
                if joined.pop().is_none() {
                    return Err(ToolError::out_of_bounds(format!(
                        "'{relative}' escapes project root '{}'",
                        self.root_name
                    )));
                }
            } else {
                joined.push(component);
            }
        }
        Ok(Self {
            root_name: self.root_name.clone(),
            root_path: self.root_path.clone(),
            relative: joined.iter().collect(),
        })
    }

    /// Reject paths that lexically stay inside the root but reach outside it through a
    /// symlink. Checks the deepest existing ancestor, so it works for paths about to be created.
    pub fn ensure_physically_contained(&self) -> Result<()> {
        let root = self
            .root_path
            .canonicalize()
            .unwrap_or_else(|_| self.root_path.clone());
        let mut ancestor = self.absolute();
        loop {
            if ancestor.symlink_metadata().is_ok() {
                let real = ancestor.canonicalize().map_err(|err| {
                    ToolError::out_of_bounds(format!(
                        "Cannot resolve '{}': {err}",
                        self.display_path()
                    ))
                })?;
                if real.starts_with(&root) {
                    return Ok(());
                }
                return Err(ToolError::out_of_bounds(format!(
                    "'{}' resolves outside project root '{}'",
                    self.display_path(),
                    self.root_name
                )));
            }
            if !ancestor.pop() || !ancestor.starts_with(&self.root_path) {
                return Ok(());
            }
        }
    }
}

impl fmt::Display for SandboxedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_path())
    }
}

impl serde::Serialize for SandboxedPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display_path())
    }
}

fn is_absolute_like(raw: &str) -> bool {
    raw.starts_with('/')
        || raw.starts_with('\\')
        || Path::new(raw).is_absolute()
        || Path::new(raw)
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
}

/// Split into components, keeping `..` markers for the caller to apply.
fn normalize_components(raw: &str) -> Result<Vec<String>> {
    if is_absolute_like(raw) {
        return Err(ToolError::out_of_bounds(format!(
            "Absolute paths are not allowed: '{raw}'"
        )));
    }
    let unified = raw.replace('\\', "/");
    let mut out = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => out.push("..".to_string()),
            Component::Normal(segment) => out.push(segment.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::out_of_bounds(format!(
                    "Absolute paths are not allowed: '{raw}'"
                )));
            }
        }
    }
    Ok(out)
}

/// Resolve an agent-supplied path against the project roots.
///
/// Fails with `OutOfBounds` iff the path is absolute or its normalized form climbs out of
/// the root it addresses. No filesystem access.
pub fn resolve(path: &str, roots: &ProjectRoots) -> Result<SandboxedPath> {
    let Some(primary) = roots.primary() else {
        return Err(ToolError::out_of_bounds("No project roots are configured"));
    };
    let raw = path.trim();

    let mut stack: Vec<String> = Vec::new();
    for component in normalize_components(raw)? {
        if component == ".." {
            if stack.pop().is_none() {
                return Err(ToolError::out_of_bounds(format!(
                    "'{raw}' escapes every project root"
                )));
            }
        } else {
            stack.push(component);
        }
    }

    let (root, rest) = match stack.split_first() {
        Some((first, rest)) => match roots.get(first) {
            Some(root) => (root, rest),
            None => (primary, stack.as_slice()),
        },
        None => (primary, stack.as_slice()),
    };

    Ok(SandboxedPath {
        root_name: root.name.clone(),
        root_path: root.path.clone(),
        relative: rest.iter().collect(),
    })
}
