//! Path confinement for every filesystem-touching tool
//!
//! A candidate path is resolved against the sandbox root one component at a
//! time. Existing components are canonicalized so symlinks are followed;
//! once a component does not exist the rest is resolved lexically. The
//! resolved path must stay under the canonical root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Why a candidate path was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    #[error("path escapes the working directory: {0}")]
    Escape(String),

    #[error("cannot resolve {path}: {reason}")]
    Unresolvable { path: String, reason: String },
}

/// A path that resolved inside the sandbox root when it was validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedPath {
    path: PathBuf,
    root: PathBuf,
}

impl SandboxedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root, `.` for the root itself
    pub fn relative(&self) -> String {
        relative_to(&self.path, &self.root)
    }
}

/// Render `path` relative to `root`, falling back to the full path
pub fn relative_to(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Sandbox bound to one root directory
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn validate(&self, candidate: &str) -> Result<SandboxedPath, SandboxError> {
        validate(&self.root, candidate).await
    }
}

/// Resolve `candidate` under `root`. Nothing is cached; every call sees the
/// filesystem as it is now.
pub async fn validate(root: &Path, candidate: &str) -> Result<SandboxedPath, SandboxError> {
    let candidate_path = Path::new(candidate);
    if candidate_path.is_absolute() || candidate_path.has_root() {
        return Err(SandboxError::Absolute(candidate.to_string()));
    }

    let unresolvable = |e: std::io::Error| SandboxError::Unresolvable {
        path: candidate.to_string(),
        reason: e.to_string(),
    };

    let root = tokio::fs::canonicalize(root).await.map_err(unresolvable)?;
    let mut resolved = root.clone();
    let mut lexical = false;
    let mut on_file = false;

    for component in candidate_path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if on_file {
                    return Err(SandboxError::Unresolvable {
                        path: candidate.to_string(),
                        reason: "Not a directory".to_string(),
                    });
                }
                resolved.pop();
                // Back on an existing path: symlinks must be followed again.
                if lexical && tokio::fs::symlink_metadata(&resolved).await.is_ok() {
                    lexical = false;
                }
            }
            Component::Normal(part) => {
                resolved.push(part);
                if lexical {
                    continue;
                }
                match tokio::fs::symlink_metadata(&resolved).await {
                    Ok(_) => {
                        resolved = tokio::fs::canonicalize(&resolved)
                            .await
                            .map_err(unresolvable)?;
                        on_file = !tokio::fs::metadata(&resolved)
                            .await
                            .map_err(unresolvable)?
                            .is_dir();
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => lexical = true,
                    Err(e) => return Err(unresolvable(e)),
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::Absolute(candidate.to_string()));
            }
        }
    }

    if !resolved.starts_with(&root) {
        debug!("Denied {:?}: resolved to {:?}", candidate, resolved);
        return Err(SandboxError::Escape(candidate.to_string()));
    }

    Ok(SandboxedPath {
        path: resolved,
        root,
    })
}
