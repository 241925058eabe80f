//! Build error taxonomy.
//!
//! Every fallible operation in the crate returns [`BuildResult`]. Each variant carries the
//! offending path where there is one, and a stable diagnostic code via [`BuildError::code`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_FILE_NOT_FOUND: &str = "ONO-ERR-NOT-FOUND";
pub const ERR_CYCLE: &str = "ONO-ERR-CYCLE";
pub const ERR_SYNTAX: &str = "ONO-ERR-SYNTAX";
pub const ERR_TRANSFORM: &str = "ONO-ERR-TRANSFORM";
pub const ERR_LINK: &str = "ONO-ERR-LINK";
pub const ERR_PLUGIN: &str = "ONO-ERR-PLUGIN";
pub const ERR_ASSET_COPY: &str = "ONO-ERR-ASSET";
pub const ERR_NO_DEFAULT: &str = "ONO-ERR-NO-DEFAULT";
pub const ERR_EVAL: &str = "ONO-ERR-EVAL";
pub const ERR_NO_STATIC_PATHS: &str = "ONO-ERR-STATIC-PATHS";
pub const ERR_IO: &str = "ONO-ERR-IO";
pub const ERR_CONFIG: &str = "ONO-ERR-CONFIG";

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("File not found: {} (imported from {})", .path.display(), display_origin(.referenced_from))]
    FileNotFound {
        path: PathBuf,
        referenced_from: Option<PathBuf>,
    },

    #[error("Circular dependency detected: {}", display_cycle(.cycle))]
    CircularDependency { cycle: Vec<PathBuf> },

    #[error("Syntax error in {}: {message}", .file.display())]
    Syntax { file: PathBuf, message: String },

    #[error("Transform failed for {}: {message}", .file.display())]
    TransformFailure { file: PathBuf, message: String },

    #[error("Cannot link {}: {message}", .file.display())]
    Link { file: PathBuf, message: String },

    #[error("Plugin `{plugin}` failed in {hook}: {message}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        message: String,
    },

    #[error("Failed to copy asset {}", .path.display())]
    AssetCopyFailure {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("{} has no default export to render", .file.display())]
    MissingDefaultExport { file: PathBuf },

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },

    #[error("Dynamic route {} must export getStaticPaths", .file.display())]
    MissingStaticPaths { file: PathBuf },

    #[error("IO error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

pub type BuildResult<T> = Result<T, BuildError>;

impl BuildError {
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::FileNotFound { .. } => ERR_FILE_NOT_FOUND,
            BuildError::CircularDependency { .. } => ERR_CYCLE,
            BuildError::Syntax { .. } => ERR_SYNTAX,
            BuildError::TransformFailure { .. } => ERR_TRANSFORM,
            BuildError::Link { .. } => ERR_LINK,
            BuildError::Plugin { .. } => ERR_PLUGIN,
            BuildError::AssetCopyFailure { .. } => ERR_ASSET_COPY,
            BuildError::MissingDefaultExport { .. } => ERR_NO_DEFAULT,
            BuildError::Evaluation { .. } => ERR_EVAL,
            BuildError::MissingStaticPaths { .. } => ERR_NO_STATIC_PATHS,
            BuildError::Io { .. } => ERR_IO,
            BuildError::Config { .. } => ERR_CONFIG,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn asset_copy(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::AssetCopyFailure {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        BuildError::Evaluation {
            message: message.into(),
        }
    }

    /// The file this error points at, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            BuildError::FileNotFound { path, .. }
            | BuildError::AssetCopyFailure { path, .. }
            | BuildError::Io { path, .. } => Some(path),
            BuildError::Syntax { file, .. }
            | BuildError::TransformFailure { file, .. }
            | BuildError::Link { file, .. }
            | BuildError::MissingDefaultExport { file }
            | BuildError::MissingStaticPaths { file } => Some(file),
            BuildError::CircularDependency { cycle } => cycle.first().map(PathBuf::as_path),
            _ => None,
        }
    }
}

fn display_origin(origin: &Option<PathBuf>) -> String {
    match origin {
        Some(p) => p.display().to_string(),
        None => "<entry>".to_string(),
    }
}

fn display_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = BuildError::CircularDependency {
            cycle: vec![PathBuf::from("/a.jsx"), PathBuf::from("/b.jsx"), PathBuf::from("/a.jsx")],
        };
        assert_eq!(err.code(), ERR_CYCLE);
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: /a.jsx -> /b.jsx -> /a.jsx"
        );
    }

    #[test]
    fn test_not_found_names_importer() {
        let err = BuildError::FileNotFound {
            path: PathBuf::from("/x/missing.jsx"),
            referenced_from: Some(PathBuf::from("/x/page.jsx")),
        };
        let msg = err.to_string();
        assert!(msg.contains("/x/missing.jsx"));
        assert!(msg.contains("/x/page.jsx"));
        assert_eq!(err.file(), Some(Path::new("/x/missing.jsx")));
    }

    #[test]
    fn test_io_error_is_cloneable() {
        let err = BuildError::asset_copy("/a.png", io::Error::new(io::ErrorKind::Other, "disk"));
        let copy = err.clone();
        assert_eq!(copy.code(), ERR_ASSET_COPY);
    }
}
