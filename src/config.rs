//! Build options shared by the bundler, the asset pipeline and the page builder.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    /// Where rendered pages and copied assets are written.
    pub output_dir: Option<PathBuf>,
    /// Subdirectory of `output_dir` for assets; also the public URL prefix.
    pub assets_dir: String,
    pub hash_assets: bool,
    pub jsx_factory: String,
    pub jsx_fragment: String,
    /// Prefix the bundle with a JS `h`/`Fragment` runtime for hosts that do not provide one.
    pub inline_runtime: bool,
    pub page_extensions: Vec<String>,
    pub cache_dir: Option<PathBuf>,
    /// Deepest nesting of script function calls before a `RangeError`.
    pub max_call_depth: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output_dir: Some(PathBuf::from("dist")),
            assets_dir: "assets".to_string(),
            hash_assets: true,
            jsx_factory: "h".to_string(),
            jsx_fragment: "Fragment".to_string(),
            inline_runtime: false,
            page_extensions: vec!["jsx".to_string(), "tsx".to_string()],
            cache_dir: None,
            max_call_depth: 512,
        }
    }
}

impl BuildOptions {
    pub fn from_json_str(json: &str) -> BuildResult<Self> {
        let options: BuildOptions = serde_json::from_str(json).map_err(|e| BuildError::Config {
            message: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> BuildResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn without_output(mut self) -> Self {
        self.output_dir = None;
        self
    }

    pub fn is_page_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.page_extensions.iter().any(|p| p == ext))
            .unwrap_or(false)
    }

    fn validate(&self) -> BuildResult<()> {
        if self.assets_dir.contains("..") {
            return Err(BuildError::Config {
                message: format!("assetsDir `{}` must stay inside outputDir", self.assets_dir),
            });
        }
        if self.max_call_depth == 0 {
            return Err(BuildError::Config {
                message: "maxCallDepth must be at least 1".to_string(),
            });
        }
        if !is_identifier(&self.jsx_factory) || !is_identifier(&self.jsx_fragment) {
            return Err(BuildError::Config {
                message: "jsxFactory and jsxFragment must be plain identifiers".to_string(),
            });
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let opts = BuildOptions::from_json_str(r#"{ "hashAssets": false }"#).unwrap();
        assert!(!opts.hash_assets);
        assert_eq!(opts.assets_dir, "assets");
        assert_eq!(opts.output_dir, Some(PathBuf::from("dist")));
        assert_eq!(opts.jsx_factory, "h");
    }

    #[test]
    fn test_rejects_bad_factory() {
        let err = BuildOptions::from_json_str(r#"{ "jsxFactory": "React.createElement" }"#)
            .unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn test_call_depth_is_configurable_and_positive() {
        let opts = BuildOptions::from_json_str(r#"{ "maxCallDepth": 2048 }"#).unwrap();
        assert_eq!(opts.max_call_depth, 2048);
        assert_eq!(BuildOptions::default().max_call_depth, 512);
        let err = BuildOptions::from_json_str(r#"{ "maxCallDepth": 0 }"#).unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = BuildOptions::from_json_str("{ outputDir: ").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_CONFIG);
    }

    #[test]
    fn test_page_extension_filter() {
        let opts = BuildOptions::default();
        assert!(opts.is_page_file(Path::new("pages/index.jsx")));
        assert!(!opts.is_page_file(Path::new("pages/styles.css")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ono.config.json");
        std::fs::write(&path, r#"{ "outputDir": "public", "assetsDir": "static" }"#).unwrap();
        let opts = BuildOptions::load(&path).unwrap();
        assert_eq!(opts.output_dir, Some(PathBuf::from("public")));
        assert_eq!(opts.assets_dir, "static");
    }
}
