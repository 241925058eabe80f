//! Asset pipeline: classification, content hashing, copying and import rewriting.

use crate::bundler::Bundle;
use crate::error::{BuildError, BuildResult};
use crate::fs::FileSystem;
use crate::plugin::{ModuleCode, Plugin, PluginContext};
use crate::resolver::Resolved;
use crate::syntax::{apply_replacements, js_string, parse_program, Replacement};
use dashmap::DashMap;
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, ModuleExportName, Statement};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub const ASSET_LOADER: &str = "asset-loader";

/// Hex digits kept from the content digest.
pub const HASH_LENGTH: usize = 8;

lazy_static! {
    static ref ASSET_EXTENSIONS: HashSet<&'static str> = [
        "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", // images
        "woff", "woff2", "ttf", "otf", "eot", // fonts
        "mp4", "webm", "ogg", "mp3", "wav", // media
        "pdf",
    ]
    .into_iter()
    .collect();
}

pub fn is_asset_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ASSET_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// First [`HASH_LENGTH`] hex digits of the SHA-256 of `bytes`.
pub fn generate_file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_LENGTH);
    hex
}

/// `{stem}-{hash}{ext}` or `{stem}{ext}`.
pub fn asset_filename(source_path: &Path, hash: Option<&str>) -> String {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    match hash {
        Some(h) => format!("{stem}-{h}{ext}"),
        None => format!("{stem}{ext}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COPYING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub hash: bool,
    pub assets_dir: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            hash: true,
            assets_dir: "assets".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEntry {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub public_path: String,
}

/// Copy `source_path` into `{output_dir}/{assets_dir}/`. With hashing, an existing file of
/// the same name already holds identical bytes and is not rewritten.
pub fn copy_asset(
    fs: &dyn FileSystem,
    source_path: &Path,
    output_dir: &Path,
    options: &CopyOptions,
) -> BuildResult<AssetEntry> {
    let bytes = fs
        .read(source_path)
        .map_err(|e| BuildError::asset_copy(source_path, e))?;

    let digest = options.hash.then(|| generate_file_hash(&bytes));
    let filename = asset_filename(source_path, digest.as_deref());
    let assets_dir = options.assets_dir.trim_matches('/');

    let output_path = output_dir.join(assets_dir).join(&filename);
    let public_path = if assets_dir.is_empty() {
        format!("/{filename}")
    } else {
        format!("/{assets_dir}/{filename}")
    };

    if digest.is_some() && fs.is_file(&output_path) {
        debug!(asset = %output_path.display(), "content-addressed asset already present");
    } else {
        fs.write(&output_path, &bytes)
            .map_err(|e| BuildError::asset_copy(source_path, e))?;
        debug!(from = %source_path.display(), to = %output_path.display(), "copied asset");
    }

    Ok(AssetEntry {
        source_path: source_path.to_path_buf(),
        output_path,
        public_path,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT REWRITING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrite `import X from "spec"` and `import { default as X } from "spec"` into
/// `const X = "url";` for every specifier in `urls`. Other import shapes naming the same
/// specifier are left as they are.
pub fn replace_asset_imports(
    code: &str,
    urls: &HashMap<String, String>,
    file: &Path,
) -> BuildResult<String> {
    if urls.is_empty() {
        return Ok(code.to_string());
    }
    let allocator = Allocator::default();
    let program = parse_program(&allocator, code, file)?;

    let mut replacements: Vec<Replacement> = Vec::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        let Some(url) = urls.get(decl.source.value.as_str()) else {
            continue;
        };
        let Some(specifiers) = &decl.specifiers else {
            continue;
        };
        if specifiers.len() != 1 {
            continue;
        }
        let local = match &specifiers[0] {
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => Some(s.local.name.as_str()),
            ImportDeclarationSpecifier::ImportSpecifier(s) if export_name(&s.imported) == "default" => {
                Some(s.local.name.as_str())
            }
            _ => None,
        };
        if let Some(local) = local {
            replacements.push((
                decl.span.start,
                decl.span.end,
                format!("const {} = {};", local, js_string(url)),
            ));
        }
    }

    Ok(apply_replacements(code, replacements))
}

pub(crate) fn export_name<'a>(name: &'a ModuleExportName<'_>) -> &'a str {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.as_str(),
        ModuleExportName::IdentifierReference(id) => id.name.as_str(),
        ModuleExportName::StringLiteral(s) => s.value.as_str(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-build memo of processed assets keyed by absolute source path. The first caller for a
/// path runs the copy; concurrent callers for the same path block on and share its result.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: DashMap<PathBuf, Arc<OnceLock<BuildResult<AssetEntry>>>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_process<F>(&self, path: &Path, process: F) -> BuildResult<AssetEntry>
    where
        F: FnOnce() -> BuildResult<AssetEntry>,
    {
        // Clone the cell out so the shard lock is released before the copy runs.
        let cell = self.entries.entry(path.to_path_buf()).or_default().clone();
        cell.get_or_init(process).clone()
    }

    pub fn get(&self, path: &Path) -> Option<AssetEntry> {
        let cell = self.entries.get(path)?.clone();
        match cell.get() {
            Some(Ok(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET LOADER PLUGIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Copies every asset a module imports and rewrites those imports to public URLs. On the
/// bundle it fills the asset manifest.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetLoaderPlugin;

impl Plugin for AssetLoaderPlugin {
    fn name(&self) -> &str {
        ASSET_LOADER
    }

    fn on_module(&self, mut module: ModuleCode, ctx: &PluginContext<'_>) -> BuildResult<ModuleCode> {
        let (Some(graph), Some(output_dir)) = (ctx.graph, ctx.options.output_dir.as_ref()) else {
            return Ok(module);
        };
        let Some(source) = graph.module(&module.path) else {
            return Ok(module);
        };

        let copy_options = CopyOptions {
            hash: ctx.options.hash_assets,
            assets_dir: ctx.options.assets_dir.clone(),
        };

        let mut urls = HashMap::new();
        for (specifier, resolved) in &source.resolved {
            let Resolved::Local(path) = resolved else {
                continue;
            };
            if !graph.is_asset(path) {
                continue;
            }
            let entry = ctx.assets.get_or_process(path, || {
                copy_asset(ctx.fs, path, output_dir, &copy_options)
            })?;
            urls.insert(specifier.clone(), entry.public_path);
        }

        if !urls.is_empty() {
            module.code = replace_asset_imports(&module.code, &urls, &module.path)?;
        }
        Ok(module)
    }

    fn on_bundle(&self, mut bundle: Bundle, ctx: &PluginContext<'_>) -> BuildResult<Bundle> {
        let Some(graph) = ctx.graph else {
            return Ok(bundle);
        };
        for path in &graph.assets {
            match ctx.assets.get(path) {
                Some(entry) => {
                    if !bundle.assets.contains(&entry) {
                        bundle.assets.push(entry);
                    }
                }
                None => warn!(asset = %path.display(), "asset was never processed"),
            }
        }
        Ok(bundle)
    }
}
