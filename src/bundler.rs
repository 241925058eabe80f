//! Bundler: resolve, transform, run plugins, isolate and concatenate.

use crate::assets::{AssetCache, AssetEntry, AssetLoaderPlugin, ASSET_LOADER};
use crate::cache::TransformCache;
use crate::config::BuildOptions;
use crate::error::BuildResult;
use crate::fs::{FileSystem, OsFileSystem};
use crate::linker::{module_id, LinkedModule, Linker, MODULES_RECORD};
use crate::plugin::{ModuleCode, Plugin, PluginContext, PluginPipeline};
use crate::resolver::{collect_dependencies, DependencyGraph};
use crate::transform::{JsxTransform, TransformAdapter};
use indexmap::IndexSet;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub entry: PathBuf,
    pub code: String,
    /// Linked fragments, dependencies first and the entry last.
    #[serde(skip)]
    pub modules: Vec<LinkedModule>,
    /// Hoisted bare-package imports, deduplicated, verbatim.
    pub externals: Vec<String>,
    pub assets: Vec<AssetEntry>,
}

/// Externals, optional runtime, the module record, then every fragment in order.
fn assemble(externals: &[String], prelude: Option<&str>, modules: &[LinkedModule]) -> String {
    let mut sections: Vec<String> = Vec::new();
    if !externals.is_empty() {
        sections.push(externals.join("\n"));
    }
    if let Some(prelude) = prelude {
        sections.push(prelude.to_string());
    }
    if modules.len() > 1 {
        sections.push(format!("const {} = {{}};", MODULES_RECORD));
    }
    for module in modules {
        if !module.code.trim().is_empty() {
            sections.push(module.code.trim().to_string());
        }
    }
    let mut code = sections.join("\n\n");
    code.push('\n');
    code
}

/// `h`/`Fragment` for hosts that evaluate the bundle without providing them.
pub fn runtime_prelude(factory: &str, fragment: &str) -> String {
    format!(
        r#"const {fragment} = Symbol.for("ono.fragment");
function {factory}(tag, props, ...children) {{
  const flat = children.flat(Infinity).filter((c) => c !== null && c !== undefined && typeof c !== "boolean");
  return {{ tag, props: props || {{}}, children: flat }};
}}"#
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Bundler {
    options: BuildOptions,
    fs: Arc<dyn FileSystem>,
    transform: Arc<dyn TransformAdapter>,
    plugins: PluginPipeline,
    assets: Arc<AssetCache>,
    cache: Option<Arc<TransformCache>>,
}

impl Bundler {
    pub fn new(options: BuildOptions) -> Self {
        let cache = options
            .cache_dir
            .as_ref()
            .map(|dir| Arc::new(TransformCache::with_dir(dir)));
        Self {
            transform: Arc::new(JsxTransform::from_options(&options)),
            fs: Arc::new(OsFileSystem),
            plugins: PluginPipeline::new(),
            assets: Arc::new(AssetCache::new()),
            cache,
            options,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_transform(mut self, transform: impl TransformAdapter + 'static) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_asset_cache(mut self, assets: Arc<AssetCache>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_transform_cache(mut self, cache: Arc<TransformCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn asset_cache(&self) -> &Arc<AssetCache> {
        &self.assets
    }

    /// Caller plugins, then the asset loader when there is somewhere to copy to.
    fn pipeline(&self) -> PluginPipeline {
        let mut pipeline = self.plugins.clone();
        if self.options.output_dir.is_some() && !pipeline.contains(ASSET_LOADER) {
            pipeline.push(AssetLoaderPlugin);
        }
        pipeline
    }

    fn transform_salt(&self) -> String {
        format!("{}|{}", self.options.jsx_factory, self.options.jsx_fragment)
    }

    fn transform_module(&self, path: &Path, source: &str) -> BuildResult<String> {
        let salt = self.transform_salt();
        if let Some(cache) = &self.cache {
            if let Some(code) = cache.get(path, source, &salt) {
                debug!(module = %path.display(), "transform cache hit");
                return Ok(code);
            }
        }
        let code = self.transform.transform(source, path)?;
        if let Some(cache) = &self.cache {
            cache.set(path, source, &salt, &code);
        }
        Ok(code)
    }

    pub fn bundle(&self, entry: &Path) -> BuildResult<Bundle> {
        let pipeline = self.pipeline();
        let graph = collect_dependencies(entry, self.fs())?;
        let entry = graph.entry.clone();

        let graph = {
            let ctx = self.context(&entry, None);
            pipeline.run_dependencies(graph, &ctx)?
        };
        debug!(
            entry = %entry.display(),
            modules = graph.order.len(),
            assets = graph.assets.len(),
            "resolved dependency graph"
        );

        let ctx = self.context(&entry, Some(&graph));
        let base_dir = entry.parent().unwrap_or_else(|| Path::new(""));
        let processed: Vec<ModuleCode> = graph
            .order
            .par_iter()
            .map(|path| self.process_module(&graph, path, module_id(path, base_dir), &pipeline, &ctx))
            .collect::<BuildResult<Vec<_>>>()?;

        let mut linker = Linker::new(&graph);
        let mut modules = Vec::with_capacity(processed.len());
        for module in &processed {
            modules.push(linker.link(module)?);
        }

        let mut externals = IndexSet::new();
        for module in &modules {
            for statement in &module.externals {
                externals.insert(statement.clone());
            }
        }
        let externals: Vec<String> = externals.into_iter().collect();

        let prelude = self
            .options
            .inline_runtime
            .then(|| runtime_prelude(&self.options.jsx_factory, &self.options.jsx_fragment));
        let code = assemble(&externals, prelude.as_deref(), &modules);

        let bundle = Bundle {
            entry: entry.clone(),
            code,
            modules,
            externals,
            assets: Vec::new(),
        };
        let bundle = pipeline.run_bundle(bundle, &ctx)?;
        info!(
            entry = %entry.display(),
            bytes = bundle.code.len(),
            assets = bundle.assets.len(),
            "bundled"
        );
        Ok(bundle)
    }

    fn process_module(
        &self,
        graph: &DependencyGraph,
        path: &Path,
        id: String,
        pipeline: &PluginPipeline,
        ctx: &PluginContext<'_>,
    ) -> BuildResult<ModuleCode> {
        let source = graph.module(path).map(|m| m.source.as_str()).unwrap_or("");
        let code = self.transform_module(path, source)?;
        debug!(module = %path.display(), "transformed");
        pipeline.run_module(
            ModuleCode {
                path: path.to_path_buf(),
                id,
                code,
                is_entry: path == graph.entry,
            },
            ctx,
        )
    }

    fn context<'a>(&'a self, entry: &'a Path, graph: Option<&'a DependencyGraph>) -> PluginContext<'a> {
        PluginContext {
            entry,
            options: &self.options,
            fs: self.fs.as_ref(),
            assets: &self.assets,
            graph,
        }
    }
}

/// Bundle `entry` from disk with a fresh [`Bundler`].
pub fn bundle(entry: &Path, options: &BuildOptions) -> BuildResult<Bundle> {
    Bundler::new(options.clone()).bundle(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::fs::MemoryFileSystem;
    use crate::plugin::ModuleFn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bundler(files: &[(&str, &str)]) -> Bundler {
        let fs = MemoryFileSystem::with_files(files.iter().map(|(p, c)| (*p, *c)));
        Bundler::new(BuildOptions::default().without_output()).with_fs(Arc::new(fs))
    }

    #[test]
    fn test_entry_last_and_unwrapped() {
        let b = bundler(&[
            ("/s/A.jsx", "import B from './B.jsx';\nexport default function App() { return <main><B /></main>; }"),
            ("/s/B.jsx", "import C from './C.jsx';\nexport default function B() { return <section><C /></section>; }"),
            ("/s/C.jsx", "export default function C() { return <p>c</p>; }"),
        ]);
        let bundle = b.bundle(Path::new("/s/A.jsx")).unwrap();
        let ids: Vec<_> = bundle.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["C.jsx", "B.jsx", "A.jsx"]);

        let code = &bundle.code;
        let record = code.find("const __modules = {};").unwrap();
        let c = code.find("__modules[\"C.jsx\"] = (() => {").unwrap();
        let b_pos = code.find("__modules[\"B.jsx\"] = (() => {").unwrap();
        let a = code.find("export default function App()").unwrap();
        assert!(record < c && c < b_pos && b_pos < a, "{code}");
        assert!(!code.contains("__modules[\"A.jsx\"]"), "{code}");
    }

    #[test]
    fn test_externals_hoisted_once_at_top() {
        let b = bundler(&[
            ("/s/A.jsx", "import { t } from 'i18n';\nimport B from './B.jsx';\nexport default () => t(B);"),
            ("/s/B.jsx", "import { t } from 'i18n';\nexport default t('b');"),
        ]);
        let bundle = b.bundle(Path::new("/s/A.jsx")).unwrap();
        assert_eq!(bundle.externals.len(), 1);
        assert!(bundle.code.starts_with("import { t } from"), "{}", bundle.code);
        assert_eq!(bundle.code.matches("from 'i18n'").count() + bundle.code.matches("from \"i18n\"").count(), 1);
    }

    #[test]
    fn test_external_reprinted_by_transform_is_hoisted_once() {
        let b = bundler(&[
            ("/s/A.jsx", "import { t } from 'i18n';\nimport B from './B.js';\nexport default () => <p>{t(B)}</p>;"),
            ("/s/B.js", "import {t} from 'i18n';\nexport default t('b');"),
        ]);
        let bundle = b.bundle(Path::new("/s/A.jsx")).unwrap();
        assert_eq!(bundle.externals, vec!["import {t} from 'i18n';"]);
        assert_eq!(bundle.code.matches("i18n").count(), 1, "{}", bundle.code);
    }

    #[test]
    fn test_single_module_has_no_record() {
        let b = bundler(&[("/s/A.jsx", "export default 1;")]);
        let bundle = b.bundle(Path::new("/s/A.jsx")).unwrap();
        assert!(!bundle.code.contains(MODULES_RECORD));
    }

    #[test]
    fn test_cycle_aborts_before_codegen() {
        let b = bundler(&[
            ("/s/A.jsx", "import './B.jsx';"),
            ("/s/B.jsx", "import './A.jsx';"),
        ]);
        assert!(matches!(
            b.bundle(Path::new("/s/A.jsx")),
            Err(BuildError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_transform_failure_aborts() {
        let b = bundler(&[("/s/A.jsx", "export default 1;")]).with_transform(
            |_: &str, file: &Path| -> BuildResult<String> {
                Err(BuildError::TransformFailure {
                    file: file.to_path_buf(),
                    message: "nope".into(),
                })
            },
        );
        assert!(matches!(
            b.bundle(Path::new("/s/A.jsx")),
            Err(BuildError::TransformFailure { .. })
        ));
    }

    #[test]
    fn test_plugins_see_every_module_and_bundle() {
        struct Banner;
        impl Plugin for Banner {
            fn name(&self) -> &str {
                "banner"
            }
            fn on_bundle(&self, mut bundle: Bundle, _ctx: &PluginContext<'_>) -> BuildResult<Bundle> {
                bundle.code = format!("/* built */\n{}", bundle.code);
                Ok(bundle)
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let b = bundler(&[
            ("/s/A.jsx", "import B from './B.jsx';\nexport default B;"),
            ("/s/B.jsx", "export default 2;"),
        ])
        .with_plugin(ModuleFn::new("count", move |m: ModuleCode| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(m)
        }))
        .with_plugin(Banner);

        let bundle = b.bundle(Path::new("/s/A.jsx")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(bundle.code.starts_with("/* built */"));
    }

    #[test]
    fn test_asset_loader_added_once() {
        let b = Bundler::new(BuildOptions::default()).with_plugin(AssetLoaderPlugin);
        assert_eq!(b.pipeline().names(), vec![ASSET_LOADER]);
        let b = Bundler::new(BuildOptions::default());
        assert_eq!(b.pipeline().names(), vec![ASSET_LOADER]);
        let b = Bundler::new(BuildOptions::default().without_output());
        assert!(b.pipeline().is_empty());
    }

    #[test]
    fn test_inline_runtime_prelude() {
        let fs = MemoryFileSystem::with_files([("/s/A.jsx", "export default () => <p />;")]);
        let mut options = BuildOptions::default().without_output();
        options.inline_runtime = true;
        let bundle = Bundler::new(options)
            .with_fs(Arc::new(fs))
            .bundle(Path::new("/s/A.jsx"))
            .unwrap();
        assert!(bundle.code.starts_with("const Fragment = Symbol.for(\"ono.fragment\");"));
        assert!(bundle.code.contains("function h(tag, props, ...children)"));
    }

    #[test]
    fn test_transform_cache_reused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = Arc::new(TransformCache::in_memory());
        let b = bundler(&[("/s/A.jsx", "export default 1;")])
            .with_transform_cache(cache.clone())
            .with_transform(move |s: &str, _: &Path| -> BuildResult<String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(s.to_string())
            });
        b.bundle(Path::new("/s/A.jsx")).unwrap();
        b.bundle(Path::new("/s/A.jsx")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }
}
