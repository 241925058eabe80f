//! Page builder: bundle, evaluate, render and write HTML.

use crate::assets::AssetEntry;
use crate::bundler::Bundler;
use crate::cache::TransformCache;
use crate::config::BuildOptions;
use crate::error::{BuildError, BuildResult};
use crate::evaluate::{evaluate, Exports, HostModules};
use crate::fs::FileSystem;
use crate::plugin::Plugin;
use crate::render::render;
use crate::vnode::Value;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

lazy_static! {
    static ref ROUTE_PARAM: Regex = Regex::new(r"\[([^\]]+)\]").unwrap();
}

pub const STATIC_PATHS_EXPORT: &str = "getStaticPaths";

/// Stack for threads that evaluate and render pages; deep script recursion runs on it.
const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPage {
    pub source: PathBuf,
    pub output_path: PathBuf,
    pub html: String,
    pub assets: Vec<AssetEntry>,
    /// Route parameters this page was rendered with, for dynamic routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub source: PathBuf,
    pub code: &'static str,
    pub message: String,
}

impl PageFailure {
    fn new(source: &Path, error: &BuildError) -> Self {
        Self {
            source: source.to_path_buf(),
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub pages: Vec<BuiltPage>,
    pub failures: Vec<PageFailure>,
}

impl BuildReport {
    /// Every HTML file written by this build.
    pub fn html_files(&self) -> Vec<&Path> {
        self.pages.iter().map(|p| p.output_path.as_path()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// `route` with every `[key]` replaced by `params[key]`.
pub fn substitute_params(route: &str, params: &IndexMap<String, Value>) -> String {
    ROUTE_PARAM
        .replace_all(route, |caps: &regex::Captures<'_>| match params.get(&caps[1]) {
            Some(value) => value.to_js_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn is_dynamic_route(route: &str) -> bool {
    ROUTE_PARAM.is_match(route)
}

fn html_route(route: &Path) -> String {
    route.with_extension("html").to_string_lossy().replace('\\', "/")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PageBuilder {
    bundler: Bundler,
    host: HostModules,
}

impl PageBuilder {
    pub fn new(options: BuildOptions) -> Self {
        let shared_cache = options.cache_dir.is_none();
        let mut bundler = Bundler::new(options);
        if shared_cache {
            bundler = bundler.with_transform_cache(Arc::new(TransformCache::in_memory()));
        }
        Self::from_bundler(bundler)
    }

    pub fn from_bundler(bundler: Bundler) -> Self {
        Self {
            bundler,
            host: HostModules::default(),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.bundler = self.bundler.with_fs(fs);
        self
    }

    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.bundler = self.bundler.with_plugin(plugin);
        self
    }

    pub fn with_host_modules(mut self, host: HostModules) -> Self {
        self.host = host;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        self.bundler.options()
    }

    /// Builds one page file; its output is named after the file alone.
    pub fn build_file(&self, entry: &Path) -> BuildResult<Vec<BuiltPage>> {
        let route = entry.file_name().map(PathBuf::from).unwrap_or_default();
        self.build_route(entry, &route)
    }

    /// Builds `entry` as the page at `route`, relative to the output directory.
    pub fn build_route(&self, entry: &Path, route: &Path) -> BuildResult<Vec<BuiltPage>> {
        std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("ono-page".to_string())
                .stack_size(EVAL_STACK_SIZE)
                .spawn_scoped(scope, || self.render_route(entry, route))
                .map_err(|e| BuildError::io(entry, e))?;
            match worker.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }

    fn render_route(&self, entry: &Path, route: &Path) -> BuildResult<Vec<BuiltPage>> {
        let bundle = self.bundler.bundle(entry)?;
        let exports = evaluate(&bundle.code, entry, self.options(), &self.host)?;
        let component = exports.default_component(entry)?;
        let route = html_route(route);

        if !is_dynamic_route(&route) {
            let html = render_page(&exports, &component, Value::empty_object())?;
            let page = self.emit(entry, &route, html, bundle.assets, None)?;
            return Ok(vec![page]);
        }

        let paths = static_paths(&exports, entry)?;
        let mut pages = Vec::with_capacity(paths.len());
        for params in paths {
            let output_route = substitute_params(&route, &params);
            if is_dynamic_route(&output_route) {
                warn!(page = %entry.display(), route = %output_route, "route parameter left unfilled");
            }
            let params = Value::object(params);
            let mut props = IndexMap::new();
            props.insert("params".to_string(), params.clone());
            let html = render_page(&exports, &component, Value::object(props))?;
            pages.push(self.emit(entry, &output_route, html, bundle.assets.clone(), params.to_json())?);
        }
        Ok(pages)
    }

    /// Builds every page file below `pages_dir`. A failing page is reported without stopping
    /// the rest.
    pub fn build_all(&self, pages_dir: &Path) -> BuildResult<BuildReport> {
        let fs = self.bundler.fs();
        let files = fs.list_files(pages_dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BuildError::FileNotFound {
                path: pages_dir.to_path_buf(),
                referenced_from: None,
            },
            _ => BuildError::io(pages_dir, e),
        })?;
        let entries: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| self.options().is_page_file(path))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("ono-page-{i}"))
            .stack_size(EVAL_STACK_SIZE)
            .build()
            .map_err(|e| BuildError::io(pages_dir, io::Error::other(e)))?;
        let results: Vec<(PathBuf, BuildResult<Vec<BuiltPage>>)> = pool.install(|| {
            entries
                .par_iter()
                .map(|entry| {
                    let route = entry.strip_prefix(pages_dir).unwrap_or(entry);
                    (entry.clone(), self.render_route(entry, route))
                })
                .collect()
        });

        let mut report = BuildReport::default();
        for (entry, result) in results {
            match result {
                Ok(pages) => report.pages.extend(pages),
                Err(error) => {
                    warn!(page = %entry.display(), code = error.code(), error = %error, "page failed to build");
                    report.failures.push(PageFailure::new(&entry, &error));
                }
            }
        }
        info!(
            pages = report.pages.len(),
            failures = report.failures.len(),
            "build finished"
        );
        Ok(report)
    }

    fn emit(
        &self,
        source: &Path,
        route: &str,
        html: String,
        assets: Vec<AssetEntry>,
        params: Option<serde_json::Value>,
    ) -> BuildResult<BuiltPage> {
        let output_path = match &self.options().output_dir {
            Some(dir) => {
                let path = dir.join(route);
                write_atomic(self.bundler.fs(), &path, html.as_bytes())?;
                info!(page = %source.display(), output = %path.display(), "built page");
                path
            }
            None => PathBuf::from(route),
        };
        Ok(BuiltPage {
            source: source.to_path_buf(),
            output_path,
            html,
            assets,
            params,
        })
    }
}

fn render_page(exports: &Exports, component: &Value, props: Value) -> BuildResult<String> {
    let vnode = match component {
        Value::Function(_) => exports.call(component, vec![props])?,
        other => other.clone(),
    };
    render(&vnode)
}

/// `getStaticPaths()` as a list of parameter maps. Accepts an array or `{ paths }`.
fn static_paths(exports: &Exports, entry: &Path) -> BuildResult<Vec<IndexMap<String, Value>>> {
    let func = match exports.get(STATIC_PATHS_EXPORT) {
        Some(f @ Value::Function(_)) => f.clone(),
        _ => {
            return Err(BuildError::MissingStaticPaths {
                file: entry.to_path_buf(),
            })
        }
    };
    let result = exports.call(&func, Vec::new())?;
    let list = match &result {
        Value::Array(_) => result.clone(),
        other => other.get("paths").unwrap_or_else(|| Value::array(Vec::new())),
    };
    let Value::Array(items) = list else {
        return Ok(Vec::new());
    };
    let items = items.borrow();
    Ok(items
        .iter()
        .map(|item| match item.get("params") {
            Some(Value::Object(params)) => params.borrow().clone(),
            _ => IndexMap::new(),
        })
        .collect())
}

/// Writes through a sibling temp file so readers never see a partial page.
pub fn write_atomic(fs: &dyn FileSystem, path: &Path, bytes: &[u8]) -> BuildResult<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs.write(&temp, bytes).map_err(|e| BuildError::io(&temp, e))?;
    if let Err(e) = fs.rename(&temp, path) {
        let _ = fs.remove_file(&temp);
        return Err(BuildError::io(path, e));
    }
    Ok(())
}

/// Build one page from disk with a fresh [`PageBuilder`].
pub fn build_file(entry: &Path, options: &BuildOptions) -> BuildResult<Vec<BuiltPage>> {
    PageBuilder::new(options.clone()).build_file(entry)
}

/// Build every page below `pages_dir` from disk with a fresh [`PageBuilder`].
pub fn build_all(pages_dir: &Path, options: &BuildOptions) -> BuildResult<BuildReport> {
    PageBuilder::new(options.clone()).build_all(pages_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERR_NO_DEFAULT, ERR_NO_STATIC_PATHS};
    use crate::fs::MemoryFileSystem;

    fn builder(files: &[(&str, &str)]) -> (PageBuilder, Arc<MemoryFileSystem>) {
        let fs = Arc::new(MemoryFileSystem::with_files(files.iter().map(|(p, c)| (*p, *c))));
        let options = BuildOptions::default().with_output_dir("/dist");
        (PageBuilder::new(options).with_fs(fs.clone()), fs)
    }

    fn read(fs: &MemoryFileSystem, path: &str) -> String {
        fs.read_to_string(Path::new(path)).unwrap()
    }

    #[test]
    fn test_static_page_is_written() {
        let (b, fs) = builder(&[(
            "/site/pages/index.jsx",
            "export default function Home() { return <h1 className=\"t\">Hello</h1>; }",
        )]);
        let pages = b.build_file(Path::new("/site/pages/index.jsx")).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].output_path, PathBuf::from("/dist/index.html"));
        assert_eq!(pages[0].html, "<h1 class=\"t\">Hello</h1>");
        assert_eq!(read(&fs, "/dist/index.html"), pages[0].html);
        assert!(fs.paths().iter().all(|p| !p.to_string_lossy().ends_with(".tmp")));
    }

    #[test]
    fn test_vnode_default_export_is_rendered_directly() {
        let (b, _fs) = builder(&[("/p/about.jsx", "export default <p>about</p>;")]);
        let pages = b.build_file(Path::new("/p/about.jsx")).unwrap();
        assert_eq!(pages[0].output_path, PathBuf::from("/dist/about.html"));
        assert_eq!(pages[0].html, "<p>about</p>");
    }

    #[test]
    fn test_missing_default_export() {
        let (b, _fs) = builder(&[("/p/x.jsx", "export const a = 1;")]);
        let err = b.build_file(Path::new("/p/x.jsx")).unwrap_err();
        assert_eq!(err.code(), ERR_NO_DEFAULT);
    }

    #[test]
    fn test_dynamic_route_renders_each_path() {
        let (b, fs) = builder(&[(
            "/p/[slug].jsx",
            r#"
            export async function getStaticPaths() {
                return [{ params: { slug: "a" } }, { params: { slug: "b" } }];
            }
            export default function Post({ params }) { return <h1>{params.slug}</h1>; }
            "#,
        )]);
        let pages = b.build_file(Path::new("/p/[slug].jsx")).unwrap();
        let outputs: Vec<_> = pages.iter().map(|p| p.output_path.clone()).collect();
        assert_eq!(outputs, vec![PathBuf::from("/dist/a.html"), PathBuf::from("/dist/b.html")]);
        assert_eq!(read(&fs, "/dist/b.html"), "<h1>b</h1>");
        assert_eq!(pages[0].params, Some(serde_json::json!({ "slug": "a" })));
    }

    #[test]
    fn test_dynamic_route_accepts_paths_object() {
        let (b, _fs) = builder(&[(
            "/p/[id].jsx",
            r#"
            export const getStaticPaths = () => ({ paths: [{ params: { id: 7 } }] });
            export default ({ params }) => <i>{params.id}</i>;
            "#,
        )]);
        let pages = b.build_file(Path::new("/p/[id].jsx")).unwrap();
        assert_eq!(pages[0].output_path, PathBuf::from("/dist/7.html"));
        assert_eq!(pages[0].html, "<i>7</i>");
    }

    #[test]
    fn test_dynamic_route_requires_static_paths() {
        let (b, _fs) = builder(&[("/p/[slug].jsx", "export default () => <p />;")]);
        let err = b.build_file(Path::new("/p/[slug].jsx")).unwrap_err();
        assert_eq!(err.code(), ERR_NO_STATIC_PATHS);
    }

    #[test]
    fn test_build_all_preserves_subdirectories_and_isolates_failures() {
        let (b, fs) = builder(&[
            ("/site/pages/index.jsx", "export default () => <main>home</main>;"),
            ("/site/pages/blog/first.jsx", "export default () => <article>first</article>;"),
            ("/site/pages/broken.jsx", "export default () => { throw new Error('boom'); };"),
            ("/site/pages/notes.txt", "not a page"),
        ]);
        let report = b.build_all(Path::new("/site/pages")).unwrap();
        let mut html = report.html_files();
        html.sort();
        assert_eq!(html, vec![Path::new("/dist/blog/first.html"), Path::new("/dist/index.html")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, PathBuf::from("/site/pages/broken.jsx"));
        assert!(report.failures[0].message.contains("boom"));
        assert_eq!(read(&fs, "/dist/blog/first.html"), "<article>first</article>");
        assert!(!report.is_success());
    }

    #[test]
    fn test_build_all_isolates_oversized_allocations() {
        let (b, fs) = builder(&[
            ("/site/pages/ok.jsx", "export default () => <p>ok</p>;"),
            ("/site/pages/big.jsx", "const rows = new Array(1e20);\nexport default () => <p>{rows.length}</p>;"),
            ("/site/pages/grow.jsx", "export default () => { const a = []; a.length = 1e20; return <p />; };"),
        ]);
        let report = b.build_all(Path::new("/site/pages")).unwrap();
        assert_eq!(report.html_files(), vec![Path::new("/dist/ok.html")]);
        assert_eq!(read(&fs, "/dist/ok.html"), "<p>ok</p>");
        let mut failed: Vec<_> = report.failures.iter().map(|f| f.source.clone()).collect();
        failed.sort();
        assert_eq!(failed, vec![PathBuf::from("/site/pages/big.jsx"), PathBuf::from("/site/pages/grow.jsx")]);
        assert!(report.failures.iter().all(|f| f.message.contains("RangeError: Invalid array length")));
    }

    #[test]
    fn test_deep_recursion_renders_on_page_stack() {
        let (b, _fs) = builder(&[(
            "/p/nav.jsx",
            "function Tree({ n }) { return n === 0 ? <b>leaf</b> : <i><Tree n={n - 1} /></i>; }\n\
             function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); }\n\
             export default () => <nav><span>{depth(400)}</span><Tree n={100} /></nav>;",
        )]);
        let pages = b.build_file(Path::new("/p/nav.jsx")).unwrap();
        let html = &pages[0].html;
        assert!(html.starts_with("<nav><span>400</span>"), "{html}");
        assert_eq!(html.matches("<i>").count(), 100);
        assert!(html.contains("<b>leaf</b>"));
    }

    #[test]
    fn test_call_depth_follows_options() {
        let fs = Arc::new(MemoryFileSystem::with_files([(
            "/p/index.jsx",
            "function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); }\nexport default () => <p>{depth(100)}</p>;",
        )]));
        let options = BuildOptions {
            max_call_depth: 50,
            ..BuildOptions::default()
        };
        let err = PageBuilder::new(options).with_fs(fs).build_file(Path::new("/p/index.jsx")).unwrap_err();
        assert!(err.to_string().contains("Maximum call stack size exceeded"), "{err}");
    }

    #[test]
    fn test_build_all_missing_dir() {
        let (b, _fs) = builder(&[]);
        assert!(matches!(
            b.build_all(Path::new("/nope")),
            Err(BuildError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_no_output_dir_renders_without_writing() {
        let fs = Arc::new(MemoryFileSystem::with_files([("/p/index.jsx", "export default () => <p>x</p>;")]));
        let b = PageBuilder::new(BuildOptions::default().without_output()).with_fs(fs.clone());
        let pages = b.build_file(Path::new("/p/index.jsx")).unwrap();
        assert_eq!(pages[0].output_path, PathBuf::from("index.html"));
        assert_eq!(fs.paths(), vec![PathBuf::from("/p/index.jsx")]);
    }

    #[test]
    fn test_host_module_components() {
        let (b, _fs) = builder(&[(
            "/p/index.jsx",
            "import { site } from 'site-data';\nexport default () => <title>{site.name}</title>;",
        )]);
        let b = b.with_host_modules(
            HostModules::new().with_value("site-data", "site", serde_json::json!({ "name": "Ono" })),
        );
        let pages = b.build_file(Path::new("/p/index.jsx")).unwrap();
        assert_eq!(pages[0].html, "<title>Ono</title>");
    }

    #[test]
    fn test_substitute_params() {
        let mut params = IndexMap::new();
        params.insert("slug".to_string(), Value::string("hello"));
        assert_eq!(substitute_params("blog/[slug].html", &params), "blog/hello.html");
        assert_eq!(substitute_params("[a]/[slug].html", &params), "[a]/hello.html");
        assert!(is_dynamic_route("[a].html"));
        assert!(!is_dynamic_route("index.html"));
    }

    #[test]
    fn test_write_atomic_cleans_up_on_failure() {
        struct NoRename(MemoryFileSystem);
        impl FileSystem for NoRename {
            fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
                self.0.read(path)
            }
            fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
                self.0.write(path, bytes)
            }
            fn exists(&self, path: &Path) -> bool {
                self.0.exists(path)
            }
            fn is_file(&self, path: &Path) -> bool {
                self.0.is_file(path)
            }
            fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            }
            fn remove_file(&self, path: &Path) -> io::Result<()> {
                self.0.remove_file(path)
            }
            fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
                self.0.list_files(dir)
            }
        }
        let fs = NoRename(MemoryFileSystem::new());
        let err = write_atomic(&fs, Path::new("/dist/index.html"), b"<p></p>").unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_IO);
        assert!(fs.0.paths().is_empty());
    }
}
