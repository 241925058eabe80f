//! Module resolution.
//!
//! Builds the dependency graph for an entry file: breadth-first discovery of imports, asset
//! leaf classification, then a depth-first topological sort that rejects cycles.

use crate::assets::is_asset_file;
use crate::error::{BuildError, BuildResult};
use crate::fs::{read_source, FileSystem};
use crate::syntax::parse_program;
use indexmap::{IndexMap, IndexSet};
use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Probed in order when a relative specifier does not name an existing file.
pub const RESOLVE_EXTENSIONS: &[&str] = &["jsx", "tsx", "js", "ts"];

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Code,
    Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    Local(PathBuf),
    /// Bare package specifier, left to the host's module system.
    External(String),
}

#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub kind: ModuleKind,
    /// Empty for assets, which are never read as text.
    pub source: String,
    pub imports: Vec<String>,
    pub resolved: IndexMap<String, Resolved>,
}

impl Module {
    pub fn resolve(&self, specifier: &str) -> Option<&Resolved> {
        self.resolved.get(specifier)
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub entry: PathBuf,
    pub modules: IndexMap<PathBuf, Module>,
    /// Importer -> imported, in import order.
    pub graph: IndexMap<PathBuf, Vec<PathBuf>>,
    /// Code modules, dependencies first, entry last.
    pub order: Vec<PathBuf>,
    pub assets: Vec<PathBuf>,
    pub externals: Vec<String>,
}

impl DependencyGraph {
    pub fn module(&self, path: &Path) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn entry_module(&self) -> Option<&Module> {
        self.modules.get(&self.entry)
    }

    pub fn is_asset(&self, path: &Path) -> bool {
        self.modules
            .get(path)
            .map(|m| m.kind == ModuleKind::Asset)
            .unwrap_or(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Every module specifier the source depends on: imports (including side-effect imports) and
/// re-exports with a source. Type-only imports are skipped. Order of first appearance.
pub fn parse_imports(source: &str, file: &Path) -> BuildResult<Vec<String>> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, source, file)?;

    let mut specifiers = IndexSet::new();
    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if !decl.import_kind.is_type() {
                    specifiers.insert(decl.source.value.to_string());
                }
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(src) = &decl.source {
                    if !decl.export_kind.is_type() {
                        specifiers.insert(src.value.to_string());
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if !decl.export_kind.is_type() {
                    specifiers.insert(decl.source.value.to_string());
                }
            }
            _ => {}
        }
    }
    Ok(specifiers.into_iter().collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECIFIER RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_bare_specifier(specifier: &str) -> bool {
    !(specifier.starts_with('.') || specifier.starts_with('/') || Path::new(specifier).is_absolute())
}

/// Resolve `specifier` as seen from `from_file`. Relative and absolute specifiers become
/// normalized paths, probing [`RESOLVE_EXTENSIONS`] and `index.*` when the exact path is not a
/// file. Unresolvable local paths are returned as-is so the read reports who referenced them.
pub fn resolve_specifier(specifier: &str, from_file: &Path, fs: &dyn FileSystem) -> Resolved {
    if is_bare_specifier(specifier) {
        return Resolved::External(specifier.to_string());
    }

    let base = from_file.parent().unwrap_or_else(|| Path::new(""));
    let candidate = normalize_path(&base.join(specifier));
    if fs.is_file(&candidate) || is_asset_file(&candidate) {
        return Resolved::Local(candidate);
    }

    for ext in RESOLVE_EXTENSIONS {
        let mut with_ext = candidate.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if fs.is_file(&with_ext) {
            return Resolved::Local(with_ext);
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let index = candidate.join(format!("index.{ext}"));
        if fs.is_file(&index) {
            return Resolved::Local(index);
        }
    }

    Resolved::Local(candidate)
}

/// Lexically collapse `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, normalized identity for an entry path.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(path)),
        Err(_) => normalize_path(path),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GRAPH CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn collect_dependencies(entry: &Path, fs: &dyn FileSystem) -> BuildResult<DependencyGraph> {
    let entry = absolutize(entry);
    let mut modules: IndexMap<PathBuf, Module> = IndexMap::new();
    let mut graph: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();
    let mut assets = IndexSet::new();
    let mut externals = IndexSet::new();

    let mut queued: HashSet<PathBuf> = HashSet::new();
    let mut queue: VecDeque<(PathBuf, Option<PathBuf>)> = VecDeque::new();
    queued.insert(entry.clone());
    queue.push_back((entry.clone(), None));

    while let Some((path, referenced_from)) = queue.pop_front() {
        if is_asset_file(&path) {
            if !fs.is_file(&path) {
                return Err(BuildError::FileNotFound {
                    path,
                    referenced_from,
                });
            }
            debug!(asset = %path.display(), "classified asset leaf");
            assets.insert(path.clone());
            graph.insert(path.clone(), Vec::new());
            modules.insert(
                path.clone(),
                Module {
                    path,
                    kind: ModuleKind::Asset,
                    source: String::new(),
                    imports: Vec::new(),
                    resolved: IndexMap::new(),
                },
            );
            continue;
        }

        let source = read_source(fs, &path, referenced_from.as_deref())?;
        let imports = parse_imports(&source, &path)?;
        debug!(module = %path.display(), imports = imports.len(), "parsed module");

        let mut edges = Vec::new();
        let mut resolved = IndexMap::new();
        for specifier in &imports {
            let target = resolve_specifier(specifier, &path, fs);
            match &target {
                Resolved::External(name) => {
                    externals.insert(name.clone());
                }
                Resolved::Local(dep) => {
                    if !edges.contains(dep) {
                        edges.push(dep.clone());
                    }
                    if queued.insert(dep.clone()) {
                        queue.push_back((dep.clone(), Some(path.clone())));
                    }
                }
            }
            resolved.insert(specifier.clone(), target);
        }

        graph.insert(path.clone(), edges);
        modules.insert(
            path.clone(),
            Module {
                path,
                kind: ModuleKind::Code,
                source,
                imports,
                resolved,
            },
        );
    }

    let order = topological_sort(&graph, &entry)?
        .into_iter()
        .filter(|p| !assets.contains(p))
        .collect();

    Ok(DependencyGraph {
        entry,
        modules,
        graph,
        order,
        assets: assets.into_iter().collect(),
        externals: externals.into_iter().collect(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOPOLOGICAL SORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Depth-first postorder from `entry`. Every dependency precedes its importers and `entry` is
/// last. A node reached again while still on the visiting stack is a cycle; the error carries
/// the cycle path closed on its first node (`[a, a]` for a self-import).
pub fn topological_sort(
    graph: &IndexMap<PathBuf, Vec<PathBuf>>,
    entry: &Path,
) -> BuildResult<Vec<PathBuf>> {
    let mut order = Vec::with_capacity(graph.len());
    let mut visited = HashSet::new();
    let mut visiting: Vec<PathBuf> = Vec::new();
    visit(graph, entry, &mut visited, &mut visiting, &mut order)?;
    Ok(order)
}

fn visit(
    graph: &IndexMap<PathBuf, Vec<PathBuf>>,
    node: &Path,
    visited: &mut HashSet<PathBuf>,
    visiting: &mut Vec<PathBuf>,
    order: &mut Vec<PathBuf>,
) -> BuildResult<()> {
    if let Some(pos) = visiting.iter().position(|p| p == node) {
        let mut cycle = visiting[pos..].to_vec();
        cycle.push(node.to_path_buf());
        return Err(BuildError::CircularDependency { cycle });
    }
    if visited.contains(node) {
        return Ok(());
    }

    visiting.push(node.to_path_buf());
    if let Some(deps) = graph.get(node) {
        for dep in deps {
            visit(graph, dep, visited, visiting, order)?;
        }
    }
    visiting.pop();

    visited.insert(node.to_path_buf());
    order.push(node.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_parse_imports_ignores_strings_and_comments() {
        let src = r#"
            import { a } from "./a.js";
            import "./side-effect.js";
            // import nope from "./commented.js";
            const s = "import fake from './fake.js'";
            const t = `import ${s} from "./tpl.js"`;
            export { b } from "./b.js";
            export * from "./c.js";
            import type { T } from "./types";
        "#;
        let imports = parse_imports(src, Path::new("/x/mod.tsx")).unwrap();
        assert_eq!(
            imports,
            vec!["./a.js", "./side-effect.js", "./b.js", "./c.js"]
        );
    }

    #[test]
    fn test_parse_imports_with_jsx() {
        let src = r#"import Button from "./Button.jsx";
export default () => <div><Button /></div>;"#;
        let imports = parse_imports(src, Path::new("/x/page.jsx")).unwrap();
        assert_eq!(imports, vec!["./Button.jsx"]);
    }

    #[test]
    fn test_resolve_relative_and_bare() {
        let fs = MemoryFileSystem::with_files([("/site/components/Button.jsx", "")]);
        let from = Path::new("/site/pages/index.jsx");
        assert_eq!(
            resolve_specifier("../components/Button.jsx", from, &fs),
            Resolved::Local(p("/site/components/Button.jsx"))
        );
        assert_eq!(
            resolve_specifier("../components/Button", from, &fs),
            Resolved::Local(p("/site/components/Button.jsx"))
        );
        assert_eq!(
            resolve_specifier("preact", from, &fs),
            Resolved::External("preact".to_string())
        );
        assert_eq!(
            resolve_specifier("@scope/pkg/blog", from, &fs),
            Resolved::External("@scope/pkg/blog".to_string())
        );
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        let fs = MemoryFileSystem::with_files([("/lib/util.js", "")]);
        assert_eq!(
            resolve_specifier("/lib/util.js", Path::new("/site/a.jsx"), &fs),
            Resolved::Local(p("/lib/util.js"))
        );
    }

    #[test]
    fn test_resolve_index_file() {
        let fs = MemoryFileSystem::with_files([("/site/ui/index.js", "")]);
        assert_eq!(
            resolve_specifier("./ui", Path::new("/site/a.jsx"), &fs),
            Resolved::Local(p("/site/ui/index.js"))
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d.js")), p("/a/c/d.js"));
        assert_eq!(normalize_path(Path::new("/../a")), p("/a"));
        assert_eq!(normalize_path(Path::new("../a/b/..")), p("../a"));
    }

    #[test]
    fn test_chain_orders_dependencies_first() {
        let fs = MemoryFileSystem::with_files([
            ("/s/A.jsx", "import B from './B.jsx';\nexport default B;"),
            ("/s/B.jsx", "import C from './C.jsx';\nexport default C;"),
            ("/s/C.jsx", "export default 1;"),
        ]);
        let graph = collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap();
        assert_eq!(graph.order, vec![p("/s/C.jsx"), p("/s/B.jsx"), p("/s/A.jsx")]);
        assert_eq!(graph.entry, p("/s/A.jsx"));
    }

    #[test]
    fn test_diamond_visits_once() {
        let fs = MemoryFileSystem::with_files([
            ("/s/A.jsx", "import './B.jsx'; import './C.jsx';"),
            ("/s/B.jsx", "import './D.jsx';"),
            ("/s/C.jsx", "import './D.jsx';"),
            ("/s/D.jsx", "export const d = 1;"),
        ]);
        let graph = collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap();
        assert_eq!(graph.modules.len(), 4);
        assert_eq!(
            graph.order,
            vec![p("/s/D.jsx"), p("/s/B.jsx"), p("/s/C.jsx"), p("/s/A.jsx")]
        );
    }

    #[test]
    fn test_assets_are_leaves() {
        let fs = MemoryFileSystem::with_files([(
            "/s/A.jsx",
            "import logo from './logo.PNG';\nimport x from 'pkg';",
        )]);
        fs.insert("/s/logo.PNG", vec![0u8, 1, 2]);
        let graph = collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap();
        assert_eq!(graph.assets, vec![p("/s/logo.PNG")]);
        assert!(graph.is_asset(Path::new("/s/logo.PNG")));
        assert_eq!(graph.order, vec![p("/s/A.jsx")]);
        assert_eq!(graph.externals, vec!["pkg".to_string()]);
    }

    #[test]
    fn test_cycle_detected() {
        let fs = MemoryFileSystem::with_files([
            ("/s/A.jsx", "import './B.jsx';"),
            ("/s/B.jsx", "import './A.jsx';"),
        ]);
        match collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap_err() {
            BuildError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec![p("/s/A.jsx"), p("/s/B.jsx"), p("/s/A.jsx")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_import_is_cycle() {
        let fs = MemoryFileSystem::with_files([("/s/A.jsx", "import './A.jsx';")]);
        match collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap_err() {
            BuildError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec![p("/s/A.jsx"), p("/s/A.jsx")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_import_names_importer() {
        let fs = MemoryFileSystem::with_files([("/s/A.jsx", "import B from './Missing.jsx';")]);
        match collect_dependencies(Path::new("/s/A.jsx"), &fs).unwrap_err() {
            BuildError::FileNotFound {
                path,
                referenced_from,
            } => {
                assert_eq!(path, p("/s/Missing.jsx"));
                assert_eq!(referenced_from, Some(p("/s/A.jsx")));
            }
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_topological_sort_on_raw_graph() {
        let mut graph = IndexMap::new();
        graph.insert(p("/e"), vec![p("/x"), p("/y")]);
        graph.insert(p("/x"), vec![p("/y")]);
        graph.insert(p("/y"), vec![]);
        let order = topological_sort(&graph, Path::new("/e")).unwrap();
        assert_eq!(order, vec![p("/y"), p("/x"), p("/e")]);
    }
}
