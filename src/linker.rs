//! Scope isolation.
//!
//! Non-entry modules are wrapped as
//! `__modules["id"] = (() => { ...; return { "name": binding }; })();` and every import of a
//! local module becomes a lookup into that record. The entry module stays at top scope with
//! its ESM exports intact. Rewrites are span replacements over top-level statements only.

use crate::assets::export_name;
use crate::error::{BuildError, BuildResult};
use crate::plugin::ModuleCode;
use crate::resolver::{is_bare_specifier, DependencyGraph, Resolved};
use crate::syntax::{apply_replacements, js_string, parse_program, Replacement};
use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_span::GetSpan;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

pub const MODULES_RECORD: &str = "__modules";
const DEFAULT_BINDING: &str = "__default";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedModule {
    pub path: PathBuf,
    pub id: String,
    pub code: String,
    /// Names in the module's export record, `default` included.
    pub exports: Vec<String>,
    /// Bare-package imports this module adds to the hoisted set.
    pub externals: Vec<String>,
}

/// Id of `path` relative to `base_dir`, with `/` separators.
pub fn module_id(path: &Path, base_dir: &Path) -> String {
    let rel = relative_path(path, base_dir);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn relative_path(path: &Path, base: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix(base) {
        return stripped.to_path_buf();
    }
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

fn record_lookup(id: &str) -> String {
    format!("{}[{}]", MODULES_RECORD, js_string(id))
}

fn member_lookup(id: &str, name: &str) -> String {
    format!("{}[{}]", record_lookup(id), js_string(name))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINKER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Linker<'g> {
    graph: &'g DependencyGraph,
    base_dir: PathBuf,
    /// Export names of modules linked so far, by path.
    exports: HashMap<PathBuf, Vec<String>>,
    /// Hoisted external bindings: local name -> (specifier, imported name).
    external_bindings: HashMap<String, (String, Imported)>,
}

/// What an import binding takes from its module.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Imported {
    Namespace,
    Name(String),
}

struct ImportBinding {
    local: String,
    imported: Imported,
}

/// Where an import specifier points once linked.
enum Target {
    Module(String, PathBuf),
    Asset(PathBuf),
    External,
}

impl<'g> Linker<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        let base_dir = graph
            .entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            graph,
            base_dir,
            exports: HashMap::new(),
            external_bindings: HashMap::new(),
        }
    }

    pub fn id_of(&self, path: &Path) -> String {
        module_id(path, &self.base_dir)
    }

    fn target(&self, importer: &Path, specifier: &str) -> BuildResult<Target> {
        let resolved = self
            .graph
            .module(importer)
            .and_then(|m| m.resolve(specifier))
            .cloned();
        match resolved {
            Some(Resolved::Local(path)) if self.graph.is_asset(&path) => Ok(Target::Asset(path)),
            Some(Resolved::Local(path)) => Ok(Target::Module(self.id_of(&path), path)),
            Some(Resolved::External(_)) => Ok(Target::External),
            None if is_bare_specifier(specifier) => Ok(Target::External),
            None => Err(BuildError::Link {
                file: importer.to_path_buf(),
                message: format!("import `{specifier}` is not part of the dependency graph"),
            }),
        }
    }

    fn exports_of(&self, importer: &Path, dep: &Path) -> BuildResult<&[String]> {
        self.exports
            .get(dep)
            .map(Vec::as_slice)
            .ok_or_else(|| BuildError::Link {
                file: importer.to_path_buf(),
                message: format!("{} has not been linked yet", dep.display()),
            })
    }

    /// Link one module. Modules must be linked in dependency order.
    pub fn link(&mut self, module: &ModuleCode) -> BuildResult<LinkedModule> {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, &module.code, &module.path)?;
        let code = module.code.as_str();
        let file = module.path.as_path();

        let mut replacements: Vec<Replacement> = Vec::new();
        let mut externals = Vec::new();
        let mut record: IndexMap<String, String> = IndexMap::new();

        for stmt in &program.body {
            let span = stmt.span();
            let text = &code[span.start as usize..span.end as usize];
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let replacement = self.link_import(file, decl, text, &mut externals)?;
                    replacements.push((span.start, span.end, replacement));
                }
                Statement::ExportNamedDeclaration(decl) => {
                    if decl.export_kind.is_type() {
                        replacements.push((span.start, span.end, String::new()));
                        continue;
                    }
                    if let Some(source) = &decl.source {
                        let replacement =
                            self.link_named_reexport(file, decl, &source.value, module.is_entry, &mut record)?;
                        replacements.push((span.start, span.end, replacement));
                    } else if module.is_entry {
                        continue;
                    } else if let Some(declaration) = &decl.declaration {
                        let mut names = Vec::new();
                        declaration_names(declaration, &mut names);
                        for name in names {
                            record.insert(name.clone(), name);
                        }
                        replacements.push((span.start, span.end, strip_keyword(text, "export").to_string()));
                    } else {
                        for spec in &decl.specifiers {
                            record.insert(
                                export_name(&spec.exported).to_string(),
                                export_name(&spec.local).to_string(),
                            );
                        }
                        replacements.push((span.start, span.end, String::new()));
                    }
                }
                Statement::ExportDefaultDeclaration(decl) => {
                    if module.is_entry {
                        continue;
                    }
                    let replacement = link_default_export(code, decl, text, &mut record);
                    replacements.push((span.start, span.end, replacement));
                }
                Statement::ExportAllDeclaration(decl) => {
                    if decl.export_kind.is_type() {
                        replacements.push((span.start, span.end, String::new()));
                        continue;
                    }
                    let replacement = self.link_star_reexport(file, decl, module.is_entry, &mut record)?;
                    replacements.push((span.start, span.end, replacement));
                }
                _ => {}
            }
        }

        let body = apply_replacements(code, replacements);
        let exported: Vec<String> = if module.is_entry {
            entry_export_names(&program)
        } else {
            record.keys().cloned().collect()
        };

        let code = if module.is_entry {
            body
        } else {
            let entries = record
                .iter()
                .map(|(name, value)| format!("{}: {}", js_string(name), value))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{} = (() => {{\n{}\nreturn {{ {} }};\n}})();",
                record_lookup(&module.id),
                body.trim_end(),
                entries
            )
        };

        self.exports.insert(module.path.clone(), exported.clone());
        Ok(LinkedModule {
            path: module.path.clone(),
            id: module.id.clone(),
            code,
            exports: exported,
            externals,
        })
    }

    fn link_import(
        &mut self,
        file: &Path,
        decl: &ImportDeclaration<'_>,
        text: &str,
        externals: &mut Vec<String>,
    ) -> BuildResult<String> {
        if decl.import_kind.is_type() {
            return Ok(String::new());
        }
        let specifier = decl.source.value.as_str();
        match self.target(file, specifier)? {
            Target::External => {
                let bindings = import_bindings(decl);
                let total = bindings.len();
                let mut fresh = Vec::new();
                for binding in bindings {
                    match self.external_bindings.get(&binding.local) {
                        Some((other, imported)) if other == specifier && *imported == binding.imported => {}
                        Some((other, _)) => {
                            let message = if other == specifier {
                                format!("`{}` is bound to two different imports of `{specifier}`", binding.local)
                            } else {
                                format!("`{}` is imported from both `{other}` and `{specifier}`", binding.local)
                            };
                            return Err(BuildError::Link {
                                file: file.to_path_buf(),
                                message,
                            });
                        }
                        None => fresh.push(binding),
                    }
                }
                if fresh.len() == total {
                    externals.push(text.trim().to_string());
                } else {
                    externals.extend(external_imports(specifier, &fresh));
                }
                for binding in fresh {
                    self.external_bindings
                        .insert(binding.local, (specifier.to_string(), binding.imported));
                }
                Ok(String::new())
            }
            Target::Asset(path) => {
                warn!(
                    module = %file.display(),
                    asset = %path.display(),
                    "dropping asset import that was not rewritten"
                );
                Ok(String::new())
            }
            Target::Module(id, _) => {
                let Some(specifiers) = &decl.specifiers else {
                    return Ok(String::new());
                };
                let mut statements = Vec::new();
                let mut named = Vec::new();
                for spec in specifiers {
                    match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            statements.push(format!(
                                "const {} = {};",
                                s.local.name,
                                member_lookup(&id, "default")
                            ));
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            statements.push(format!("const {} = {};", s.local.name, record_lookup(&id)));
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            let imported = export_name(&s.imported);
                            let local = s.local.name.as_str();
                            if imported == local {
                                named.push(local.to_string());
                            } else {
                                named.push(format!("{}: {}", property_key(imported), local));
                            }
                        }
                    }
                }
                if !named.is_empty() {
                    statements.push(format!("const {{ {} }} = {};", named.join(", "), record_lookup(&id)));
                }
                Ok(statements.join("\n"))
            }
        }
    }

    fn link_named_reexport(
        &mut self,
        file: &Path,
        decl: &ExportNamedDeclaration<'_>,
        specifier: &str,
        is_entry: bool,
        record: &mut IndexMap<String, String>,
    ) -> BuildResult<String> {
        let (id, _) = self.reexport_target(file, specifier)?;
        let mut declarations = Vec::new();
        let mut default_value = None;
        for spec in &decl.specifiers {
            let local = export_name(&spec.local);
            let exported = export_name(&spec.exported);
            let value = member_lookup(&id, local);
            if !is_entry {
                record.insert(exported.to_string(), value);
            } else if exported == "default" {
                default_value = Some(value);
            } else if is_identifier(exported) {
                declarations.push(format!("{exported} = {value}"));
            } else {
                return Err(BuildError::Link {
                    file: file.to_path_buf(),
                    message: format!("cannot re-export `{exported}` from the entry module"),
                });
            }
        }
        let mut out = Vec::new();
        if !declarations.is_empty() {
            out.push(format!("export const {};", declarations.join(", ")));
        }
        if let Some(value) = default_value {
            out.push(format!("export default {value};"));
        }
        Ok(out.join("\n"))
    }

    fn link_star_reexport(
        &mut self,
        file: &Path,
        decl: &ExportAllDeclaration<'_>,
        is_entry: bool,
        record: &mut IndexMap<String, String>,
    ) -> BuildResult<String> {
        let (id, dep) = self.reexport_target(file, decl.source.value.as_str())?;

        if let Some(exported) = &decl.exported {
            let name = export_name(exported);
            if !is_entry {
                record.insert(name.to_string(), record_lookup(&id));
                return Ok(String::new());
            }
            if !is_identifier(name) {
                return Err(BuildError::Link {
                    file: file.to_path_buf(),
                    message: format!("cannot re-export `{name}` from the entry module"),
                });
            }
            return Ok(format!("export const {} = {};", name, record_lookup(&id)));
        }

        let names: Vec<String> = self
            .exports_of(file, &dep)?
            .iter()
            .filter(|n| n.as_str() != "default")
            .cloned()
            .collect();

        if !is_entry {
            for name in names {
                let value = member_lookup(&id, &name);
                record.entry(name).or_insert(value);
            }
            return Ok(String::new());
        }
        let declarations: Vec<String> = names
            .iter()
            .filter(|n| is_identifier(n))
            .map(|n| format!("{} = {}", n, member_lookup(&id, n)))
            .collect();
        if declarations.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("export const {};", declarations.join(", ")))
        }
    }

    fn reexport_target(&self, file: &Path, specifier: &str) -> BuildResult<(String, PathBuf)> {
        match self.target(file, specifier)? {
            Target::Module(id, path) => Ok((id, path)),
            Target::External => Err(BuildError::Link {
                file: file.to_path_buf(),
                message: format!("re-exporting from package `{specifier}` is not supported"),
            }),
            Target::Asset(_) => Err(BuildError::Link {
                file: file.to_path_buf(),
                message: format!("cannot re-export from asset `{specifier}`"),
            }),
        }
    }
}

fn link_default_export(
    code: &str,
    decl: &ExportDefaultDeclaration<'_>,
    text: &str,
    record: &mut IndexMap<String, String>,
) -> String {
    let rest = strip_keyword(strip_keyword(text, "export"), "default");
    let named = match &decl.declaration {
        ExportDefaultDeclarationKind::FunctionDeclaration(f) => f.id.as_ref().map(|id| id.name.to_string()),
        ExportDefaultDeclarationKind::ClassDeclaration(c) => c.id.as_ref().map(|id| id.name.to_string()),
        _ => None,
    };

    match named {
        Some(name) => {
            record.insert("default".to_string(), name);
            rest.to_string()
        }
        None => {
            record.insert("default".to_string(), DEFAULT_BINDING.to_string());
            let value = match decl.declaration.as_expression() {
                Some(expr) => {
                    let span = expr.span();
                    &code[span.start as usize..span.end as usize]
                }
                None => rest.trim_end().trim_end_matches(';'),
            };
            format!("const {DEFAULT_BINDING} = {value};")
        }
    }
}

fn strip_keyword<'s>(text: &'s str, keyword: &str) -> &'s str {
    text.trim_start()
        .strip_prefix(keyword)
        .map(str::trim_start)
        .unwrap_or(text)
}

fn import_bindings(decl: &ImportDeclaration<'_>) -> Vec<ImportBinding> {
    let Some(specifiers) = &decl.specifiers else {
        return Vec::new();
    };
    specifiers
        .iter()
        .filter(|s| !matches!(s, ImportDeclarationSpecifier::ImportSpecifier(s) if s.import_kind.is_type()))
        .map(|s| match s {
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportBinding {
                local: s.local.name.to_string(),
                imported: Imported::Name("default".to_string()),
            },
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ImportBinding {
                local: s.local.name.to_string(),
                imported: Imported::Namespace,
            },
            ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding {
                local: s.local.name.to_string(),
                imported: Imported::Name(export_name(&s.imported).to_string()),
            },
        })
        .collect()
}

/// Import statements for the bindings of `specifier` not hoisted yet.
fn external_imports(specifier: &str, bindings: &[ImportBinding]) -> Vec<String> {
    let source = js_string(specifier);
    let mut statements = Vec::new();
    let mut named = Vec::new();
    for binding in bindings {
        match &binding.imported {
            Imported::Namespace => statements.push(format!("import * as {} from {};", binding.local, source)),
            Imported::Name(name) if *name == binding.local => named.push(binding.local.clone()),
            Imported::Name(name) => named.push(format!("{} as {}", property_key(name), binding.local)),
        }
    }
    if !named.is_empty() {
        statements.insert(0, format!("import {{ {} }} from {};", named.join(", "), source));
    }
    statements
}

fn declaration_names(declaration: &Declaration<'_>, out: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for d in &var.declarations {
                binding_names(&d.id, out);
            }
        }
        Declaration::FunctionDeclaration(f) => {
            if let Some(id) = &f.id {
                out.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(c) => {
            if let Some(id) = &c.id {
                out.push(id.name.to_string());
            }
        }
        _ => {}
    }
}

pub(crate) fn binding_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => out.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                binding_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for p in arr.elements.iter().flatten() {
                binding_names(p, out);
            }
            if let Some(rest) = &arr.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assign) => binding_names(&assign.left, out),
    }
}

fn entry_export_names(program: &Program<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in &program.body {
        match stmt {
            Statement::ExportDefaultDeclaration(_) => names.push("default".to_string()),
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    declaration_names(declaration, &mut names);
                }
                for spec in &decl.specifiers {
                    names.push(export_name(&spec.exported).to_string());
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if let Some(exported) = &decl.exported {
                    names.push(export_name(exported).to_string());
                }
            }
            _ => {}
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::resolver::collect_dependencies;

    fn graph(files: &[(&str, &str)]) -> DependencyGraph {
        let fs = MemoryFileSystem::with_files(files.iter().map(|(p, c)| (*p, *c)));
        collect_dependencies(Path::new(files[0].0), &fs).unwrap()
    }

    fn link_all(graph: &DependencyGraph) -> Vec<LinkedModule> {
        let mut linker = Linker::new(graph);
        graph
            .order
            .iter()
            .map(|path| {
                let module = ModuleCode {
                    path: path.clone(),
                    id: linker.id_of(path),
                    code: graph.module(path).unwrap().source.clone(),
                    is_entry: *path == graph.entry,
                };
                linker.link(&module).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_module_id_relative_to_entry_dir() {
        assert_eq!(module_id(Path::new("/s/pages/a.jsx"), Path::new("/s/pages")), "a.jsx");
        assert_eq!(
            module_id(Path::new("/s/components/B.jsx"), Path::new("/s/pages")),
            "../components/B.jsx"
        );
    }

    #[test]
    fn test_non_entry_wrapped_with_record() {
        let g = graph(&[
            ("/s/A.jsx", "import B, { helper as hp } from './B.jsx';\nexport default function A() { return B() + hp; }"),
            ("/s/B.jsx", "export const helper = 1;\nexport default function B() { return 'b'; }"),
        ]);
        let linked = link_all(&g);
        let b = &linked[0];
        assert!(b.code.starts_with("__modules[\"B.jsx\"] = (() => {"), "{}", b.code);
        assert!(b.code.contains("const helper = 1;"), "{}", b.code);
        assert!(b.code.contains("function B()"), "{}", b.code);
        assert!(b.code.contains("return { \"helper\": helper, \"default\": B };"), "{}", b.code);
        assert!(!b.code.contains("export"), "{}", b.code);
        assert_eq!(b.exports, vec!["helper", "default"]);

        let a = &linked[1];
        assert!(a.code.contains("const B = __modules[\"B.jsx\"][\"default\"];"), "{}", a.code);
        assert!(a.code.contains("const { helper: hp } = __modules[\"B.jsx\"];"), "{}", a.code);
        assert!(a.code.contains("export default function A()"), "{}", a.code);
        assert!(!a.code.contains("(() =>"), "{}", a.code);
    }

    #[test]
    fn test_same_names_in_siblings_do_not_collide() {
        let g = graph(&[
            ("/s/A.jsx", "import { x as x1 } from './B.jsx';\nimport { x as x2 } from './C.jsx';\nexport default () => x1 + x2;"),
            ("/s/B.jsx", "export const x = 1;"),
            ("/s/C.jsx", "export const x = 2;"),
        ]);
        let linked = link_all(&g);
        assert!(linked[0].code.contains("const x = 1;"));
        assert!(linked[1].code.contains("const x = 2;"));
        assert!(linked.iter().take(2).all(|m| m.code.contains("(() => {")));
    }

    #[test]
    fn test_anonymous_default_expression() {
        let g = graph(&[
            ("/s/A.jsx", "import v from './B.js';\nexport default v;"),
            ("/s/B.js", "export default { title: 'x' }"),
        ]);
        let linked = link_all(&g);
        assert!(linked[0].code.contains("const __default = { title: 'x' };"), "{}", linked[0].code);
        assert!(linked[0].code.contains("\"default\": __default"));
    }

    #[test]
    fn test_namespace_and_side_effect_imports() {
        let g = graph(&[
            ("/s/A.jsx", "import * as util from './u.js';\nimport './setup.js';\nexport default util.a;"),
            ("/s/u.js", "export function a() {}"),
            ("/s/setup.js", "globalThis.ready = true;"),
        ]);
        let linked = link_all(&g);
        let entry = linked.last().unwrap();
        assert!(entry.code.contains("const util = __modules[\"u.js\"];"), "{}", entry.code);
        assert!(!entry.code.contains("setup.js"), "{}", entry.code);
    }

    #[test]
    fn test_export_list_and_reexports() {
        let g = graph(&[
            ("/s/A.jsx", "import { a, b, c, all } from './index.js';\nexport default [a, b, c, all];"),
            ("/s/index.js", "export { one as a } from './one.js';\nexport * from './two.js';\nexport * as all from './two.js';\nconst c = 3;\nexport { c };"),
            ("/s/one.js", "export const one = 1;"),
            ("/s/two.js", "export const b = 2;\nexport default 9;"),
        ]);
        let linked = link_all(&g);
        let index = linked.iter().find(|m| m.id == "index.js").unwrap();
        assert!(index.code.contains("\"a\": __modules[\"one.js\"][\"one\"]"), "{}", index.code);
        assert!(index.code.contains("\"b\": __modules[\"two.js\"][\"b\"]"), "{}", index.code);
        assert!(index.code.contains("\"all\": __modules[\"two.js\"]"), "{}", index.code);
        assert!(index.code.contains("\"c\": c"), "{}", index.code);
        assert!(!index.exports.contains(&"default".to_string()));
    }

    #[test]
    fn test_externals_hoisted_once_per_binding() {
        let g = graph(&[
            ("/s/A.jsx", "import { h } from 'ono';\nimport B from './B.jsx';\nexport default B;"),
            ("/s/B.jsx", "import { h } from 'ono';\nexport default () => h('p');"),
        ]);
        let linked = link_all(&g);
        assert_eq!(linked[0].externals, vec!["import { h } from 'ono';"]);
        assert!(!linked[0].code.contains("from 'ono'"));
        assert!(linked[1].externals.is_empty());
        assert!(!linked[1].code.contains("from 'ono'"));
    }

    #[test]
    fn test_external_import_spelled_differently_is_not_rebound() {
        let g = graph(&[
            ("/s/A.jsx", "import { t } from \"i18n\";\nimport B from './B.js';\nexport default () => t(B);"),
            ("/s/B.js", "import {t} from 'i18n';\nexport default t('b');"),
        ]);
        let linked = link_all(&g);
        assert_eq!(linked[0].externals, vec!["import {t} from 'i18n';"]);
        assert!(linked[1].externals.is_empty());
    }

    #[test]
    fn test_partially_hoisted_external_emits_remaining_bindings() {
        let g = graph(&[
            ("/s/A.jsx", "import Lib, { t, x as y } from 'lib';\nimport B from './B.js';\nexport default () => [Lib, t, y, B];"),
            ("/s/B.js", "import { t } from 'lib';\nexport default t('b');"),
        ]);
        let linked = link_all(&g);
        assert_eq!(linked[1].externals, vec!["import { default as Lib, x as y } from \"lib\";"]);
    }

    #[test]
    fn test_same_local_bound_to_two_imports_of_one_package_fails() {
        let g = graph(&[
            ("/s/A.jsx", "import { x as t } from 'lib';\nimport B from './B.js';\nexport default B;"),
            ("/s/B.js", "import { t } from 'lib';\nexport default t;"),
        ]);
        let mut linker = Linker::new(&g);
        let mut results = g.order.iter().map(|path| {
            linker.link(&ModuleCode {
                path: path.clone(),
                id: module_id(path, Path::new("/s")),
                code: g.module(path).unwrap().source.clone(),
                is_entry: *path == g.entry,
            })
        });
        assert!(results.next().unwrap().is_ok());
        let err = results.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("two different imports of `lib`"), "{err}");
    }

    #[test]
    fn test_conflicting_external_bindings_fail() {
        let g = graph(&[
            ("/s/A.jsx", "import { x } from 'p1';\nimport B from './B.jsx';\nexport default B;"),
            ("/s/B.jsx", "import { x } from 'p2';\nexport default x;"),
        ]);
        let mut linker = Linker::new(&g);
        let b = ModuleCode {
            path: PathBuf::from("/s/B.jsx"),
            id: "B.jsx".into(),
            code: g.module(Path::new("/s/B.jsx")).unwrap().source.clone(),
            is_entry: false,
        };
        linker.link(&b).unwrap();
        let a = ModuleCode {
            path: PathBuf::from("/s/A.jsx"),
            id: "A.jsx".into(),
            code: g.module(Path::new("/s/A.jsx")).unwrap().source.clone(),
            is_entry: true,
        };
        assert!(matches!(linker.link(&a), Err(BuildError::Link { .. })));
    }

    #[test]
    fn test_bare_reexport_is_link_error() {
        let g = graph(&[
            ("/s/A.jsx", "import B from './B.js';\nexport default B;"),
            ("/s/B.js", "export { x } from 'pkg';"),
        ]);
        let mut linker = Linker::new(&g);
        let b = ModuleCode {
            path: PathBuf::from("/s/B.js"),
            id: "B.js".into(),
            code: "export { x } from 'pkg';".into(),
            is_entry: false,
        };
        match linker.link(&b) {
            Err(BuildError::Link { message, .. }) => assert!(message.contains("pkg")),
            other => panic!("expected link error, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_reexport_becomes_top_level_export() {
        let g = graph(&[
            ("/s/A.jsx", "export { getStaticPaths } from './paths.js';\nexport default () => 1;"),
            ("/s/paths.js", "export function getStaticPaths() { return []; }"),
        ]);
        let linked = link_all(&g);
        let entry = linked.last().unwrap();
        assert!(
            entry.code.contains("export const getStaticPaths = __modules[\"paths.js\"][\"getStaticPaths\"];"),
            "{}",
            entry.code
        );
        assert_eq!(entry.exports, vec!["getStaticPaths", "default"]);
    }
}
