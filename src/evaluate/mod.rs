//! Page evaluator.
//!
//! Runs a linked bundle in an isolated realm and hands back its exports. Bare-package imports
//! are satisfied from [`HostModules`]; nothing is read from disk or the network while a page
//! evaluates.

mod builtins;
mod interp;
mod ir;
mod lower;

use crate::config::BuildOptions;
use crate::error::{BuildError, BuildResult};
use crate::syntax;
use crate::vnode::{Callable, JsResult, Thrown, Value};
use indexmap::IndexMap;
use interp::{get_property, Interp, Realm};
use ir::{ImportBinding, Stmt};
use oxc_allocator::Allocator;
use oxc_span::SourceType;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

pub type HostFn = Arc<dyn Fn(&[Value]) -> JsResult<Value> + Send + Sync>;

/// One export of a host-provided package.
#[derive(Clone)]
pub enum HostExport {
    Function(HostFn),
    Json(serde_json::Value),
}

/// Packages a page may import by bare specifier.
#[derive(Clone, Default)]
pub struct HostModules {
    modules: HashMap<String, IndexMap<String, HostExport>>,
}

impl fmt::Debug for HostModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.modules.iter().map(|(k, v)| (k, v.keys().collect::<Vec<_>>())))
            .finish()
    }
}

impl HostModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(
        mut self,
        module: &str,
        export: &str,
        func: impl Fn(&[Value]) -> JsResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(export.to_string(), HostExport::Function(Arc::new(func)));
        self
    }

    pub fn with_value(mut self, module: &str, export: &str, value: serde_json::Value) -> Self {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(export.to_string(), HostExport::Json(value));
        self
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    fn namespace(&self, module: &str) -> Option<IndexMap<String, Value>> {
        let exports = self.modules.get(module)?;
        Some(
            exports
                .iter()
                .map(|(name, export)| (name.clone(), host_value(name, export)))
                .collect(),
        )
    }
}

struct HostFunction {
    name: String,
    func: HostFn,
}

impl Callable for HostFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, _this: &Value, args: Vec<Value>) -> JsResult<Value> {
        (self.func)(&args)
    }
}

fn host_value(name: &str, export: &HostExport) -> Value {
    match export {
        HostExport::Function(func) => Value::Function(Rc::new(HostFunction {
            name: name.to_string(),
            func: func.clone(),
        })),
        HostExport::Json(json) => Value::from_json(json),
    }
}

/// Values a module exported, kept alive with the realm that produced them.
pub struct Exports {
    realm: Rc<Realm>,
    values: IndexMap<String, Value>,
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl Exports {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn default(&self) -> Option<&Value> {
        self.get("default")
    }

    /// The default export, when it is something the renderer can consume.
    pub fn default_component(&self, file: &Path) -> BuildResult<Value> {
        match self.default() {
            Some(value @ Value::Function(_)) => Ok(value.clone()),
            Some(value) if value.is_vnode() => Ok(value.clone()),
            _ => Err(BuildError::MissingDefaultExport {
                file: file.to_path_buf(),
            }),
        }
    }

    /// Calls `func` inside this module's realm.
    pub fn call(&self, func: &Value, args: Vec<Value>) -> BuildResult<Value> {
        let interp = Interp::new(self.realm.clone());
        Ok(interp.call_value(func, Value::Undefined, args)?)
    }
}

/// Parses and runs `code` as an ES module, returning its exports.
pub fn evaluate(code: &str, file: &Path, options: &BuildOptions, host: &HostModules) -> BuildResult<Exports> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let program = syntax::parse_with(&allocator, code, file, source_type)?;
    let lowered = lower::lower_program(&program, file)?;

    let realm = Realm::new(options.max_call_depth);
    let scope = realm.new_scope(realm.global());
    builtins::install_globals(&realm, realm.global(), &options.jsx_factory, &options.jsx_fragment);

    for stmt in &lowered.body {
        if let Stmt::Import { source, bindings } = stmt {
            link_host_import(&realm, scope, source, bindings, host)?;
        }
    }

    let interp = Interp::new(realm.clone());
    interp.run_module(&lowered, scope)?;

    let mut values = IndexMap::new();
    for stmt in &lowered.body {
        if let Stmt::Export(pairs) = stmt {
            for (local, exported) in pairs {
                let value = realm.get_own(scope, local).unwrap_or_default();
                values.insert(exported.to_string(), value);
            }
        }
    }
    debug!(
        file = %file.display(),
        exports = values.len(),
        "evaluated module"
    );
    Ok(Exports { realm, values })
}

fn link_host_import(
    realm: &Realm,
    scope: interp::ScopeId,
    source: &str,
    bindings: &[ImportBinding],
    host: &HostModules,
) -> BuildResult<()> {
    let namespace = host
        .namespace(source)
        .ok_or_else(|| BuildError::from(Thrown::error("Error", format!("Cannot find module '{}'", source))))?;
    let namespace = Value::object(namespace);
    for binding in bindings {
        let (local, value) = match binding {
            ImportBinding::Default(local) => (local, get_property(&namespace, "default")?),
            ImportBinding::Named { imported, local } => (local, get_property(&namespace, imported)?),
            ImportBinding::Namespace(local) => (local, namespace.clone()),
        };
        realm.declare(scope, local, value, false);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> Exports {
        run_with(code, &HostModules::new())
    }

    fn run_with(code: &str, host: &HostModules) -> Exports {
        evaluate(code, Path::new("page.js"), &BuildOptions::default(), host).unwrap()
    }

    fn run_err(code: &str) -> BuildError {
        evaluate(code, Path::new("page.js"), &BuildOptions::default(), &HostModules::new()).unwrap_err()
    }

    fn export_string(exports: &Exports, name: &str) -> String {
        exports.get(name).map(Value::to_js_string).unwrap_or_default()
    }

    #[test]
    fn test_named_and_default_exports() {
        let exports = run("export const a = 1; const b = 2; export { b as c }; export default function Page() {}");
        assert_eq!(exports.names().collect::<Vec<_>>(), vec!["a", "c", "default"]);
        assert_eq!(export_string(&exports, "c"), "2");
        assert!(matches!(exports.default(), Some(Value::Function(_))));
    }

    #[test]
    fn test_default_expression_export() {
        let exports = run("export default [1, 2, 3].map((n) => n * 2).join('-');");
        assert_eq!(export_string(&exports, "default"), "2-4-6");
    }

    #[test]
    fn test_closures_and_counters() {
        let exports = run(r#"
            function counter() {
                let n = 0;
                return () => ++n;
            }
            const next = counter();
            next();
            next();
            export const value = next();
        "#);
        assert_eq!(export_string(&exports, "value"), "3");
    }

    #[test]
    fn test_let_loop_captures_each_iteration() {
        let exports = run(r#"
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            export const out = fns.map((f) => f()).join(",");
        "#);
        assert_eq!(export_string(&exports, "out"), "0,1,2");
    }

    #[test]
    fn test_destructuring_defaults_and_rest() {
        let exports = run(r#"
            const { a, b: { c = 5 } = {}, ...rest } = { a: 1, x: 2, y: 3 };
            const [first, , third = 9, ...tail] = [10, 20, undefined, 40, 50];
            export const out = [a, c, Object.keys(rest).join(""), first, third, tail.length].join(" ");
        "#);
        assert_eq!(export_string(&exports, "out"), "1 5 xy 10 9 2");
    }

    #[test]
    fn test_control_flow() {
        let exports = run(r#"
            let log = [];
            outer: for (const x of [1, 2, 3]) {
                for (const y of [1, 2, 3]) {
                    if (y === 2) continue outer;
                    if (x === 3) break outer;
                    log.push(`${x}${y}`);
                }
            }
            switch (log.length) {
                case 1: log.push("one");
                case 2: log.push("two"); break;
                default: log.push("many");
            }
            let i = 0;
            do { i += 2; } while (i < 5);
            export const out = log.join(",") + ":" + i;
        "#);
        assert_eq!(export_string(&exports, "out"), "11,21,two:6");
    }

    #[test]
    fn test_try_catch_finally() {
        let exports = run(r#"
            const steps = [];
            function risky() {
                try {
                    throw new Error("bad");
                } catch (e) {
                    steps.push(e.message);
                    return "caught";
                } finally {
                    steps.push("finally");
                }
            }
            export const out = risky() + ":" + steps.join("|");
        "#);
        assert_eq!(export_string(&exports, "out"), "caught:bad|finally");
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let exports = run(r#"
            const user = { profile: null, tags: ["a"] };
            export const out = [
                user.profile?.name ?? "anon",
                user.missing?.deep.deeper,
                user.tags?.[0],
                user.nope?.(),
            ].map(String).join(",");
        "#);
        assert_eq!(export_string(&exports, "out"), "anon,undefined,a,undefined");
    }

    #[test]
    fn test_method_this_binding() {
        let exports = run(r#"
            const obj = { n: 2, double() { return this.n * 2; } };
            function Point(x) { this.x = x; }
            const p = new Point(7);
            export const out = obj.double() + p.x;
        "#);
        assert_eq!(export_string(&exports, "out"), "11");
    }

    #[test]
    fn test_async_functions_run_synchronously() {
        let exports = run(r#"
            async function load() { return await Promise.resolve(["a", "b"]); }
            export const out = (await load()).length;
        "#);
        assert_eq!(export_string(&exports, "out"), "2");
    }

    #[test]
    fn test_host_module_import() {
        let host = HostModules::new()
            .with_function("greet", "default", |args| {
                Ok(Value::string(format!("hi {}", args.first().map(Value::to_js_string).unwrap_or_default())))
            })
            .with_value("site-config", "title", serde_json::json!("Docs"));
        let exports = run_with(
            r#"
            import greet from "greet";
            import { title } from "site-config";
            import * as cfg from "site-config";
            export const out = greet(title) + "/" + cfg.title;
            "#,
            &host,
        );
        assert_eq!(export_string(&exports, "out"), "hi Docs/Docs");
    }

    #[test]
    fn test_missing_host_module() {
        let err = run_err("import x from 'left-pad'; export default x;");
        assert!(err.to_string().contains("Cannot find module 'left-pad'"));
    }

    #[test]
    fn test_uncaught_throw_becomes_evaluation_error() {
        let err = run_err("throw new TypeError('nope');");
        assert_eq!(err.code(), crate::error::ERR_EVAL);
        assert!(err.to_string().contains("Uncaught TypeError: nope"));
    }

    #[test]
    fn test_reference_error() {
        let err = run_err("export default missing + 1;");
        assert!(err.to_string().contains("missing is not defined"));
    }

    #[test]
    fn test_const_reassignment_throws() {
        let err = run_err("const a = 1; a = 2;");
        assert!(err.to_string().contains("Assignment to constant variable."));
    }

    fn with_depth(max_call_depth: usize) -> BuildOptions {
        BuildOptions {
            max_call_depth,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_runaway_recursion_is_bounded() {
        let err = evaluate(
            "function f() { return f(); } f();",
            Path::new("page.js"),
            &with_depth(16),
            &HostModules::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Maximum call stack size exceeded"));
    }

    #[test]
    fn test_recursion_below_the_limit_succeeds() {
        let code = "function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); } export const d = depth(12);";
        let exports = evaluate(code, Path::new("page.js"), &with_depth(16), &HostModules::new()).unwrap();
        assert_eq!(export_string(&exports, "d"), "12");
        let err = evaluate(code, Path::new("page.js"), &with_depth(8), &HostModules::new()).unwrap_err();
        assert!(err.to_string().contains("Maximum call stack size exceeded"));
    }

    #[test]
    fn test_oversized_array_lengths_throw_range_errors() {
        for code in [
            "new Array(1e20);",
            "Array(2 ** 32);",
            "const a = []; a.length = 1e20;",
            "const a = []; a[4294967295] = 1;",
            "Array.from({ length: 1e20 });",
        ] {
            let err = run_err(code);
            assert!(err.to_string().contains("RangeError: Invalid array length"), "{code}: {err}");
        }
    }

    #[test]
    fn test_oversized_strings_throw_range_errors() {
        for code in [
            "'ab'.repeat(1e12);",
            "'7'.padStart(1e12, '0');",
            "'7'.padEnd(1e12);",
            "const s = 'x'.repeat(2 ** 25 + 1); s + s;",
        ] {
            let err = run_err(code);
            assert!(err.to_string().contains("RangeError: Invalid string length"), "{code}: {err}");
        }
        let exports = run("export const s = ''.repeat(1e20) + 'ab'.repeat(2);");
        assert_eq!(export_string(&exports, "s"), "abab");
    }

    #[test]
    fn test_class_is_rejected() {
        let err = run_err("export default class Page {}");
        assert!(err.to_string().contains("class is not supported"));
    }

    #[test]
    fn test_default_component_requires_function_or_vnode() {
        let exports = run("export const a = 1;");
        let err = exports.default_component(Path::new("page.js")).unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_NO_DEFAULT);

        let vnode = run("export default h('p', null, 'x');");
        assert!(vnode.default_component(Path::new("page.js")).is_ok());
    }

    #[test]
    fn test_exported_function_is_callable_after_evaluation() {
        let exports = run("export function add(a, b = 10) { return a + b; }");
        let add = exports.get("add").cloned().unwrap();
        let out = exports.call(&add, vec![Value::Number(1.0)]).unwrap();
        assert_eq!(out.to_js_string(), "11");
    }

    #[test]
    fn test_json_and_runtime_prelude_compat() {
        let exports = run(r#"
            const data = JSON.parse('{"items":[1,2]}');
            const node = h(Fragment, null, [data.items.length], false, "x");
            export const out = JSON.stringify({ n: node.children.length, s: typeof Symbol.for("k") });
        "#);
        assert_eq!(export_string(&exports, "out"), r#"{"n":2,"s":"symbol"}"#);
    }
}
