//! Ordered plugin pipeline.
//!
//! Each hook takes the previous stage's value by value and returns the value handed to the
//! next plugin. Plugins see the build only through a read-only [`PluginContext`].

use crate::assets::AssetCache;
use crate::bundler::Bundle;
use crate::config::BuildOptions;
use crate::error::{BuildError, BuildResult};
use crate::fs::FileSystem;
use crate::resolver::DependencyGraph;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const HOOK_DEPENDENCIES: &str = "onDependencies";
pub const HOOK_MODULE: &str = "onModule";
pub const HOOK_BUNDLE: &str = "onBundle";

/// One module's code as it flows through `on_module`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCode {
    pub path: PathBuf,
    /// Stable id: the path relative to the entry's directory.
    pub id: String,
    pub code: String,
    pub is_entry: bool,
}

pub struct PluginContext<'a> {
    pub entry: &'a std::path::Path,
    pub options: &'a BuildOptions,
    pub fs: &'a dyn FileSystem,
    pub assets: &'a AssetCache,
    /// `None` while `on_dependencies` runs.
    pub graph: Option<&'a DependencyGraph>,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_dependencies(
        &self,
        graph: DependencyGraph,
        _ctx: &PluginContext<'_>,
    ) -> BuildResult<DependencyGraph> {
        Ok(graph)
    }

    fn on_module(&self, module: ModuleCode, _ctx: &PluginContext<'_>) -> BuildResult<ModuleCode> {
        Ok(module)
    }

    fn on_bundle(&self, bundle: Bundle, _ctx: &PluginContext<'_>) -> BuildResult<Bundle> {
        Ok(bundle)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.push(plugin);
        self
    }

    pub fn push(&mut self, plugin: impl Plugin + 'static) {
        self.plugins.push(Arc::new(plugin));
    }

    pub fn push_arc(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn run_dependencies(
        &self,
        mut graph: DependencyGraph,
        ctx: &PluginContext<'_>,
    ) -> BuildResult<DependencyGraph> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "running {}", HOOK_DEPENDENCIES);
            graph = plugin
                .on_dependencies(graph, ctx)
                .map_err(|e| wrap_error(plugin.name(), HOOK_DEPENDENCIES, e))?;
        }
        Ok(graph)
    }

    pub fn run_module(
        &self,
        mut module: ModuleCode,
        ctx: &PluginContext<'_>,
    ) -> BuildResult<ModuleCode> {
        for plugin in &self.plugins {
            module = plugin
                .on_module(module, ctx)
                .map_err(|e| wrap_error(plugin.name(), HOOK_MODULE, e))?;
        }
        Ok(module)
    }

    pub fn run_bundle(&self, mut bundle: Bundle, ctx: &PluginContext<'_>) -> BuildResult<Bundle> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "running {}", HOOK_BUNDLE);
            bundle = plugin
                .on_bundle(bundle, ctx)
                .map_err(|e| wrap_error(plugin.name(), HOOK_BUNDLE, e))?;
        }
        Ok(bundle)
    }
}

/// Core taxonomy errors keep their identity; anything else is attributed to the plugin.
fn wrap_error(plugin: &str, hook: &'static str, err: BuildError) -> BuildError {
    match err {
        e @ (BuildError::Plugin { .. }
        | BuildError::FileNotFound { .. }
        | BuildError::AssetCopyFailure { .. }
        | BuildError::CircularDependency { .. }) => e,
        other => BuildError::Plugin {
            plugin: plugin.to_string(),
            hook,
            message: other.to_string(),
        },
    }
}

/// Adapt a closure into an `on_module` plugin.
pub struct ModuleFn<F> {
    name: String,
    f: F,
}

impl<F> ModuleFn<F>
where
    F: Fn(ModuleCode) -> BuildResult<ModuleCode> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Plugin for ModuleFn<F>
where
    F: Fn(ModuleCode) -> BuildResult<ModuleCode> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_module(&self, module: ModuleCode, _ctx: &PluginContext<'_>) -> BuildResult<ModuleCode> {
        (self.f)(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::path::Path;

    fn module(code: &str) -> ModuleCode {
        ModuleCode {
            path: PathBuf::from("/s/a.jsx"),
            id: "a.jsx".to_string(),
            code: code.to_string(),
            is_entry: false,
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&PluginContext<'_>) -> R) -> R {
        let fs = MemoryFileSystem::new();
        let options = BuildOptions::default();
        let assets = AssetCache::new();
        let ctx = PluginContext {
            entry: Path::new("/s/a.jsx"),
            options: &options,
            fs: &fs,
            assets: &assets,
            graph: None,
        };
        f(&ctx)
    }

    #[test]
    fn test_module_hooks_chain_in_order() {
        let pipeline = PluginPipeline::new()
            .with(ModuleFn::new("first", |mut m: ModuleCode| {
                m.code.push_str("/*1*/");
                Ok(m)
            }))
            .with(ModuleFn::new("second", |mut m: ModuleCode| {
                m.code.push_str("/*2*/");
                Ok(m)
            }));
        let out = with_ctx(|ctx| pipeline.run_module(module("x;"), ctx)).unwrap();
        assert_eq!(out.code, "x;/*1*//*2*/");
        assert_eq!(pipeline.names(), vec!["first", "second"]);
    }

    #[test]
    fn test_failing_hook_aborts_and_names_plugin() {
        let pipeline = PluginPipeline::new()
            .with(ModuleFn::new("boom", |_m: ModuleCode| {
                Err(BuildError::evaluation("kaboom"))
            }))
            .with(ModuleFn::new("never", |_m: ModuleCode| {
                panic!("must not run after a failure")
            }));
        let err = with_ctx(|ctx| pipeline.run_module(module("x;"), ctx)).unwrap_err();
        match err {
            BuildError::Plugin {
                plugin,
                hook,
                message,
            } => {
                assert_eq!(plugin, "boom");
                assert_eq!(hook, HOOK_MODULE);
                assert!(message.contains("kaboom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_asset_errors_keep_identity() {
        let err = wrap_error(
            "asset-loader",
            HOOK_MODULE,
            BuildError::asset_copy("/a.png", std::io::Error::other("disk full")),
        );
        assert!(matches!(err, BuildError::AssetCopyFailure { .. }));
    }
}
