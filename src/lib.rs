//! # Ono Native
//!
//! Resolver, bundler and VNode renderer for the Ono static-site generator.
//!
//! ## Pipeline
//!
//! 1. **Resolve**: [`collect_dependencies`] walks the import graph from an entry page and
//!    returns modules in post-order (dependencies first, entry last). Asset imports are graph
//!    leaves; bare specifiers are externals.
//! 2. **Transform**: a [`TransformAdapter`] turns component syntax into plain JS. The default
//!    [`JsxTransform`] lowers JSX to `h(tag, props, ...children)` calls.
//! 3. **Plugins**: [`PluginPipeline`] runs `on_dependencies`, `on_module` and `on_bundle`
//!    hooks in registration order. [`AssetLoaderPlugin`] copies imported assets and rewrites
//!    their imports to public URLs.
//! 4. **Link**: every non-entry module is wrapped in its own scope and published on the
//!    module record; the entry keeps its ESM exports.
//! 5. **Evaluate & render**: [`evaluate`] runs the bundle, the default export is called with
//!    page props and [`render`] serializes the element tree to HTML.
//!
//! ## Errors
//!
//! Every failure is a [`BuildError`] with a stable code (`ONO-ERR-*`); nothing panics on bad
//! input.

pub mod assets;
pub mod builder;
pub mod bundler;
pub mod cache;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod fs;
pub mod linker;
pub mod plugin;
pub mod render;
pub mod resolver;
pub mod syntax;
pub mod transform;
pub mod vnode;

#[cfg(feature = "napi")]
mod bindings;

#[cfg(test)]
mod pipeline_tests;

pub use assets::{copy_asset, generate_file_hash, replace_asset_imports, AssetCache, AssetEntry, AssetLoaderPlugin};
pub use builder::{build_all, build_file, BuildReport, BuiltPage, PageBuilder};
pub use bundler::{bundle, Bundle, Bundler};
pub use cache::TransformCache;
pub use config::BuildOptions;
pub use error::{BuildError, BuildResult};
pub use evaluate::{evaluate, Exports, HostModules};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use plugin::{Plugin, PluginContext, PluginPipeline};
pub use render::render;
pub use resolver::{collect_dependencies, DependencyGraph};
pub use transform::{JsxTransform, TransformAdapter};
pub use vnode::Value;

#[cfg(feature = "napi")]
pub use bindings::{build_all_native, build_file_native, bundle_native};
