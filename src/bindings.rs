//! Node bindings. JSON in, JSON out.

use crate::builder::PageBuilder;
use crate::bundler::Bundler;
use crate::config::BuildOptions;
use crate::error::BuildError;
use napi_derive::napi;
use serde::Serialize;
use std::path::Path;

fn to_napi(err: BuildError) -> napi::Error {
    napi::Error::from_reason(format!("[{}] {}", err.code(), err))
}

fn options_from(options: Option<serde_json::Value>) -> napi::Result<BuildOptions> {
    match options {
        None | Some(serde_json::Value::Null) => Ok(BuildOptions::default()),
        Some(value) => BuildOptions::from_json_str(&value.to_string()).map_err(to_napi),
    }
}

fn to_json(value: &impl Serialize) -> napi::Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[napi]
pub fn bundle_native(entry: String, options: Option<serde_json::Value>) -> napi::Result<serde_json::Value> {
    let options = options_from(options)?;
    let bundle = Bundler::new(options).bundle(Path::new(&entry)).map_err(to_napi)?;
    to_json(&bundle)
}

#[napi]
pub fn build_file_native(entry: String, options: Option<serde_json::Value>) -> napi::Result<serde_json::Value> {
    let options = options_from(options)?;
    let pages = PageBuilder::new(options)
        .build_file(Path::new(&entry))
        .map_err(to_napi)?;
    to_json(&pages)
}

#[napi]
pub fn build_all_native(pages_dir: String, options: Option<serde_json::Value>) -> napi::Result<serde_json::Value> {
    let options = options_from(options)?;
    let report = PageBuilder::new(options)
        .build_all(Path::new(&pages_dir))
        .map_err(to_napi)?;
    to_json(&report)
}
