//! Shared oxc parsing helpers.

use crate::error::{BuildError, BuildResult};
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::path::Path;

/// `.ts` files are parsed without JSX so `<T>(x)` stays a cast; everything else allows JSX.
pub fn source_type_for(path: &Path) -> SourceType {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let source_type = SourceType::default().with_module(true);
    match ext.as_str() {
        "ts" | "mts" | "cts" => source_type.with_typescript(true),
        "tsx" => source_type.with_typescript(true).with_jsx(true),
        _ => source_type.with_jsx(true),
    }
}

pub fn is_typescript(path: &Path) -> bool {
    source_type_for(path).is_typescript()
}

/// Parse `source` as a module. The first parser diagnostic becomes a [`BuildError::Syntax`].
pub fn parse_program<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    file: &Path,
) -> BuildResult<Program<'a>> {
    parse_with(allocator, source, file, source_type_for(file))
}

pub fn parse_with<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    file: &Path,
    source_type: SourceType,
) -> BuildResult<Program<'a>> {
    let ret = Parser::new(allocator, source, source_type).parse();
    if let Some(first) = ret.errors.first() {
        return Err(BuildError::Syntax {
            file: file.to_path_buf(),
            message: first.to_string(),
        });
    }
    if ret.panicked {
        return Err(BuildError::Syntax {
            file: file.to_path_buf(),
            message: "parser aborted".to_string(),
        });
    }
    Ok(ret.program)
}

/// `(start, end, text)` span edit against the original source.
pub type Replacement = (u32, u32, String);

/// Apply non-overlapping span edits, last first so earlier offsets stay valid.
pub fn apply_replacements(source: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by(|a, b| b.0.cmp(&a.0));

    let mut result = source.to_string();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }
    result
}

/// Escape a string for a double-quoted JS string literal.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
