//! Transform adapter.
//!
//! [`TransformAdapter`] is the seam between component syntax and the bundler: it turns a
//! module's source into plain function-call source. [`JsxTransform`] is the built-in
//! implementation, a classic-runtime JSX lowering to `h(tag, props, ...children)`.

use crate::config::BuildOptions;
use crate::error::{BuildError, BuildResult};
use crate::syntax::{is_typescript, parse_program};
use lazy_static::lazy_static;
use oxc_allocator::{Allocator, Box as oxc_box, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::walk_expression;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_span::SPAN;
use std::collections::HashMap;
use std::path::Path;

pub trait TransformAdapter: Send + Sync {
    /// Rewrite every element expression into a node-constructor call. Everything else must be
    /// preserved. Failures surface as [`BuildError::TransformFailure`] or [`BuildError::Syntax`].
    fn transform(&self, source: &str, filename: &Path) -> BuildResult<String>;
}

/// Returns the source unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl TransformAdapter for IdentityTransform {
    fn transform(&self, source: &str, _filename: &Path) -> BuildResult<String> {
        Ok(source.to_string())
    }
}

impl<F> TransformAdapter for F
where
    F: Fn(&str, &Path) -> BuildResult<String> + Send + Sync,
{
    fn transform(&self, source: &str, filename: &Path) -> BuildResult<String> {
        self(source, filename)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct JsxTransform {
    pub factory: String,
    pub fragment: String,
}

impl Default for JsxTransform {
    fn default() -> Self {
        Self::new("h", "Fragment")
    }
}

impl JsxTransform {
    pub fn new(factory: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            fragment: fragment.into(),
        }
    }

    pub fn from_options(options: &BuildOptions) -> Self {
        Self::new(options.jsx_factory.clone(), options.jsx_fragment.clone())
    }
}

impl TransformAdapter for JsxTransform {
    fn transform(&self, source: &str, filename: &Path) -> BuildResult<String> {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, source, filename)?;

        let mut lowerer = JsxLowerer::new(&allocator, &self.factory, &self.fragment);
        lowerer.strip_types = is_typescript(filename);
        lowerer.visit_program(&mut program);

        if let Some(message) = lowerer.error.take() {
            return Err(BuildError::TransformFailure {
                file: filename.to_path_buf(),
                message,
            });
        }
        if !lowerer.changed {
            return Ok(source.to_string());
        }
        Ok(Codegen::new().build(&program).code)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERER
// ═══════════════════════════════════════════════════════════════════════════════

struct JsxLowerer<'a> {
    ast: AstBuilder<'a>,
    factory: &'a str,
    fragment: &'a str,
    strip_types: bool,
    changed: bool,
    error: Option<String>,
}

impl<'a> JsxLowerer<'a> {
    fn new(allocator: &'a Allocator, factory: &str, fragment: &str) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
            factory: allocator.alloc_str(factory),
            fragment: allocator.alloc_str(fragment),
            strip_types: false,
            changed: false,
            error: None,
        }
    }

    fn intern(&self, s: &str) -> &'a str {
        self.ast.allocator.alloc_str(s)
    }

    fn string_expr(&self, s: &str) -> Expression<'a> {
        self.ast.expression_string_literal(SPAN, self.intern(s), None)
    }

    fn call_factory(&self, args: oxc_allocator::Vec<'a, Argument<'a>>) -> Expression<'a> {
        self.ast.expression_call(
            SPAN,
            self.ast.expression_identifier(SPAN, self.factory),
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    fn lower_element(&mut self, element: &JSXElement<'a>) -> Expression<'a> {
        let tag = self.lower_tag(&element.opening_element.name);
        let props = self.lower_attributes(&element.opening_element.attributes);

        let mut args = self.ast.vec();
        args.push(Argument::from(tag));
        args.push(Argument::from(props));
        self.lower_children(&element.children, &mut args);
        self.call_factory(args)
    }

    fn lower_fragment(&mut self, fragment: &JSXFragment<'a>) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(
            self.ast.expression_identifier(SPAN, self.fragment),
        ));
        args.push(Argument::from(self.ast.expression_null_literal(SPAN)));
        self.lower_children(&fragment.children, &mut args);
        self.call_factory(args)
    }

    /// Intrinsic tags become strings, components stay references.
    fn lower_tag(&mut self, name: &JSXElementName<'a>) -> Expression<'a> {
        match name {
            JSXElementName::Identifier(id) => self.string_expr(&id.name),
            JSXElementName::IdentifierReference(id) => {
                if is_intrinsic(&id.name) {
                    self.string_expr(&id.name)
                } else {
                    self.ast.expression_identifier(SPAN, id.name)
                }
            }
            JSXElementName::NamespacedName(ns) => {
                self.string_expr(&format!("{}:{}", ns.namespace.name, ns.name.name))
            }
            JSXElementName::MemberExpression(me) => self.lower_member(me),
            JSXElementName::ThisExpression(_) => self.ast.expression_this(SPAN),
        }
    }

    fn lower_member(&mut self, me: &JSXMemberExpression<'a>) -> Expression<'a> {
        let object = match &me.object {
            JSXMemberExpressionObject::IdentifierReference(id) => {
                self.ast.expression_identifier(SPAN, id.name)
            }
            JSXMemberExpressionObject::MemberExpression(inner) => self.lower_member(inner),
            JSXMemberExpressionObject::ThisExpression(_) => self.ast.expression_this(SPAN),
        };
        Expression::from(self.ast.member_expression_static(
            SPAN,
            object,
            self.ast.identifier_name(SPAN, me.property.name),
            false,
        ))
    }

    fn lower_attributes(&mut self, attributes: &[JSXAttributeItem<'a>]) -> Expression<'a> {
        let mut properties = self.ast.vec();

        for item in attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = match &attr.name {
                        JSXAttributeName::Identifier(id) => id.name.to_string(),
                        JSXAttributeName::NamespacedName(ns) => {
                            format!("{}:{}", ns.namespace.name, ns.name.name)
                        }
                    };
                    let key = if is_identifier_name(&name) {
                        PropertyKey::StaticIdentifier(
                            self.ast.alloc(self.ast.identifier_name(SPAN, self.intern(&name))),
                        )
                    } else {
                        PropertyKey::StringLiteral(
                            self.ast.alloc(self.ast.string_literal(SPAN, self.intern(&name), None)),
                        )
                    };

                    let value = match &attr.value {
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            self.string_expr(&decode_entities(&s.value))
                        }
                        Some(JSXAttributeValue::Element(el)) => self.lower_element(el),
                        Some(JSXAttributeValue::Fragment(frag)) => self.lower_fragment(frag),
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            self.lower_expression(&container.expression)
                        }
                        None => self.ast.expression_boolean_literal(SPAN, true),
                    };

                    properties.push(self.ast.object_property_kind_object_property(
                        SPAN,
                        PropertyKind::Init,
                        key,
                        value,
                        false,
                        false,
                        false,
                    ));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let mut argument = spread.argument.clone_in(self.ast.allocator);
                    self.visit_expression(&mut argument);
                    properties.push(self.ast.object_property_kind_spread_property(SPAN, argument));
                }
            }
        }

        if properties.is_empty() {
            self.ast.expression_null_literal(SPAN)
        } else {
            self.ast.expression_object(SPAN, properties)
        }
    }

    fn lower_children(
        &mut self,
        children: &[JSXChild<'a>],
        args: &mut oxc_allocator::Vec<'a, Argument<'a>>,
    ) {
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    if let Some(text) = clean_jsx_text(&t.value) {
                        args.push(Argument::from(self.string_expr(&text)));
                    }
                }
                JSXChild::Element(el) => args.push(Argument::from(self.lower_element(el))),
                JSXChild::Fragment(frag) => args.push(Argument::from(self.lower_fragment(frag))),
                JSXChild::ExpressionContainer(container) => {
                    if matches!(container.expression, JSXExpression::EmptyExpression(_)) {
                        continue;
                    }
                    args.push(Argument::from(self.lower_expression(&container.expression)));
                }
                JSXChild::Spread(spread) => {
                    let mut argument = spread.expression.clone_in(self.ast.allocator);
                    self.visit_expression(&mut argument);
                    args.push(self.ast.argument_spread_element(SPAN, argument));
                }
            }
        }
    }

    fn lower_expression(&mut self, jsx_expr: &JSXExpression<'a>) -> Expression<'a> {
        match jsx_expr
            .as_expression()
            .map(|e| e.clone_in(self.ast.allocator))
        {
            Some(mut e) => {
                self.visit_expression(&mut e);
                e
            }
            None => self.ast.expression_identifier(SPAN, "undefined"),
        }
    }

    fn is_type_only(stmt: &Statement<'a>) -> bool {
        match stmt {
            Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_)
            | Statement::TSModuleDeclaration(_)
            | Statement::TSImportEqualsDeclaration(_)
            | Statement::TSExportAssignment(_)
            | Statement::TSNamespaceExportDeclaration(_) => true,
            Statement::ImportDeclaration(decl) => decl.import_kind.is_type(),
            Statement::ExportNamedDeclaration(decl) => {
                decl.export_kind.is_type()
                    || matches!(
                        decl.declaration,
                        Some(Declaration::TSTypeAliasDeclaration(_))
                            | Some(Declaration::TSInterfaceDeclaration(_))
                            | Some(Declaration::TSModuleDeclaration(_))
                    )
            }
            Statement::ExportAllDeclaration(decl) => decl.export_kind.is_type(),
            Statement::VariableDeclaration(decl) => decl.declare,
            _ => false,
        }
    }
}

impl<'a> VisitMut<'a> for JsxLowerer<'a> {
    fn visit_program(&mut self, program: &mut Program<'a>) {
        if self.strip_types {
            let before = program.body.len();
            program.body.retain(|stmt| !Self::is_type_only(stmt));
            if program.body.len() != before {
                self.changed = true;
            }
            for stmt in &program.body {
                if let Statement::TSEnumDeclaration(decl) = stmt {
                    self.error = Some(format!(
                        "TypeScript enum `{}` has no runtime lowering; use a const object",
                        decl.id.name
                    ));
                    return;
                }
            }
        }
        oxc_ast_visit::walk_mut::walk_program(self, program);
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        match expr {
            Expression::JSXElement(element) => {
                *expr = self.lower_element(element);
                self.changed = true;
            }
            Expression::JSXFragment(fragment) => {
                *expr = self.lower_fragment(fragment);
                self.changed = true;
            }
            Expression::TSAsExpression(inner) if self.strip_types => {
                *expr = inner.expression.clone_in(self.ast.allocator);
                self.changed = true;
                self.visit_expression(expr);
            }
            Expression::TSSatisfiesExpression(inner) if self.strip_types => {
                *expr = inner.expression.clone_in(self.ast.allocator);
                self.changed = true;
                self.visit_expression(expr);
            }
            Expression::TSNonNullExpression(inner) if self.strip_types => {
                *expr = inner.expression.clone_in(self.ast.allocator);
                self.changed = true;
                self.visit_expression(expr);
            }
            Expression::TSTypeAssertion(inner) if self.strip_types => {
                *expr = inner.expression.clone_in(self.ast.allocator);
                self.changed = true;
                self.visit_expression(expr);
            }
            _ => walk_expression(self, expr),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_intrinsic(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase()) || name.contains('-')
}

fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// JSX text whitespace: lines are trimmed where they meet a line break, whitespace-only
/// lines vanish and the surviving lines are joined with a single space.
pub fn clean_jsx_text(raw: &str) -> Option<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|l| l.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if !trimmed.is_empty() {
            if i != last_non_empty {
                trimmed.push(' ');
            }
            out.push_str(&trimmed);
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(decode_entities(&out))
    }
}

lazy_static! {
    static ref NAMED_ENTITIES: HashMap<&'static str, char> = {
        let mut m = HashMap::new();
        m.insert("amp", '&');
        m.insert("lt", '<');
        m.insert("gt", '>');
        m.insert("quot", '"');
        m.insert("apos", '\'');
        m.insert("nbsp", '\u{a0}');
        m.insert("copy", '©');
        m.insert("reg", '®');
        m.insert("trade", '™');
        m.insert("hellip", '…');
        m.insert("mdash", '—');
        m.insert("ndash", '–');
        m.insert("lsquo", '‘');
        m.insert("rsquo", '’');
        m.insert("ldquo", '“');
        m.insert("rdquo", '”');
        m.insert("laquo", '«');
        m.insert("raquo", '»');
        m.insert("middot", '·');
        m.insert("bull", '•');
        m.insert("larr", '←');
        m.insert("rarr", '→');
        m.insert("uarr", '↑');
        m.insert("darr", '↓');
        m.insert("harr", '↔');
        m.insert("times", '×');
        m.insert("divide", '÷');
        m.insert("deg", '°');
        m.insert("euro", '€');
        m.insert("pound", '£');
        m.insert("yen", '¥');
        m.insert("sect", '§');
        m.insert("para", '¶');
        m.insert("check", '✓');
        m.insert("hearts", '♥');
        m.insert("star", '☆');
        m
    };
}

/// Decode HTML character references. Unknown references are kept verbatim.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&end| end <= 10).and_then(|end| {
            let name = &after[..end];
            let ch = if let Some(num) = name.strip_prefix('#') {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            } else {
                NAMED_ENTITIES.get(name).copied()
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str) -> String {
        JsxTransform::default()
            .transform(src, Path::new("/t/page.jsx"))
            .unwrap()
    }

    fn compact(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_intrinsic_element_becomes_string_tag() {
        let out = lower("const a = <div class=\"x\">hi</div>;");
        let out = compact(&out);
        assert!(out.contains("h(\"div\", {"), "{out}");
        assert!(out.contains("class: \"x\""), "{out}");
        assert!(out.contains("\"hi\")"), "{out}");
    }

    #[test]
    fn test_component_tag_is_reference() {
        let out = lower("const a = <Card title={t} />;");
        let out = compact(&out);
        assert!(out.contains("h(Card, {"), "{out}");
        assert!(out.contains("title: t"), "{out}");
    }

    #[test]
    fn test_empty_props_are_null() {
        let out = lower("const a = <br />;");
        assert!(compact(&out).contains("h(\"br\", null)"), "{out}");
    }

    #[test]
    fn test_fragment_uses_marker() {
        let out = lower("const a = <><p /></>;");
        assert!(compact(&out).contains("h(Fragment, null, h(\"p\", null))"), "{out}");
    }

    #[test]
    fn test_custom_factory() {
        let out = JsxTransform::new("createElement", "Frag")
            .transform("const a = <><i /></>;", Path::new("/t/a.jsx"))
            .unwrap();
        assert!(compact(&out).contains("createElement(Frag, null, createElement(\"i\", null))"));
    }

    #[test]
    fn test_dashed_attribute_gets_string_key() {
        let out = lower("const a = <div data-id=\"1\" aria-label=\"x\" hidden />;");
        let out = compact(&out);
        assert!(out.contains("\"data-id\": \"1\""), "{out}");
        assert!(out.contains("hidden: true"), "{out}");
    }

    #[test]
    fn test_spreads_preserved() {
        let out = compact(&lower("const a = <Btn {...props} x={1}>{...items}</Btn>;"));
        assert!(out.contains("...props"), "{out}");
        assert!(out.contains("...items"), "{out}");
    }

    #[test]
    fn test_nested_jsx_in_expression() {
        let out = compact(&lower("const a = <ul>{items.map(i => <li>{i}</li>)}</ul>;"));
        assert!(out.contains("h(\"li\", null, i)"), "{out}");
        assert!(!out.contains("<li>"), "{out}");
    }

    #[test]
    fn test_empty_expression_child_skipped() {
        let out = compact(&lower("const a = <p>{/* note */}</p>;"));
        assert!(out.contains("h(\"p\", null)"), "{out}");
    }

    #[test]
    fn test_non_jsx_source_untouched() {
        let src = "export const add = (a, b) => a + b; // keep formatting\n";
        assert_eq!(lower(src), src);
    }

    #[test]
    fn test_member_tag() {
        let out = compact(&lower("const a = <UI.Button />;"));
        assert!(out.contains("h(UI.Button, null)"), "{out}");
    }

    #[test]
    fn test_typescript_declarations_stripped() {
        let src = "import type { P } from './types';\ninterface Props { a: string }\ntype X = number;\nexport const v = (y as number)!;\n";
        let out = JsxTransform::default()
            .transform(src, Path::new("/t/mod.ts"))
            .unwrap();
        assert!(!out.contains("interface"), "{out}");
        assert!(!out.contains("type X"), "{out}");
        assert!(!out.contains("./types"), "{out}");
        assert!(!out.contains(" as "), "{out}");
    }

    #[test]
    fn test_enum_is_transform_failure() {
        let err = JsxTransform::default()
            .transform("enum Color { Red }", Path::new("/t/c.ts"))
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_TRANSFORM);
    }

    #[test]
    fn test_jsx_whitespace_rule() {
        assert_eq!(clean_jsx_text("\n    Hello\n    world\n  "), Some("Hello world".to_string()));
        assert_eq!(clean_jsx_text("  a  b  "), Some("  a  b  ".to_string()));
        assert_eq!(clean_jsx_text("\n   \n  "), None);
        assert_eq!(clean_jsx_text("Hi "), Some("Hi ".to_string()));
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(decode_entities("&larr; Back &amp; forth"), "← Back & forth");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("AT&T &unknown;"), "AT&T &unknown;");
    }
}
