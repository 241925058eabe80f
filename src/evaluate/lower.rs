//! oxc AST to evaluator IR.

use super::ir::{self, *};
use crate::assets::export_name;
use crate::error::{BuildError, BuildResult};
use crate::vnode::number_to_string;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, AssignmentOperator, AssignmentTarget, BindingPattern,
    BindingRestElement, ChainElement, Declaration, ExportDefaultDeclarationKind, Expression,
    ForStatementInit, ForStatementLeft, FormalParameter, FormalParameters, Function,
    ImportDeclarationSpecifier, ObjectPropertyKind, PropertyKey, PropertyKind,
    SimpleAssignmentTarget, Statement, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Local name the anonymous `export default` value is bound to.
pub const DEFAULT_LOCAL: &str = "*default*";

fn name(s: &str) -> Name {
    Rc::from(s)
}

pub fn lower_program(program: &oxc_ast::ast::Program<'_>, file: &Path) -> BuildResult<ir::Program> {
    let mut lowerer = Lowerer {
        file: file.to_path_buf(),
        vars: vec![Vec::new()],
    };
    let mut body = Vec::with_capacity(program.body.len());
    for stmt in &program.body {
        lowerer.module_item(stmt, &mut body)?;
    }
    let vars = lowerer.vars.pop().unwrap_or_default();
    Ok(ir::Program { body, vars })
}

struct Lowerer {
    file: PathBuf,
    /// One frame per function being lowered.
    vars: Vec<Vec<Name>>,
}

impl Lowerer {
    fn unsupported<T>(&self, what: &str) -> BuildResult<T> {
        Err(BuildError::evaluation(format!(
            "{}: {} is not supported by the page evaluator",
            self.file.display(),
            what
        )))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MODULE ITEMS
    // ═══════════════════════════════════════════════════════════════════════════

    fn module_item(&mut self, stmt: &Statement<'_>, out: &mut Vec<Stmt>) -> BuildResult<()> {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if decl.import_kind.is_type() {
                    return Ok(());
                }
                let source = decl.source.value.to_string();
                if source.starts_with('.') || source.starts_with('/') {
                    return Err(BuildError::evaluation(format!(
                        "{}: unlinked local import `{}`",
                        self.file.display(),
                        source
                    )));
                }
                let mut bindings = Vec::new();
                for spec in decl.specifiers.iter().flatten() {
                    match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            bindings.push(ImportBinding::Default(name(&s.local.name)));
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            bindings.push(ImportBinding::Namespace(name(&s.local.name)));
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            bindings.push(ImportBinding::Named {
                                imported: name(export_name(&s.imported)),
                                local: name(&s.local.name),
                            });
                        }
                    }
                }
                out.push(Stmt::Import { source, bindings });
                Ok(())
            }
            Statement::ExportNamedDeclaration(export) => {
                if export.export_kind.is_type() {
                    return Ok(());
                }
                if export.source.is_some() {
                    return self.unsupported("re-export from a package");
                }
                if let Some(decl) = &export.declaration {
                    let names = match decl {
                        Declaration::VariableDeclaration(var) => {
                            out.push(self.var_decl(var)?);
                            var.declarations
                                .iter()
                                .flat_map(|d| binding_names(&d.id))
                                .collect()
                        }
                        Declaration::FunctionDeclaration(func) => {
                            let def = self.function(func)?;
                            let local = def.name.clone();
                            out.push(Stmt::Function(def));
                            local.into_iter().collect()
                        }
                        Declaration::ClassDeclaration(_) => return self.unsupported("class"),
                        _ => Vec::new(),
                    };
                    out.push(Stmt::Export(names.into_iter().map(|n| (n.clone(), n)).collect()));
                }
                let pairs: Vec<(Name, Name)> = export
                    .specifiers
                    .iter()
                    .filter(|s| !s.export_kind.is_type())
                    .map(|s| (name(export_name(&s.local)), name(export_name(&s.exported))))
                    .collect();
                if !pairs.is_empty() {
                    out.push(Stmt::Export(pairs));
                }
                Ok(())
            }
            Statement::ExportDefaultDeclaration(export) => {
                match &export.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        let def = self.function(func)?;
                        let local = def.name.clone().unwrap_or_else(|| name(DEFAULT_LOCAL));
                        if def.name.is_some() {
                            out.push(Stmt::Function(def));
                        } else {
                            out.push(Stmt::Decl {
                                kind: DeclKind::Const,
                                declarators: vec![(Pattern::Ident(local.clone()), Some(Expr::Function(def)))],
                            });
                        }
                        out.push(Stmt::Export(vec![(local, name("default"))]));
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(_) => return self.unsupported("class"),
                    kind => {
                        if let Some(expr) = kind.as_expression() {
                            let value = self.expr(expr)?;
                            out.push(Stmt::Decl {
                                kind: DeclKind::Const,
                                declarators: vec![(Pattern::Ident(name(DEFAULT_LOCAL)), Some(value))],
                            });
                            out.push(Stmt::Export(vec![(name(DEFAULT_LOCAL), name("default"))]));
                        }
                    }
                }
                Ok(())
            }
            Statement::ExportAllDeclaration(_) => self.unsupported("`export *` in the entry module"),
            other => {
                out.push(self.stmt(other)?);
                Ok(())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn block(&mut self, stmts: &[Statement<'_>]) -> BuildResult<Vec<Stmt>> {
        stmts.iter().map(|s| self.stmt(s)).collect()
    }

    fn stmt(&mut self, stmt: &Statement<'_>) -> BuildResult<Stmt> {
        Ok(match stmt {
            Statement::ExpressionStatement(s) => Stmt::Expr(self.expr(&s.expression)?),
            Statement::VariableDeclaration(var) => self.var_decl(var)?,
            Statement::FunctionDeclaration(func) => Stmt::Function(self.function(func)?),
            Statement::ReturnStatement(ret) => Stmt::Return(ret.argument.as_ref().map(|e| self.expr(e)).transpose()?),
            Statement::IfStatement(s) => Stmt::If {
                test: self.expr(&s.test)?,
                consequent: Box::new(self.stmt(&s.consequent)?),
                alternate: s.alternate.as_ref().map(|a| self.stmt(a).map(Box::new)).transpose()?,
            },
            Statement::BlockStatement(b) => Stmt::Block(self.block(&b.body)?),
            Statement::ForStatement(s) => {
                let init = match &s.init {
                    None => None,
                    Some(ForStatementInit::VariableDeclaration(var)) => Some(Box::new(self.var_decl(var)?)),
                    Some(other) => match other.as_expression() {
                        Some(e) => Some(Box::new(Stmt::Expr(self.expr(e)?))),
                        None => return self.unsupported("for-loop initializer"),
                    },
                };
                Stmt::For {
                    init,
                    test: s.test.as_ref().map(|e| self.expr(e)).transpose()?,
                    update: s.update.as_ref().map(|e| self.expr(e)).transpose()?,
                    body: Box::new(self.stmt(&s.body)?),
                }
            }
            Statement::ForOfStatement(s) => {
                if s.r#await {
                    return self.unsupported("for await");
                }
                let (kind, target) = self.for_left(&s.left)?;
                Stmt::ForOf {
                    kind,
                    target,
                    iterable: self.expr(&s.right)?,
                    body: Box::new(self.stmt(&s.body)?),
                }
            }
            Statement::ForInStatement(s) => {
                let (kind, target) = self.for_left(&s.left)?;
                Stmt::ForIn {
                    kind,
                    target,
                    object: self.expr(&s.right)?,
                    body: Box::new(self.stmt(&s.body)?),
                }
            }
            Statement::WhileStatement(s) => Stmt::While {
                test: self.expr(&s.test)?,
                body: Box::new(self.stmt(&s.body)?),
            },
            Statement::DoWhileStatement(s) => Stmt::DoWhile {
                body: Box::new(self.stmt(&s.body)?),
                test: self.expr(&s.test)?,
            },
            Statement::SwitchStatement(s) => {
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in &s.cases {
                    cases.push(SwitchCase {
                        test: case.test.as_ref().map(|e| self.expr(e)).transpose()?,
                        body: self.block(&case.consequent)?,
                    });
                }
                Stmt::Switch {
                    discriminant: self.expr(&s.discriminant)?,
                    cases,
                }
            }
            Statement::TryStatement(s) => {
                let block = self.block(&s.block.body)?;
                let (param, handler) = match &s.handler {
                    Some(clause) => {
                        let param = clause.param.as_ref().map(|p| self.pattern(&p.pattern)).transpose()?;
                        (param, Some(self.block(&clause.body.body)?))
                    }
                    None => (None, None),
                };
                let finalizer = s.finalizer.as_ref().map(|f| self.block(&f.body)).transpose()?;
                Stmt::Try {
                    block,
                    param,
                    handler,
                    finalizer,
                }
            }
            Statement::ThrowStatement(s) => Stmt::Throw(self.expr(&s.argument)?),
            Statement::BreakStatement(s) => Stmt::Break(s.label.as_ref().map(|l| name(&l.name))),
            Statement::ContinueStatement(s) => Stmt::Continue(s.label.as_ref().map(|l| name(&l.name))),
            Statement::LabeledStatement(s) => Stmt::Labeled(name(&s.label.name), Box::new(self.stmt(&s.body)?)),
            Statement::EmptyStatement(_) | Statement::DebuggerStatement(_) => Stmt::Empty,
            Statement::ClassDeclaration(_) => return self.unsupported("class"),
            Statement::WithStatement(_) => return self.unsupported("with"),
            Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_)
            | Statement::TSModuleDeclaration(_)
            | Statement::TSImportEqualsDeclaration(_)
            | Statement::TSNamespaceExportDeclaration(_)
            | Statement::TSExportAssignment(_) => Stmt::Empty,
            Statement::TSEnumDeclaration(_) => return self.unsupported("enum"),
            Statement::ImportDeclaration(_)
            | Statement::ExportNamedDeclaration(_)
            | Statement::ExportDefaultDeclaration(_)
            | Statement::ExportAllDeclaration(_) => return self.unsupported("nested module declaration"),
            #[allow(unreachable_patterns)]
            _ => return self.unsupported("statement"),
        })
    }

    fn decl_kind(&mut self, kind: VariableDeclarationKind) -> BuildResult<DeclKind> {
        match kind {
            VariableDeclarationKind::Var => Ok(DeclKind::Var),
            VariableDeclarationKind::Let => Ok(DeclKind::Let),
            VariableDeclarationKind::Const => Ok(DeclKind::Const),
            _ => self.unsupported("`using` declaration"),
        }
    }

    fn var_decl(&mut self, var: &VariableDeclaration<'_>) -> BuildResult<Stmt> {
        if var.declare {
            return Ok(Stmt::Empty);
        }
        let kind = self.decl_kind(var.kind)?;
        let mut declarators = Vec::with_capacity(var.declarations.len());
        for d in &var.declarations {
            if kind == DeclKind::Var {
                let names = binding_names(&d.id);
                if let Some(frame) = self.vars.last_mut() {
                    frame.extend(names);
                }
            }
            let pattern = self.pattern(&d.id)?;
            let init = d.init.as_ref().map(|e| self.expr(e)).transpose()?;
            declarators.push((pattern, init));
        }
        Ok(Stmt::Decl { kind, declarators })
    }

    fn for_left(&mut self, left: &ForStatementLeft<'_>) -> BuildResult<(Option<DeclKind>, Pattern)> {
        match left {
            ForStatementLeft::VariableDeclaration(var) => {
                let kind = self.decl_kind(var.kind)?;
                let Some(d) = var.declarations.first() else {
                    return self.unsupported("empty loop declaration");
                };
                if kind == DeclKind::Var {
                    let names = binding_names(&d.id);
                    if let Some(frame) = self.vars.last_mut() {
                        frame.extend(names);
                    }
                }
                Ok((Some(kind), self.pattern(&d.id)?))
            }
            ForStatementLeft::AssignmentTargetIdentifier(id) => Ok((None, Pattern::Ident(name(&id.name)))),
            _ => self.unsupported("loop target"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTIONS & PATTERNS
    // ═══════════════════════════════════════════════════════════════════════════

    fn function(&mut self, func: &Function<'_>) -> BuildResult<Rc<FunctionDef>> {
        if func.generator {
            return self.unsupported("generator");
        }
        self.vars.push(Vec::new());
        let params = self.params(&func.params);
        let body = match &func.body {
            Some(body) => self.block(&body.statements).map(FunctionBody::Block),
            None => Ok(FunctionBody::Block(Vec::new())),
        };
        let vars = self.vars.pop().unwrap_or_default();
        let (params, rest) = params?;
        Ok(Rc::new(FunctionDef {
            name: func.id.as_ref().map(|id| name(&id.name)),
            params,
            rest,
            body: body?,
            is_arrow: false,
            is_async: func.r#async,
            vars,
        }))
    }

    fn arrow(&mut self, arrow: &oxc_ast::ast::ArrowFunctionExpression<'_>) -> BuildResult<Rc<FunctionDef>> {
        self.vars.push(Vec::new());
        let params = self.params(&arrow.params);
        let body = if arrow.expression {
            match arrow.body.statements.first() {
                Some(Statement::ExpressionStatement(s)) => self.expr(&s.expression).map(FunctionBody::Expr),
                _ => Ok(FunctionBody::Expr(Expr::Lit(Lit::Undefined))),
            }
        } else {
            self.block(&arrow.body.statements).map(FunctionBody::Block)
        };
        let vars = self.vars.pop().unwrap_or_default();
        let (params, rest) = params?;
        Ok(Rc::new(FunctionDef {
            name: None,
            params,
            rest,
            body: body?,
            is_arrow: true,
            is_async: arrow.r#async,
            vars,
        }))
    }

    fn params(&mut self, params: &FormalParameters<'_>) -> BuildResult<(Vec<Pattern>, Option<Pattern>)> {
        let mut out = Vec::with_capacity(params.items.len());
        for param in &params.items {
            let pattern = self.pattern(&param.pattern)?;
            out.push(match self.param_default(param)? {
                Some(default) => Pattern::Default(Box::new(pattern), Box::new(default)),
                None => pattern,
            });
        }
        let rest = match &params.rest {
            Some(rest) => {
                let span = rest.span();
                let mut probe = RestProbe {
                    lowerer: self,
                    start: span.start,
                    end: span.end,
                    found: None,
                };
                probe.visit_formal_parameters(params);
                probe.found.transpose()?
            }
            None => None,
        };
        Ok((out, rest))
    }

    /// Initializer written after the binding, e.g. `(a = 1)`.
    fn param_default(&mut self, param: &FormalParameter<'_>) -> BuildResult<Option<Expr>> {
        let pattern_end = param.pattern.span().end;
        if param.span.end <= pattern_end {
            return Ok(None);
        }
        let mut probe = DefaultProbe {
            lowerer: self,
            after: pattern_end,
            found: None,
        };
        probe.visit_formal_parameter(param);
        probe.found.transpose()
    }

    fn pattern(&mut self, pattern: &BindingPattern<'_>) -> BuildResult<Pattern> {
        Ok(match pattern {
            BindingPattern::BindingIdentifier(id) => Pattern::Ident(name(&id.name)),
            BindingPattern::ObjectPattern(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    let key = self.property_key(&prop.key, prop.computed)?;
                    props.push((key, self.pattern(&prop.value)?));
                }
                let rest = obj.rest.as_ref().map(|r| self.pattern(&r.argument).map(Box::new)).transpose()?;
                Pattern::Object { props, rest }
            }
            BindingPattern::ArrayPattern(arr) => {
                let mut elems = Vec::with_capacity(arr.elements.len());
                for elem in &arr.elements {
                    elems.push(elem.as_ref().map(|p| self.pattern(p)).transpose()?);
                }
                let rest = arr.rest.as_ref().map(|r| self.pattern(&r.argument).map(Box::new)).transpose()?;
                Pattern::Array { elems, rest }
            }
            BindingPattern::AssignmentPattern(assign) => Pattern::Default(
                Box::new(self.pattern(&assign.left)?),
                Box::new(self.expr(&assign.right)?),
            ),
        })
    }

    fn property_key(&mut self, key: &PropertyKey<'_>, computed: bool) -> BuildResult<MemberKey> {
        if !computed {
            match key {
                PropertyKey::StaticIdentifier(id) => return Ok(MemberKey::Static(name(&id.name))),
                PropertyKey::StringLiteral(s) => return Ok(MemberKey::Static(name(&s.value))),
                PropertyKey::NumericLiteral(n) => return Ok(MemberKey::Static(name(&number_to_string(n.value)))),
                _ => {}
            }
        }
        match key.as_expression() {
            Some(e) => Ok(MemberKey::Computed(Box::new(self.expr(e)?))),
            None => self.unsupported("private property"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn args(&mut self, args: &[Argument<'_>]) -> BuildResult<Vec<ArrayItem>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(match arg {
                Argument::SpreadElement(s) => ArrayItem::Spread(self.expr(&s.argument)?),
                other => match other.as_expression() {
                    Some(e) => ArrayItem::Item(self.expr(e)?),
                    None => return self.unsupported("argument"),
                },
            });
        }
        Ok(out)
    }

    fn boxed(&mut self, expr: &Expression<'_>) -> BuildResult<Box<Expr>> {
        self.expr(expr).map(Box::new)
    }

    fn expr(&mut self, expr: &Expression<'_>) -> BuildResult<Expr> {
        Ok(match expr {
            Expression::BooleanLiteral(b) => Expr::Lit(Lit::Bool(b.value)),
            Expression::NullLiteral(_) => Expr::Lit(Lit::Null),
            Expression::NumericLiteral(n) => Expr::Lit(Lit::Number(n.value)),
            Expression::StringLiteral(s) => Expr::Lit(Lit::String(name(&s.value))),
            Expression::TemplateLiteral(t) => {
                let quasis = t
                    .quasis
                    .iter()
                    .map(|q| name(q.value.cooked.as_ref().map(|c| c.as_str()).unwrap_or(q.value.raw.as_str())))
                    .collect();
                let exprs = t.expressions.iter().map(|e| self.expr(e)).collect::<BuildResult<_>>()?;
                Expr::Template { quasis, exprs }
            }
            Expression::Identifier(id) => Expr::Ident(name(&id.name)),
            Expression::ThisExpression(_) => Expr::This,
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for elem in &arr.elements {
                    items.push(match elem {
                        ArrayExpressionElement::SpreadElement(s) => ArrayItem::Spread(self.expr(&s.argument)?),
                        ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(e) => ArrayItem::Item(self.expr(e)?),
                            None => return self.unsupported("array element"),
                        },
                    });
                }
                Expr::Array(items)
            }
            Expression::ObjectExpression(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    props.push(match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if p.kind != PropertyKind::Init {
                                return self.unsupported("getter or setter");
                            }
                            PropItem::Init {
                                key: self.property_key(&p.key, p.computed)?,
                                value: self.expr(&p.value)?,
                            }
                        }
                        ObjectPropertyKind::SpreadProperty(s) => PropItem::Spread(self.expr(&s.argument)?),
                    });
                }
                Expr::Object(props)
            }
            Expression::FunctionExpression(func) => Expr::Function(self.function(func)?),
            Expression::ArrowFunctionExpression(arrow) => Expr::Function(self.arrow(arrow)?),
            Expression::UnaryExpression(u) => {
                let op = match u.operator {
                    UnaryOperator::UnaryNegation => UnaryOp::Neg,
                    UnaryOperator::UnaryPlus => UnaryOp::Plus,
                    UnaryOperator::LogicalNot => UnaryOp::Not,
                    UnaryOperator::BitwiseNot => UnaryOp::BitNot,
                    UnaryOperator::Typeof => UnaryOp::Typeof,
                    UnaryOperator::Void => UnaryOp::Void,
                    UnaryOperator::Delete => UnaryOp::Delete,
                };
                Expr::Unary(op, self.boxed(&u.argument)?)
            }
            Expression::BinaryExpression(b) => {
                Expr::Binary(binary_op(b.operator), self.boxed(&b.left)?, self.boxed(&b.right)?)
            }
            Expression::LogicalExpression(l) => {
                let op = match l.operator {
                    LogicalOperator::And => LogicalOp::And,
                    LogicalOperator::Or => LogicalOp::Or,
                    LogicalOperator::Coalesce => LogicalOp::Coalesce,
                };
                Expr::Logical(op, self.boxed(&l.left)?, self.boxed(&l.right)?)
            }
            Expression::ConditionalExpression(c) => Expr::Conditional(
                self.boxed(&c.test)?,
                self.boxed(&c.consequent)?,
                self.boxed(&c.alternate)?,
            ),
            Expression::AssignmentExpression(a) => {
                let op = match a.operator {
                    AssignmentOperator::Assign => AssignOp::Assign,
                    AssignmentOperator::Addition => AssignOp::Binary(BinaryOp::Add),
                    AssignmentOperator::Subtraction => AssignOp::Binary(BinaryOp::Sub),
                    AssignmentOperator::Multiplication => AssignOp::Binary(BinaryOp::Mul),
                    AssignmentOperator::Division => AssignOp::Binary(BinaryOp::Div),
                    AssignmentOperator::Remainder => AssignOp::Binary(BinaryOp::Rem),
                    AssignmentOperator::Exponential => AssignOp::Binary(BinaryOp::Exp),
                    AssignmentOperator::ShiftLeft => AssignOp::Binary(BinaryOp::Shl),
                    AssignmentOperator::ShiftRight => AssignOp::Binary(BinaryOp::Shr),
                    AssignmentOperator::ShiftRightZeroFill => AssignOp::Binary(BinaryOp::UShr),
                    AssignmentOperator::BitwiseOR => AssignOp::Binary(BinaryOp::BitOr),
                    AssignmentOperator::BitwiseXOR => AssignOp::Binary(BinaryOp::BitXor),
                    AssignmentOperator::BitwiseAnd => AssignOp::Binary(BinaryOp::BitAnd),
                    AssignmentOperator::LogicalAnd => AssignOp::Logical(LogicalOp::And),
                    AssignmentOperator::LogicalOr => AssignOp::Logical(LogicalOp::Or),
                    AssignmentOperator::LogicalNullish => AssignOp::Logical(LogicalOp::Coalesce),
                };
                let target = match &a.left {
                    AssignmentTarget::AssignmentTargetIdentifier(id) => Target::Ident(name(&id.name)),
                    AssignmentTarget::StaticMemberExpression(m) => Target::Member {
                        object: self.expr(&m.object)?,
                        key: MemberKey::Static(name(&m.property.name)),
                    },
                    AssignmentTarget::ComputedMemberExpression(m) => Target::Member {
                        object: self.expr(&m.object)?,
                        key: MemberKey::Computed(self.boxed(&m.expression)?),
                    },
                    _ => return self.unsupported("destructuring assignment"),
                };
                Expr::Assign {
                    op,
                    target: Box::new(target),
                    value: self.boxed(&a.right)?,
                }
            }
            Expression::UpdateExpression(u) => {
                let target = match &u.argument {
                    SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => Target::Ident(name(&id.name)),
                    SimpleAssignmentTarget::StaticMemberExpression(m) => Target::Member {
                        object: self.expr(&m.object)?,
                        key: MemberKey::Static(name(&m.property.name)),
                    },
                    SimpleAssignmentTarget::ComputedMemberExpression(m) => Target::Member {
                        object: self.expr(&m.object)?,
                        key: MemberKey::Computed(self.boxed(&m.expression)?),
                    },
                    _ => return self.unsupported("update target"),
                };
                Expr::Update {
                    increment: u.operator == UpdateOperator::Increment,
                    prefix: u.prefix,
                    target: Box::new(target),
                }
            }
            Expression::StaticMemberExpression(m) => Expr::Member {
                object: self.boxed(&m.object)?,
                key: MemberKey::Static(name(&m.property.name)),
                optional: m.optional,
            },
            Expression::ComputedMemberExpression(m) => Expr::Member {
                object: self.boxed(&m.object)?,
                key: MemberKey::Computed(self.boxed(&m.expression)?),
                optional: m.optional,
            },
            Expression::CallExpression(c) => Expr::Call {
                callee: self.boxed(&c.callee)?,
                args: self.args(&c.arguments)?,
                optional: c.optional,
            },
            Expression::NewExpression(n) => Expr::New {
                callee: self.boxed(&n.callee)?,
                args: self.args(&n.arguments)?,
            },
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::CallExpression(c) => Expr::Call {
                        callee: self.boxed(&c.callee)?,
                        args: self.args(&c.arguments)?,
                        optional: c.optional,
                    },
                    ChainElement::StaticMemberExpression(m) => Expr::Member {
                        object: self.boxed(&m.object)?,
                        key: MemberKey::Static(name(&m.property.name)),
                        optional: m.optional,
                    },
                    ChainElement::ComputedMemberExpression(m) => Expr::Member {
                        object: self.boxed(&m.object)?,
                        key: MemberKey::Computed(self.boxed(&m.expression)?),
                        optional: m.optional,
                    },
                    ChainElement::TSNonNullExpression(e) => self.expr(&e.expression)?,
                    _ => return self.unsupported("private field"),
                };
                Expr::Chain(Box::new(inner))
            }
            Expression::SequenceExpression(s) => {
                Expr::Sequence(s.expressions.iter().map(|e| self.expr(e)).collect::<BuildResult<_>>()?)
            }
            Expression::ParenthesizedExpression(p) => self.expr(&p.expression)?,
            Expression::AwaitExpression(a) => Expr::Await(self.boxed(&a.argument)?),
            Expression::TSAsExpression(e) => self.expr(&e.expression)?,
            Expression::TSSatisfiesExpression(e) => self.expr(&e.expression)?,
            Expression::TSTypeAssertion(e) => self.expr(&e.expression)?,
            Expression::TSNonNullExpression(e) => self.expr(&e.expression)?,
            Expression::TSInstantiationExpression(e) => self.expr(&e.expression)?,
            Expression::JSXElement(_) | Expression::JSXFragment(_) => {
                return self.unsupported("untransformed JSX")
            }
            Expression::ClassExpression(_) => return self.unsupported("class"),
            Expression::RegExpLiteral(_) => return self.unsupported("regular expression"),
            Expression::BigIntLiteral(_) => return self.unsupported("BigInt"),
            Expression::TaggedTemplateExpression(_) => return self.unsupported("tagged template"),
            Expression::YieldExpression(_) => return self.unsupported("yield"),
            Expression::ImportExpression(_) => return self.unsupported("dynamic import"),
            _ => return self.unsupported("expression"),
        })
    }
}

fn binary_op(op: BinaryOperator) -> BinaryOp {
    match op {
        BinaryOperator::Equality => BinaryOp::Eq,
        BinaryOperator::Inequality => BinaryOp::NotEq,
        BinaryOperator::StrictEquality => BinaryOp::StrictEq,
        BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
        BinaryOperator::LessThan => BinaryOp::Lt,
        BinaryOperator::LessEqualThan => BinaryOp::LtEq,
        BinaryOperator::GreaterThan => BinaryOp::Gt,
        BinaryOperator::GreaterEqualThan => BinaryOp::GtEq,
        BinaryOperator::Addition => BinaryOp::Add,
        BinaryOperator::Subtraction => BinaryOp::Sub,
        BinaryOperator::Multiplication => BinaryOp::Mul,
        BinaryOperator::Division => BinaryOp::Div,
        BinaryOperator::Remainder => BinaryOp::Rem,
        BinaryOperator::Exponential => BinaryOp::Exp,
        BinaryOperator::ShiftLeft => BinaryOp::Shl,
        BinaryOperator::ShiftRight => BinaryOp::Shr,
        BinaryOperator::ShiftRightZeroFill => BinaryOp::UShr,
        BinaryOperator::BitwiseOR => BinaryOp::BitOr,
        BinaryOperator::BitwiseXOR => BinaryOp::BitXor,
        BinaryOperator::BitwiseAnd => BinaryOp::BitAnd,
        BinaryOperator::In => BinaryOp::In,
        BinaryOperator::Instanceof => BinaryOp::Instanceof,
    }
}

fn binding_names(pattern: &BindingPattern<'_>) -> Vec<Name> {
    let mut out = Vec::new();
    crate::linker::binding_names(pattern, &mut out);
    out.iter().map(|n| name(n)).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETER PROBES
// ═══════════════════════════════════════════════════════════════════════════════

/// Lowers the outermost rest element inside the rest parameter's span.
struct RestProbe<'l> {
    lowerer: &'l mut Lowerer,
    start: u32,
    end: u32,
    found: Option<BuildResult<Pattern>>,
}

impl<'a, 'l> Visit<'a> for RestProbe<'l> {
    fn visit_binding_rest_element(&mut self, it: &BindingRestElement<'a>) {
        if self.found.is_none() && it.span.start >= self.start && it.span.end <= self.end {
            self.found = Some(self.lowerer.pattern(&it.argument));
            return;
        }
        walk::walk_binding_rest_element(self, it);
    }
}

/// Lowers the first expression that starts after the parameter's binding.
struct DefaultProbe<'l> {
    lowerer: &'l mut Lowerer,
    after: u32,
    found: Option<BuildResult<Expr>>,
}

impl<'a, 'l> Visit<'a> for DefaultProbe<'l> {
    fn visit_expression(&mut self, it: &Expression<'a>) {
        if self.found.is_some() {
            return;
        }
        if it.span().start >= self.after {
            self.found = Some(self.lowerer.expr(it));
            return;
        }
        walk::walk_expression(self, it);
    }
}
