//! Owned program representation the interpreter runs.
//!
//! Lowered once from the oxc AST so evaluation never holds the parse arena. Only the
//! language slice component modules use is represented; anything else is rejected while
//! lowering.

use std::rc::Rc;

pub type Name = Rc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        kind: DeclKind,
        declarators: Vec<(Pattern, Option<Expr>)>,
    },
    /// Hoisted to the top of the enclosing block.
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: Option<DeclKind>,
        target: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        kind: Option<DeclKind>,
        target: Pattern,
        object: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Break(Option<Name>),
    Continue(Option<Name>),
    Labeled(Name, Box<Stmt>),
    /// Bare-package import resolved through the host module registry.
    Import {
        source: String,
        bindings: Vec<ImportBinding>,
    },
    /// `(local, exported)` pairs read from module scope after the body has run.
    Export(Vec<(Name, Name)>),
    Empty,
}

#[derive(Debug)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum ImportBinding {
    Default(Name),
    Named { imported: Name, local: Name },
    Namespace(Name),
}

#[derive(Debug, Clone)]
pub enum Lit {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Name),
}

#[derive(Debug)]
pub enum Expr {
    Lit(Lit),
    Template {
        quasis: Vec<Name>,
        exprs: Vec<Expr>,
    },
    Ident(Name),
    This,
    Array(Vec<ArrayItem>),
    Object(Vec<PropItem>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: AssignOp,
        target: Box<Target>,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Target>,
    },
    Member {
        object: Box<Expr>,
        key: MemberKey,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
    },
    /// Boundary of an optional chain: a short-circuit inside yields `undefined` here.
    Chain(Box<Expr>),
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
}

#[derive(Debug)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug)]
pub enum PropItem {
    Init { key: MemberKey, value: Expr },
    Spread(Expr),
}

#[derive(Debug)]
pub enum MemberKey {
    Static(Name),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub enum Target {
    Ident(Name),
    Member { object: Expr, key: MemberKey },
}

#[derive(Debug)]
pub enum Pattern {
    Ident(Name),
    Object {
        props: Vec<(MemberKey, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elems: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default(Box<Pattern>, Box<Expr>),
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Expr),
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<Name>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    pub is_async: bool,
    /// `var` names declared anywhere in the body, hoisted to function scope.
    pub vars: Vec<Name>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Shl,
    Shr,
    UShr,
    BitOr,
    BitXor,
    BitAnd,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// A lowered module: its body plus hoisted `var` names.
#[derive(Debug)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub vars: Vec<Name>,
}
