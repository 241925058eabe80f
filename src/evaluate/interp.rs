//! Tree-walking interpreter over the lowered IR.
//!
//! Scopes live in an arena owned by the [`Realm`]; closures refer to their scope by index and
//! hold the realm weakly, so a realm and everything it created is released together.
//! `await` is synchronous: async functions return their result directly.

use super::builtins;
use super::ir::*;
use crate::vnode::{Callable, JsResult, Thrown, Value};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

const THIS: &str = "this";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

struct Binding {
    value: Value,
    mutable: bool,
}

struct ScopeData {
    vars: HashMap<Name, Binding>,
    parent: Option<ScopeId>,
}

pub struct Realm {
    scopes: RefCell<Vec<ScopeData>>,
    depth: Cell<usize>,
    max_depth: usize,
    global: ScopeId,
}

impl Realm {
    pub fn new(max_depth: usize) -> Rc<Realm> {
        let root = ScopeData {
            vars: HashMap::new(),
            parent: None,
        };
        Rc::new(Realm {
            scopes: RefCell::new(vec![root]),
            depth: Cell::new(0),
            max_depth,
            global: ScopeId(0),
        })
    }

    pub fn global(&self) -> ScopeId {
        self.global
    }

    pub fn new_scope(&self, parent: ScopeId) -> ScopeId {
        let mut scopes = self.scopes.borrow_mut();
        scopes.push(ScopeData {
            vars: HashMap::new(),
            parent: Some(parent),
        });
        ScopeId(scopes.len() - 1)
    }

    pub fn declare(&self, scope: ScopeId, name: &str, value: Value, mutable: bool) {
        let mut scopes = self.scopes.borrow_mut();
        if let Some(data) = scopes.get_mut(scope.0) {
            data.vars.insert(Rc::from(name), Binding { value, mutable });
        }
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let scopes = self.scopes.borrow();
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = scopes.get(id.0)?;
            if let Some(binding) = data.vars.get(name) {
                return Some(binding.value.clone());
            }
            current = data.parent;
        }
        None
    }

    /// Own binding of `scope` only, without walking parents.
    pub fn get_own(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let scopes = self.scopes.borrow();
        scopes.get(scope.0)?.vars.get(name).map(|b| b.value.clone())
    }

    fn assign(&self, scope: ScopeId, name: &str, value: Value) -> JsResult<()> {
        let mut scopes = self.scopes.borrow_mut();
        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(data) = scopes.get_mut(id.0) else { break };
            if let Some(binding) = data.vars.get_mut(name) {
                if !binding.mutable {
                    return Err(Thrown::type_error("Assignment to constant variable."));
                }
                binding.value = value;
                return Ok(());
            }
            current = data.parent;
        }
        Err(Thrown::reference_error(format!("{} is not defined", name)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOSURES
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Closure {
    def: Rc<FunctionDef>,
    scope: ScopeId,
    realm: Weak<Realm>,
}

impl Callable for Closure {
    fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or("anonymous")
    }

    fn call(&self, this: &Value, args: Vec<Value>) -> JsResult<Value> {
        let realm = self
            .realm
            .upgrade()
            .ok_or_else(|| Thrown::error("Error", "function called after its module was released"))?;
        Interp::new(realm).call_function(&self.def, self.scope, this.clone(), args)
    }

    fn is_constructor(&self) -> bool {
        !self.def.is_arrow && !self.def.is_async
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

enum Flow {
    Normal,
    Return(Value),
    Break(Option<Name>),
    Continue(Option<Name>),
}

enum Bind {
    Declare { mutable: bool },
    Assign,
}

impl Bind {
    fn for_kind(kind: Option<DeclKind>) -> Bind {
        match kind {
            Some(DeclKind::Const) => Bind::Declare { mutable: false },
            Some(DeclKind::Let) => Bind::Declare { mutable: true },
            Some(DeclKind::Var) | None => Bind::Assign,
        }
    }
}

/// What a loop body asked for.
enum LoopStep {
    Next,
    Exit(Flow),
}

fn loop_step(flow: Flow, label: Option<&Name>) -> LoopStep {
    match flow {
        Flow::Normal => LoopStep::Next,
        Flow::Continue(None) => LoopStep::Next,
        Flow::Continue(Some(l)) if Some(&l) == label => LoopStep::Next,
        Flow::Break(None) => LoopStep::Exit(Flow::Normal),
        Flow::Break(Some(l)) if Some(&l) == label => LoopStep::Exit(Flow::Normal),
        other => LoopStep::Exit(other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Interp {
    realm: Rc<Realm>,
}

impl Interp {
    pub fn new(realm: Rc<Realm>) -> Self {
        Self { realm }
    }

    /// Run a module body in `scope`. `var` names are hoisted first.
    pub fn run_module(&self, program: &Program, scope: ScopeId) -> JsResult<()> {
        for var in &program.vars {
            if self.realm.get_own(scope, var).is_none() {
                self.realm.declare(scope, var, Value::Undefined, true);
            }
        }
        match self.exec_block(&program.body, scope)? {
            Flow::Normal => Ok(()),
            _ => Err(Thrown::error("SyntaxError", "illegal top-level control flow")),
        }
    }

    fn closure(&self, def: &Rc<FunctionDef>, scope: ScopeId) -> Value {
        Value::Function(Rc::new(Closure {
            def: def.clone(),
            scope,
            realm: Rc::downgrade(&self.realm),
        }))
    }

    pub fn call_function(&self, def: &FunctionDef, captured: ScopeId, this: Value, args: Vec<Value>) -> JsResult<Value> {
        let depth = self.realm.depth.get();
        if depth >= self.realm.max_depth {
            return Err(Thrown::error("RangeError", "Maximum call stack size exceeded"));
        }
        self.realm.depth.set(depth + 1);
        let result = self.invoke(def, captured, this, args);
        self.realm.depth.set(depth);
        result
    }

    fn invoke(&self, def: &FunctionDef, captured: ScopeId, this: Value, args: Vec<Value>) -> JsResult<Value> {
        let scope = self.realm.new_scope(captured);
        if !def.is_arrow {
            self.realm.declare(scope, THIS, this, false);
        }
        for var in &def.vars {
            self.realm.declare(scope, var, Value::Undefined, true);
        }
        let mut args = args.into_iter();
        for param in &def.params {
            let value = args.next().unwrap_or_default();
            self.bind_pattern(param, value, scope, &Bind::Declare { mutable: true })?;
        }
        if let Some(rest) = &def.rest {
            self.bind_pattern(rest, Value::array(args.collect()), scope, &Bind::Declare { mutable: true })?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, scope),
            FunctionBody::Block(body) => match self.exec_block(body, scope)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    pub fn call_value(&self, callee: &Value, this: Value, args: Vec<Value>) -> JsResult<Value> {
        match callee {
            Value::Function(f) => f.call(&this, args),
            other => Err(Thrown::type_error(format!("{} is not a function", describe(other)))),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn exec_block(&self, body: &[Stmt], scope: ScopeId) -> JsResult<Flow> {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    self.realm.declare(scope, name, self.closure(def, scope), true);
                }
            }
        }
        for stmt in body {
            match self.exec(stmt, scope, None)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, scope: ScopeId, label: Option<&Name>) -> JsResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            Stmt::Decl { kind, declarators } => {
                for (pattern, init) in declarators {
                    if *kind == DeclKind::Var && init.is_none() {
                        continue;
                    }
                    let value = match init {
                        Some(e) => self.eval(e, scope)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(pattern, value, scope, &Bind::for_kind(Some(*kind)))?;
                }
            }
            Stmt::Function(_) | Stmt::Import { .. } | Stmt::Export(_) | Stmt::Empty => {}
            Stmt::Return(arg) => {
                let value = match arg {
                    Some(e) => self.eval(e, scope)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    return self.exec_nested(consequent, scope);
                } else if let Some(alt) = alternate {
                    return self.exec_nested(alt, scope);
                }
            }
            Stmt::Block(body) => {
                let inner = self.realm.new_scope(scope);
                return self.exec_block(body, inner);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => return self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope, label),
            Stmt::ForOf {
                kind,
                target,
                iterable,
                body,
            } => {
                let items = iterate(&self.eval(iterable, scope)?)?;
                return self.exec_each(items, *kind, target, body, scope, label);
            }
            Stmt::ForIn {
                kind,
                target,
                object,
                body,
            } => {
                let keys = own_keys(&self.eval(object, scope)?)
                    .into_iter()
                    .map(Value::string)
                    .collect();
                return self.exec_each(keys, *kind, target, body, scope, label);
            }
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.is_truthy() {
                    if let LoopStep::Exit(flow) = loop_step(self.exec_nested(body, scope)?, label) {
                        return Ok(flow);
                    }
                }
            }
            Stmt::DoWhile { body, test } => loop {
                if let LoopStep::Exit(flow) = loop_step(self.exec_nested(body, scope)?, label) {
                    return Ok(flow);
                }
                if !self.eval(test, scope)?.is_truthy() {
                    break;
                }
            },
            Stmt::Switch { discriminant, cases } => return self.exec_switch(discriminant, cases, scope),
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => return self.exec_try(block, param.as_ref(), handler.as_deref(), finalizer.as_deref(), scope),
            Stmt::Throw(expr) => return Err(Thrown(self.eval(expr, scope)?)),
            Stmt::Break(l) => return Ok(Flow::Break(l.clone())),
            Stmt::Continue(l) => return Ok(Flow::Continue(l.clone())),
            Stmt::Labeled(name, body) => {
                return match self.exec(body, scope, Some(name))? {
                    Flow::Break(Some(l)) if &l == name => Ok(Flow::Normal),
                    other => Ok(other),
                };
            }
        }
        Ok(Flow::Normal)
    }

    /// A single-statement body gets its own scope when it declares anything.
    fn exec_nested(&self, stmt: &Stmt, scope: ScopeId) -> JsResult<Flow> {
        match stmt {
            Stmt::Decl { .. } | Stmt::Function(_) => {
                let inner = self.realm.new_scope(scope);
                self.exec_block(std::slice::from_ref(stmt), inner)
            }
            other => self.exec(other, scope, None),
        }
    }

    fn exec_for(
        &self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: ScopeId,
        label: Option<&Name>,
    ) -> JsResult<Flow> {
        let loop_scope = self.realm.new_scope(scope);
        let mut per_iteration: Vec<Name> = Vec::new();
        if let Some(init) = init {
            if let Stmt::Decl {
                kind: DeclKind::Let,
                declarators,
            } = init
            {
                for (pattern, _) in declarators {
                    pattern_names(pattern, &mut per_iteration);
                }
            }
            self.exec(init, loop_scope, None)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, loop_scope)?.is_truthy() {
                    break;
                }
            }
            // Each iteration sees its own copy of `let` bindings.
            let iteration = self.realm.new_scope(loop_scope);
            for name in &per_iteration {
                let value = self.realm.get_own(loop_scope, name).unwrap_or_default();
                self.realm.declare(iteration, name, value, true);
            }
            let flow = self.exec_nested(body, iteration)?;
            for name in &per_iteration {
                let value = self.realm.get_own(iteration, name).unwrap_or_default();
                self.realm.declare(loop_scope, name, value, true);
            }
            if let LoopStep::Exit(flow) = loop_step(flow, label) {
                return Ok(flow);
            }
            if let Some(update) = update {
                self.eval(update, loop_scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_each(
        &self,
        items: Vec<Value>,
        kind: Option<DeclKind>,
        target: &Pattern,
        body: &Stmt,
        scope: ScopeId,
        label: Option<&Name>,
    ) -> JsResult<Flow> {
        let bind = Bind::for_kind(kind);
        for item in items {
            let iteration = self.realm.new_scope(scope);
            self.bind_pattern(target, item, iteration, &bind)?;
            if let LoopStep::Exit(flow) = loop_step(self.exec_nested(body, iteration)?, label) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(&self, discriminant: &Expr, cases: &[SwitchCase], scope: ScopeId) -> JsResult<Flow> {
        let value = self.eval(discriminant, scope)?;
        let inner = self.realm.new_scope(scope);
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, inner)?.strict_equals(&value) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        for case in &cases[start..] {
            match self.exec_block(&case.body, inner)? {
                Flow::Normal => {}
                Flow::Break(None) => return Ok(Flow::Normal),
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &self,
        block: &[Stmt],
        param: Option<&Pattern>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        scope: ScopeId,
    ) -> JsResult<Flow> {
        let inner = self.realm.new_scope(scope);
        let mut result = self.exec_block(block, inner);
        if let (Err(thrown), Some(handler)) = (&result, handler) {
            let catch_scope = self.realm.new_scope(scope);
            let caught = thrown.0.clone();
            result = match param {
                Some(p) => self
                    .bind_pattern(p, caught, catch_scope, &Bind::Declare { mutable: true })
                    .and_then(|_| self.exec_block(handler, catch_scope)),
                None => self.exec_block(handler, catch_scope),
            };
        }
        if let Some(finalizer) = finalizer {
            let finally_scope = self.realm.new_scope(scope);
            match self.exec_block(finalizer, finally_scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BINDINGS
    // ═══════════════════════════════════════════════════════════════════════════

    fn bind_pattern(&self, pattern: &Pattern, value: Value, scope: ScopeId, bind: &Bind) -> JsResult<()> {
        match pattern {
            Pattern::Ident(name) => match bind {
                Bind::Declare { mutable } => {
                    self.realm.declare(scope, name, value, *mutable);
                    Ok(())
                }
                Bind::Assign => self.realm.assign(scope, name, value),
            },
            Pattern::Default(inner, default) => {
                let value = match value {
                    Value::Undefined => self.eval(default, scope)?,
                    other => other,
                };
                self.bind_pattern(inner, value, scope, bind)
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(Thrown::type_error(format!("Cannot destructure '{}'", value.to_js_string())));
                }
                let mut used = Vec::with_capacity(props.len());
                for (key, target) in props {
                    let key = self.member_key(key, scope)?;
                    let item = get_property(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(target, item, scope, bind)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = IndexMap::new();
                    if let Value::Object(obj) = &value {
                        for (k, v) in obj.borrow().iter() {
                            if !used.contains(k) {
                                remaining.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    self.bind_pattern(rest, Value::object(remaining), scope, bind)?;
                }
                Ok(())
            }
            Pattern::Array { elems, rest } => {
                let items = iterate(&value)?;
                let mut items = items.into_iter();
                for elem in elems {
                    let item = items.next().unwrap_or_default();
                    if let Some(target) = elem {
                        self.bind_pattern(target, item, scope, bind)?;
                    }
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, Value::array(items.collect()), scope, bind)?;
                }
                Ok(())
            }
        }
    }

    fn member_key(&self, key: &MemberKey, scope: ScopeId) -> JsResult<String> {
        match key {
            MemberKey::Static(name) => Ok(name.to_string()),
            MemberKey::Computed(expr) => Ok(property_key(&self.eval(expr, scope)?)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn eval(&self, expr: &Expr, scope: ScopeId) -> JsResult<Value> {
        match expr {
            Expr::Lit(lit) => Ok(match lit {
                Lit::Undefined => Value::Undefined,
                Lit::Null => Value::Null,
                Lit::Bool(b) => Value::Bool(*b),
                Lit::Number(n) => Value::Number(*n),
                Lit::String(s) => Value::String(s.clone()),
            }),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        out.push_str(&self.eval(e, scope)?.to_js_string());
                    }
                }
                Ok(Value::string(out))
            }
            Expr::Ident(name) => self
                .realm
                .lookup(scope, name)
                .ok_or_else(|| Thrown::reference_error(format!("{} is not defined", name))),
            Expr::This => Ok(self.realm.lookup(scope, THIS).unwrap_or_default()),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(props) => {
                let mut entries = IndexMap::new();
                for prop in props {
                    match prop {
                        PropItem::Init { key, value } => {
                            let key = self.member_key(key, scope)?;
                            let value = self.eval(value, scope)?;
                            entries.insert(key, value);
                        }
                        PropItem::Spread(e) => spread_into(&self.eval(e, scope)?, &mut entries),
                    }
                }
                Ok(Value::object(entries))
            }
            Expr::Function(def) => Ok(self.closure(def, scope)),
            Expr::Unary(op, arg) => self.eval_unary(*op, arg, scope),
            Expr::Binary(op, left, right) => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                binary(*op, &l, &r)
            }
            Expr::Logical(op, left, right) => {
                let l = self.eval(left, scope)?;
                let short = match op {
                    LogicalOp::And => !l.is_truthy(),
                    LogicalOp::Or => l.is_truthy(),
                    LogicalOp::Coalesce => !l.is_nullish(),
                };
                if short {
                    Ok(l)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.read_target(target, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_target(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Member { .. } | Expr::Call { .. } | Expr::Chain(_) => {
                Ok(self.eval_optional(expr, scope)?.unwrap_or_default())
            }
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_items(args, scope)?;
                self.construct(&constructor, args)
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval(e, scope)?;
                }
                Ok(last)
            }
            Expr::Await(arg) => self.eval(arg, scope),
        }
    }

    /// `None` means an optional link short-circuited.
    fn eval_optional(&self, expr: &Expr, scope: ScopeId) -> JsResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                key,
                optional,
            } => {
                let Some(obj) = self.eval_optional(object, scope)? else {
                    return Ok(None);
                };
                if *optional && obj.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(key, scope)?;
                get_property(&obj, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (this, func) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        key,
                        optional: member_optional,
                    } => {
                        let Some(obj) = self.eval_optional(object, scope)? else {
                            return Ok(None);
                        };
                        if *member_optional && obj.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.member_key(key, scope)?;
                        let func = get_property(&obj, &key)?;
                        if !*optional && func.as_function().is_none() {
                            return Err(Thrown::type_error(format!(
                                "{}.{} is not a function",
                                describe(&obj),
                                key
                            )));
                        }
                        (obj, func)
                    }
                    other => match self.eval_optional(other, scope)? {
                        Some(func) => (Value::Undefined, func),
                        None => return Ok(None),
                    },
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_items(args, scope)?;
                self.call_value(&func, this, args).map(Some)
            }
            Expr::Chain(inner) => Ok(Some(self.eval_optional(inner, scope)?.unwrap_or_default())),
            other => self.eval(other, scope).map(Some),
        }
    }

    fn eval_items(&self, items: &[ArrayItem], scope: ScopeId) -> JsResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(e) => out.push(self.eval(e, scope)?),
                ArrayItem::Spread(e) => out.extend(iterate(&self.eval(e, scope)?)?),
                ArrayItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    fn eval_unary(&self, op: UnaryOp, arg: &Expr, scope: ScopeId) -> JsResult<Value> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = arg {
                    if self.realm.lookup(scope, name).is_none() {
                        return Ok(Value::string("undefined"));
                    }
                }
                Ok(Value::string(self.eval(arg, scope)?.type_of()))
            }
            UnaryOp::Delete => {
                if let Expr::Member { object, key, .. } = arg {
                    let obj = self.eval(object, scope)?;
                    let key = self.member_key(key, scope)?;
                    if let Value::Object(entries) = &obj {
                        entries.borrow_mut().shift_remove(&key);
                    }
                }
                Ok(Value::Bool(true))
            }
            _ => {
                let value = self.eval(arg, scope)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.to_number()))),
                    _ => Value::Undefined,
                })
            }
        }
    }

    fn eval_assign(&self, op: AssignOp, target: &Target, value: &Expr, scope: ScopeId) -> JsResult<Value> {
        let new = match op {
            AssignOp::Assign => self.eval(value, scope)?,
            AssignOp::Binary(bin) => {
                let current = self.read_target(target, scope)?;
                binary(bin, &current, &self.eval(value, scope)?)?
            }
            AssignOp::Logical(logical) => {
                let current = self.read_target(target, scope)?;
                let keep = match logical {
                    LogicalOp::And => !current.is_truthy(),
                    LogicalOp::Or => current.is_truthy(),
                    LogicalOp::Coalesce => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval(value, scope)?
            }
        };
        self.write_target(target, new.clone(), scope)?;
        Ok(new)
    }

    fn read_target(&self, target: &Target, scope: ScopeId) -> JsResult<Value> {
        match target {
            Target::Ident(name) => self
                .realm
                .lookup(scope, name)
                .ok_or_else(|| Thrown::reference_error(format!("{} is not defined", name))),
            Target::Member { object, key } => {
                let obj = self.eval(object, scope)?;
                let key = self.member_key(key, scope)?;
                get_property(&obj, &key)
            }
        }
    }

    fn write_target(&self, target: &Target, value: Value, scope: ScopeId) -> JsResult<()> {
        match target {
            Target::Ident(name) => self.realm.assign(scope, name, value),
            Target::Member { object, key } => {
                let obj = self.eval(object, scope)?;
                let key = self.member_key(key, scope)?;
                set_property(&obj, &key, value)
            }
        }
    }

    fn construct(&self, constructor: &Value, args: Vec<Value>) -> JsResult<Value> {
        let Value::Function(func) = constructor else {
            return Err(Thrown::type_error(format!("{} is not a constructor", describe(constructor))));
        };
        if !func.is_constructor() {
            return func.call(&Value::Undefined, args);
        }
        let this = Value::empty_object();
        let result = func.call(&this, args)?;
        Ok(match result {
            Value::Object(_) | Value::Array(_) => result,
            _ => this,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTY ACCESS & OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Function(f) => f.name().to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
        other => other.to_js_string(),
    }
}

pub fn property_key(value: &Value) -> String {
    match value {
        Value::Symbol(key) => format!("@@{}", key),
        other => other.to_js_string(),
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

pub fn get_property(value: &Value, key: &str) -> JsResult<Value> {
    match value {
        Value::Undefined | Value::Null => Err(Thrown::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            value.to_js_string(),
            key
        ))),
        Value::Object(obj) => {
            if let Some(v) = obj.borrow().get(key) {
                return Ok(v.clone());
            }
            Ok(builtins::object_method(key).unwrap_or_default())
        }
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.borrow().len() as f64));
            }
            if let Some(i) = array_index(key) {
                return Ok(items.borrow().get(i).cloned().unwrap_or_default());
            }
            Ok(builtins::array_method(key).unwrap_or_default())
        }
        Value::String(s) => {
            if key == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            if let Some(i) = array_index(key) {
                return Ok(s.chars().nth(i).map(|c| Value::string(c.to_string())).unwrap_or_default());
            }
            Ok(builtins::string_method(key).unwrap_or_default())
        }
        Value::Number(_) => Ok(builtins::number_method(key).unwrap_or_default()),
        Value::Bool(_) => Ok(builtins::object_method(key).unwrap_or_default()),
        Value::Function(f) => {
            if let Some(v) = f.property(key) {
                return Ok(v);
            }
            if key == "name" {
                return Ok(Value::string(f.name()));
            }
            Ok(builtins::function_method(key).unwrap_or_default())
        }
        Value::Symbol(sym) => Ok(if key == "description" {
            Value::String(sym.clone())
        } else {
            Value::Undefined
        }),
    }
}

pub fn set_property(target: &Value, key: &str, value: Value) -> JsResult<()> {
    match target {
        Value::Undefined | Value::Null => Err(Thrown::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            target.to_js_string(),
            key
        ))),
        Value::Object(obj) => {
            obj.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = builtins::array_length(value.to_number())?;
                items.resize(len, Value::Undefined);
                return Ok(());
            }
            if let Some(i) = array_index(key) {
                if i >= items.len() {
                    builtins::array_length(i as f64 + 1.0)?;
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Values a `for...of` or spread walks.
pub fn iterate(value: &Value) -> JsResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        other => Err(Thrown::type_error(format!("{} is not iterable", describe(other)))),
    }
}

pub fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.borrow().keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

pub fn spread_into(value: &Value, entries: &mut IndexMap<String, Value>) {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj.borrow().iter() {
                entries.insert(k.clone(), v.clone());
            }
        }
        Value::Array(items) => {
            for (i, v) in items.borrow().iter().enumerate() {
                entries.insert(i.to_string(), v.clone());
            }
        }
        Value::String(s) => {
            for (i, c) in s.chars().enumerate() {
                entries.insert(i.to_string(), Value::string(c.to_string()));
            }
        }
        _ => {}
    }
}

fn pattern_names(pattern: &Pattern, out: &mut Vec<Name>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Default(inner, _) => pattern_names(inner, out),
        Pattern::Object { props, rest } => {
            for (_, p) in props {
                pattern_names(p, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Array { elems, rest } => {
            for p in elems.iter().flatten() {
                pattern_names(p, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
    }
}

pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) => Value::string(value.to_js_string()),
        other => other.clone(),
    }
}

fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    let (l, r) = (to_primitive(l), to_primitive(r));
    match (&l, &r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> JsResult<Value> {
    use std::cmp::Ordering::*;
    Ok(match op {
        BinaryOp::Add => {
            let (lp, rp) = (to_primitive(l), to_primitive(r));
            match (&lp, &rp) {
                (Value::String(_), _) | (_, Value::String(_)) => {
                    let (ls, rs) = (lp.to_js_string(), rp.to_js_string());
                    builtins::check_string_length((ls.len() + rs.len()) as f64)?;
                    Value::string(format!("{}{}", ls, rs))
                }
                _ => Value::Number(lp.to_number() + rp.to_number()),
            }
        }
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Exp => Value::Number(l.to_number().powf(r.to_number())),
        BinaryOp::Eq => Value::Bool(l.loose_equals(r)),
        BinaryOp::NotEq => Value::Bool(!l.loose_equals(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_equals(r)),
        BinaryOp::StrictNotEq => Value::Bool(!l.strict_equals(r)),
        BinaryOp::Lt => Value::Bool(compare(l, r) == Some(Less)),
        BinaryOp::LtEq => Value::Bool(matches!(compare(l, r), Some(Less | Equal))),
        BinaryOp::Gt => Value::Bool(compare(l, r) == Some(Greater)),
        BinaryOp::GtEq => Value::Bool(matches!(compare(l, r), Some(Greater | Equal))),
        BinaryOp::Shl => Value::Number(f64::from(to_int32(l.to_number()).wrapping_shl(to_uint32(r.to_number()) & 31))),
        BinaryOp::Shr => Value::Number(f64::from(to_int32(l.to_number()) >> (to_uint32(r.to_number()) & 31))),
        BinaryOp::UShr => Value::Number(f64::from(to_uint32(l.to_number()) >> (to_uint32(r.to_number()) & 31))),
        BinaryOp::BitOr => Value::Number(f64::from(to_int32(l.to_number()) | to_int32(r.to_number()))),
        BinaryOp::BitXor => Value::Number(f64::from(to_int32(l.to_number()) ^ to_int32(r.to_number()))),
        BinaryOp::BitAnd => Value::Number(f64::from(to_int32(l.to_number()) & to_int32(r.to_number()))),
        BinaryOp::In => {
            let key = property_key(l);
            match r {
                Value::Object(obj) => Value::Bool(obj.borrow().contains_key(&key)),
                Value::Array(items) => Value::Bool(
                    key == "length" || array_index(&key).map(|i| i < items.borrow().len()).unwrap_or(false),
                ),
                other => {
                    return Err(Thrown::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        key,
                        describe(other)
                    )))
                }
            }
        }
        BinaryOp::Instanceof => match r {
            Value::Function(f) => Value::Bool(builtins::instance_of(l, f.name())),
            other => {
                return Err(Thrown::type_error(format!(
                    "Right-hand side of 'instanceof' is not callable: {}",
                    describe(other)
                )))
            }
        },
    })
}
