//! Tree-walking evaluator.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::ast::{
    AssignOp, BinaryOp, DeclKind, Expr, FnBody, ForHead, FunctionDef, Item, LogicalOp, Pattern,
    Prop, PropKey, Stmt, SwitchCase, TemplatePart, UnaryOp,
};
use super::builtins::{self, MAX_STRING_LENGTH};
use super::dom_api;
use super::parser::parse_program;
use super::value::{
    console_format, describe, loose_equals, strict_equals, to_js_string, to_number,
    to_property_key, Binding, Closure, Ctor, Env, ErrorKind, HostRef, Scope, Value,
};
use super::{SandboxLimits, ScriptFault, MAX_NESTING};
use crate::console::Console;
use crate::host::HostPage;

/// Stack reserved for the worker thread that evaluates scripts.
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Nested statement and expression evaluations allowed across all active
/// calls together.
const MAX_EVAL_NESTING: usize = 2 * MAX_NESTING;

/// Minimum scope count at which dead scope handles are pruned.
const SCOPE_PRUNE_THRESHOLD: usize = 4096;

const STEP_LIMIT_MESSAGE: &str = "Execution step limit exceeded (possible infinite loop)";
const CALL_DEPTH_MESSAGE: &str = "Maximum call stack size exceeded";

/// Non-local exits from evaluation.
#[derive(Debug)]
pub enum Interrupt {
    /// A thrown value; `try`/`catch` can intercept it.
    Throw(Value),
    /// An exhausted budget or early error; never catchable.
    Abort(ScriptFault),
    /// An optional chain met a nullish base.
    ShortCircuit,
}

pub type Eval<T> = Result<T, Interrupt>;

/// Throws a built-in error.
pub fn throw<T>(kind: ErrorKind, message: impl AsRef<str>) -> Eval<T> {
    Err(Interrupt::Throw(Value::error(kind.name(), message.as_ref())))
}

fn abort<T>(fault: ScriptFault) -> Eval<T> {
    Err(Interrupt::Abort(fault))
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum BindMode {
    /// Create or initialize a binding in the given scope.
    Declare { mutable: bool },
    /// Assign to an existing binding found through the scope chain.
    Assign,
}

enum Place {
    Name(String),
    Property(Value, String),
}

/// Runs `task` against a fresh interpreter on a worker thread with a
/// large stack, so deeply nested scripts cannot overflow the caller's.
pub fn run_isolated<R, F>(
    console: &mut Console,
    page: Option<&mut HostPage>,
    limits: SandboxLimits,
    task: F,
) -> Result<R, ScriptFault>
where
    R: Send,
    F: FnOnce(&mut Interpreter<'_>) -> Result<R, ScriptFault> + Send,
{
    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("kata-script".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn_scoped(scope, move || {
                let mut interp = Interpreter::new(console, page, limits);
                task(&mut interp)
            })
            .map_err(|e| {
                ScriptFault::new("InternalError", format!("failed to start script worker: {e}"))
            })?;
        worker.join().unwrap_or_else(|_| {
            tracing::error!("script worker panicked");
            Err(ScriptFault::new("InternalError", "script evaluation panicked"))
        })
    })
}

/// Evaluates scripts against a console and, for DOM exercises, a page.
pub struct Interpreter<'h> {
    globals: Env,
    console: &'h mut Console,
    page: Option<&'h mut HostPage>,
    limits: SandboxLimits,
    steps: u64,
    depth: usize,
    nesting: usize,
    scopes: Vec<Weak<RefCell<Scope>>>,
    prune_at: usize,
}

impl<'h> Interpreter<'h> {
    /// Creates an interpreter. `document` is defined only when a page is
    /// supplied.
    pub fn new(
        console: &'h mut Console,
        page: Option<&'h mut HostPage>,
        limits: SandboxLimits,
    ) -> Self {
        let builtins_env = Rc::new(RefCell::new(Scope::default()));
        {
            let mut scope = builtins_env.borrow_mut();
            for (name, value) in builtins::globals(page.is_some()) {
                let mutable = !matches!(name, "undefined" | "NaN" | "Infinity");
                scope.vars.insert(
                    name.to_string(),
                    Binding {
                        value,
                        mutable,
                        initialized: true,
                        lexical: false,
                    },
                );
            }
        }
        let globals = Scope::child(&builtins_env);
        let scopes = vec![Rc::downgrade(&builtins_env), Rc::downgrade(&globals)];
        Self {
            globals,
            console,
            page,
            limits,
            steps: 0,
            nesting: 0,
            depth: 0,
            scopes,
            prune_at: SCOPE_PRUNE_THRESHOLD,
        }
    }

    /// Runs a program and returns the value of its last top-level
    /// expression statement.
    pub fn run(&mut self, source: &str) -> Result<Value, ScriptFault> {
        let program = parse_program(source)?;
        self.exec_program(&program).map_err(Self::fault)
    }

    /// Calls a script function with the given arguments.
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, ScriptFault> {
        self.call_value(func, Value::Undefined, args)
            .map_err(Self::fault)
    }

    /// Reads a global binding.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals
            .borrow()
            .vars
            .get(name)
            .filter(|binding| binding.initialized)
            .map(|binding| binding.value.clone())
    }

    /// Returns the number of evaluation steps taken so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    pub(super) fn console(&mut self) -> &mut Console {
        self.console
    }

    pub(super) fn page(&self) -> Option<&HostPage> {
        self.page.as_deref()
    }

    pub(super) fn page_mut(&mut self) -> Option<&mut HostPage> {
        self.page.as_deref_mut()
    }

    fn fault(interrupt: Interrupt) -> ScriptFault {
        match interrupt {
            Interrupt::Throw(value) => match value.as_error() {
                Some((name, message)) => ScriptFault::new(name, message),
                None => ScriptFault::new("Error", console_format(&value)),
            },
            Interrupt::Abort(fault) => fault,
            Interrupt::ShortCircuit => {
                ScriptFault::new("InternalError", "optional chain escaped its expression")
            }
        }
    }

    /// Runs one level of recursive evaluation, bounding how deep the
    /// evaluator may recurse on the worker stack.
    fn nested<T>(&mut self, eval: impl FnOnce(&mut Self) -> Eval<T>) -> Eval<T> {
        if self.nesting >= MAX_EVAL_NESTING {
            return abort(ScriptFault::range(CALL_DEPTH_MESSAGE));
        }
        self.nesting += 1;
        let result = eval(self);
        self.nesting -= 1;
        result
    }

    pub(super) fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return abort(ScriptFault::range(STEP_LIMIT_MESSAGE));
        }
        Ok(())
    }

    // ========================================================================
    // Scopes and bindings
    // ========================================================================

    fn new_scope(&mut self, parent: &Env) -> Env {
        let scope = Scope::child(parent);
        if self.scopes.len() >= self.prune_at {
            self.scopes.retain(|weak| weak.strong_count() > 0);
            self.prune_at = (self.scopes.len() * 2).max(SCOPE_PRUNE_THRESHOLD);
        }
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    fn find_scope(env: &Env, name: &str) -> Option<Env> {
        let mut current = Rc::clone(env);
        loop {
            let parent = {
                let scope = current.borrow();
                if scope.vars.contains_key(name) {
                    return Some(Rc::clone(&current));
                }
                scope.parent.clone()
            };
            current = parent?;
        }
    }

    fn lookup(env: &Env, name: &str) -> Eval<Value> {
        let Some(scope) = Self::find_scope(env, name) else {
            return throw(ErrorKind::ReferenceError, format!("{name} is not defined"));
        };
        let scope = scope.borrow();
        match scope.vars.get(name) {
            Some(binding) if binding.initialized => Ok(binding.value.clone()),
            _ => throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            ),
        }
    }

    fn this_value(env: &Env) -> Value {
        Self::find_scope(env, "this")
            .and_then(|scope| scope.borrow().vars.get("this").map(|b| b.value.clone()))
            .unwrap_or(Value::Undefined)
    }

    fn assign_name(env: &Env, name: &str, value: Value) -> Eval<()> {
        let Some(scope) = Self::find_scope(env, name) else {
            return throw(ErrorKind::ReferenceError, format!("{name} is not defined"));
        };
        let mut scope = scope.borrow_mut();
        let Some(binding) = scope.vars.get_mut(name) else {
            return throw(ErrorKind::ReferenceError, format!("{name} is not defined"));
        };
        if !binding.initialized {
            return throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            );
        }
        if !binding.mutable {
            return throw(ErrorKind::TypeError, "Assignment to constant variable.");
        }
        binding.value = value;
        Ok(())
    }

    fn declare_name(env: &Env, name: &str, value: Value, mutable: bool) {
        env.borrow_mut().vars.insert(
            name.to_string(),
            Binding {
                value,
                mutable,
                initialized: true,
                lexical: true,
            },
        );
    }

    fn already_declared<T>(name: &str) -> Eval<T> {
        abort(ScriptFault::syntax(format!(
            "Identifier '{name}' has already been declared"
        )))
    }

    /// Hoists `var` declarations found anywhere in `stmts` (but not in
    /// nested functions) into `env`.
    fn hoist_vars(env: &Env, stmts: &[Stmt]) -> Eval<()> {
        let mut names = Vec::new();
        collect_var_names(stmts, &mut names);
        let mut scope = env.borrow_mut();
        for name in names {
            match scope.vars.get(&name) {
                Some(binding) if binding.lexical => return Self::already_declared(&name),
                Some(_) => {}
                None => {
                    scope.vars.insert(
                        name,
                        Binding {
                            value: Value::Undefined,
                            mutable: true,
                            initialized: true,
                            lexical: false,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Declares the block's `let`/`const` bindings (uninitialized) and its
    /// function declarations (initialized).
    fn declare_block<'a>(
        &mut self,
        env: &Env,
        stmts: impl IntoIterator<Item = &'a Stmt>,
    ) -> Eval<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Decl(kind @ (DeclKind::Let | DeclKind::Const), decls) => {
                    let mut names = Vec::new();
                    for (pattern, _) in decls {
                        pattern.bound_names(&mut names);
                    }
                    let mut scope = env.borrow_mut();
                    for name in names {
                        if scope.vars.contains_key(&name) {
                            return Self::already_declared(&name);
                        }
                        scope.vars.insert(
                            name,
                            Binding {
                                value: Value::Undefined,
                                mutable: *kind == DeclKind::Let,
                                initialized: false,
                                lexical: true,
                            },
                        );
                    }
                }
                Stmt::Function(def) => {
                    let name = def.name.clone().unwrap_or_default();
                    if env.borrow().vars.get(&name).is_some_and(|b| b.lexical) {
                        return Self::already_declared(&name);
                    }
                    let value = Self::closure(def, env, &name);
                    env.borrow_mut().vars.insert(
                        name,
                        Binding {
                            value,
                            mutable: true,
                            initialized: true,
                            lexical: false,
                        },
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn closure(def: &Rc<FunctionDef>, env: &Env, name: &str) -> Value {
        Value::Function(Rc::new(Closure {
            def: Rc::clone(def),
            env: Rc::clone(env),
            name: name.to_string(),
        }))
    }

    fn bind_name(env: &Env, name: &str, value: Value, mode: BindMode) -> Eval<()> {
        match mode {
            BindMode::Declare { mutable } => {
                Self::declare_name(env, name, value, mutable);
                Ok(())
            }
            BindMode::Assign => Self::assign_name(env, name, value),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &Env,
        mode: BindMode,
    ) -> Eval<()> {
        match pattern {
            Pattern::Ident(name) => Self::bind_name(env, name, value, mode),
            Pattern::Array { elements, rest } => {
                let items = iterate(&value)?;
                for (i, elem) in elements.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let mut item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    if let (Value::Undefined, Some(default)) = (&item, &elem.default) {
                        item = self.eval_named(default, env, pattern_name(&elem.pattern))?;
                    }
                    self.bind_pattern(&elem.pattern, item, env, mode)?;
                }
                if let Some(rest) = rest {
                    let remaining = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::array(remaining), env, mode)?;
                }
                Ok(())
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return throw(
                        ErrorKind::TypeError,
                        format!("Cannot destructure '{}' as it is {}.", to_js_string(&value), to_js_string(&value)),
                    );
                }
                for (key, elem) in props {
                    let mut item = self.get_property(&value, key)?;
                    if let (Value::Undefined, Some(default)) = (&item, &elem.default) {
                        item = self.eval_named(default, env, pattern_name(&elem.pattern))?;
                    }
                    self.bind_pattern(&elem.pattern, item, env, mode)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = IndexMap::new();
                    if let Value::Object(obj) = &value {
                        for (key, item) in &obj.borrow().props {
                            if !props.iter().any(|(taken, _)| taken == key) {
                                remaining.insert(key.clone(), item.clone());
                            }
                        }
                    }
                    Self::bind_name(env, rest, Value::object(remaining), mode)?;
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_program(&mut self, program: &[Stmt]) -> Eval<Value> {
        let env = Rc::clone(&self.globals);
        Self::hoist_vars(&env, program)?;
        self.declare_block(&env, program)?;
        let mut completion = Value::Undefined;
        for stmt in program {
            if let Stmt::Expr(expr) = stmt {
                completion = self.eval_expr(expr, &env)?;
                continue;
            }
            match self.exec(stmt, &env)? {
                Flow::Normal => {}
                Flow::Return(_) => return abort(ScriptFault::syntax("Illegal return statement")),
                Flow::Break => return abort(ScriptFault::syntax("Illegal break statement")),
                Flow::Continue => {
                    return abort(ScriptFault::syntax("Illegal continue statement"))
                }
            }
        }
        Ok(completion)
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Eval<Flow> {
        let block_env = if needs_scope(stmts) {
            let block_env = self.new_scope(env);
            self.declare_block(&block_env, stmts)?;
            block_env
        } else {
            Rc::clone(env)
        };
        for stmt in stmts {
            let flow = self.exec(stmt, &block_env)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Eval<Flow> {
        self.nested(|interp| interp.exec_node(stmt, env))
    }

    #[allow(clippy::too_many_lines)]
    fn exec_node(&mut self, stmt: &Stmt, env: &Env) -> Eval<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Decl(kind, decls) => {
                for (pattern, init) in decls {
                    match (kind, init) {
                        (DeclKind::Var, None) => {}
                        (DeclKind::Var, Some(init)) => {
                            let value = self.eval_named(init, env, pattern_name(pattern))?;
                            self.bind_pattern(pattern, value, env, BindMode::Assign)?;
                        }
                        (_, init) => {
                            let value = match init {
                                Some(init) => self.eval_named(init, env, pattern_name(pattern))?,
                                None => Value::Undefined,
                            };
                            let mode = BindMode::Declare {
                                mutable: *kind == DeclKind::Let,
                            };
                            self.bind_pattern(pattern, value, env, mode)?;
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::If(test, then, otherwise) => {
                if self.eval_expr(test, env)?.truthy() {
                    self.exec_scoped(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec_scoped(otherwise, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(test, body) => {
                while self.eval_expr(test, env)?.truthy() {
                    match self.exec_scoped(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile(body, test) => {
                loop {
                    match self.exec_scoped(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval_expr(test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, env),
            Stmt::ForOf(head, iterable, body) => {
                let iterable = self.eval_expr(iterable, env)?;
                match &iterable {
                    Value::Array(items) => {
                        let mut index = 0;
                        loop {
                            // Arrays are iterated live, so pushes during the loop are seen.
                            let Some(item) = items.borrow().get(index).cloned() else {
                                break;
                            };
                            index += 1;
                            match self.exec_iteration(head, item, body, env)? {
                                Flow::Break => break,
                                Flow::Return(value) => return Ok(Flow::Return(value)),
                                Flow::Normal | Flow::Continue => {}
                            }
                        }
                    }
                    _ => {
                        for item in iterate(&iterable)? {
                            match self.exec_iteration(head, item, body, env)? {
                                Flow::Break => break,
                                Flow::Return(value) => return Ok(Flow::Return(value)),
                                Flow::Normal | Flow::Continue => {}
                            }
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForIn(head, object, body) => {
                let object = self.eval_expr(object, env)?;
                for key in enumerable_keys(&object) {
                    match self.exec_iteration(head, Value::Str(key), body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Switch(discriminant, cases) => self.exec_switch(discriminant, cases, env),
            Stmt::Block(stmts) => self.exec_block(stmts, env),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval_expr(expr, env)?;
                Err(Interrupt::Throw(value))
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let result = match (self.exec_block(block, env), handler) {
                    (Err(Interrupt::Throw(thrown)), Some(handler)) => {
                        self.exec_catch(param.as_ref(), thrown, handler, env)
                    }
                    (result, _) => result,
                };
                if matches!(result, Err(Interrupt::Abort(_))) {
                    return result;
                }
                if let Some(finalizer) = finalizer {
                    let flow = self.exec_block(finalizer, env)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                result
            }
        }
    }

    /// Runs a statement used as a loop or branch body, giving lexical
    /// declarations their own scope.
    fn exec_scoped(&mut self, stmt: &Stmt, env: &Env) -> Eval<Flow> {
        match stmt {
            Stmt::Decl(DeclKind::Let | DeclKind::Const, _) | Stmt::Function(_) => {
                self.exec_block(std::slice::from_ref(stmt), env)
            }
            _ => self.exec(stmt, env),
        }
    }

    fn exec_catch(
        &mut self,
        param: Option<&Pattern>,
        thrown: Value,
        handler: &[Stmt],
        env: &Env,
    ) -> Eval<Flow> {
        let catch_env = self.new_scope(env);
        if let Some(param) = param {
            self.bind_pattern(param, thrown, &catch_env, BindMode::Declare { mutable: true })?;
        }
        self.exec_block(handler, &catch_env)
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Env,
    ) -> Eval<Flow> {
        // `let` loop variables get a fresh binding per iteration so closures
        // created in the body capture that iteration's value.
        let mut per_iteration = Vec::new();
        if let Some(Stmt::Decl(DeclKind::Let, decls)) = init {
            for (pattern, _) in decls {
                pattern.bound_names(&mut per_iteration);
            }
        }
        let mut iter_env = self.new_scope(env);
        if let Some(init) = init {
            self.declare_block(&iter_env, std::iter::once(init))?;
            self.exec(init, &iter_env)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval_expr(test, &iter_env)?.truthy() {
                    break;
                }
            }
            match self.exec_scoped(body, &iter_env)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            if !per_iteration.is_empty() {
                let next = self.new_scope(env);
                {
                    let previous = iter_env.borrow();
                    let mut fresh = next.borrow_mut();
                    for name in &per_iteration {
                        if let Some(binding) = previous.vars.get(name) {
                            fresh.vars.insert(name.clone(), binding.clone());
                        }
                    }
                }
                iter_env = next;
            }
            if let Some(update) = update {
                self.eval_expr(update, &iter_env)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_iteration(
        &mut self,
        head: &ForHead,
        item: Value,
        body: &Stmt,
        env: &Env,
    ) -> Eval<Flow> {
        let iter_env = self.new_scope(env);
        match head {
            ForHead::Decl(DeclKind::Var, pattern) => {
                self.bind_pattern(pattern, item, &iter_env, BindMode::Assign)?;
            }
            ForHead::Decl(kind, pattern) => {
                let mode = BindMode::Declare {
                    mutable: *kind == DeclKind::Let,
                };
                self.bind_pattern(pattern, item, &iter_env, mode)?;
            }
            ForHead::Target(target) => {
                let place = self.place(target, &iter_env)?;
                self.write_place(place, item, &iter_env)?;
            }
        }
        self.exec_scoped(body, &iter_env)
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], env: &Env) -> Eval<Flow> {
        let value = self.eval_expr(discriminant, env)?;
        let block_env = self.new_scope(env);
        self.declare_block(&block_env, cases.iter().flat_map(|case| case.body.iter()))?;

        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if strict_equals(&value, &self.eval_expr(test, &block_env)?) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec(stmt, &block_env)? {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    flow => return Ok(flow),
                }
            }
        }
        Ok(Flow::Normal)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluates `expr`, naming it `name` if it is an anonymous function.
    fn eval_named(&mut self, expr: &Expr, env: &Env, name: Option<&str>) -> Eval<Value> {
        match (expr, name) {
            (Expr::Function(def), Some(name)) if def.name.is_none() => {
                self.tick()?;
                Ok(Self::closure(def, env, name))
            }
            _ => self.eval_expr(expr, env),
        }
    }

    pub(super) fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Eval<Value> {
        self.nested(|interp| interp.eval_node(expr, env))
    }

    #[allow(clippy::too_many_lines)]
    fn eval_node(&mut self, expr: &Expr, env: &Env) -> Eval<Value> {
        self.tick()?;
        match expr {
            Expr::Num(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            let value = self.eval_expr(expr, env)?;
                            out.push_str(&to_js_string(&value));
                        }
                    }
                    check_string_length(out.len())?;
                }
                Ok(Value::Str(out))
            }
            Expr::Ident(name) => Self::lookup(env, name),
            Expr::This => Ok(Self::this_value(env)),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        None => out.push(Value::Undefined),
                        Some(Item::Expr(expr)) => out.push(self.eval_expr(expr, env)?),
                        Some(Item::Spread(expr)) => {
                            let spread = self.eval_expr(expr, env)?;
                            out.extend(iterate(&spread)?);
                        }
                    }
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut out = IndexMap::new();
                for prop in props {
                    match prop {
                        Prop::Value(key, value) => {
                            let key = match key {
                                PropKey::Static(key) => key.clone(),
                                PropKey::Computed(expr) => {
                                    to_property_key(&self.eval_expr(expr, env)?)
                                }
                            };
                            let value = self.eval_named(value, env, Some(&key))?;
                            out.insert(key, value);
                        }
                        Prop::Spread(expr) => {
                            let spread = self.eval_expr(expr, env)?;
                            for (key, value) in own_entries(&spread) {
                                out.insert(key, value);
                            }
                        }
                    }
                }
                Ok(Value::object(out))
            }
            Expr::Function(def) => match &def.name {
                // Named function expressions can refer to themselves.
                Some(name) if !def.is_arrow => {
                    let own_env = self.new_scope(env);
                    let func = Self::closure(def, &own_env, name);
                    own_env.borrow_mut().vars.insert(
                        name.clone(),
                        Binding {
                            value: func.clone(),
                            mutable: false,
                            initialized: true,
                            lexical: false,
                        },
                    );
                    Ok(func)
                }
                _ => Ok(Self::closure(def, env, "")),
            },
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, env),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.place(target, env)?;
                let old = to_number(&self.read_place(&place, env)?);
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(place, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval_expr(left, env)?;
                let short_circuits = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval_expr(right, env)
                }
            }
            Expr::Conditional(test, then, otherwise) => {
                if self.eval_expr(test, env)?.truthy() {
                    self.eval_expr(then, env)
                } else {
                    self.eval_expr(otherwise, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target, env)?;
                let value = match op {
                    AssignOp::Assign => {
                        let name = match &place {
                            Place::Name(name) => Some(name.as_str()),
                            Place::Property(..) => None,
                        };
                        self.eval_named(value, env, name)?
                    }
                    AssignOp::Compound(op) => {
                        let current = self.read_place(&place, env)?;
                        let rhs = self.eval_expr(value, env)?;
                        self.binary(*op, &current, &rhs)?
                    }
                };
                self.write_place(place, value.clone(), env)?;
                Ok(value)
            }
            Expr::AssignPattern(pattern, value) => {
                let value = self.eval_expr(value, env)?;
                self.bind_pattern(pattern, value.clone(), env, BindMode::Assign)?;
                Ok(value)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval_expr(object, env)?;
                if *optional && object.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                self.get_property(&object, property)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let object = self.eval_expr(object, env)?;
                if *optional && object.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let key = to_property_key(&self.eval_expr(index, env)?);
                self.get_property(&object, &key)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (func, this) = self.eval_callee(callee, env)?;
                if *optional && func.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let args = self.eval_args(args, env)?;
                if !func.is_callable() {
                    return throw(
                        ErrorKind::TypeError,
                        format!("{} is not a function", expr_label(callee)),
                    );
                }
                self.call_value(&func, this, args)
            }
            Expr::New { callee, args } => {
                let func = self.eval_expr(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.construct(&func, args, callee)
            }
            Expr::OptionalChain(inner) => match self.eval_expr(inner, env) {
                Err(Interrupt::ShortCircuit) => Ok(Value::Undefined),
                result => result,
            },
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval_expr(expr, env)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> Eval<Value> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = operand {
                    if Self::find_scope(env, name).is_none() {
                        return Ok(Value::from("undefined"));
                    }
                }
                let value = self.eval_expr(operand, env)?;
                Ok(Value::from(value.type_of()))
            }
            UnaryOp::Delete => {
                let place = match operand {
                    Expr::Member { .. } | Expr::Index { .. } => self.place(operand, env)?,
                    _ => {
                        self.eval_expr(operand, env)?;
                        return Ok(Value::Bool(true));
                    }
                };
                if let Place::Property(object, key) = place {
                    return Ok(Value::Bool(delete_property(&object, &key)));
                }
                Ok(Value::Bool(true))
            }
            UnaryOp::Not => Ok(Value::Bool(!self.eval_expr(operand, env)?.truthy())),
            UnaryOp::Neg => Ok(Value::Number(-to_number(&self.eval_expr(operand, env)?))),
            UnaryOp::Plus => Ok(Value::Number(to_number(&self.eval_expr(operand, env)?))),
            UnaryOp::Void => {
                self.eval_expr(operand, env)?;
                Ok(Value::Undefined)
            }
        }
    }

    fn eval_callee(&mut self, callee: &Expr, env: &Env) -> Eval<(Value, Value)> {
        match callee {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval_expr(object, env)?;
                if *optional && object.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let func = self.get_property(&object, property)?;
                Ok((func, object))
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let object = self.eval_expr(object, env)?;
                if *optional && object.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let key = to_property_key(&self.eval_expr(index, env)?);
                let func = self.get_property(&object, &key)?;
                Ok((func, object))
            }
            _ => Ok((self.eval_expr(callee, env)?, Value::Undefined)),
        }
    }

    fn eval_args(&mut self, args: &[Item], env: &Env) -> Eval<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Item::Expr(expr) => out.push(self.eval_expr(expr, env)?),
                Item::Spread(expr) => {
                    let spread = self.eval_expr(expr, env)?;
                    out.extend(iterate(&spread)?);
                }
            }
        }
        Ok(out)
    }

    fn place(&mut self, target: &Expr, env: &Env) -> Eval<Place> {
        match target {
            Expr::Ident(name) => Ok(Place::Name(name.clone())),
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object, env)?;
                Ok(Place::Property(object, property.clone()))
            }
            Expr::Index { object, index, .. } => {
                let object = self.eval_expr(object, env)?;
                let key = to_property_key(&self.eval_expr(index, env)?);
                Ok(Place::Property(object, key))
            }
            _ => abort(ScriptFault::syntax("Invalid left-hand side in assignment")),
        }
    }

    fn read_place(&mut self, place: &Place, env: &Env) -> Eval<Value> {
        match place {
            Place::Name(name) => Self::lookup(env, name),
            Place::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, env: &Env) -> Eval<()> {
        match place {
            Place::Name(name) => Self::assign_name(env, &name, value),
            Place::Property(object, key) => self.set_property(&object, &key, value),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Eval<Value> {
        let number = |f: fn(f64, f64) -> f64| -> Eval<Value> {
            Ok(Value::Number(f(to_number(left), to_number(right))))
        };
        match op {
            BinaryOp::Add => {
                if is_numeric_operand(left) && is_numeric_operand(right) {
                    return number(|a, b| a + b);
                }
                let left = to_js_string(left);
                let right = to_js_string(right);
                check_string_length(left.len() + right.len())?;
                Ok(Value::Str(left + &right))
            }
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Rem => number(|a, b| a % b),
            BinaryOp::Pow => number(|a, b| if b.is_nan() { f64::NAN } else { a.powf(b) }),
            BinaryOp::Lt => Ok(Value::Bool(compare(left, right, |o| o.is_lt()))),
            BinaryOp::Gt => Ok(Value::Bool(compare(left, right, |o| o.is_gt()))),
            BinaryOp::Le => Ok(Value::Bool(compare(left, right, |o| o.is_le()))),
            BinaryOp::Ge => Ok(Value::Bool(compare(left, right, |o| o.is_ge()))),
            BinaryOp::Eq => Ok(Value::Bool(loose_equals(left, right))),
            BinaryOp::NotEq => Ok(Value::Bool(!loose_equals(left, right))),
            BinaryOp::StrictEq => Ok(Value::Bool(strict_equals(left, right))),
            BinaryOp::StrictNotEq => Ok(Value::Bool(!strict_equals(left, right))),
            BinaryOp::In => {
                let key = to_property_key(left);
                match right {
                    Value::Object(obj) => Ok(Value::Bool(obj.borrow().props.contains_key(&key))),
                    Value::Array(items) => Ok(Value::Bool(
                        key == "length"
                            || array_index(&key).is_some_and(|i| i < items.borrow().len()),
                    )),
                    Value::Host(_) | Value::Node(_) | Value::Function(_) | Value::Native(_) => {
                        Ok(Value::Bool(!self.get_property(right, &key)?.is_nullish()))
                    }
                    _ => throw(
                        ErrorKind::TypeError,
                        format!(
                            "Cannot use 'in' operator to search for '{key}' in {}",
                            to_js_string(right)
                        ),
                    ),
                }
            }
            BinaryOp::InstanceOf => {
                if !right.is_callable() {
                    return throw(
                        ErrorKind::TypeError,
                        "Right-hand side of 'instanceof' is not callable",
                    );
                }
                Ok(Value::Bool(instance_of(left, right)))
            }
        }
    }

    // ========================================================================
    // Properties and calls
    // ========================================================================

    pub(super) fn get_property(&mut self, object: &Value, key: &str) -> Eval<Value> {
        match object {
            Value::Undefined | Value::Null => throw(
                ErrorKind::TypeError,
                format!(
                    "Cannot read properties of {} (reading '{key}')",
                    to_js_string(object)
                ),
            ),
            Value::Object(obj) => {
                if let Some(value) = obj.borrow().props.get(key) {
                    return Ok(value.clone());
                }
                Ok(builtins::object_property(object, key))
            }
            Value::Host(HostRef::Document | HostRef::Style(_) | HostRef::ClassList(_))
            | Value::Node(_) => dom_api::get_property(self, object, key),
            _ => Ok(builtins::property(object, key)),
        }
    }

    pub(super) fn set_property(&mut self, object: &Value, key: &str, value: Value) -> Eval<()> {
        match object {
            Value::Undefined | Value::Null => throw(
                ErrorKind::TypeError,
                format!(
                    "Cannot set properties of {} (setting '{key}')",
                    to_js_string(object)
                ),
            ),
            Value::Object(obj) => {
                let mut obj = obj.borrow_mut();
                if !obj.frozen {
                    obj.props.insert(key.to_string(), value);
                }
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = to_number(&value);
                    let Some(len) = super::value::as_index(len) else {
                        return throw(ErrorKind::RangeError, "Invalid array length");
                    };
                    builtins::check_array_length(len)?;
                    items.borrow_mut().resize(len, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    builtins::check_array_length(index + 1)?;
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Host(HostRef::Document | HostRef::Style(_) | HostRef::ClassList(_))
            | Value::Node(_) => dom_api::set_property(self, object, key, value),
            // Writes to primitives and other host objects are ignored.
            _ => Ok(()),
        }
    }

    pub(super) fn call_value(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Eval<Value> {
        match func {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Native(native) => {
                let receiver = native.this.clone();
                let name = native.name;
                match &receiver {
                    Value::Host(HostRef::Document | HostRef::Style(_) | HostRef::ClassList(_))
                    | Value::Node(_) => dom_api::call_method(self, &receiver, name, args),
                    _ => builtins::call_method(self, &receiver, name, args),
                }
            }
            Value::Host(HostRef::Ctor(ctor)) => builtins::call_ctor(self, *ctor, args),
            _ => throw(
                ErrorKind::TypeError,
                format!("{} is not a function", describe(func)),
            ),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Eval<Value> {
        if self.depth >= self.limits.max_call_depth {
            return abort(ScriptFault::range(CALL_DEPTH_MESSAGE));
        }
        self.depth += 1;
        let result = self.invoke(closure, this, args);
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Eval<Value> {
        let closure = Rc::clone(closure);
        let env = self.new_scope(&closure.env);
        if !closure.def.is_arrow {
            env.borrow_mut().vars.insert(
                "this".to_string(),
                Binding {
                    value: this,
                    mutable: false,
                    initialized: true,
                    lexical: false,
                },
            );
        }
        let mut args = args.into_iter();
        for param in &closure.def.params {
            let value = if param.rest {
                Value::array(args.by_ref().collect())
            } else {
                args.next().unwrap_or(Value::Undefined)
            };
            let value = match (&param.default, value) {
                (Some(default), Value::Undefined) => {
                    self.eval_named(default, &env, pattern_name(&param.pattern))?
                }
                (_, value) => value,
            };
            self.bind_pattern(&param.pattern, value, &env, BindMode::Declare { mutable: true })?;
        }
        // Parameters may be redeclared by `var` but not by `let`/`const`.
        for binding in env.borrow_mut().vars.values_mut() {
            binding.lexical = false;
        }

        match &closure.def.body {
            FnBody::Expr(expr) => self.eval_expr(expr, &env),
            FnBody::Block(stmts) => {
                Self::hoist_vars(&env, stmts)?;
                self.declare_block(&env, stmts)?;
                for stmt in stmts {
                    match self.exec(stmt, &env)? {
                        Flow::Normal => {}
                        Flow::Return(value) => return Ok(value),
                        Flow::Break => {
                            return abort(ScriptFault::syntax("Illegal break statement"))
                        }
                        Flow::Continue => {
                            return abort(ScriptFault::syntax("Illegal continue statement"))
                        }
                    }
                }
                Ok(Value::Undefined)
            }
        }
    }

    fn construct(&mut self, func: &Value, args: Vec<Value>, callee: &Expr) -> Eval<Value> {
        match func {
            Value::Host(HostRef::Ctor(ctor)) => builtins::construct(self, *ctor, args),
            Value::Function(closure) if !closure.def.is_arrow => {
                let instance = Value::object(IndexMap::new());
                let result = self.call_closure(closure, instance.clone(), args)?;
                Ok(match result {
                    Value::Object(_) | Value::Array(_) => result,
                    _ => instance,
                })
            }
            _ => throw(
                ErrorKind::TypeError,
                format!("{} is not a constructor", expr_label(callee)),
            ),
        }
    }

}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        // Closures and scopes reference each other; clearing every scope
        // breaks those cycles so the values can be freed.
        for weak in self.scopes.drain(..) {
            if let Some(scope) = weak.upgrade() {
                if let Ok(mut scope) = scope.try_borrow_mut() {
                    scope.vars.clear();
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Collects the items of an iterable value.
pub(super) fn iterate(value: &Value) -> Eval<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        _ => throw(
            ErrorKind::TypeError,
            format!("{} is not iterable", describe(value)),
        ),
    }
}

fn collect_var_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_var_names_in(stmt, out);
    }
}

fn collect_var_names_in(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Decl(DeclKind::Var, decls) => {
            for (pattern, _) in decls {
                pattern.bound_names(out);
            }
        }
        Stmt::If(_, then, otherwise) => {
            collect_var_names_in(then, out);
            if let Some(otherwise) = otherwise {
                collect_var_names_in(otherwise, out);
            }
        }
        Stmt::While(_, body) | Stmt::DoWhile(body, _) => collect_var_names_in(body, out),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names_in(init, out);
            }
            collect_var_names_in(body, out);
        }
        Stmt::ForOf(head, _, body) | Stmt::ForIn(head, _, body) => {
            if let ForHead::Decl(DeclKind::Var, pattern) = head {
                pattern.bound_names(out);
            }
            collect_var_names_in(body, out);
        }
        Stmt::Switch(_, cases) => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        Stmt::Block(stmts) => collect_var_names(stmts, out),
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(handler, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        _ => {}
    }
}

fn needs_scope(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| {
        matches!(
            stmt,
            Stmt::Decl(DeclKind::Let | DeclKind::Const, _) | Stmt::Function(_)
        )
    })
}

fn pattern_name(pattern: &Pattern) -> Option<&str> {
    match pattern {
        Pattern::Ident(name) => Some(name),
        _ => None,
    }
}

/// Source-like label for an expression, used in error messages.
fn expr_label(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", expr_label(object)),
        Expr::Index { object, .. } => format!("{}[...]", expr_label(object)),
        Expr::Call { callee, .. } => format!("{}(...)", expr_label(callee)),
        Expr::OptionalChain(inner) => expr_label(inner),
        Expr::Str(s) => format!("\"{s}\""),
        Expr::Num(n) => super::value::number_to_string(*n),
        _ => "expression".to_string(),
    }
}

/// Parses a canonical array index (`"0"`, `"12"`, but not `"01"`).
pub(super) fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

pub(super) fn check_string_length(len: usize) -> Eval<()> {
    if len > MAX_STRING_LENGTH {
        return throw(ErrorKind::RangeError, "Invalid string length");
    }
    Ok(())
}

const fn is_numeric_operand(value: &Value) -> bool {
    matches!(
        value,
        Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined
    )
}

fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return test(a.cmp(b));
    }
    to_number(left)
        .partial_cmp(&to_number(right))
        .is_some_and(test)
}

fn instance_of(value: &Value, ctor: &Value) -> bool {
    match ctor {
        Value::Host(HostRef::Ctor(Ctor::Array)) => matches!(value, Value::Array(_)),
        Value::Host(HostRef::Ctor(Ctor::Object)) => matches!(
            value,
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_)
        ),
        Value::Host(HostRef::Ctor(Ctor::Error(kind))) => value
            .as_error()
            .is_some_and(|(name, _)| *kind == ErrorKind::Error || name == kind.name()),
        _ => false,
    }
}

/// Own enumerable keys, in insertion order.
fn enumerable_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.borrow().props.keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Own enumerable entries, used by object spread.
pub(super) fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(obj) => obj
            .borrow()
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::Str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn delete_property(object: &Value, key: &str) -> bool {
    match object {
        Value::Object(obj) => {
            let mut obj = obj.borrow_mut();
            if obj.frozen {
                return false;
            }
            obj.props.shift_remove(key);
            true
        }
        Value::Array(items) => {
            if let Some(index) = array_index(key) {
                if let Some(slot) = items.borrow_mut().get_mut(index) {
                    *slot = Value::Undefined;
                }
            }
            true
        }
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::console::{DiscardSink, MemorySink};

    fn eval(source: &str) -> Result<String, ScriptFault> {
        let mut console = Console::new(DiscardSink);
        run_isolated(&mut console, None, SandboxLimits::default(), |interp| {
            interp.run(source).map(|value| console_format(&value))
        })
    }

    fn eval_with(source: &str, limits: SandboxLimits) -> Result<String, ScriptFault> {
        let mut console = Console::new(DiscardSink);
        run_isolated(&mut console, None, limits, |interp| {
            interp.run(source).map(|value| console_format(&value))
        })
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), "7");
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), "512");
        assert_eq!(eval("'a' + 1 + 2").unwrap(), "a12");
        assert_eq!(eval("1 + 2 + 'a'").unwrap(), "3a");
        assert_eq!(eval("7 % -3").unwrap(), "1");
        assert_eq!(eval("'10' - 4").unwrap(), "6");
        assert_eq!(eval("[1, 2] + ''").unwrap(), "1,2");
        assert_eq!(eval("'b' > 'a' && 2 > 10 === false").unwrap(), "true");
    }

    #[test]
    fn test_closures_capture_state() {
        let source = "
            function counter() {
                let count = 0;
                return () => ++count;
            }
            const next = counter();
            next();
            next();
            next()
        ";
        assert_eq!(eval(source).unwrap(), "3");
    }

    #[test]
    fn test_function_declarations_are_hoisted() {
        assert_eq!(eval("double(21); function double(n) { return n * 2 }").unwrap(), "42");
        assert_eq!(eval("x; var x = 5; x").unwrap(), "5");
    }

    #[test]
    fn test_reference_errors() {
        let fault = eval("missing + 1").unwrap_err();
        assert_eq!(fault.to_string(), "ReferenceError: missing is not defined");

        let fault = eval("value; let value = 1;").unwrap_err();
        assert_eq!(fault.message, "Cannot access 'value' before initialization");

        assert_eq!(eval("typeof missing").unwrap(), "undefined");
    }

    #[test]
    fn test_const_and_duplicate_declarations() {
        let fault = eval("const a = 1; a = 2;").unwrap_err();
        assert_eq!(fault.to_string(), "TypeError: Assignment to constant variable.");

        let fault = eval("let a = 1; let a = 2;").unwrap_err();
        assert_eq!(
            fault.to_string(),
            "SyntaxError: Identifier 'a' has already been declared"
        );
        assert!(eval("let a = 1; { let a = 2; }").is_ok());
    }

    #[test]
    fn test_type_errors() {
        let fault = eval("const user = null; user.name").unwrap_err();
        assert_eq!(
            fault.to_string(),
            "TypeError: Cannot read properties of null (reading 'name')"
        );
        let fault = eval("const obj = {}; obj.run()").unwrap_err();
        assert_eq!(fault.to_string(), "TypeError: obj.run is not a function");
        let fault = eval("let u; u.x = 1").unwrap_err();
        assert_eq!(
            fault.message,
            "Cannot set properties of undefined (setting 'x')"
        );
    }

    #[test]
    fn test_try_catch_finally() {
        let source = "
            let log = [];
            try {
                throw new TypeError('bad input');
            } catch (e) {
                log.push(e.name, e.message, e instanceof TypeError, e instanceof Error);
            } finally {
                log.push('done');
            }
            log.join('|')
        ";
        assert_eq!(eval(source).unwrap(), "TypeError|bad input|true|true|done");
        assert_eq!(
            eval("function f() { try { return 1 } finally { return 2 } } f()").unwrap(),
            "2"
        );
        let fault = eval("throw 'plain'").unwrap_err();
        assert_eq!(fault.to_string(), "Error: plain");
    }

    #[test]
    fn test_step_limit_cannot_be_caught() {
        let limits = SandboxLimits {
            max_steps: 10_000,
            ..SandboxLimits::default()
        };
        let fault = eval_with("try { while (true) {} } catch (e) { 'caught' }", limits).unwrap_err();
        assert_eq!(fault.name, "RangeError");
        assert_eq!(fault.message, STEP_LIMIT_MESSAGE);
    }

    #[test]
    fn test_call_depth_limit() {
        let fault = eval("function down(n) { return down(n + 1) } down(0)").unwrap_err();
        assert_eq!(fault.to_string(), "RangeError: Maximum call stack size exceeded");
        assert_eq!(
            eval("function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) } fact(10)").unwrap(),
            "3628800"
        );
    }

    #[test]
    fn test_evaluation_nesting_is_bounded() {
        let limits = SandboxLimits {
            max_call_depth: 1_000_000,
            ..SandboxLimits::default()
        };
        let body = format!("{}down(n + 1){}", "-(".repeat(400), ")".repeat(400));
        let source = format!("function down(n) {{ return {body} }} down(0)");
        let fault = eval_with(&source, limits).unwrap_err();
        assert_eq!(fault.to_string(), "RangeError: Maximum call stack size exceeded");

        // Nesting is released as calls return.
        let body = format!("{}1{}", "-(".repeat(300), ")".repeat(300));
        let source = format!("function one() {{ return {body} }} one() + one() + one()");
        assert_eq!(eval(&source).unwrap(), "3");
    }

    #[test]
    fn test_destructuring_and_spread() {
        let source = "
            const { a, b: renamed = 5, ...others } = { a: 1, c: 3, d: 4 };
            const [first, , third = 9, ...tail] = [10, 20, undefined, 40, 50];
            let x = 1, y = 2;
            [x, y] = [y, x];
            [a, renamed, others.d, first, third, tail.length, x, y, ...'hi'].join(',')
        ";
        assert_eq!(eval(source).unwrap(), "1,5,4,10,9,2,2,1,h,i");
        assert_eq!(
            eval("const f = (...nums) => Math.max(...nums); f(3, 9, 4)").unwrap(),
            "9"
        );
        assert_eq!(eval("({ ...{ a: 1 }, b: 2 })").unwrap(), "{\n  \"a\": 1,\n  \"b\": 2\n}");
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        assert_eq!(eval("const o = null; o?.a.b.c").unwrap(), "undefined");
        assert_eq!(eval("const o = { a: { b: 2 } }; o?.a?.b").unwrap(), "2");
        assert_eq!(eval("const o = {}; o.run?.()").unwrap(), "undefined");
        assert_eq!(eval("0 ?? 5").unwrap(), "0");
        assert_eq!(eval("null ?? 5").unwrap(), "5");
        assert_eq!(eval("0 || 5").unwrap(), "5");
    }

    #[test]
    fn test_loops() {
        let source = "
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            fns.map(f => f()).join('')
        ";
        assert_eq!(eval(source).unwrap(), "012");

        let source = "
            let out = '';
            for (const ch of 'abc') { if (ch === 'b') continue; out += ch; }
            for (const key in { x: 1, y: 2 }) out += key;
            let n = 0;
            do { n++ } while (n < 5);
            while (true) { if (n > 7) break; n++; }
            out + n
        ";
        assert_eq!(eval(source).unwrap(), "acxy8");
    }

    #[test]
    fn test_switch_falls_through() {
        let source = "
            function grade(n) {
                let out = '';
                switch (n) {
                    case 1: out += 'one ';
                    case 2: out += 'two'; break;
                    default: out = 'other';
                }
                return out;
            }
            [grade(1), grade(2), grade(3)].join('|')
        ";
        assert_eq!(eval(source).unwrap(), "one two|two|other");
    }

    #[test]
    fn test_this_and_constructors() {
        let source = "
            const counter = { count: 1, bump() { this.count += 1; return this.count; } };
            counter.bump();
            function Point(x, y) { this.x = x; this.y = y; }
            const p = new Point(3, 4);
            counter.count + p.x + p.y
        ";
        assert_eq!(eval(source).unwrap(), "9");
        let fault = eval("const f = () => 1; new f()").unwrap_err();
        assert_eq!(fault.message, "f is not a constructor");
    }

    #[test]
    fn test_function_names_are_inferred() {
        assert_eq!(eval("const greet = () => 1; greet.name").unwrap(), "greet");
        assert_eq!(eval("const o = { run: function () {} }; o.run").unwrap(), "[Function: run]");
        assert_eq!(eval("(() => 1)").unwrap(), "[Function (anonymous)]");
        assert_eq!(
            eval("const fib = function f(n) { return n < 2 ? n : f(n - 1) + f(n - 2) }; fib(10)")
                .unwrap(),
            "55"
        );
    }

    #[test]
    fn test_top_level_return_is_rejected() {
        let fault = eval("return 1").unwrap_err();
        assert_eq!(fault.to_string(), "SyntaxError: Illegal return statement");
    }

    #[test]
    fn test_console_goes_to_injected_sink() {
        let sink = MemorySink::new();
        let mut console = Console::new(sink.clone());
        let result = run_isolated(&mut console, None, SandboxLimits::default(), |interp| {
            interp.run("console.log('a', 1, [1]); console.warn({ k: true })")?;
            Ok(interp.steps())
        });
        assert!(result.unwrap() > 0);
        assert_eq!(sink.lines(), vec!["a 1 [\n  1\n]", "{\n  \"k\": true\n}"]);
    }

    #[test]
    fn test_call_runs_a_returned_function() {
        let mut console = Console::new(DiscardSink);
        let out = run_isolated(&mut console, None, SandboxLimits::default(), |interp| {
            let func = interp.run("(code) => code.length > 3")?;
            let result = interp.call(&func, vec![Value::from("hello")])?;
            Ok(result.truthy())
        });
        assert!(out.unwrap());
    }

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }
}
