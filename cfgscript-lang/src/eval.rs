//! Tree-walking evaluator
//!
//! The evaluator executes one module body or one function call at a time.
//! It owns the call stack used for backtraces and recursion checks, and routes
//! `load` statements to the [`ImportHandler`] supplied by the loader.

use crate::ast::{Arg, BinOp, Clause, Expr, ExprKind, FunctionDef, Module, Param, Stmt, StmtKind};
use crate::builtins;
use crate::env::ModuleEnv;
use crate::ops;
use crate::source::SourceFile;
use crate::value::{Arguments, Dict, Function, Value};
use cfgscript_core::{
    CancellationToken, Error, ImportHandler, ModulePath, Result, ScriptError,
};
use rustc_hash::FxHashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::trace;

/// Receives the output of `print(...)`, already prefixed with its position
pub type PrintHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Control flow out of a statement
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    name: String,
    source: Arc<SourceFile>,
    def: Option<Arc<FunctionDef>>,
    /// Offset of the expression currently being evaluated in this frame
    offset: usize,
}

/// Name resolution context for the code being executed
struct Scope {
    module: Arc<ModuleEnv>,
    /// `None` at module level, where assignments bind globals
    locals: Option<FxHashMap<String, Value>>,
    captured: Arc<FxHashMap<String, Value>>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.as_ref().and_then(|locals| locals.get(name)) {
            return Some(value.clone());
        }
        if let Some(value) = self.captured.get(name) {
            return Some(value.clone());
        }
        self.module
            .get(name)
            .or_else(|| builtins::universe().get(name).cloned())
    }

    fn assign(&mut self, name: String, value: Value) {
        match &mut self.locals {
            Some(locals) => {
                locals.insert(name, value);
            }
            None => self.module.set(name, value),
        }
    }

    /// A scope for comprehension variables, which never leak out
    fn child(&self) -> Scope {
        Scope {
            module: self.module.clone(),
            locals: Some(self.locals.clone().unwrap_or_default()),
            captured: self.captured.clone(),
        }
    }
}

pub struct Evaluator<'a> {
    cancel: &'a CancellationToken,
    imports: Option<&'a mut dyn ImportHandler<Value>>,
    print: PrintHandler,
    frames: Vec<Frame>,
}

impl<'a> Evaluator<'a> {
    pub fn new(cancel: &'a CancellationToken, print: PrintHandler) -> Self {
        Self {
            cancel,
            imports: None,
            print,
            frames: Vec::new(),
        }
    }

    /// Allow `load` statements, resolving them through `imports`
    pub fn with_imports(mut self, imports: &'a mut dyn ImportHandler<Value>) -> Self {
        self.imports = Some(imports);
        self
    }

    pub fn cancel(&self) -> &CancellationToken {
        self.cancel
    }

    /// Emit a `print(...)` line, prefixed with the current position
    pub fn print(&self, message: &str) {
        match self.frames.last() {
            Some(frame) => {
                let position = frame.source.position(frame.offset);
                (self.print)(&format!("[{}] {}", position, message))
            }
            None => (self.print)(message),
        }
    }

    /// Execute a parsed module, binding its globals in `env`
    pub fn exec_module(&mut self, module: &Module, env: &Arc<ModuleEnv>) -> Result<()> {
        self.frames.push(Frame {
            name: "<toplevel>".to_string(),
            source: env.source().clone(),
            def: None,
            offset: 0,
        });
        let mut scope = Scope {
            module: env.clone(),
            locals: None,
            captured: Arc::default(),
        };
        let result = self.exec_block(&module.body, &mut scope);
        self.frames.pop();
        result.map(|_| ())
    }

    /// Call `callable` from the expression at `offset` in the current frame
    pub fn call(&mut self, callable: &Value, args: Arguments, offset: usize) -> Result<Value> {
        self.cancel.check()?;
        if let Some(frame) = self.frames.last_mut() {
            frame.offset = offset;
        }
        match callable {
            Value::Function(function) => self.call_function(function, args, offset),
            Value::Builtin(builtin) => {
                let result = (builtin.func)(self, args);
                result.map_err(|err| self.convert(err, offset))
            }
            Value::Method(method) => {
                let result = (method.func)(self, &method.receiver, args);
                result.map_err(|err| self.convert(err, offset))
            }
            Value::RecordType(rtype) => rtype
                .construct(args)
                .map_err(|err| self.convert(err, offset)),
            other => Err(self.error_at(
                offset,
                format!("invalid call of non-function ({})", other.type_name()),
            )),
        }
    }

    /// Call `callable` from inside a builtin, at the builtin's call site
    pub fn call_value(&mut self, callable: &Value, args: Arguments) -> Result<Value> {
        let offset = self.frames.last().map_or(0, |frame| frame.offset);
        self.call(callable, args, offset)
    }

    fn call_function(&mut self, function: &Arc<Function>, args: Arguments, offset: usize) -> Result<Value> {
        let recursive = self.frames.iter().any(|frame| {
            frame
                .def
                .as_ref()
                .map_or(false, |def| Arc::ptr_eq(def, &function.def))
        });
        if recursive {
            return Err(self.error_at(
                offset,
                format!("function {} called recursively", function.name()),
            ));
        }
        let locals = bind_parameters(function, args).map_err(|err| self.convert(err, offset))?;
        trace!("Calling function {}", function.name());
        self.frames.push(Frame {
            name: function.name().to_string(),
            source: function.module.source().clone(),
            def: Some(function.def.clone()),
            offset: function.def.offset,
        });
        let mut scope = Scope {
            module: function.module.clone(),
            locals: Some(locals),
            captured: function.captured.clone(),
        };
        let result = self.exec_block(&function.def.body, &mut scope);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Build an execution error positioned at `offset` in the current frame
    fn error_at(&self, offset: usize, message: impl Into<String>) -> Error {
        let mut error = ScriptError::new(message);
        if let Some(frame) = self.frames.last() {
            error = error
                .at(frame.source.position(offset))
                .with_backtrace(self.backtrace(offset));
        }
        Error::Execution(error)
    }

    fn backtrace(&self, offset: usize) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        let last = self.frames.len().saturating_sub(1);
        for (i, frame) in self.frames.iter().enumerate() {
            let at = if i == last { offset } else { frame.offset };
            let _ = writeln!(out, "  {}: in {}", frame.source.position(at), frame.name);
        }
        out
    }

    /// Errors from the core pass through; anything else is positioned at `offset`
    fn convert(&self, err: anyhow::Error, offset: usize) -> Error {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(err) => self.error_at(offset, format!("{:#}", err)),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &mut Scope) -> Result<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut Scope) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                self.assign(target, value, scope)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value, scope)?;
            }
            StmtKind::Def(def) => {
                let function = self.make_function(def, scope)?;
                scope.assign(def.name.clone(), function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { cond, then, otherwise } => {
                return if self.eval(cond, scope)?.truth() {
                    self.exec_block(then, scope)
                } else {
                    self.exec_block(otherwise, scope)
                };
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, scope)?;
                let items = iterable
                    .iterate()
                    .map_err(|err| self.convert(err, iter.offset))?;
                for item in items {
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Load { module, symbols } => {
                self.exec_load(module, symbols, stmt.offset, scope)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_load(
        &mut self,
        module: &str,
        symbols: &[(String, String)],
        offset: usize,
        scope: &mut Scope,
    ) -> Result<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.offset = offset;
        }
        let from = ModulePath::new(scope.module.source().name().clone());
        let imported = self
            .imports
            .as_mut()
            .map(|imports| imports.import(module, &from));
        let table = match imported {
            Some(table) => table?,
            None => return Err(self.error_at(offset, "load not allowed here")),
        };
        for (local, exported) in symbols {
            if exported.starts_with('_') {
                return Err(self.error_at(
                    offset,
                    format!("load: symbol {} is private", exported),
                ));
            }
            let value = table.get(exported).cloned().ok_or_else(|| {
                self.error_at(
                    offset,
                    format!("load: name {} not found in module {}", exported, module),
                )
            })?;
            scope.assign(local.clone(), value);
        }
        Ok(())
    }

    fn exec_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr, scope: &mut Scope) -> Result<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let current = self.lookup(name, target.offset, scope)?;
                let rhs = self.eval(value, scope)?;
                let result = self.augmented(op, current, &rhs, target.offset)?;
                scope.assign(name.clone(), result);
                Ok(())
            }
            ExprKind::Index { target: container, index } => {
                let container = self.eval(container, scope)?;
                let key = self.eval(index, scope)?;
                let current = ops::index(&container, &key)
                    .map_err(|err| self.convert(err, target.offset))?;
                let rhs = self.eval(value, scope)?;
                let result = self.augmented(op, current, &rhs, target.offset)?;
                ops::set_index(&container, key, result).map_err(|err| self.convert(err, target.offset))
            }
            _ => Err(self.error_at(target.offset, "invalid augmented assignment target")),
        }
    }

    /// `x op= y`; lists are extended in place
    fn augmented(&self, op: BinOp, current: Value, rhs: &Value, offset: usize) -> Result<Value> {
        if let (BinOp::Add, Value::List(list)) = (op, &current) {
            let extra = rhs.iterate().map_err(|err| self.convert(err, offset))?;
            list.mutate(|items| items.extend(extra))
                .map_err(|err| self.convert(err, offset))?;
            return Ok(current);
        }
        ops::binary(op, &current, rhs).map_err(|err| self.convert(err, offset))
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &mut Scope) -> Result<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                scope.assign(name.clone(), value);
                Ok(())
            }
            ExprKind::Index { target: container, index } => {
                let container = self.eval(container, scope)?;
                let key = self.eval(index, scope)?;
                ops::set_index(&container, key, value).map_err(|err| self.convert(err, target.offset))
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let values = value
                    .iterate()
                    .map_err(|err| self.convert(err, target.offset))?;
                if values.len() != targets.len() {
                    return Err(self.error_at(
                        target.offset,
                        format!(
                            "cannot unpack {} values into {} variables",
                            values.len(),
                            targets.len()
                        ),
                    ));
                }
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value, scope)?;
                }
                Ok(())
            }
            _ => Err(self.error_at(target.offset, "cannot assign to this expression")),
        }
    }

    fn lookup(&self, name: &str, offset: usize, scope: &Scope) -> Result<Value> {
        scope
            .lookup(name)
            .ok_or_else(|| self.error_at(offset, format!("undefined: {}", name)))
    }

    fn make_function(&mut self, def: &Arc<FunctionDef>, scope: &mut Scope) -> Result<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match param {
                Param::Optional(_, default) => Some(self.eval(default, scope)?),
                _ => None,
            });
        }
        let captured = match &scope.locals {
            None => scope.captured.clone(),
            Some(locals) => {
                let mut captured = (*scope.captured).clone();
                captured.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
                Arc::new(captured)
            }
        };
        Ok(Value::Function(Arc::new(Function {
            def: def.clone(),
            defaults,
            module: scope.module.clone(),
            captured,
        })))
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &mut Scope) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr, scope)?);
        }
        Ok(values)
    }

    fn eval_optional(&mut self, expr: &Option<Box<Expr>>, scope: &mut Scope) -> Result<Option<Value>> {
        match expr {
            Some(expr) => Ok(Some(self.eval(expr, scope)?)),
            None => Ok(None),
        }
    }

    fn eval(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Value> {
        let offset = expr.offset;
        match &expr.kind {
            ExprKind::None => Ok(Value::None),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Ident(name) => self.lookup(name, offset, scope),
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, scope)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, scope)?)),
            ExprKind::Dict(entries) => {
                let dict = Dict::new();
                for (key, value) in entries {
                    let key_value = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key_value, value)
                        .map_err(|err| self.convert(err, key.offset))?;
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp { element, clauses } => {
                let mut inner = scope.child();
                let mut items = Vec::new();
                self.comprehension(clauses, &mut inner, &mut |eval, scope| {
                    items.push(eval.eval(element, scope)?);
                    Ok(())
                })?;
                Ok(Value::list(items))
            }
            ExprKind::DictComp { key, value, clauses } => {
                let mut inner = scope.child();
                let dict = Dict::new();
                self.comprehension(clauses, &mut inner, &mut |eval, scope| {
                    let k = eval.eval(key, scope)?;
                    let v = eval.eval(value, scope)?;
                    dict.insert(k, v).map_err(|err| eval.convert(err, key.offset))
                })?;
                Ok(Value::dict(dict))
            }
            ExprKind::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let key = self.eval(index, scope)?;
                ops::index(&target, &key).map_err(|err| self.convert(err, offset))
            }
            ExprKind::Slice { target, start, stop, step } => {
                let target = self.eval(target, scope)?;
                let start = self.eval_optional(start, scope)?;
                let stop = self.eval_optional(stop, scope)?;
                let step = self.eval_optional(step, scope)?;
                ops::slice(&target, start, stop, step).map_err(|err| self.convert(err, offset))
            }
            ExprKind::Attr { target, name } => {
                let target = self.eval(target, scope)?;
                ops::attr(&target, name).map_err(|err| self.convert(err, offset))
            }
            ExprKind::Call { func, args } => {
                let callable = self.eval(func, scope)?;
                let args = self.eval_args(args, scope)?;
                self.call(&callable, args, offset)
            }
            ExprKind::Lambda(def) => self.make_function(def, scope),
            ExprKind::Conditional { cond, then, otherwise } => {
                if self.eval(cond, scope)?.truth() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                ops::unary(*op, &value).map_err(|err| self.convert(err, offset))
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::binary(*op, &left, &right).map_err(|err| self.convert(err, offset))
            }
            ExprKind::And(left, right) => {
                let left = self.eval(left, scope)?;
                if left.truth() {
                    self.eval(right, scope)
                } else {
                    Ok(left)
                }
            }
            ExprKind::Or(left, right) => {
                let left = self.eval(left, scope)?;
                if left.truth() {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
        }
    }

    fn comprehension(
        &mut self,
        clauses: &[Clause],
        scope: &mut Scope,
        emit: &mut dyn FnMut(&mut Self, &mut Scope) -> Result<()>,
    ) -> Result<()> {
        match clauses.split_first() {
            None => emit(self, scope),
            Some((Clause::For { target, iter }, rest)) => {
                let iterable = self.eval(iter, scope)?;
                let items = iterable
                    .iterate()
                    .map_err(|err| self.convert(err, iter.offset))?;
                for item in items {
                    self.assign(target, item, scope)?;
                    self.comprehension(rest, scope, emit)?;
                }
                Ok(())
            }
            Some((Clause::If(cond), rest)) => {
                if self.eval(cond, scope)?.truth() {
                    self.comprehension(rest, scope, emit)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Arg], scope: &mut Scope) -> Result<Arguments> {
        let mut out = Arguments::default();
        for arg in args {
            match arg {
                Arg::Positional(expr) => out.positional.push(self.eval(expr, scope)?),
                Arg::Named(name, expr) => {
                    let value = self.eval(expr, scope)?;
                    out.named.push((name.clone(), value));
                }
                Arg::Star(expr) => {
                    let value = self.eval(expr, scope)?;
                    let items = value
                        .iterate()
                        .map_err(|err| self.convert(err, expr.offset))?;
                    out.positional.extend(items);
                }
                Arg::StarStar(expr) => match self.eval(expr, scope)? {
                    Value::Dict(dict) => {
                        for (key, value) in dict.items() {
                            match key.as_str() {
                                Some(name) => out.named.push((name.to_string(), value)),
                                None => {
                                    return Err(self.error_at(
                                        expr.offset,
                                        format!("keywords must be strings, not {}", key.type_name()),
                                    ))
                                }
                            }
                        }
                    }
                    other => {
                        return Err(self.error_at(
                            expr.offset,
                            format!("argument after ** must be a dict, not {}", other.type_name()),
                        ))
                    }
                },
            }
        }
        Ok(out)
    }
}

/// Bind call arguments to the parameters of `function`
fn bind_parameters(function: &Function, args: Arguments) -> anyhow::Result<FxHashMap<String, Value>> {
    let name = function.name();
    let params = &function.def.params;
    let mut locals = FxHashMap::default();

    let slots: Vec<&str> = params
        .iter()
        .take_while(|p| matches!(p, Param::Required(_) | Param::Optional(..)))
        .map(Param::name)
        .collect();
    let accepts_args = params.iter().any(|p| matches!(p, Param::Args(_)));
    let accepts_kwargs = params.iter().any(|p| matches!(p, Param::Kwargs(_)));

    let mut positional = args.positional.into_iter();
    for slot in &slots {
        match positional.next() {
            Some(value) => {
                locals.insert(slot.to_string(), value);
            }
            None => break,
        }
    }
    let mut extra: Vec<Value> = positional.collect();
    if !extra.is_empty() && !accepts_args {
        anyhow::bail!(
            "function {} accepts at most {} positional arguments ({} given)",
            name,
            slots.len(),
            slots.len() + extra.len()
        );
    }

    let mut extra_named = Vec::new();
    for (key, value) in args.named {
        if slots.contains(&key.as_str()) {
            if locals.contains_key(&key) {
                anyhow::bail!("function {} got multiple values for parameter {}", name, key);
            }
            locals.insert(key, value);
        } else if accepts_kwargs {
            extra_named.push((key, value));
        } else {
            anyhow::bail!("function {} got an unexpected keyword argument {}", name, key);
        }
    }

    for (param, default) in params.iter().zip(&function.defaults) {
        match param {
            Param::Required(param) if !locals.contains_key(param) => {
                anyhow::bail!("function {} missing argument for {}", name, param);
            }
            Param::Optional(param, _) if !locals.contains_key(param) => {
                locals.insert(param.clone(), default.clone().unwrap_or(Value::None));
            }
            Param::Args(param) => {
                locals.insert(param.clone(), Value::tuple(std::mem::take(&mut extra)));
            }
            Param::Kwargs(param) => {
                let pairs = std::mem::take(&mut extra_named);
                locals.insert(param.clone(), Value::dict(Dict::from_strings(pairs)));
            }
            _ => {}
        }
    }
    Ok(locals)
}
