//! Evaluation of spell scripts.
//!
//! A script has no ambient authority: it sees only the bindings it is run
//! with, and every [`Handle`] in those bindings leads back to the [`Host`].
//! The interpreter itself never touches the filesystem, the network or the
//! clock beyond enforcing its [`Budget`].

use std::collections::BTreeMap;
use std::fmt;
use spell_common::time::{Duration, Instant};

use crate::ast::*;
use crate::error::ScriptError;
use crate::parser::parse;

/// An opaque reference to something only the host can act on. Scripts can
/// pass handles around and store them, but cannot forge them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Mint a handle. Only hosts do this.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The host-assigned id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Handle(Handle),
}

impl Value {
    /// A short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Handle(_) => "handle",
        }
    }

    /// Whether the value counts as true in a condition.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Handle(_) => true,
        }
    }

    fn render(&self, top: bool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) if top => write!(f, "{s}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    item.render(false, f)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (index, (key, item)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    item.render(false, f)?;
                }
                write!(f, "}}")
            }
            Value::Handle(handle) => write!(f, "<handle {}>", handle.id()),
        }
    }
}

/// Strings display bare at the top level and quoted inside collections.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(true, f)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<Handle> for Value {
    fn from(value: Handle) -> Self {
        Value::Handle(value)
    }
}

/// Everything a script can do beyond computing on plain data goes through
/// a [`Host`].
pub trait Host {
    /// The error the host reports when it refuses or fails an operation.
    type Error;

    /// Read `handle.name`.
    fn get(&mut self, handle: Handle, name: &str) -> Result<Value, Self::Error>;

    /// Write `handle.name = value`.
    fn set(&mut self, handle: Handle, name: &str, value: Value) -> Result<(), Self::Error>;

    /// Call `handle.method(args)`.
    fn call(&mut self, handle: Handle, method: &str, args: Vec<Value>)
    -> Result<Value, Self::Error>;

    /// Call `handle(args)`.
    fn invoke(&mut self, handle: Handle, args: Vec<Value>) -> Result<Value, Self::Error>;

    /// Receive a line written with `log(..)`.
    fn log(&mut self, line: &str);
}

/// How deeply lists and maps may nest inside one another.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Allocation units a map costs on top of its entries. Every value costs one
/// unit and every byte of text, keys included, one more.
pub const MAP_UNITS: u64 = 16;

/// Limits on a single script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Statements plus expressions evaluated.
    pub max_steps: u64,
    /// Wall-clock allowance, if any.
    pub max_duration: Option<Duration>,
    /// Data the script may build or copy over the whole run; see
    /// [`MAP_UNITS`] for how it is counted.
    pub max_allocation: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_duration: Some(Duration::from_secs(1)),
            max_allocation: 4 * 1024 * 1024,
        }
    }
}

type Outcome<T, E> = Result<T, ScriptError<E>>;

fn runtime<T, E>(message: impl Into<String>) -> Outcome<T, E> {
    Err(ScriptError::Runtime(message.into()))
}

/// Parse and run `source` with `bindings` as its only variables.
pub fn run<H: Host>(
    source: &str,
    bindings: BTreeMap<String, Value>,
    host: &mut H,
    budget: &Budget,
) -> Result<(), ScriptError<H::Error>> {
    let program = parse(source)?;
    evaluate(&program, bindings, host, budget)
}

/// Run an already parsed program with `bindings` as its only variables.
pub fn evaluate<H: Host>(
    program: &Program,
    bindings: BTreeMap<String, Value>,
    host: &mut H,
    budget: &Budget,
) -> Result<(), ScriptError<H::Error>> {
    let mut interpreter = Interpreter {
        host,
        scopes: vec![bindings, BTreeMap::new()],
        steps: 0,
        allocated: 0,
        budget: *budget,
        deadline: budget.max_duration.map(|duration| Instant::now() + duration),
    };
    for statement in &program.statements {
        interpreter.exec(statement)?;
    }
    Ok(())
}

enum Key {
    Name(String),
    Position(i64),
}

struct Interpreter<'h, H: Host> {
    host: &'h mut H,
    scopes: Vec<BTreeMap<String, Value>>,
    steps: u64,
    allocated: u64,
    budget: Budget,
    deadline: Option<Instant>,
}

impl<H: Host> Interpreter<'_, H> {
    fn tick(&mut self) -> Outcome<(), H::Error> {
        self.steps += 1;
        if self.steps > self.budget.max_steps {
            return Err(ScriptError::BudgetExceeded(format!(
                "exceeded the budget of {} steps",
                self.budget.max_steps
            )));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(ScriptError::BudgetExceeded(format!(
                    "exceeded the time budget of {:?}",
                    self.budget.max_duration.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    /// What copying or building `value` costs against the allocation
    /// budget.
    fn cost(&self, value: &Value) -> Outcome<u64, H::Error> {
        let remaining = self.budget.max_allocation.saturating_sub(self.allocated);
        let (units, depth) = measure(value, remaining);
        if depth > MAX_VALUE_DEPTH {
            return runtime(format!(
                "values may nest at most {MAX_VALUE_DEPTH} levels deep"
            ));
        }
        if units > remaining {
            return Err(ScriptError::BudgetExceeded(format!(
                "exceeded the allocation budget of {} units",
                self.budget.max_allocation
            )));
        }
        Ok(units)
    }

    fn allocate(&mut self, value: Value) -> Outcome<Value, H::Error> {
        self.allocated += self.cost(&value)?;
        Ok(value)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    // --- Statements ---

    fn exec(&mut self, statement: &Statement) -> Outcome<(), H::Error> {
        self.tick()?;
        match statement {
            Statement::Let { name, value } => {
                let value = self.eval(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
            }
            Statement::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Statement::Expr(expr) => {
                self.eval(expr)?;
            }
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.exec_block(then)?;
                } else {
                    self.exec_block(otherwise)?;
                }
            }
            Statement::While { condition, body } => {
                while self.eval(condition)?.is_truthy() {
                    self.exec_block(body)?;
                }
            }
        }
        Ok(())
    }

    fn exec_block(&mut self, statements: &[Statement]) -> Outcome<(), H::Error> {
        self.scopes.push(BTreeMap::new());
        for statement in statements {
            self.exec(statement)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn assign(&mut self, place: &Place, value: Value) -> Outcome<(), H::Error> {
        let mut keys = Vec::with_capacity(place.path.len());
        for step in &place.path {
            keys.push(match step {
                Step::Field(name) => Key::Name(name.clone()),
                Step::Index(index) => match self.eval(index)? {
                    Value::Str(name) => Key::Name(name),
                    Value::Integer(position) => Key::Position(position),
                    other => return runtime(format!("cannot index with {}", other.type_name())),
                },
            });
        }

        if measure(&value, u64::MAX).1 + keys.len() > MAX_VALUE_DEPTH {
            return runtime(format!(
                "values may nest at most {MAX_VALUE_DEPTH} levels deep"
            ));
        }

        let Some(current) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&place.root))
            .map(std::mem::take)
        else {
            return runtime(format!("assignment to undeclared variable '{}'", place.root));
        };
        let updated = self.assign_into(current, &keys, value)?;

        if let Some(slot) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&place.root))
        {
            *slot = updated;
        }
        Ok(())
    }

    /// Write `value` at `keys` inside `container`, returning the updated
    /// container. Writes through a handle go to the host; a handle itself is
    /// never replaced.
    fn assign_into(
        &mut self,
        container: Value,
        keys: &[Key],
        value: Value,
    ) -> Outcome<Value, H::Error> {
        let Some((key, rest)) = keys.split_first() else {
            return Ok(value);
        };

        match (container, key) {
            (Value::Handle(handle), Key::Name(name)) => {
                let updated = if rest.is_empty() {
                    value
                } else {
                    let child = self.host.get(handle, name).map_err(ScriptError::Host)?;
                    if let Value::Handle(_) = child {
                        self.assign_into(child, rest, value)?;
                        return Ok(Value::Handle(handle));
                    }
                    self.assign_into(child, rest, value)?
                };
                self.host
                    .set(handle, name, updated)
                    .map_err(ScriptError::Host)?;
                Ok(Value::Handle(handle))
            }
            (Value::Map(mut entries), Key::Name(name)) => {
                let child = entries.remove(name).unwrap_or_default();
                let updated = if rest.is_empty() {
                    value
                } else {
                    self.assign_into(child, rest, value)?
                };
                entries.insert(name.clone(), updated);
                Ok(Value::Map(entries))
            }
            (Value::List(mut items), Key::Position(position)) => {
                let length = items.len();
                let Some(slot) = usize::try_from(*position)
                    .ok()
                    .and_then(|index| items.get_mut(index))
                else {
                    return runtime(format!(
                        "index {position} out of range for list of length {length}"
                    ));
                };
                *slot = if rest.is_empty() {
                    value
                } else {
                    self.assign_into(std::mem::take(slot), rest, value)?
                };
                Ok(Value::List(items))
            }
            (container, Key::Name(name)) => runtime(format!(
                "cannot assign field '{name}' of {}",
                container.type_name()
            )),
            (container, Key::Position(position)) => runtime(format!(
                "cannot assign index {position} of {}",
                container.type_name()
            )),
        }
    }

    // --- Expressions ---

    fn eval(&mut self, expr: &Expr) -> Outcome<Value, H::Error> {
        self.tick()?;
        match expr {
            Expr::Literal(literal) => self.allocate(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Integer(n) => Value::Integer(*n),
                Literal::Float(n) => Value::Float(*n),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Variable(name) => {
                let Some(value) = self.lookup(name) else {
                    return runtime(format!("unknown variable '{name}'"));
                };
                let units = self.cost(value)?;
                let value = value.clone();
                self.allocated += units;
                Ok(value)
            }
            Expr::List(items) => {
                let items = self.eval_all(items)?;
                self.allocate(Value::List(items))
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                self.allocate(Value::Map(map))
            }
            Expr::Field { target, name } => {
                let target = self.eval(target)?;
                self.field(target, name)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index(target, index)
            }
            Expr::Call { callee, args } => {
                if let Expr::Variable(name) = callee.as_ref() {
                    if self.lookup(name).is_none() && is_builtin(name) {
                        let args = self.eval_all(args)?;
                        return self.builtin(name, args);
                    }
                }
                let callee = self.eval(callee)?;
                let args = self.eval_all(args)?;
                let result = match callee {
                    Value::Handle(handle) => {
                        self.host.invoke(handle, args).map_err(ScriptError::Host)?
                    }
                    other => return runtime(format!("{} is not callable", other.type_name())),
                };
                self.allocate(result)
            }
            Expr::MethodCall {
                target,
                method,
                args,
            } => {
                let target = self.eval(target)?;
                let args = self.eval_all(args)?;
                let result = match target {
                    Value::Handle(handle) => self
                        .host
                        .call(handle, method, args)
                        .map_err(ScriptError::Host)?,
                    Value::Map(entries) => match entries.get(method) {
                        Some(Value::Handle(handle)) => {
                            self.host.invoke(*handle, args).map_err(ScriptError::Host)?
                        }
                        _ => return runtime(format!("map has no callable '{method}'")),
                    },
                    other => {
                        return runtime(format!("{} has no method '{method}'", other.type_name()));
                    }
                };
                self.allocate(result)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match (op, operand) {
                    (UnaryOp::Not, operand) => Ok(Value::Bool(!operand.is_truthy())),
                    (UnaryOp::Negate, Value::Integer(n)) => match n.checked_neg() {
                        Some(n) => Ok(Value::Integer(n)),
                        None => runtime("integer overflow"),
                    },
                    (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (UnaryOp::Negate, other) => {
                        runtime(format!("cannot negate {}", other.type_name()))
                    }
                }
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let result = self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let result = self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                match binary(*op, left, right).map_err(ScriptError::Runtime)? {
                    grown @ (Value::Str(_) | Value::List(_)) => self.allocate(grown),
                    other => Ok(other),
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Outcome<Vec<Value>, H::Error> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn field(&mut self, target: Value, name: &str) -> Outcome<Value, H::Error> {
        match target {
            Value::Map(mut entries) => Ok(entries.remove(name).unwrap_or_default()),
            Value::Handle(handle) => {
                let value = self.host.get(handle, name).map_err(ScriptError::Host)?;
                self.allocate(value)
            }
            other => runtime(format!(
                "cannot read field '{name}' of {}",
                other.type_name()
            )),
        }
    }

    fn index(&mut self, target: Value, index: Value) -> Outcome<Value, H::Error> {
        match (target, index) {
            (Value::List(items), Value::Integer(position)) => {
                let length = items.len();
                match usize::try_from(position)
                    .ok()
                    .and_then(|index| items.into_iter().nth(index))
                {
                    Some(item) => Ok(item),
                    None => runtime(format!(
                        "index {position} out of range for list of length {length}"
                    )),
                }
            }
            (Value::Str(text), Value::Integer(position)) => {
                match usize::try_from(position)
                    .ok()
                    .and_then(|index| text.chars().nth(index))
                {
                    Some(ch) => Ok(Value::Str(ch.to_string())),
                    None => runtime(format!("index {position} out of range for string")),
                }
            }
            (Value::Map(mut entries), Value::Str(key)) => {
                Ok(entries.remove(&key).unwrap_or_default())
            }
            (Value::Handle(handle), Value::Str(key)) => {
                let value = self.host.get(handle, &key).map_err(ScriptError::Host)?;
                self.allocate(value)
            }
            (target, index) => runtime(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            )),
        }
    }

    fn builtin(&mut self, name: &str, args: Vec<Value>) -> Outcome<Value, H::Error> {
        match (name, args.as_slice()) {
            ("log", _) => {
                let line = args
                    .iter()
                    .map(|arg| arg.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.host.log(&line);
                Ok(Value::Null)
            }
            ("fail", []) => Err(ScriptError::Raised("failed".into())),
            ("fail", [reason]) => Err(ScriptError::Raised(reason.to_string())),
            ("len", [Value::Str(text)]) => Ok(Value::Integer(text.chars().count() as i64)),
            ("len", [Value::List(items)]) => Ok(Value::Integer(items.len() as i64)),
            ("len", [Value::Map(entries)]) => Ok(Value::Integer(entries.len() as i64)),
            ("keys", [Value::Map(entries)]) => self.allocate(Value::List(
                entries.keys().map(|key| Value::Str(key.clone())).collect(),
            )),
            (name, args) => runtime(format!(
                "{name}() does not accept ({})",
                args.iter()
                    .map(Value::type_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Allocation units `value` occupies and how deeply it nests. Counting stops
/// once it passes `limit` units or [`MAX_VALUE_DEPTH`] levels.
fn measure(value: &Value, limit: u64) -> (u64, usize) {
    let mut units = 0u64;
    let mut deepest = 0;
    let mut pending = vec![(value, 1)];
    while let Some((value, depth)) = pending.pop() {
        units += 1;
        deepest = deepest.max(depth);
        match value {
            Value::Str(text) => units += text.len() as u64,
            Value::List(items) => pending.extend(items.iter().map(|item| (item, depth + 1))),
            Value::Map(entries) => {
                units += MAP_UNITS;
                for (key, item) in entries {
                    units += key.len() as u64;
                    pending.push((item, depth + 1));
                }
            }
            _ => {}
        }
        if units > limit || deepest > MAX_VALUE_DEPTH {
            break;
        }
    }
    (units, deepest)
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "log" | "fail" | "len" | "keys")
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Remainder => "%",
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Less => "<",
        BinaryOp::LessEqual => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterEqual => ">=",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

/// Structural equality, with integers and floats compared by value.
fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
            as_float(left) == as_float(right)
        }
        (Value::List(left), Value::List(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| equal(l, r))
        }
        (Value::Map(left), Value::Map(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|((lk, lv), (rk, rv))| lk == rk && equal(lv, rv))
        }
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    let mismatch = |left: &Value, right: &Value| {
        format!(
            "cannot apply '{}' to {} and {}",
            symbol(op),
            left.type_name(),
            right.type_name()
        )
    };

    match op {
        BinaryOp::Equal => return Ok(Value::Bool(equal(&left, &right))),
        BinaryOp::NotEqual => return Ok(Value::Bool(!equal(&left, &right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Value::Integer(l), Value::Integer(r)) => l.partial_cmp(r),
                (Value::Str(l), Value::Str(r)) => l.partial_cmp(r),
                _ => match (as_float(&left), as_float(&right)) {
                    (Some(l), Some(r)) => l.partial_cmp(&r),
                    _ => return Err(mismatch(&left, &right)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            return Ok(Value::Bool(match op {
                BinaryOp::Less => ordering.is_lt(),
                BinaryOp::LessEqual => ordering.is_le(),
                BinaryOp::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => {
            if r == 0 && matches!(op, BinaryOp::Divide | BinaryOp::Remainder) {
                return Err("division by zero".into());
            }
            let result = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Subtract => l.checked_sub(r),
                BinaryOp::Multiply => l.checked_mul(r),
                BinaryOp::Divide => l.checked_div(r),
                BinaryOp::Remainder => l.checked_rem(r),
                _ => return Err(mismatch(&Value::Integer(l), &Value::Integer(r))),
            };
            result.map(Value::Integer).ok_or("integer overflow".into())
        }
        (Value::Str(l), Value::Str(r)) if op == BinaryOp::Add => Ok(Value::Str(l + &r)),
        (Value::List(mut l), Value::List(r)) if op == BinaryOp::Add => {
            l.extend(r);
            Ok(Value::List(l))
        }
        (left, right) => {
            let (Some(l), Some(r)) = (as_float(&left), as_float(&right)) else {
                return Err(mismatch(&left, &right));
            };
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide => l / r,
                BinaryOp::Remainder => l % r,
                _ => return Err(mismatch(&left, &right)),
            };
            if result.is_finite() {
                Ok(Value::Float(result))
            } else {
                Err("arithmetic produced a non-finite number".into())
            }
        }
    }
}
