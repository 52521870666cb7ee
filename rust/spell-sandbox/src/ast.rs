//! AST types for spell scripts.

/// A parsed script: statements run in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;` declares a variable in the current block.
    Let { name: String, value: Expr },
    /// `place = value;` overwrites a variable or a part of one.
    Assign { target: Place, value: Expr },
    /// `expr;` evaluated for its effects.
    Expr(Expr),
    /// `if condition { .. } else { .. }`; `else if` nests in `otherwise`.
    If {
        condition: Expr,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
    /// `while condition { .. }`
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
}

/// The left side of an assignment: a variable followed by zero or more
/// field or index steps, e.g. `power.memory.items[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub root: String,
    pub path: Vec<Step>,
}

/// One step into a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `.name`
    Field(String),
    /// `[expr]`
    Index(Expr),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Binary operators, lowest precedence last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Variable(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Field {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `target.method(args)`
    MethodCall {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Reinterpret an expression parsed before `=` as an assignment target.
    pub fn into_place(self) -> Option<Place> {
        match self {
            Expr::Variable(root) => Some(Place {
                root,
                path: Vec::new(),
            }),
            Expr::Field { target, name } => {
                let mut place = target.into_place()?;
                place.path.push(Step::Field(name));
                Some(place)
            }
            Expr::Index { target, index } => {
                let mut place = target.into_place()?;
                place.path.push(Step::Index(*index));
                Some(place)
            }
            _ => None,
        }
    }
}
