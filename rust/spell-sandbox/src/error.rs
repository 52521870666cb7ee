//! Error types for the spell script sandbox.

use thiserror::Error;

/// Errors that can occur while tokenizing or parsing a script.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A character that starts no token.
    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedCharacter { found: char, line: usize },
    /// A string literal ran to the end of the input.
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },
    /// An unknown `\` escape inside a string literal.
    #[error("line {line}: unknown escape '\\{found}'")]
    InvalidEscape { found: char, line: usize },
    /// A numeric literal that does not fit its type.
    #[error("line {line}: invalid number '{text}'")]
    InvalidNumber { text: String, line: usize },
    /// Expected a particular token or construct but found something else.
    #[error("line {line}: expected {expected}, found {found}")]
    Expected {
        expected: String,
        found: String,
        line: usize,
    },
    /// The left side of `=` is not a variable, field or index.
    #[error("line {line}: cannot assign to this expression")]
    InvalidAssignmentTarget { line: usize },
    /// Expressions or blocks nested deeper than the parser allows.
    #[error("line {line}: nesting deeper than {limit} levels")]
    TooDeep { limit: usize, line: usize },
}

/// Errors that end the evaluation of a script.
///
/// `E` is the error type of the [`Host`](crate::Host) the script ran
/// against; host failures pass through untouched so the embedder can tell a
/// confinement breach from a bug in the script.
#[derive(Error, Debug)]
pub enum ScriptError<E> {
    /// The script does not parse.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// A type error or other runtime fault in the script.
    #[error("{0}")]
    Runtime(String),
    /// The script called `fail(..)`.
    #[error("script failed: {0}")]
    Raised(String),
    /// The script ran past its step or time allowance.
    #[error("{0}")]
    BudgetExceeded(String),
    /// The host refused or failed an operation.
    #[error("{0}")]
    Host(E),
}
