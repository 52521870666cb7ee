//! # spell-sandbox
//!
//! The confined interpreter that vats run urbject code in.
//!
//! A script is a short sequence of statements over plain data. The only
//! names it starts with are the bindings its embedder passes in (for a vat,
//! `args` and `power`), and the only way to affect anything outside the
//! script is through a [`Handle`], which only the embedding [`Host`] can
//! mint and interpret.
//!
//! ## Syntax
//!
//! ```text
//! # comments run to the end of the line, as do // comments
//! let count = args.count + 1;
//! power.memory.count = count;
//! if count > 10 {
//!     args.callback.sendOnly({count: count});
//! } else {
//!     log('still counting', count);
//! }
//! ```
//!
//! Builtins are `log(..)`, `fail(reason)`, `len(x)` and `keys(map)`; a
//! variable with the same name hides the builtin.
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use spell_sandbox::{Budget, Handle, Host, Value, run};
//!
//! struct Printer(Vec<String>);
//!
//! impl Host for Printer {
//!     type Error = String;
//!     fn get(&mut self, _: Handle, name: &str) -> Result<Value, String> {
//!         Err(format!("no {name}"))
//!     }
//!     fn set(&mut self, _: Handle, name: &str, _: Value) -> Result<(), String> {
//!         Err(format!("no {name}"))
//!     }
//!     fn call(&mut self, _: Handle, name: &str, _: Vec<Value>) -> Result<Value, String> {
//!         Err(format!("no {name}"))
//!     }
//!     fn invoke(&mut self, _: Handle, _: Vec<Value>) -> Result<Value, String> {
//!         Err("not callable".into())
//!     }
//!     fn log(&mut self, line: &str) {
//!         self.0.push(line.to_owned());
//!     }
//! }
//!
//! let mut printer = Printer(Vec::new());
//! let args = BTreeMap::from([("args".to_string(), Value::Map(BTreeMap::new()))]);
//! run("log('hello', 40 + 2);", args, &mut printer, &Budget::default()).unwrap();
//!
//! assert_eq!(printer.0, vec!["hello 42".to_string()]);
//! ```

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod tokenizer;

pub use error::{ParseError, ScriptError};
pub use interpreter::{Budget, Handle, Host, MAP_UNITS, MAX_VALUE_DEPTH, Value, evaluate, run};
pub use parser::{parse, parse_expression};
