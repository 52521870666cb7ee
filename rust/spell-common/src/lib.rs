#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! across the spellserver crates: cross-target `Send`/`Sync` bounds, the
//! shared interior-mutability cell, content hashing for code identity, the
//! entropy source behind swiss numbers and a monotonic clock that also works
//! on WASM.

mod sync;
pub use sync::*;

mod hash;
pub use hash::*;

mod swiss;
pub use swiss::*;

pub mod time;
