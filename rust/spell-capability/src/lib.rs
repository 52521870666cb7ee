//! Object-capability data model shared by every spellserver vat.
//!
//! A vat hosts three kinds of capability objects, all named by unguessable
//! swiss numbers:
//!
//! - an [`Urbject`] is immutable code bound to one [`Power`];
//! - a [`Power`] is a fixed, ordered bundle of named [`Authority`] grants;
//! - a state cell (memory) holds a mutable [`Value`] tree.
//!
//! Authorities come in three flavours: [`Authority::Native`] grants a host
//! primitive, [`Authority::Reference`] grants sending to an urbject (local or
//! remote) and [`Authority::MemorySlot`] grants read/write of one cell.
//!
//! Objects of a remote vat are only ever named by a [`Spid`]:
//!
//! ```rust
//! use spell_capability::{Spid, Urbjid, VatId};
//!
//! let spid = Spid::new(VatId::from("vat0-alpha"), Urbjid::from("urbj0-beta"));
//! let encoded = spid.to_string();
//!
//! assert!(encoded.starts_with("spid0-"));
//! assert_eq!(encoded.parse::<Spid>().unwrap(), spid);
//! ```
//!
//! Values exchanged between vats (message `args`) and values stored in cells
//! share the [`Value`] shape, in which capabilities are embedded as maps
//! carrying the reserved `__power__` discriminator.

#![warn(missing_docs)]

mod error;
pub use error::*;

mod id;
pub use id::*;

mod spid;
pub use spid::*;

mod authority;
pub use authority::*;

mod power;
pub use power::*;

mod urbject;
pub use urbject::*;

mod value;
pub use value::*;

mod message;
pub use message::*;
