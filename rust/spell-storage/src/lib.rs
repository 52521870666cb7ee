#![warn(missing_docs)]

//! Durable storage for a spellserver vat.
//!
//! A [`CapabilityStore`] keeps the vat's capability objects (urbjects,
//! powers and state cells) together with the transport ledger (outbound
//! queues, sequence counters and inbound high-water marks) in a single
//! [`StorageBackend`]. Rows are encoded with the [`CborEncoder`].
//!
//! Backends only need single-row atomicity. Multi-row atomicity comes from
//! the store's commit journal: a [`Changeset`] is written as one journal row,
//! applied, then cleared, and any leftover journal row is replayed when the
//! store is opened.
//!
//! ```rust
//! # async fn example() -> Result<(), spell_storage::SpellStorageError> {
//! use spell_storage::{CapabilityStore, MemoryStorageBackend};
//!
//! let mut store = CapabilityStore::open(MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default()).await?;
//! let memid = store.create_state_cell().await?;
//! let powid = store.create_power_for_memid(&memid, false).await?;
//! let urbjid = store
//!     .create_urbject("power.memory.foo = args.foo;", &powid)
//!     .await?;
//!
//! assert_eq!(store.get_urbject(&urbjid).await?.powid(), &powid);
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod encoder;
pub use encoder::*;

mod backend;
pub use backend::*;

mod changeset;
pub use changeset::*;

mod key;
pub use key::*;

mod store;
pub use store::*;

mod ledger;
pub use ledger::*;

#[cfg(all(not(target_arch = "wasm32"), any(test, feature = "helpers")))]
mod helpers;
#[cfg(all(not(target_arch = "wasm32"), any(test, feature = "helpers")))]
pub use helpers::*;
