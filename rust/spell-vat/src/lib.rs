#![warn(missing_docs)]

//! The execution kernel of a spellserver vat.
//!
//! A vat runs code in [`Turn`]s. Each Turn sees only the authority it was
//! handed (the `power` bundle of the invoked urbject, or a single state cell
//! for `execute`) plus its message `args`, and its effects are committed to
//! the vat's store as a unit or not at all. Turns talk to other objects only
//! by `sendOnly`, which the [`Transport`] turns into durable, ordered,
//! effectively-once messages.
//!
//! ```rust
//! # async fn example() -> Result<(), spell_vat::VatError> {
//! use spell_capability::{Message, Value};
//! use spell_storage::{CapabilityStore, MemoryStorageBackend};
//! use spell_vat::{ExecutionServer, Metrics, Switchboard, VatConfig};
//!
//! let store = CapabilityStore::open(MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default()).await?;
//! let mut server =
//!     ExecutionServer::new(store, Switchboard::new(), &VatConfig::default(), Metrics::new())
//!         .await?;
//!
//! let memid = server.store_mut().create_state_cell().await?;
//! let local = server.vat_id().clone();
//! server
//!     .process_request(
//!         &Message::execute(memid.clone(), "power.memory.greeting = 'hello';", Value::empty_map()),
//!         &local,
//!     )
//!     .await?;
//!
//! assert_eq!(
//!     server.store().read_cell(&memid).await?.get("greeting"),
//!     Some(&Value::from("hello"))
//! );
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod config;
pub use config::*;

mod metrics;
pub use metrics::*;

mod turn;
pub use turn::*;

mod network;
pub use network::*;

mod transport;
pub use transport::*;

mod graph;
pub use graph::*;

mod server;
pub use server::*;

mod control;
pub use control::*;

mod vat;
pub use vat::*;
