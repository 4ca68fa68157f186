//! Chama - rotating savings group core
//!
//! Members of a group each contribute a fixed amount every period and the
//! whole pool goes to one member per round, in a frozen order, until every
//! member has been paid once.
//!
//! Layout:
//! - `group`: pure rules over one group's state (membership, nominations,
//!   lifecycle, rounds, payout authorization, scheduling)
//! - `service`: async façade that serializes work per group, persists a
//!   snapshot and publishes events after every successful change
//! - `persistence`: snapshot stores (in-memory, SQLite)
//! - `protocol`: JSON request/response mapping used by the `serve` command
//!
//! Money never moves here. A payout is recorded as completed once the
//! caller reports the ledger transfer.

pub mod clock;
pub mod error;
pub mod group;
pub mod notify;
pub mod persistence;
pub mod protocol;
pub mod serialization;
pub mod service;

pub use error::{ChamaError, ChamaResult, ErrorKind};
pub use service::ChamaService;
