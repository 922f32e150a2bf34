//! Entities and typed repository interfaces for the durable campaign ledger.
//!
//! Each multi-record read-modify-write a campaign engine performs is exposed
//! as a single repository operation so implementations can make it one
//! transaction. Domain rejections come back as values in per-operation
//! outcome enums; the error channel is reserved for storage failures.
//!
//! Repositories never read the clock. Every operation that depends on time
//! takes the caller's timestamp, which keeps time-driven behavior a pure
//! function of its inputs.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod campaign;
mod group;
mod order;
mod session;

pub use campaign::*;
pub use group::*;
pub use order::*;
pub use session::*;

use std::error::Error;
use std::fmt::Debug;

/// Marker trait for ledger errors
pub trait LedgerError: Debug + Error + Send + Sync + 'static {}
