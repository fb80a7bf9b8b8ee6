//! Core vocabulary of the Data Access Abstraction Layer.
//!
//! One filter/query language, one result envelope, one adapter contract:
//!
//! ```text
//! FilterSpec + QueryOptions ──► adapter (embedded | http | mock | sql)
//!                                   │ translate → execute → normalize
//!                                   ▼
//!                         ResponseEnvelope { success, data, error }
//! ```
//!
//! Adapters implement the fallible [`Backend`] trait with `?`-propagating
//! methods; a blanket impl turns every `Backend` into a [`BackendAdapter`],
//! which never returns an error to the caller, only an envelope.
//!
//! [`matches`] is the reference predicate every backend's filtering must agree
//! with.

mod adapter;
mod envelope;
mod error;
mod filter;
mod query;
mod session;
mod stamp;

pub use adapter::{validate_identifier, Backend, BackendAdapter};
pub use envelope::ResponseEnvelope;
pub use error::{DaalError, DaalResult, ErrorKind};
pub use filter::{compare_values, matches, value_text, values_equal, FilterCondition, FilterSpec};
pub use query::{Columns, OrderBy, QueryOptions, Record};
pub use session::{
    session_machine, Session, SessionMachine, SessionMachineInput, SessionMachineState,
    SessionState, SessionTracker,
};
pub use stamp::{generate_id, next_timestamp, stamp_insert, stamp_update, timestamp_now};
