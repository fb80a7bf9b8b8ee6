//! Embedded platform client adapter.
//!
//! Translates DAAL calls into the chained query builder of a schema-bound
//! remote client ([`RemoteQuery`]) and executes them through a
//! [`RemoteClient`]:
//!
//! - [`SupabaseRestClient`]: PostgREST/GoTrue over reqwest
//! - [`InMemoryRemoteClient`]: process-local stand-in with the same semantics
//!
//! Sessions (access token + user) are kept by the adapter and attached to
//! every remote call; a remote 401 drops them.

mod adapter;
mod builder;
mod client;
mod error;
pub mod memory;
mod supabase;

pub use adapter::{apply_filters, EmbeddedClientAdapter};
pub use builder::{contains_pattern, escape_like, RemoteAction, RemoteFilter, RemoteOp, RemoteQuery};
pub use client::{RemoteAuth, RemoteClient, RemoteResponse};
pub use error::{RemoteError, RemoteResult};
pub use memory::InMemoryRemoteClient;
pub use supabase::SupabaseRestClient;
