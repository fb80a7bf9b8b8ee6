//! REST adapter.
//!
//! Routes:
//!
//! | operation    | request                          |
//! |--------------|----------------------------------|
//! | select       | `GET /{table}?{filters}`         |
//! | select_one   | `GET /{table}?{filters}&limit=1` |
//! | insert       | `POST /{table}`                  |
//! | update       | `PUT /{table}?{filters}`         |
//! | delete       | `DELETE /{table}?{filters}`      |
//! | upsert       | `POST /{table}/upsert`           |
//! | count        | `GET /{table}/count?{filters}`   |
//! | rpc          | `POST /rpc/{fn}`                 |
//! | auth         | `/auth/login`, `/auth/register`, `/auth/logout`, `/auth/me` |
//!
//! Filters are flattened to `column=value`; only equality conditions can be
//! expressed that way, so other operators fail with a validation error.

mod adapter;
mod transport;

pub use adapter::{filter_pairs, HttpAdapter};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
    TransportResult,
};
