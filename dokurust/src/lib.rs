//! XML-RPC client for DokuWiki: a minimal value codec, a blocking call
//! transport that carries session cookies, and a thin page editing API.

pub use crate::api::{DokuWiki, LockOutcome, RPC_PATH};
pub use crate::xmlrpc::{
    Client, ClientOptions, Error, Fault, Result, StructuralError, TransportError, Value,
};

pub mod api;
pub mod xmlrpc;
