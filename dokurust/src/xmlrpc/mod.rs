//! Minimal XML-RPC client machinery: the value codec, the request and
//! response envelopes, and a blocking call transport with session cookies.

pub use self::client::{Client, ClientOptions};
pub use self::error::{Error, Fault, Result, StructuralError, TransportError};
pub use self::value::{parse_response, MethodResponse, Request, StructValue, Value};

pub mod client;
pub mod error;
pub mod value;
