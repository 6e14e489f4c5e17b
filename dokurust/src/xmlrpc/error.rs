/// Convenience type for shorter return value syntax of this crate's errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by a call, split into three non-overlapping kinds.
///
/// Callers match on the kind: transport failures are retryable at their
/// discretion, faults are expected application-level outcomes (bad
/// credentials, missing pages), and structural errors point at a server or
/// parser incompatibility and are best treated as fatal.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No usable HTTP response was obtained.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server understood the call and reported a fault.
    #[error(transparent)]
    Fault(#[from] Fault),
    /// The response body does not conform to the XML-RPC response grammar.
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Failure to complete the HTTP round trip.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The endpoint URL did not parse, or the HTTP client could not be set up.
    #[error("invalid endpoint `{url}`: {reason}")]
    BadEndpoint {
        /// The endpoint as given by the caller.
        url: String,
        /// Reason for the failure.
        reason: String,
    },
    /// The request never produced a response (connection refused, timeout,
    /// TLS failure, interrupted body).
    #[error("request to `{url}` failed: {source}")]
    Request {
        /// Endpoint the request was sent to.
        url: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status code.
    #[error("bad status {status} from server: {body}")]
    Status {
        /// HTTP status code received.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
    },
}

/// Application-level fault reported by the server.
///
/// Carries enough context to be logged verbatim: the code and message from
/// the fault struct, plus the request document that triggered it.
#[derive(thiserror::Error, Debug)]
#[error("fault {code} calling `{method}`: {message}")]
pub struct Fault {
    /// Server-assigned fault code.
    pub code: i32,
    /// Human-readable fault description.
    pub message: String,
    /// Name of the remote method that was called.
    pub method: String,
    /// The request document that triggered the fault.
    pub request_xml: String,
}

/// The XML did not match the expected shape while decoding.
#[derive(thiserror::Error, Debug)]
pub enum StructuralError {
    /// The text was not well-formed XML.
    #[error("failed to read XML: {0}")]
    Xml(#[from] xml::reader::Error),
    /// A value carried a type tag outside the supported set.
    #[error("unsupported value type `{tag}`")]
    UnsupportedTag {
        /// The unrecognized tag name.
        tag: String,
    },
    /// An `<int>` did not hold base-10 integer text.
    #[error("failed to parse integer `{text}`")]
    MalformedInt {
        /// The offending text.
        text: String,
    },
    /// A `<boolean>` did not hold integer text.
    #[error("expected integer boolean text, got `{text}`")]
    MalformedBoolean {
        /// The offending text.
        text: String,
    },
    /// A node violated the cardinality rules of the value grammar.
    #[error("{reason}")]
    Malformed {
        /// Description of the violation.
        reason: String,
    },
    /// A whole `methodResponse` document was rejected.
    #[error("malformed method response: {reason}; full response: {raw}")]
    BadResponse {
        /// Description of the violation.
        reason: String,
        /// The raw response text, kept whole for diagnostics.
        raw: String,
    },
}

impl StructuralError {
    pub(crate) fn malformed<T: Into<String>>(reason: T) -> StructuralError {
        StructuralError::Malformed {
            reason: reason.into(),
        }
    }
}
