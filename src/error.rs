//! Unified error type.

use thiserror::Error;

/// The error type returned by tsu-bridge's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values or toolkit
/// [`HttpException`](crate::toolkit::HttpException)s, not as `Error`s. This
/// type surfaces infrastructure failures and misuse of the request-local
/// proxies.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The configured listen address is not a valid `host:port`.
    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    /// A request-local proxy was dereferenced with no request bound to the
    /// current task.
    #[error("no request bound for plugin `{plugin}` in this context")]
    OutsideRequest { plugin: &'static str },

    /// The bound request-local value is not of the type the proxy expects.
    #[error("request-local value for plugin `{plugin}` is not a `{expected}`")]
    ContextType {
        plugin: &'static str,
        expected: &'static str,
    },
}

/// Result type for tsu-bridge operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
