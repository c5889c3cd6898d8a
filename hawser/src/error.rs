//! Error type shared by entities, I/O handlers, and handles.

use thiserror::Error;

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported through handle methods and the application error callback.
///
/// The first seven variants are the framework's stable shutdown and misuse
/// codes; everything the operating system reports passes through as
/// [`Error::Io`].
#[derive(Debug, Error)]
pub enum Error {
    /// A handle was used after its entity or I/O handler was destroyed.
    #[error("network entity or I/O handler reference expired")]
    WeakPtrExpired,
    /// A TCP acceptor was stopped; delivered as the final error callback.
    #[error("TCP acceptor stopped")]
    TcpAcceptorStopped,
    /// A TCP connector was stopped; delivered as the final error callback.
    #[error("TCP connector stopped")]
    TcpConnectorStopped,
    /// A TCP connection was shut down through `stop_io`.
    #[error("TCP I/O handler stopped")]
    TcpIoHandlerStopped,
    /// A UDP entity was stopped; delivered as the final error callback.
    #[error("UDP entity stopped")]
    UdpEntityStopped,
    /// A UDP socket was shut down through `stop_io`.
    #[error("UDP I/O handler stopped")]
    UdpIoHandlerStopped,
    /// A message handler returned `false`, or a frame function produced an
    /// unframeable size; the handler is torn down.
    #[error("message handler terminated")]
    MessageHandlerTerminated,
    /// Passthrough of an operating system error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the graceful shutdown codes, false for transport and
    /// protocol failures.
    pub fn is_stop_code(&self) -> bool {
        matches!(
            self,
            Error::TcpAcceptorStopped
                | Error::TcpConnectorStopped
                | Error::TcpIoHandlerStopped
                | Error::UdpEntityStopped
                | Error::UdpIoHandlerStopped
        )
    }
}
