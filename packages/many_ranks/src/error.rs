use thiserror::Error;

/// Errors that can occur when driving a timing session.
///
/// Every error carries a stable negative integer code, exchanged between
/// ranks when a collective operation has to agree on a shared outcome. See
/// [`Error::code()`] and [`Error::from_code()`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The session (or one of its peers) was not in an initialised state
    /// when a collective operation needed it. Also the agreed outcome when
    /// a peer failed without reporting a usable code of its own.
    #[error("timing session is not initialised")]
    NotInitialised,

    /// An aggregation buffer could not be sized or allocated.
    #[error("memory allocation failure")]
    FailedAllocation,

    /// The instance id is stale or was issued by another session.
    #[error("unknown instance id passed to function")]
    UnknownInstance,

    /// The timer group id is stale or was issued by another session.
    #[error("unknown timer group id passed to function")]
    UnknownGroup,

    /// The timer id is stale or was issued by another session.
    #[error("unknown timer id passed to function")]
    UnknownTimer,

    /// Collective instance construction failed on at least one rank.
    #[error("failed to create instance")]
    CreateInstanceFailed,

    /// The timer already exists in its group for the requested context.
    #[error("failed to create timer")]
    CreateTimerFailed,

    /// The report file could not be created or written.
    #[error("cannot create or write output file")]
    Sink,

    /// The communicator failed during a gather, reduction or broadcast, or
    /// delivered a payload that could not be decoded.
    #[error("transport error whilst gathering across ranks")]
    TransportFailed,

    /// More flags were logged than the report format can carry.
    #[error("too many flags supplied")]
    TooManyFlags,

    /// An option name did not match any known session option.
    #[error("unknown option name")]
    UnknownOption,
}

impl Error {
    /// The stable wire code for this error.
    ///
    /// Codes are negative and never reused; zero is reserved for success in
    /// the agreement protocol.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::NotInitialised => -2,
            Self::FailedAllocation => -3,
            Self::UnknownInstance => -6,
            Self::UnknownGroup => -7,
            Self::UnknownTimer => -8,
            Self::CreateInstanceFailed => -9,
            Self::CreateTimerFailed => -11,
            Self::Sink => -16,
            Self::TransportFailed => -21,
            Self::TooManyFlags => -22,
            Self::UnknownOption => -26,
        }
    }

    /// Reconstructs an error from a wire code received from another rank.
    ///
    /// Unrecognised codes fall back to [`Error::NotInitialised`], the
    /// weakest claim that can be made about a peer that failed.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -3 => Self::FailedAllocation,
            -6 => Self::UnknownInstance,
            -7 => Self::UnknownGroup,
            -8 => Self::UnknownTimer,
            -9 => Self::CreateInstanceFailed,
            -11 => Self::CreateTimerFailed,
            -16 => Self::Sink,
            -21 => Self::TransportFailed,
            -22 => Self::TooManyFlags,
            -26 => Self::UnknownOption,
            _ => Self::NotInitialised,
        }
    }
}

impl From<std::io::Error> for Error {
    /// Any I/O failure surfaces as the sink error. The underlying cause
    /// cannot travel between ranks, which only exchange the integer codes.
    fn from(_: std::io::Error) -> Self {
        Self::Sink
    }
}

impl From<std::num::TryFromIntError> for Error {
    /// A length that does not fit the wire format's fixed-width framing.
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::FailedAllocation
    }
}

/// A specialized `Result` type for timing session operations, returning the
/// crate's [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn codes_round_trip() {
        let all = [
            Error::NotInitialised,
            Error::FailedAllocation,
            Error::UnknownInstance,
            Error::UnknownGroup,
            Error::UnknownTimer,
            Error::CreateInstanceFailed,
            Error::CreateTimerFailed,
            Error::Sink,
            Error::TransportFailed,
            Error::TooManyFlags,
            Error::UnknownOption,
        ];

        for error in all {
            assert!(error.code() < 0);
            assert_eq!(Error::from_code(error.code()), error);
        }
    }

    #[test]
    fn unknown_code_falls_back_to_not_initialised() {
        assert_eq!(Error::from_code(-999), Error::NotInitialised);
        assert_eq!(Error::from_code(1), Error::NotInitialised);
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            Error::UnknownTimer.to_string(),
            "unknown timer id passed to function"
        );
        assert_eq!(
            Error::TransportFailed.to_string(),
            "transport error whilst gathering across ranks"
        );
    }
}
