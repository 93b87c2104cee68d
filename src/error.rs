//! Error taxonomy for the interop layer
//!
//! Every variant maps onto a foreign status code, so an error raised inside a
//! callback can be handed back across the boundary as a plain `i32`.

use crate::guid::Guid;
use crate::result::ResultCode;
use std::io;
use thiserror::Error;

pub type Result<T, E = InteropError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteropError {
    /// Target does not implement the requested interface
    #[error("interface not supported{}", .iid.map(|iid| format!(": {iid}")).unwrap_or_default())]
    NoInterface { iid: Option<Guid> },

    /// Foreign call returned a failure status
    #[error("foreign call failed with {0}")]
    ForeignCall(ResultCode),

    /// Error raised by a callback, with the status it translates to
    #[error("callback failed with {code}: {message}")]
    Callback { code: ResultCode, message: String },

    /// Callback panicked while serving a foreign call
    #[error("callback panicked: {0}")]
    Panic(String),

    #[error("null native pointer")]
    NullPointer,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Trampoline invoked with an address no live shadow owns
    #[error("no shadow registered at 0x{0:X}")]
    ShadowNotFound(usize),

    /// Facet target is not of the type the trampoline expects
    #[error("shadow callback is not a {0}")]
    CallbackType(&'static str),

    #[error("invalid interface identifier: {0:?}")]
    InvalidGuid(String),
}

impl InteropError {
    /// Callback failure carrying an explicit status code
    pub fn callback(code: ResultCode, message: impl Into<String>) -> Self {
        Self::Callback {
            code,
            message: message.into(),
        }
    }

    /// Callback failure with the generic `E_FAIL` status
    pub fn failed(message: impl Into<String>) -> Self {
        Self::callback(ResultCode::FAIL, message)
    }

    pub fn no_interface(iid: Guid) -> Self {
        Self::NoInterface { iid: Some(iid) }
    }

    /// Status code reported to foreign callers for this error
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::NoInterface { .. } => ResultCode::NO_INTERFACE,
            Self::ForeignCall(code) => *code,
            Self::Callback { code, .. } if code.is_failure() => *code,
            Self::Callback { .. } => ResultCode::FAIL,
            Self::Panic(_) | Self::CallbackType(_) => ResultCode::UNEXPECTED,
            Self::NullPointer | Self::ShadowNotFound(_) => ResultCode::POINTER,
            Self::InvalidArgument(_) | Self::InvalidGuid(_) => ResultCode::INVALID_ARG,
        }
    }

    #[inline]
    pub fn is_no_interface(&self) -> bool {
        matches!(self, Self::NoInterface { .. })
    }
}

impl From<ResultCode> for InteropError {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::NO_INTERFACE => Self::NoInterface { iid: None },
            ResultCode::POINTER => Self::NullPointer,
            other => Self::ForeignCall(other),
        }
    }
}

impl From<io::Error> for InteropError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::PermissionDenied => ResultCode::ACCESS_DENIED,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ResultCode::INVALID_ARG,
            io::ErrorKind::OutOfMemory => ResultCode::OUT_OF_MEMORY,
            io::ErrorKind::Unsupported => ResultCode::NOT_IMPLEMENTED,
            io::ErrorKind::Interrupted => ResultCode::ABORT,
            _ => ResultCode::FAIL,
        };
        Self::callback(code, err.to_string())
    }
}
