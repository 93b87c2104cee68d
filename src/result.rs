//! Status codes returned across the foreign boundary
//!
//! Zero and positive values are success, negative values are failure.

use crate::error::InteropError;
use crate::guid::Guid;
use core::fmt;

/// 32-bit signed status code
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const OK: Self = Self(0);
    pub const FALSE: Self = Self(1);
    pub const NOT_IMPLEMENTED: Self = Self(0x8000_4001_u32 as i32);
    pub const NO_INTERFACE: Self = Self(0x8000_4002_u32 as i32);
    pub const POINTER: Self = Self(0x8000_4003_u32 as i32);
    pub const ABORT: Self = Self(0x8000_4004_u32 as i32);
    pub const FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const UNEXPECTED: Self = Self(0x8000_FFFF_u32 as i32);
    pub const ACCESS_DENIED: Self = Self(0x8007_0005_u32 as i32);
    pub const OUT_OF_MEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const INVALID_ARG: Self = Self(0x8007_0057_u32 as i32);

    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Symbolic name for well-known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "S_OK",
            Self::FALSE => "S_FALSE",
            Self::NOT_IMPLEMENTED => "E_NOTIMPL",
            Self::NO_INTERFACE => "E_NOINTERFACE",
            Self::POINTER => "E_POINTER",
            Self::ABORT => "E_ABORT",
            Self::FAIL => "E_FAIL",
            Self::UNEXPECTED => "E_UNEXPECTED",
            Self::ACCESS_DENIED => "E_ACCESSDENIED",
            Self::OUT_OF_MEMORY => "E_OUTOFMEMORY",
            Self::INVALID_ARG => "E_INVALIDARG",
            _ => return None,
        };
        Some(name)
    }

    /// Convert a failure status into an error
    #[inline]
    pub fn check(self) -> Result<(), InteropError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(InteropError::from(self))
        }
    }

    /// Like `check`, but a no-interface failure names the queried id
    #[inline]
    pub fn check_query(self, iid: &Guid) -> Result<(), InteropError> {
        match self {
            Self::NO_INTERFACE => Err(InteropError::NoInterface { iid: Some(*iid) }),
            code => code.check(),
        }
    }
}

impl From<i32> for ResultCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code.0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:08X} ({})", self.0 as u32, name),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({})", self)
    }
}
