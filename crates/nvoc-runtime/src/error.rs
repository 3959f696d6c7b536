//! Runtime status codes
//!
//! Every fallible runtime operation returns [`NvResult`]. Each [`NvocError`]
//! variant maps onto the numeric `NV_STATUS` value the resource manager
//! reports to its callers; success (`NV_OK`) is `Ok(..)`.

use thiserror::Error;

/// Numeric status reported for success.
pub const NV_OK: u32 = 0x0000_0000;

/// Failure statuses produced by object creation and control dispatch
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvocError {
    /// The allocator could not satisfy the request
    #[error("out of memory")]
    NoMemory,

    /// A caller-supplied argument was rejected
    #[error("invalid argument")]
    InvalidArgument,

    /// The object is in the wrong lifecycle phase for the operation
    #[error("invalid state")]
    InvalidState,

    /// Unspecified failure reported by a constructor or control
    #[error("generic failure")]
    GenericFailure,

    /// The operation or control is not implemented for this object
    #[error("not supported")]
    NotSupported,

    /// The class id is unknown or not constructible
    #[error("invalid class")]
    InvalidClass,

    /// The parent object cannot own the child
    #[error("invalid object parent")]
    InvalidObjectParent,

    /// The control parameter buffer does not match the declared size
    #[error("invalid parameter struct")]
    InvalidParamStruct,

    /// The caller lacks the access rights required by the control
    #[error("insufficient permissions")]
    InsufficientPermissions,
}

impl NvocError {
    /// All variants, in status-code order.
    pub const ALL: [NvocError; 9] = [
        NvocError::InsufficientPermissions,
        NvocError::InvalidArgument,
        NvocError::InvalidClass,
        NvocError::InvalidObjectParent,
        NvocError::InvalidParamStruct,
        NvocError::InvalidState,
        NvocError::NoMemory,
        NvocError::NotSupported,
        NvocError::GenericFailure,
    ];

    /// The `NV_STATUS` value for this error.
    pub const fn code(self) -> u32 {
        match self {
            NvocError::InsufficientPermissions => 0x0000_001B,
            NvocError::InvalidArgument => 0x0000_001F,
            NvocError::InvalidClass => 0x0000_0022,
            NvocError::InvalidObjectParent => 0x0000_003A,
            NvocError::InvalidParamStruct => 0x0000_003E,
            NvocError::InvalidState => 0x0000_0040,
            NvocError::NoMemory => 0x0000_0051,
            NvocError::NotSupported => 0x0000_0056,
            NvocError::GenericFailure => 0x0000_FFFF,
        }
    }

    /// Map an `NV_STATUS` value back to an error. `NV_OK` and unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|err| err.code() == code)
    }

    /// The `NV_ERR_*` symbol for this error.
    pub const fn symbol(self) -> &'static str {
        match self {
            NvocError::InsufficientPermissions => "NV_ERR_INSUFFICIENT_PERMISSIONS",
            NvocError::InvalidArgument => "NV_ERR_INVALID_ARGUMENT",
            NvocError::InvalidClass => "NV_ERR_INVALID_CLASS",
            NvocError::InvalidObjectParent => "NV_ERR_INVALID_OBJECT_PARENT",
            NvocError::InvalidParamStruct => "NV_ERR_INVALID_PARAM_STRUCT",
            NvocError::InvalidState => "NV_ERR_INVALID_STATE",
            NvocError::NoMemory => "NV_ERR_NO_MEMORY",
            NvocError::NotSupported => "NV_ERR_NOT_SUPPORTED",
            NvocError::GenericFailure => "NV_ERR_GENERIC",
        }
    }
}

/// Result type used throughout the runtime
pub type NvResult<T> = Result<T, NvocError>;

/// Collapse a result into the numeric status a C caller would observe.
pub fn status_code<T>(result: &NvResult<T>) -> u32 {
    match result {
        Ok(_) => NV_OK,
        Err(err) => err.code(),
    }
}
