//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. 4xxx codes are the
//! caller's fault, 5xxx codes are the server's.

use jsonrpsee::types::ErrorObjectOwned;
use tasklane_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const UNKNOWN_JOB: i32 = 4001;
    pub const NOT_FOUND: i32 = 4004;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_UNAVAILABLE: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
            code::VALIDATION_ERROR
        }
        AppError::UnknownJob(_) => code::UNKNOWN_JOB,
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::StoreUnavailable(_) => code::STORE_UNAVAILABLE,
        AppError::HandlerFailure(_) | AppError::Config(_) | AppError::Internal(_) => {
            code::INTERNAL_ERROR
        }
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}
