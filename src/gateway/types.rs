//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `error_codes`: Standard error code constants

use serde::Serialize;

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    pub code: i32,
    /// Response message
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const DUPLICATE_EVENT: i32 = 1003;
    pub const UNKNOWN_REFERENCE: i32 = 1004;
    pub const PERCENTAGE_MISMATCH: i32 = 1005;

    // Auth errors (2xxx)
    pub const INVALID_SIGNATURE: i32 = 2001;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const PROVIDER_UNAVAILABLE: i32 = 5002;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let response = ApiResponse::success(42);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"], 42);
    }

    #[test]
    fn test_error_omits_data() {
        let response = ApiResponse::<()>::error(error_codes::NOT_FOUND, "missing");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], 4001);
        assert!(json.get("data").is_none());
    }
}
