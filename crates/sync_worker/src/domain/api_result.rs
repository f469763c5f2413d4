use common::domain::{DomainError, SyncError};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Error half of an `ApiResult`: a stable kind plus a human message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&SyncError> for ApiError {
    fn from(error: &SyncError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        Self::from(&error)
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self::from(SyncError::Domain(error))
    }
}

/// Uniform success-or-error value handed to display layers. Serializes as
/// `{"ok": true, "data": ...}` or `{"ok": false, "error": {"kind", "message"}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResult<T> {
    Ok(T),
    Err(ApiError),
}

impl<T> ApiResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ApiResult::Ok(_))
    }

    pub fn from_result<E: Into<ApiError>>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ApiResult::Ok(value),
            Err(e) => ApiResult::Err(e.into()),
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            ApiResult::Ok(value) => Ok(value),
            ApiResult::Err(e) => Err(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            ApiResult::Ok(value) => ApiResult::Ok(f(value)),
            ApiResult::Err(e) => ApiResult::Err(e),
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            ApiResult::Ok(_) => None,
            ApiResult::Err(e) => Some(e),
        }
    }
}

impl<T: Serialize> Serialize for ApiResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiResult", 2)?;
        match self {
            ApiResult::Ok(data) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("data", data)?;
            }
            ApiResult::Err(error) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}
