use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub const MAX_DEVICE_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
}

impl KernelError {
    pub fn status(&self) -> StatusCode {
        match self {
            KernelError::MalformedBody(_) | KernelError::InvalidDeviceId(_) => {
                StatusCode::BAD_REQUEST
            }
            KernelError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Body parsed as JSON but is not an object.
    pub fn expected_object() -> Self {
        KernelError::MalformedBody(<serde_json::Error as serde::de::Error>::custom(
            "expected a JSON object",
        ))
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Rejects ids that cannot be echoed back safely in logs and JSON keys.
pub fn validate_device_id(id: &str) -> Result<(), KernelError> {
    if id.trim().is_empty() {
        return Err(KernelError::InvalidDeviceId("empty".into()));
    }
    if id.len() > MAX_DEVICE_ID_LEN {
        return Err(KernelError::InvalidDeviceId(format!(
            "longer than {MAX_DEVICE_ID_LEN} bytes"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(KernelError::InvalidDeviceId("contains control characters".into()));
    }
    Ok(())
}
