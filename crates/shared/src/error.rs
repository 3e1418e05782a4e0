use serde::{Deserialize, Serialize};

/// Error body returned by the backend on non-2xx responses.
///
/// FastAPI-style servers use `detail`, others use `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            message: None,
        }
    }

    /// Server-supplied text, preferring `detail` over `message`.
    pub fn text(&self) -> Option<&str> {
        fn non_blank(field: &Option<String>) -> Option<&str> {
            field
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
        }
        non_blank(&self.detail).or_else(|| non_blank(&self.message))
    }
}
