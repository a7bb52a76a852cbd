use serde::Serialize;
use utoipa::ToSchema;

use crate::models::notification::ProviderType;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message,
        }
    }

    pub fn error(error: String, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AcceptReceipt {
    pub id: String,
    pub queued: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BulkReceipt {
    pub ids: Vec<String>,
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub available: Vec<ProviderType>,
}
