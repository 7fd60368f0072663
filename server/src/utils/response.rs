use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Meta {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_data: Option<i64>,
}

impl Meta {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            page: None,
            size: None,
            total_page: None,
            total_data: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageInfo {
    pub page: i64,
    pub size: i64,
    pub total_page: i64,
    pub total_data: i64,
}

#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    let body = ApiResponse {
        meta: Meta::new(StatusCode::OK, message),
        data: Some(data),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub fn paginated<T>(data: T, page: PageInfo, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    let mut meta = Meta::new(StatusCode::OK, message);
    meta.page = Some(page.page);
    meta.size = Some(page.size);
    meta.total_page = Some(page.total_page);
    meta.total_data = Some(page.total_data);

    let body = ApiResponse {
        meta,
        data: Some(data),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub fn error(message: impl Into<String>, status: StatusCode) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        meta: Meta::new(status, message),
        data: None,
    };

    (status, Json(body)).into_response()
}
