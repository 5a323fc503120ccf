use std::fmt::Display;

use axum::{
    http::{header, HeaderValue, StatusCode},
    Json,
};
use serde::{ser::SerializeStruct, Serialize};
use serde_json::{json, Value};
/// 响应数据
#[derive(Debug)]
pub struct Response {
    /// 响应状态码
    code: StatusCode,
    status: i32,
    data: Value,
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let code = self.code;
        (code, Json(self)).into_response()
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("Response", 3)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("code", &self.code.as_u16())?;
        s.serialize_field("data", &self.data)?;
        s.end()
    }
}
impl Response {
    pub fn new(code: StatusCode, status: i32, data: Value) -> Response {
        Self { code, status, data }
    }
    pub fn ok(data: Value) -> Self {
        Self {
            code: StatusCode::OK,
            status: 0,
            data,
        }
    }
    pub fn empty() -> Self {
        Self {
            code: StatusCode::OK,
            status: 0,
            data: json!("OK"),
        }
    }
    pub fn token_error(e: impl Display) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, -1, json!(e.to_string()))
    }
    /// 内部错误
    pub fn internal_server_error(e: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, -1, json!(e.to_string()))
    }
    /// 参数格式错误
    pub fn invalid_format(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 1, json!(e.to_string()))
    }
    /// 请求的数据不存在
    pub fn not_exist(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 2, json!(e.to_string()))
    }
    /// 要添加的数据已存在
    pub fn already_exist(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 3, json!(e.to_string()))
    }
    /// 权限不足
    pub fn permission_denied() -> Self {
        Self::new(StatusCode::OK, 4, json!("Access denied."))
    }
    /// Permission denied with a hint about who may perform the action.
    pub fn permission_denied_with(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 4, json!(e.to_string()))
    }
    /// 密码错误
    pub fn wrong_password() -> Self {
        Self::new(StatusCode::OK, 5, json!("Invalid credentials. Please try again."))
    }
    /// 数值不对
    pub fn invalid_value(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 7, json!(e.to_string()))
    }
    /// The row changed underneath the request (lost a race or stale view).
    pub fn conflict(e: impl Display) -> Self {
        Self::new(StatusCode::OK, 8, json!(e.to_string()))
    }
    pub fn code(&self) -> StatusCode {
        self.code
    }
    pub fn status(&self) -> i32 {
        self.status
    }
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl From<std::io::Error> for Response {
    fn from(value: std::io::Error) -> Self {
        tracing::error!("io error: {value}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            -1,
            json!(value.to_string()),
        )
    }
}

impl From<serde_json::Error> for Response {
    fn from(value: serde_json::Error) -> Self {
        Response::invalid_format(value)
    }
}

impl From<axum::extract::multipart::MultipartError> for Response {
    fn from(value: axum::extract::multipart::MultipartError) -> Self {
        Response::invalid_format(value)
    }
}

/// Raw bytes sent back as a file (photos, CSV exports).
#[derive(Debug)]
pub struct BodyFile {
    bytes: Vec<u8>,
    mime: String,
    filename: Option<String>,
}

impl BodyFile {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            filename: None,
        }
    }
    pub fn csv(text: String, filename: &str) -> Self {
        Self {
            bytes: text.into_bytes(),
            mime: mime::TEXT_CSV_UTF_8.to_string(),
            filename: Some(filename.to_owned()),
        }
    }
}

impl axum::response::IntoResponse for BodyFile {
    fn into_response(self) -> axum::response::Response {
        let mut response = self.bytes.into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.mime) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Some(name) = self.filename {
            if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
        }
        response
    }
}
