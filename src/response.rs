use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.is_success(),
        }
    }

    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, data, message)
    }

    pub fn into_response(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        HttpResponse::build(status).json(self)
    }
}

/// Failure envelope rendered by `ApiError`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    pub success: bool,
    pub errors: Vec<String>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
            success: false,
            errors: Vec::new(),
        }
    }
}

/// An empty JSON object for responses that carry no payload.
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_uses_camel_case_keys() {
        let body = serde_json::to_value(ApiResponse::created(Empty {}, "made")).unwrap();
        assert_eq!(body["statusCode"], 201);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "made");
        assert!(body["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn error_envelope_has_empty_errors_list() {
        let body =
            serde_json::to_value(ErrorBody::new(StatusCode::NOT_FOUND, "missing")).unwrap();
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"], serde_json::json!([]));
    }
}
