use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use stockbook_core::{ErrorClass, LedgerError, LedgerResult};

/// HTTP status for a ledger error.
///
/// Input problems are 400 (404 for missing entities), business-rule
/// rejections the operator may act on are 422, state collisions 409,
/// retryable conflicts 503 and configuration/infrastructure failures 500.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::InsufficientStock { .. } | LedgerError::ReturnExceedsSold { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => match err.class() {
            ErrorClass::FixInput => StatusCode::BAD_REQUEST,
            ErrorClass::Retry => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::ContactAdministrator => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(code = err.code(), error = %err, "request failed");
    }
    (
        status,
        Json(json!({
            "error": err.code(),
            "message": err.to_string(),
            "class": err.class().as_str(),
            "overridable": err.is_overridable(),
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
            "class": ErrorClass::FixInput.as_str(),
            "overridable": false,
        })),
    )
        .into_response()
}

/// `status` with the JSON value, or the mapped error.
pub fn respond<T: Serialize>(status: StatusCode, result: LedgerResult<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => ledger_error_to_response(err),
    }
}

/// `204 No Content`, or the mapped error.
pub fn no_content(result: LedgerResult<()>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ledger_error_to_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_core::{LocationId, Money};

    #[test]
    fn every_class_maps_to_its_status() {
        let cases = [
            (LedgerError::validation("bad"), StatusCode::BAD_REQUEST),
            (LedgerError::UnknownLocation(LocationId::new()), StatusCode::BAD_REQUEST),
            (
                LedgerError::InvalidPaymentAmount {
                    paid: Money::from_cents(0),
                    total: Money::from_cents(100),
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::not_found("movement"), StatusCode::NOT_FOUND),
            (LedgerError::conflict("in use"), StatusCode::CONFLICT),
            (
                LedgerError::InsufficientStock {
                    sku: "X".into(),
                    location: LocationId::new(),
                    available: 1,
                    requested: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::concurrency("40001"), StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::series("no active web series"), StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::store("connection reset"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err}");
        }
    }
}
