use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::Response;

use crate::app::errors;

/// Parse a path segment, answering `400 invalid_id` when it does not fit.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id '{raw}'")))
}
