use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use stockbook_core::LocationId;
use stockbook_infra::{ConvertDeposit, DepositRequest, LedgerStore, ReturnDeposit};

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/", post(place_deposit::<S>))
        .route("/:location", get(pending_deposit::<S>))
        .route("/:location/convert", post(convert_deposit::<S>))
        .route("/:location/return", post(return_deposit::<S>))
}

pub async fn place_deposit<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(body): Json<DepositRequest>,
) -> Response {
    errors::respond(StatusCode::CREATED, services.ledger.place_deposit(body).await)
}

pub async fn pending_deposit<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(location): Path<String>,
) -> Response {
    let location: LocationId = match parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .ledger
        .pending_deposit(location)
        .await
        .map(|pending| dto::PendingDepositResponse { location, pending });
    errors::respond(StatusCode::OK, result)
}

pub async fn convert_deposit<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(location): Path<String>,
    Json(body): Json<ConvertDeposit>,
) -> Response {
    let location: LocationId = match parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::CREATED, services.ledger.convert_deposit(location, body).await)
}

pub async fn return_deposit<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(location): Path<String>,
    Json(body): Json<ReturnDeposit>,
) -> Response {
    let location: LocationId = match parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::CREATED, services.ledger.return_deposit(location, body).await)
}
