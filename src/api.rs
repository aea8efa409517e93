use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing,
};
use rearch::Container;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    gui,
    url_service::{
        self, DeleteUrlError, GetUrlError, ShortenUrlError, ShortenUrlPayload,
        url_rest_service_capsule,
    },
};

pub const WELCOME_MESSAGE: &str = "Welcome to the URL shortener API :)";

/// Builds the full application: the JSON API under `/api` and the HTML form under `/gui`.
pub fn router(container: Container) -> Router {
    Router::new()
        .route("/", routing::get(read_root))
        .route("/api/url", routing::post(post_url))
        .route("/api/{key}", routing::get(get_url).delete(delete_url))
        .route("/gui", routing::get(gui::form_handler))
        .route("/gui/url", routing::post(gui::post_url_handler))
        .with_state(container)
}

#[derive(Serialize)]
pub struct Error {
    error: String,
    error_id: String,
}

#[derive(Serialize)]
pub struct DeletedUrl {
    key: String,
    deleted: bool,
}

fn error_response(
    status: StatusCode,
    error: String,
    err_uuid: Uuid,
) -> (StatusCode, Json<Error>) {
    (
        status,
        Json(Error {
            error,
            error_id: err_uuid.to_string(),
        }),
    )
}

async fn read_root() -> Json<&'static str> {
    Json(WELCOME_MESSAGE)
}

#[instrument(skip(container))]
async fn post_url(
    State(container): State<Container>,
    Json(ShortenUrlPayload { url }): Json<ShortenUrlPayload>,
) -> impl IntoResponse {
    container
        .read(url_rest_service_capsule)
        .shorten_url(&url)
        .await
        .map(Json)
        .map_err(|error: ShortenUrlError| {
            let err_uuid = Uuid::new_v4();
            match error {
                ShortenUrlError::InvalidUrl(_) => {
                    info!(%err_uuid, ?error, "User submitted a bad request");
                    error_response(StatusCode::BAD_REQUEST, error.to_string(), err_uuid)
                }
                ShortenUrlError::Internal(_) => {
                    error!(%err_uuid, ?error, "Encountered an error during a request");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                        err_uuid,
                    )
                }
            }
        })
}

#[instrument(skip(container))]
async fn get_url(State(container): State<Container>, Path(key): Path<String>) -> impl IntoResponse {
    container
        .read(url_rest_service_capsule)
        .get_url(&key)
        .await
        .map(|url_service::Redirect { url }| {
            (StatusCode::FOUND, [(header::LOCATION, url)])
        })
        .map_err(|error: GetUrlError| {
            let err_uuid = Uuid::new_v4();
            match error {
                GetUrlError::NotFound => {
                    info!(%err_uuid, key, "Key not found");
                    error_response(StatusCode::NOT_FOUND, "Not found".to_owned(), err_uuid)
                }
                GetUrlError::Internal(_) => {
                    error!(%err_uuid, ?error, "Encountered an error during a request");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                        err_uuid,
                    )
                }
            }
        })
}

#[instrument(skip(container))]
async fn delete_url(
    State(container): State<Container>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let result = container
        .read(url_rest_service_capsule)
        .delete_url(&key)
        .await;

    result
        .map(|()| Json(DeletedUrl { key, deleted: true }))
        .map_err(|error: DeleteUrlError| {
            let err_uuid = Uuid::new_v4();
            match error {
                DeleteUrlError::NotFound => {
                    info!(%err_uuid, "Key not found");
                    error_response(StatusCode::NOT_FOUND, "Not found".to_owned(), err_uuid)
                }
                DeleteUrlError::Internal(_) => {
                    error!(%err_uuid, ?error, "Encountered an error during a request");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                        err_uuid,
                    )
                }
            }
        })
}
