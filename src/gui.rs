//! Server-rendered HTML front end for people without an HTTP client at hand.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rearch::Container;
use serde::Deserialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::url_service::{ShortenUrlError, ShortenedUrl, url_rest_service_capsule};

#[derive(Template, WebTemplate)]
#[template(path = "form.html")]
pub struct FormTemplate {}

#[derive(Template, WebTemplate)]
#[template(path = "result.html")]
pub struct ResultTemplate {
    pub key: String,
    pub long_url: String,
    pub short_url: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub message: String,
    pub error_id: String,
}

#[derive(Deserialize)]
pub struct ShortenUrlForm {
    pub long_url: String,
}

pub async fn form_handler() -> impl IntoResponse {
    FormTemplate {}
}

#[instrument(skip(container))]
pub async fn post_url_handler(
    State(container): State<Container>,
    Form(ShortenUrlForm { long_url }): Form<ShortenUrlForm>,
) -> Response {
    match container
        .read(url_rest_service_capsule)
        .shorten_url(&long_url)
        .await
    {
        Ok(ShortenedUrl {
            key,
            long_url,
            short_url,
        }) => ResultTemplate {
            key,
            long_url,
            short_url,
        }
        .into_response(),
        Err(error) => {
            let err_uuid = Uuid::new_v4();
            let (status, message) = match error {
                ShortenUrlError::InvalidUrl(_) => {
                    info!(%err_uuid, ?error, "User submitted a bad form");
                    (StatusCode::BAD_REQUEST, error.to_string())
                }
                ShortenUrlError::Internal(_) => {
                    error!(%err_uuid, ?error, "Encountered an error during a form request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_owned(),
                    )
                }
            };
            (
                status,
                ErrorTemplate {
                    message,
                    error_id: err_uuid.to_string(),
                },
            )
                .into_response()
        }
    }
}
