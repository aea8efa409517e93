use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, instrument, warn};

use crate::{
    config::settings_capsule,
    key_gen::{KeyGenerator, key_generator_capsule},
    url_repo::{
        InsertUrlError, LongUrl, LongUrlValidationError, NewUrlMapping, UrlMapping, UrlRepository,
        url_repository_capsule,
    },
};

/// Upper bound on key generations per shortening; each attempt only fails on a key collision.
const INSERT_ATTEMPTS: usize = 16;

#[derive(Deserialize)]
pub struct ShortenUrlPayload {
    pub url: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ShortenedUrl {
    pub key: String,
    pub long_url: String,
    pub short_url: String,
}

#[derive(Debug)]
pub struct Redirect {
    pub url: String,
}

pub fn url_rest_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn UrlRestService> {
    let url_repo = Arc::clone(get.as_ref(url_repository_capsule));
    let key_generator = Arc::clone(get.as_ref(key_generator_capsule));
    let base_url = get.as_ref(settings_capsule).base_url.clone();
    Arc::new(UrlRestServiceImpl {
        url_repo,
        key_generator,
        base_url,
    })
}

#[async_trait]
pub trait UrlRestService: Send + Sync {
    /// Returns the mapping for `long_url`, creating one only if the exact URL
    /// has never been shortened before.
    async fn shorten_url(&self, long_url: &str) -> Result<ShortenedUrl, ShortenUrlError>;
    async fn get_url(&self, key: &str) -> Result<Redirect, GetUrlError>;
    async fn delete_url(&self, key: &str) -> Result<(), DeleteUrlError>;
}

#[derive(Debug, Error)]
pub enum ShortenUrlError {
    #[error("Your provided URL is not valid: {0}")]
    InvalidUrl(#[from] LongUrlValidationError),
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum GetUrlError {
    #[error("no URL is registered under this key")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeleteUrlError {
    #[error("no URL is registered under this key")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct UrlRestServiceImpl {
    url_repo: Arc<dyn UrlRepository>,
    key_generator: Arc<dyn KeyGenerator>,
    base_url: String,
}

#[async_trait]
impl UrlRestService for UrlRestServiceImpl {
    #[instrument(skip(self))]
    async fn shorten_url(&self, long_url: &str) -> Result<ShortenedUrl, ShortenUrlError> {
        let long_url = LongUrl::new(long_url.to_owned())?;

        // NOTE: exact string comparison; no normalization of scheme case or trailing slashes
        if let Some(existing) = self
            .url_repo
            .find_by_long_url(long_url.as_str())
            .await
            .context("Failed to look up existing URL")
            .map_err(ShortenUrlError::Internal)?
        {
            return Ok(existing.into());
        }

        for _ in 0..INSERT_ATTEMPTS {
            let key = self.key_generator.generate_key();
            let to_insert = NewUrlMapping {
                short_url: format!("{}/{key}", self.base_url),
                key: key.clone(),
                long_url: long_url.clone(),
            };

            match self.url_repo.insert(to_insert).await {
                Ok(inserted) => return Ok(inserted.into()),
                // NOTE: retryable; another mapping got this key first
                Err(InsertUrlError::KeyTaken) => {
                    warn!(%key, "Generated key that was already taken");
                }
                Err(InsertUrlError::Internal(err)) => {
                    error!(?err, "Encountered internal error while inserting URL");
                    return Err(ShortenUrlError::Internal(
                        err.context("Encountered internal error while inserting URL"),
                    ));
                }
            }
        }

        Err(ShortenUrlError::Internal(anyhow!(
            "Exhausted key generation attempts"
        )))
    }

    #[instrument(skip(self))]
    async fn get_url(&self, key: &str) -> Result<Redirect, GetUrlError> {
        match self.url_repo.find_by_key(key).await {
            Ok(Some(mapping)) => Ok(Redirect {
                url: mapping.long_url.into_inner(),
            }),
            Ok(None) => Err(GetUrlError::NotFound),
            Err(err) => Err(GetUrlError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_url(&self, key: &str) -> Result<(), DeleteUrlError> {
        let existing = self
            .url_repo
            .find_by_key(key)
            .await
            .map_err(DeleteUrlError::Internal)?;
        if existing.is_none() {
            return Err(DeleteUrlError::NotFound);
        }

        // NOTE: a concurrent delete may have won between the lookup and here
        match self.url_repo.delete_by_key(key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DeleteUrlError::NotFound),
            Err(err) => Err(DeleteUrlError::Internal(err)),
        }
    }
}

impl From<UrlMapping> for ShortenedUrl {
    fn from(
        UrlMapping {
            key,
            long_url,
            short_url,
            ..
        }: UrlMapping,
    ) -> Self {
        Self {
            key: key.into_inner(),
            long_url: long_url.into_inner(),
            short_url,
        }
    }
}
