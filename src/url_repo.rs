use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, SqlErr,
};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::{config::db_conn_capsule, key_gen::ShortKey, orm::short_url};

pub fn url_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn UrlRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(UrlRepositoryImpl { db })
}

#[async_trait]
pub trait UrlRepository: Send + Sync {
    /// Returns the oldest mapping whose long URL is exactly `long_url`.
    async fn find_by_long_url(&self, long_url: &str) -> anyhow::Result<Option<UrlMapping>>;

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<UrlMapping>>;

    /// Persists a new mapping, failing with [`InsertUrlError::KeyTaken`]
    /// if its key is already in use.
    async fn insert(&self, mapping: NewUrlMapping) -> Result<UrlMapping, InsertUrlError>;

    /// Returns whether a mapping with `key` existed.
    async fn delete_by_key(&self, key: &str) -> anyhow::Result<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlMapping {
    pub id: i32,
    pub key: ShortKey,
    pub long_url: LongUrl,
    pub short_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUrlMapping {
    pub key: ShortKey,
    pub long_url: LongUrl,
    pub short_url: String,
}

#[derive(Debug, Error)]
pub enum InsertUrlError {
    #[error("key is already taken")]
    KeyTaken,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

/// A URL with at least a scheme and a host, kept exactly as it was submitted.
///
/// The raw string is stored (rather than [`Url`]'s normalized form) so that
/// lookups and redirects hand back byte-for-byte what the user sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongUrl(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LongUrlValidationError {
    #[error("URL is malformed: {0}")]
    Malformed(#[from] url::ParseError),
    #[error("URL has no host")]
    MissingHost,
    #[error("URL has leading or trailing whitespace")]
    SurroundingWhitespace,
}

impl LongUrl {
    /// # Errors
    /// Returns [`Err`] when `url` does not parse as an absolute URL with a host.
    pub fn new(url: String) -> Result<Self, LongUrlValidationError> {
        if url.trim() != url {
            return Err(LongUrlValidationError::SurroundingWhitespace);
        }
        if !Url::parse(&url)?.has_host() {
            return Err(LongUrlValidationError::MissingHost);
        }
        Ok(Self(url))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<short_url::Model> for UrlMapping {
    type Error = anyhow::Error;

    fn try_from(
        short_url::Model {
            id,
            key,
            long_url,
            short_url,
        }: short_url::Model,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            id,
            key: ShortKey::new(key).with_context(|| format!("Row {id} has an invalid key"))?,
            long_url: LongUrl::new(long_url)
                .with_context(|| format!("Row {id} has an invalid long URL"))?,
            short_url,
        })
    }
}

struct UrlRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl UrlRepository for UrlRepositoryImpl {
    #[instrument(skip(self))]
    async fn find_by_long_url(&self, long_url: &str) -> anyhow::Result<Option<UrlMapping>> {
        short_url::Entity::find()
            .filter(short_url::Column::LongUrl.eq(long_url))
            .order_by_asc(short_url::Column::Id)
            .one(&self.db)
            .await
            .context("Failed to look up URL by long URL")?
            .map(UrlMapping::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<UrlMapping>> {
        short_url::Entity::find()
            .filter(short_url::Column::Key.eq(key))
            .one(&self.db)
            .await
            .context("Failed to look up URL by key")?
            .map(UrlMapping::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn insert(&self, mapping: NewUrlMapping) -> Result<UrlMapping, InsertUrlError> {
        let to_insert = short_url::ActiveModel {
            id: NotSet,
            key: Set(mapping.key.into_inner()),
            long_url: Set(mapping.long_url.into_inner()),
            short_url: Set(mapping.short_url),
        };

        match to_insert.insert(&self.db).await {
            Ok(inserted) => UrlMapping::try_from(inserted)
                .context("Failed to convert inserted row")
                .map_err(InsertUrlError::Internal),
            Err(err) if is_unique_violation(&err) => Err(InsertUrlError::KeyTaken),
            Err(err) => Err(InsertUrlError::Internal(
                anyhow::Error::new(err).context("Failed to insert URL"),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn delete_by_key(&self, key: &str) -> anyhow::Result<bool> {
        let result = short_url::Entity::delete_many()
            .filter(short_url::Column::Key.eq(key))
            .exec(&self.db)
            .await
            .context("Failed to delete URL by key")?;
        Ok(result.rows_affected > 0)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{Database, DatabaseBackend, MockDatabase};
    use sea_orm_migration::MigratorTrait;

    use crate::migration::Migrator;

    use super::*;

    async fn sqlite_repo() -> UrlRepositoryImpl {
        let mut options = sea_orm::ConnectOptions::new("sqlite::memory:");
        // every pooled connection to :memory: would otherwise get its own database
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        UrlRepositoryImpl { db }
    }

    fn new_mapping(key: &str, long_url: &str) -> NewUrlMapping {
        NewUrlMapping {
            key: ShortKey::new(key.to_owned()).unwrap(),
            long_url: LongUrl::new(long_url.to_owned()).unwrap(),
            short_url: format!("http://localhost//{key}"),
        }
    }

    #[test]
    fn test_long_url_valid() {
        let url = LongUrl::new("https://example.com/page?q=1".to_owned()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?q=1");
    }

    #[test]
    fn test_long_url_kept_verbatim() {
        // Url would normalize this to "https://example.com/"
        let url = LongUrl::new("HTTPS://Example.com".to_owned()).unwrap();
        assert_eq!(url.into_inner(), "HTTPS://Example.com");
    }

    #[test]
    fn test_long_url_invalid() {
        assert!(matches!(
            LongUrl::new("not a url".to_owned()).unwrap_err(),
            LongUrlValidationError::Malformed(url::ParseError::RelativeUrlWithoutBase)
        ));
        assert!(matches!(
            LongUrl::new("http://".to_owned()).unwrap_err(),
            LongUrlValidationError::Malformed(_)
        ));
        assert_eq!(
            LongUrl::new("mailto:someone@example.com".to_owned()).unwrap_err(),
            LongUrlValidationError::MissingHost
        );
        assert_eq!(
            LongUrl::new(" https://example.com".to_owned()).unwrap_err(),
            LongUrlValidationError::SurroundingWhitespace
        );
        assert!(LongUrl::new(String::new()).is_err());
    }

    #[test]
    fn test_model_with_bad_key_is_rejected() {
        let model = short_url::Model {
            id: 7,
            key: "bad".to_owned(),
            long_url: "https://example.com".to_owned(),
            short_url: "http://localhost//bad".to_owned(),
        };
        let err = UrlMapping::try_from(model).unwrap_err();
        assert!(err.to_string().contains("Row 7"));
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = sqlite_repo().await;

        let inserted = repo
            .insert(new_mapping("ABCD1234", "https://example.com/page"))
            .await
            .unwrap();
        assert_eq!(inserted.key.as_str(), "ABCD1234");
        assert_eq!(inserted.long_url.as_str(), "https://example.com/page");
        assert_eq!(inserted.short_url, "http://localhost//ABCD1234");

        let by_key = repo.find_by_key("ABCD1234").await.unwrap();
        assert_eq!(by_key, Some(inserted.clone()));

        let by_long_url = repo
            .find_by_long_url("https://example.com/page")
            .await
            .unwrap();
        assert_eq!(by_long_url, Some(inserted));
    }

    #[tokio::test]
    async fn test_find_missing() {
        let repo = sqlite_repo().await;
        assert_eq!(repo.find_by_key("ZZZZ9999").await.unwrap(), None);
        assert_eq!(
            repo.find_by_long_url("https://nowhere.example").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_find_by_long_url_is_exact() {
        let repo = sqlite_repo().await;
        repo.insert(new_mapping("ABCD1234", "https://example.com/page"))
            .await
            .unwrap();

        for near_miss in [
            "https://example.com/page/",
            "HTTPS://example.com/page",
            "https://example.com/Page",
        ] {
            assert_eq!(repo.find_by_long_url(near_miss).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_find_by_long_url_returns_oldest() {
        let repo = sqlite_repo().await;
        let first = repo
            .insert(new_mapping("AAAA0001", "https://example.com"))
            .await
            .unwrap();
        repo.insert(new_mapping("AAAA0002", "https://example.com"))
            .await
            .unwrap();

        let found = repo
            .find_by_long_url("https://example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key() {
        let repo = sqlite_repo().await;
        repo.insert(new_mapping("DUPE0000", "https://one.example"))
            .await
            .unwrap();

        let err = repo
            .insert(new_mapping("DUPE0000", "https://two.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, InsertUrlError::KeyTaken));

        let kept = repo.find_by_key("DUPE0000").await.unwrap().unwrap();
        assert_eq!(kept.long_url.as_str(), "https://one.example");
    }

    #[tokio::test]
    async fn test_ids_are_assigned() {
        let repo = sqlite_repo().await;
        let a = repo
            .insert(new_mapping("AAAA0001", "https://a.example"))
            .await
            .unwrap();
        let b = repo
            .insert(new_mapping("AAAA0002", "https://b.example"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_delete_by_key() {
        let repo = sqlite_repo().await;
        repo.insert(new_mapping("GONE0000", "https://example.com"))
            .await
            .unwrap();

        assert!(repo.delete_by_key("GONE0000").await.unwrap());
        assert_eq!(repo.find_by_key("GONE0000").await.unwrap(), None);
        assert!(!repo.delete_by_key("GONE0000").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_leaves_others() {
        let repo = sqlite_repo().await;
        repo.insert(new_mapping("KEEP0000", "https://keep.example"))
            .await
            .unwrap();

        assert!(!repo.delete_by_key("MISS0000").await.unwrap());
        assert!(repo.find_by_key("KEEP0000").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_db_error_propagates() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_errors([DbErr::Custom("test failure".to_owned())])
            .into_connection();
        let repo = UrlRepositoryImpl { db };

        let err = repo.find_by_key("ABCD1234").await.unwrap_err();
        assert!(format!("{err:#}").contains("test failure"));
    }
}
