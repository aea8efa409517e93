use sea_orm_migration::prelude::*;

mod m20251016_000001_create_urls_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20251016_000001_create_urls_table::Migration)]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{ConnectOptions, Database};

    use super::*;

    #[tokio::test]
    async fn test_up_and_down() {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1);
        let db = Database::connect(opts).await.unwrap();
        let manager = SchemaManager::new(&db);

        Migrator::up(&db, None).await.unwrap();
        assert!(manager.has_table("urls").await.unwrap());
        assert!(manager.has_index("urls", "idx_urls_long_url").await.unwrap());

        Migrator::down(&db, None).await.unwrap();
        assert!(!manager.has_table("urls").await.unwrap());
    }
}
