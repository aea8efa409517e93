use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Urls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Urls::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Urls::Key).string().not_null().unique_key())
                    .col(ColumnDef::new(Urls::LongUrl).text().not_null())
                    .col(ColumnDef::new(Urls::ShortUrl).text().not_null())
                    .to_owned(),
            )
            .await?;

        // dedup lookups go through long_url
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_urls_long_url")
                    .table(Urls::Table)
                    .col(Urls::LongUrl)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_urls_long_url").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Urls::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Urls {
    Table,
    Id,
    Key,
    LongUrl,
    ShortUrl,
}
