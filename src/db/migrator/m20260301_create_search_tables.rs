use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[allow(clippy::too_many_lines)]
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Searches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Searches::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Searches::UserId).string().not_null())
                    .col(ColumnDef::new(Searches::Query).string().not_null())
                    .col(
                        ColumnDef::new(Searches::FiltersJson)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Searches::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Searches::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Searches::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_searches_user_id")
                    .table(Searches::Table)
                    .col(Searches::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SearchJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SearchJobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SearchJobs::SearchId).integer().not_null())
                    .col(
                        ColumnDef::new(SearchJobs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SearchJobs::StartedAt).string())
                    .col(ColumnDef::new(SearchJobs::CompletedAt).string())
                    .col(ColumnDef::new(SearchJobs::Error).text())
                    .col(
                        ColumnDef::new(SearchJobs::ResultCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SearchJobs::CreatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_search_jobs_search_id")
                            .from(SearchJobs::Table, SearchJobs::SearchId)
                            .to(Searches::Table, Searches::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_search_jobs_search_id")
                    .table(SearchJobs::Table)
                    .col(SearchJobs::SearchId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_search_jobs_status")
                    .table(SearchJobs::Table)
                    .col(SearchJobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SearchResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SearchResults::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SearchResults::JobId).integer().not_null())
                    .col(ColumnDef::new(SearchResults::Position).integer().not_null())
                    .col(ColumnDef::new(SearchResults::Title).string().not_null())
                    .col(ColumnDef::new(SearchResults::Price).double())
                    .col(ColumnDef::new(SearchResults::Currency).string())
                    .col(ColumnDef::new(SearchResults::ImageUrl).string())
                    .col(ColumnDef::new(SearchResults::Description).text())
                    .col(ColumnDef::new(SearchResults::Location).string())
                    .col(ColumnDef::new(SearchResults::SellerName).string())
                    .col(ColumnDef::new(SearchResults::ListingUrl).string().not_null())
                    .col(ColumnDef::new(SearchResults::CreatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_search_results_job_id")
                            .from(SearchResults::Table, SearchResults::JobId)
                            .to(SearchJobs::Table, SearchJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_search_results_job_id")
                    .table(SearchResults::Table)
                    .col(SearchResults::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResultUnlocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResultUnlocks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResultUnlocks::ResultId).integer().not_null())
                    .col(ColumnDef::new(ResultUnlocks::UserId).string().not_null())
                    .col(ColumnDef::new(ResultUnlocks::UnlockedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_result_unlocks_result_id")
                            .from(ResultUnlocks::Table, ResultUnlocks::ResultId)
                            .to(SearchResults::Table, SearchResults::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_result_unlocks_result_user")
                    .table(ResultUnlocks::Table)
                    .col(ResultUnlocks::ResultId)
                    .col(ResultUnlocks::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ResultUnlocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SearchResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SearchJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Searches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Searches {
    Table,
    Id,
    UserId,
    Query,
    FiltersJson,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SearchJobs {
    Table,
    Id,
    SearchId,
    Status,
    StartedAt,
    CompletedAt,
    Error,
    ResultCount,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SearchResults {
    Table,
    Id,
    JobId,
    Position,
    Title,
    Price,
    Currency,
    ImageUrl,
    Description,
    Location,
    SellerName,
    ListingUrl,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ResultUnlocks {
    Table,
    Id,
    ResultId,
    UserId,
    UnlockedAt,
}
