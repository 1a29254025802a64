use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(UserSessions::UserId).uuid().not_null())
                    .col(ColumnDef::new(UserSessions::TokenId).string().not_null())
                    .col(ColumnDef::new(UserSessions::IpAddress).string())
                    .col(ColumnDef::new(UserSessions::UserAgent).text())
                    .col(ColumnDef::new(UserSessions::ExpiresAt).timestamp().not_null())
                    .col(ColumnDef::new(UserSessions::CreatedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_sessions_user_id")
                            .from(UserSessions::Table, UserSessions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_user_id")
                    .table(UserSessions::Table)
                    .col(UserSessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_token_id")
                    .table(UserSessions::Table)
                    .col(UserSessions::TokenId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BlacklistedTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BlacklistedTokens::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(BlacklistedTokens::TokenId).string().not_null().unique_key())
                    .col(ColumnDef::new(BlacklistedTokens::UserId).uuid())
                    .col(ColumnDef::new(BlacklistedTokens::ExpiresAt).timestamp().not_null())
                    .col(ColumnDef::new(BlacklistedTokens::BlacklistedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .to_owned(),
            )
            .await?;

        // Expired rows are swept by maintenance jobs outside the core
        manager
            .create_index(
                Index::create()
                    .name("idx_blacklisted_tokens_expires_at")
                    .table(BlacklistedTokens::Table)
                    .col(BlacklistedTokens::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BlacklistedTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserSessions {
    Table,
    Id,
    UserId,
    TokenId,
    IpAddress,
    UserAgent,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BlacklistedTokens {
    Table,
    Id,
    TokenId,
    UserId,
    ExpiresAt,
    BlacklistedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
