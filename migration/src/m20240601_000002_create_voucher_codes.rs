use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoucherCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoucherCodes::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(VoucherCodes::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(VoucherCodes::Description).text())
                    .col(ColumnDef::new(VoucherCodes::DiscountType).string().not_null().default("percentage"))
                    .col(ColumnDef::new(VoucherCodes::DiscountValue).decimal_len(10, 2).not_null().default(0))
                    .col(ColumnDef::new(VoucherCodes::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(VoucherCodes::UsageLimit).integer().not_null().default(1))
                    .col(ColumnDef::new(VoucherCodes::UsageCount).integer().not_null().default(0))
                    .col(ColumnDef::new(VoucherCodes::IsUsed).boolean().not_null().default(false))
                    .col(ColumnDef::new(VoucherCodes::UsedBy).uuid())
                    .col(ColumnDef::new(VoucherCodes::UsedAt).timestamp())
                    .col(ColumnDef::new(VoucherCodes::ValidFrom).timestamp())
                    .col(ColumnDef::new(VoucherCodes::ExpiresAt).timestamp())
                    .col(ColumnDef::new(VoucherCodes::AllowedUsers).json())
                    .col(ColumnDef::new(VoucherCodes::CreatedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .col(ColumnDef::new(VoucherCodes::UpdatedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_voucher_codes_used_by")
                            .from(VoucherCodes::Table, VoucherCodes::UsedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_voucher_codes_code")
                    .table(VoucherCodes::Table)
                    .col(VoucherCodes::Code)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE voucher_codes ADD CONSTRAINT chk_voucher_codes_usage_within_limit \
                 CHECK (usage_count >= 0 AND usage_count <= usage_limit)",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared("ALTER TABLE voucher_codes ADD CONSTRAINT chk_voucher_codes_limit_positive CHECK (usage_limit > 0)")
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE voucher_codes ADD CONSTRAINT chk_voucher_codes_validity_window \
                 CHECK (valid_from IS NULL OR expires_at IS NULL OR expires_at > valid_from)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoucherCodes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VoucherCodes {
    Table,
    Id,
    Code,
    Description,
    DiscountType,
    DiscountValue,
    IsActive,
    UsageLimit,
    UsageCount,
    IsUsed,
    UsedBy,
    UsedAt,
    ValidFrom,
    ExpiresAt,
    AllowedUsers,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
