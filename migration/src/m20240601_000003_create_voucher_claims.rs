use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoucherClaims::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoucherClaims::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(VoucherClaims::UserId).uuid().not_null())
                    .col(ColumnDef::new(VoucherClaims::VoucherCode).string().not_null())
                    .col(ColumnDef::new(VoucherClaims::VoucherCodeId).uuid())
                    .col(ColumnDef::new(VoucherClaims::Status).string().not_null().default("pending"))
                    .col(ColumnDef::new(VoucherClaims::IpAddress).string())
                    .col(ColumnDef::new(VoucherClaims::UserAgent).text())
                    .col(ColumnDef::new(VoucherClaims::DeviceId).string())
                    .col(ColumnDef::new(VoucherClaims::RequestId).string().not_null().unique_key())
                    .col(ColumnDef::new(VoucherClaims::ClaimedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .col(ColumnDef::new(VoucherClaims::RefundedAt).timestamp())
                    .col(ColumnDef::new(VoucherClaims::RefundedBy).uuid())
                    .col(ColumnDef::new(VoucherClaims::RefundReason).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_voucher_claims_user_id")
                            .from(VoucherClaims::Table, VoucherClaims::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_voucher_claims_voucher_code_id")
                            .from(VoucherClaims::Table, VoucherClaims::VoucherCodeId)
                            .to(VoucherCodes::Table, VoucherCodes::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim history is always read newest-first per user
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_voucher_claims_user_claimed_at \
                 ON voucher_claims (user_id, claimed_at DESC)",
            )
            .await?;

        // Fraud scans correlate successful claims by network identity
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_voucher_claims_fraud_scan \
                 ON voucher_claims (ip_address, device_id, claimed_at DESC) \
                 WHERE status = 'success'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoucherClaims::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VoucherClaims {
    Table,
    Id,
    UserId,
    VoucherCode,
    VoucherCodeId,
    Status,
    IpAddress,
    UserAgent,
    DeviceId,
    RequestId,
    ClaimedAt,
    RefundedAt,
    RefundedBy,
    RefundReason,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum VoucherCodes {
    Table,
    Id,
}
