use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoucherAuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoucherAuditLog::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(VoucherAuditLog::UserId).uuid())
                    .col(ColumnDef::new(VoucherAuditLog::ClaimId).uuid())
                    .col(ColumnDef::new(VoucherAuditLog::Action).string().not_null())
                    .col(ColumnDef::new(VoucherAuditLog::Metadata).json())
                    .col(ColumnDef::new(VoucherAuditLog::IpAddress).string())
                    .col(ColumnDef::new(VoucherAuditLog::UserAgent).text())
                    .col(ColumnDef::new(VoucherAuditLog::CreatedAt).timestamp().not_null().extra("DEFAULT CURRENT_TIMESTAMP".to_string()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_voucher_audit_log_user_id")
                            .from(VoucherAuditLog::Table, VoucherAuditLog::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX idx_voucher_audit_log_user_created_at \
                 ON voucher_audit_log (user_id, created_at DESC)",
            )
            .await?;

        // Every claim row inserted gets an audit shadow from the store itself.
        // The trigger only appends; counter updates stay with the locked rows
        // in the claim transaction.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE OR REPLACE FUNCTION voucher_claims_audit() RETURNS trigger AS $$ \
                 BEGIN \
                     INSERT INTO voucher_audit_log (user_id, claim_id, action, metadata, ip_address, user_agent) \
                     VALUES ( \
                         NEW.user_id, \
                         NEW.id, \
                         'CLAIM', \
                         json_build_object( \
                             'status', NEW.status, \
                             'voucher_code', NEW.voucher_code, \
                             'request_id', NEW.request_id \
                         ), \
                         NEW.ip_address, \
                         NEW.user_agent \
                     ); \
                     RETURN NEW; \
                 END; \
                 $$ LANGUAGE plpgsql",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TRIGGER trg_voucher_claims_audit \
                 AFTER INSERT ON voucher_claims \
                 FOR EACH ROW EXECUTE FUNCTION voucher_claims_audit()",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS trg_voucher_claims_audit ON voucher_claims")
            .await?;
        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS voucher_claims_audit()")
            .await?;
        manager
            .drop_table(Table::drop().table(VoucherAuditLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VoucherAuditLog {
    Table,
    Id,
    UserId,
    ClaimId,
    Action,
    Metadata,
    IpAddress,
    UserAgent,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
