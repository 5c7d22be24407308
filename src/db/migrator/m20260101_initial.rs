use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdminCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminCredentials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AdminCredentials::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AdminCredentials::PasswordHash)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdminCredentials::SessionEpoch)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AdminCredentials::CreatedAt)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdminCredentials::UpdatedAt)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PasswordResetTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PasswordResetTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PasswordResetTokens::Email)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PasswordResetTokens::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(PasswordResetTokens::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PasswordResetTokens::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PasswordResetTokens::CreatedAt)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reset_email")
                    .table(PasswordResetTokens::Table)
                    .col(PasswordResetTokens::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AdminAuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminAuditLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdminAuditLog::Action).string().not_null())
                    .col(ColumnDef::new(AdminAuditLog::Details).string().null())
                    .col(ColumnDef::new(AdminAuditLog::IpAddress).string().null())
                    .col(ColumnDef::new(AdminAuditLog::UserAgent).string().null())
                    .col(ColumnDef::new(AdminAuditLog::CreatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_created")
                    .table(AdminAuditLog::Table)
                    .col(AdminAuditLog::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AppointmentRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AppointmentRequests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AppointmentRequests::Name).string().not_null())
                    .col(
                        ColumnDef::new(AppointmentRequests::Contact)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AppointmentRequests::PreferredTimes)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AppointmentRequests::Service)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AppointmentRequests::Note).string().null())
                    .col(
                        ColumnDef::new(AppointmentRequests::Status)
                            .string()
                            .not_null()
                            .default("new"),
                    )
                    .col(
                        ColumnDef::new(AppointmentRequests::CreatedAt)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_appointment_status")
                    .table(AppointmentRequests::Table)
                    .col(AppointmentRequests::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_appointment_created")
                    .table(AppointmentRequests::Table)
                    .col(AppointmentRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reviews::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Reviews::Author).string().not_null())
                    .col(ColumnDef::new(Reviews::Body).string().not_null())
                    .col(ColumnDef::new(Reviews::Rating).integer().not_null())
                    .col(
                        ColumnDef::new(Reviews::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Reviews::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Reviews::ModeratedAt).string().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reviews::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AppointmentRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdminAuditLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PasswordResetTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdminCredentials::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum AdminCredentials {
    Table,
    Id,
    Email,
    PasswordHash,
    SessionEpoch,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PasswordResetTokens {
    Table,
    Id,
    Email,
    TokenHash,
    ExpiresAt,
    Used,
    CreatedAt,
}

#[derive(Iden)]
enum AdminAuditLog {
    Table,
    Id,
    Action,
    Details,
    IpAddress,
    UserAgent,
    CreatedAt,
}

#[derive(Iden)]
enum AppointmentRequests {
    Table,
    Id,
    Name,
    Contact,
    PreferredTimes,
    Service,
    Note,
    Status,
    CreatedAt,
}

#[derive(Iden)]
enum Reviews {
    Table,
    Id,
    Author,
    Body,
    Rating,
    Status,
    CreatedAt,
    ModeratedAt,
}
