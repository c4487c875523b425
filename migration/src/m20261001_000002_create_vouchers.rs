use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Establishments {
    Table,
    Id,
    PartnerId,
    BusinessId,
    Name,
    VoucherCooldown,
    AverageRating,
    TotalRatings,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Vouchers {
    Table,
    Id,
    Code,
    MemberId,
    EstablishmentId,
    PartnerId,
    BusinessId,
    Status,
    GeneratedAt,
    ExpiresAt,
    UsedAt,
    RatingPromptedAt,
    CreatedAt,
    UpdatedAt,
}

/// One row per (member, establishment); the issuance slot
#[derive(DeriveIden)]
enum VoucherCooldowns {
    Table,
    Id,
    MemberId,
    EstablishmentId,
    LastGeneratedAt,
}

#[derive(DeriveIden)]
enum Ratings {
    Table,
    Id,
    EstablishmentId,
    MemberId,
    VoucherId,
    Score,
    Comment,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Establishments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Establishments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Establishments::PartnerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Establishments::BusinessId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Establishments::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Establishments::VoucherCooldown)
                            .integer()
                            .not_null()
                            .default(24),
                    )
                    .col(
                        ColumnDef::new(Establishments::AverageRating)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Establishments::TotalRatings)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Establishments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Establishments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vouchers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vouchers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vouchers::Code).string_len(6).not_null())
                    .col(ColumnDef::new(Vouchers::MemberId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Vouchers::EstablishmentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Vouchers::PartnerId).big_integer().not_null())
                    .col(ColumnDef::new(Vouchers::BusinessId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Vouchers::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Vouchers::GeneratedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::UsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::RatingPromptedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vouchers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_vouchers_member_establishment")
                    .table(Vouchers::Table)
                    .col(Vouchers::MemberId)
                    .col(Vouchers::EstablishmentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_vouchers_code")
                    .table(Vouchers::Table)
                    .col(Vouchers::Code)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VoucherCooldowns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoucherCooldowns::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VoucherCooldowns::MemberId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoucherCooldowns::EstablishmentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoucherCooldowns::LastGeneratedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_voucher_cooldowns_pair")
                    .table(VoucherCooldowns::Table)
                    .col(VoucherCooldowns::MemberId)
                    .col(VoucherCooldowns::EstablishmentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ratings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ratings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Ratings::EstablishmentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Ratings::MemberId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Ratings::VoucherId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Ratings::Score).integer().not_null())
                    .col(ColumnDef::new(Ratings::Comment).text().null())
                    .col(
                        ColumnDef::new(Ratings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Ratings::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(VoucherCooldowns::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Vouchers::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Establishments::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
