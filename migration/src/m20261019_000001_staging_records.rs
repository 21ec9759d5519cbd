//! 暂存表迁移
//!
//! 创建 staging_records 表，按 (页面, 访客 IP, 日期) 聚合访客活动，
//! 由定时任务批量转发到远程服务后清空。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StagingRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StagingRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StagingRecords::PageTitle).text().not_null())
                    .col(
                        ColumnDef::new(StagingRecords::TimeSpent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::PageView)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::VisitorIp)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::HeaderIp)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::VisitorCity)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::VisitorCountry)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::VisitorCompany)
                            .string_len(255)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(StagingRecords::AccountId)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StagingRecords::LastUpdate).date().not_null())
                    .to_owned(),
            )
            .await?;

        // 按访客 IP + 日期查找当天记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_staging_records_ip_day")
                    .table(StagingRecords::Table)
                    .col(StagingRecords::VisitorIp)
                    .col(StagingRecords::LastUpdate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_staging_records_ip_day").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(StagingRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StagingRecords {
    #[sea_orm(iden = "staging_records")]
    Table,
    Id,
    PageTitle,
    TimeSpent,
    PageView,
    VisitorIp,
    HeaderIp,
    VisitorCity,
    VisitorCountry,
    VisitorCompany,
    AccountId,
    LastUpdate,
}
