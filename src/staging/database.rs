//! SeaORM implementation of the staging store (SQLite, MySQL/MariaDB, PostgreSQL).

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::{debug, error};

use super::retry::{RetryConfig, with_retry};
use super::{NewStagingRecord, StagingRecord, StagingStore};
use crate::errors::{Result, TrackerError};
use migration::entities::staging_record;

#[derive(Clone)]
pub struct SeaOrmStagingStore {
    db: DatabaseConnection,
    retry: RetryConfig,
}

impl SeaOrmStagingStore {
    pub fn new(db: DatabaseConnection, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl From<staging_record::Model> for StagingRecord {
    fn from(m: staging_record::Model) -> Self {
        Self {
            id: m.id,
            page_title: m.page_title,
            time_spent: m.time_spent,
            page_view: m.page_view,
            visitor_ip: m.visitor_ip,
            header_ip: m.header_ip,
            visitor_city: m.visitor_city,
            visitor_country: m.visitor_country,
            visitor_company: m.visitor_company,
            account_id: m.account_id,
            last_update: m.last_update,
        }
    }
}

fn to_active_model(record: NewStagingRecord) -> staging_record::ActiveModel {
    staging_record::ActiveModel {
        page_title: Set(record.page_title),
        time_spent: Set(record.time_spent),
        page_view: Set(record.page_view),
        visitor_ip: Set(record.visitor_ip),
        header_ip: Set(record.header_ip),
        visitor_city: Set(record.visitor_city),
        visitor_country: Set(record.visitor_country),
        visitor_company: Set(record.visitor_company),
        account_id: Set(record.account_id),
        last_update: Set(record.last_update),
        ..Default::default()
    }
}

fn db_error(operation: &str, err: sea_orm::DbErr) -> TrackerError {
    error!("Staging {} failed: {}", operation, err);
    TrackerError::database_operation(format!("{}: {}", operation, err))
}

#[async_trait]
impl StagingStore for SeaOrmStagingStore {
    async fn find(
        &self,
        page_title: &str,
        visitor_ip: &str,
        day: NaiveDate,
    ) -> Result<Option<StagingRecord>> {
        let found = with_retry("staging.find", self.retry, || {
            staging_record::Entity::find()
                .filter(staging_record::Column::PageTitle.eq(page_title))
                .filter(staging_record::Column::VisitorIp.eq(visitor_ip))
                .filter(staging_record::Column::LastUpdate.eq(day))
                .order_by_asc(staging_record::Column::Id)
                .one(&self.db)
        })
        .await
        .map_err(|e| db_error("find", e))?;

        Ok(found.map(StagingRecord::from))
    }

    async fn insert(&self, record: NewStagingRecord) -> Result<StagingRecord> {
        let model = to_active_model(record);
        let inserted = with_retry("staging.insert", self.retry, || {
            model.clone().insert(&self.db)
        })
        .await
        .map_err(|e| db_error("insert", e))?;

        debug!(
            "Staged new record {} for page '{}'",
            inserted.id, inserted.page_title
        );
        Ok(inserted.into())
    }

    async fn update_counters(
        &self,
        id: i64,
        time_spent: i32,
        page_view: i32,
        day: NaiveDate,
    ) -> Result<()> {
        let result = with_retry("staging.update", self.retry, || {
            staging_record::Entity::update_many()
                .col_expr(staging_record::Column::TimeSpent, Expr::value(time_spent))
                .col_expr(staging_record::Column::PageView, Expr::value(page_view))
                .col_expr(staging_record::Column::LastUpdate, Expr::value(day))
                .filter(staging_record::Column::Id.eq(id))
                .exec(&self.db)
        })
        .await
        .map_err(|e| db_error("update", e))?;

        if result.rows_affected == 0 {
            return Err(TrackerError::not_found(format!("staging record {}", id)));
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<StagingRecord>> {
        let rows = with_retry("staging.all", self.retry, || {
            staging_record::Entity::find()
                .order_by_asc(staging_record::Column::Id)
                .all(&self.db)
        })
        .await
        .map_err(|e| db_error("read all", e))?;

        Ok(rows.into_iter().map(StagingRecord::from).collect())
    }

    async fn find_account_id(
        &self,
        visitor_ip: &str,
        header_ip: &str,
        page_title: &str,
    ) -> Result<Option<String>> {
        let mut by_address =
            Condition::any().add(staging_record::Column::VisitorIp.eq(visitor_ip));
        if !header_ip.is_empty() {
            by_address = by_address.add(staging_record::Column::HeaderIp.eq(header_ip));
        }
        let condition = Condition::all()
            .add(by_address)
            .add(staging_record::Column::PageTitle.eq(page_title))
            .add(staging_record::Column::AccountId.ne(""));

        let account_id = with_retry("staging.find_account_id", self.retry, || {
            staging_record::Entity::find()
                .select_only()
                .column(staging_record::Column::AccountId)
                .filter(condition.clone())
                .order_by_asc(staging_record::Column::Id)
                .into_tuple::<String>()
                .one(&self.db)
        })
        .await
        .map_err(|e| db_error("account lookup", e))?;

        Ok(account_id)
    }

    async fn delete_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        // 分批删除，避免超出 SQL 参数上限
        for chunk in ids.chunks(500) {
            let result = with_retry("staging.delete", self.retry, || {
                staging_record::Entity::delete_many()
                    .filter(staging_record::Column::Id.is_in(chunk.iter().copied()))
                    .exec(&self.db)
            })
            .await
            .map_err(|e| db_error("delete", e))?;
            deleted += result.rows_affected;
        }
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64> {
        with_retry("staging.count", self.retry, || {
            staging_record::Entity::find().count(&self.db)
        })
        .await
        .map_err(|e| db_error("count", e))
    }
}
