//! Staging record entity: one row per (page, visitor IP, day)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "staging_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub page_title: String,
    pub time_spent: i32,
    pub page_view: i32,
    pub visitor_ip: String,
    /// Client IP resolved from proxy headers, empty when none qualified
    pub header_ip: String,
    pub visitor_city: String,
    pub visitor_country: String,
    pub visitor_company: String,
    pub account_id: String,
    pub last_update: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
