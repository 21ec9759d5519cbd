pub mod staging_record;

pub use staging_record::Entity as StagingRecordEntity;
