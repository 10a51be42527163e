use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub attendee_key: Uuid,
    pub event_id: i64,
    pub catalog_id: Option<i64>,
    pub deployment_name: String,
    /// Token counts for buffered calls, `{"stream": true}` for streams.
    pub usage: Json,
    pub at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
