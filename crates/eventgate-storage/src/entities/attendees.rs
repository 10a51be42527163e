use sea_orm::entity::prelude::*;
use time::{Date, OffsetDateTime};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attendees")]
pub struct Model {
    /// The caller-presented credential.
    #[sea_orm(primary_key, auto_increment = false)]
    pub api_key: Uuid,
    pub event_id: i64,
    pub active: bool,
    /// Requests counted within `count_date`. The counter rolls over when
    /// the stored date falls behind the current UTC date.
    pub request_count: i64,
    pub count_date: Date,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "event_id", to = "id", on_delete = "Cascade")]
    pub event: HasOne<super::events::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
