use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "event_code")]
    pub event_code: String,
    pub event_name: String,
    /// Soft-deactivation flag; event rows are never hard-deleted.
    pub active: bool,
    pub start_utc: OffsetDateTime,
    pub end_utc: OffsetDateTime,
    pub max_token_cap: i64,
    pub daily_request_cap: i64,
    pub organizer_name: String,
    pub organizer_email: String,
    pub event_url: Option<String>,
    pub event_url_text: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub attendees: HasMany<super::attendees::Entity>,
    #[sea_orm(has_many)]
    pub deployments: HasMany<super::deployments::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
