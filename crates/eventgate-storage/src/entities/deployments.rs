use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deployments")]
pub struct Model {
    /// Catalog identity used for usage attribution.
    #[sea_orm(primary_key)]
    pub id: i64,
    pub event_id: i64,
    pub deployment_name: String,
    pub model_class: String,
    pub endpoint_url: String,
    pub endpoint_key: String,
    pub location: String,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "event_id", to = "id", on_delete = "Cascade")]
    pub event: HasOne<super::events::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
