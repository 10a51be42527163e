use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    QueryFilter, Schema, TransactionTrait,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities;
use crate::pool::PoolManager;
use crate::storage::{
    AuthorizedRow, DeploymentInput, DeploymentRow, EventInput, Storage, StorageResult, UsageRow,
};

#[derive(Clone)]
pub struct SeaOrmStorage {
    pool: Arc<PoolManager>,
}

impl SeaOrmStorage {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Storage for SeaOrmStorage {
    async fn sync(&self) -> StorageResult<()> {
        let db = self.pool.acquire().await?;
        // Ensure sqlite enforces foreign keys (required for cascade + integrity).
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        Schema::new(db.get_database_backend())
            .builder()
            .register(entities::Events)
            .register(entities::Attendees)
            .register(entities::Deployments)
            .register(entities::UsageLogs)
            .sync(&db)
            .await?;
        Ok(())
    }

    async fn attendee_authorized(
        &self,
        event_code: &str,
        api_key: Uuid,
    ) -> StorageResult<Option<AuthorizedRow>> {
        use entities::attendees::Column as AttendeeColumn;
        use entities::events::Column as EventColumn;

        let db = self.pool.acquire().await?;
        let txn = db.begin().await?;

        let Some(event) = entities::Events::find()
            .filter(EventColumn::EventCode.eq(event_code))
            .filter(EventColumn::Active.eq(true))
            .one(&txn)
            .await?
        else {
            txn.commit().await?;
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc();
        if now < event.start_utc || now > event.end_utc {
            txn.commit().await?;
            return Ok(None);
        }

        let Some(attendee) = entities::Attendees::find_by_id(api_key)
            .filter(AttendeeColumn::EventId.eq(event.id))
            .filter(AttendeeColumn::Active.eq(true))
            .one(&txn)
            .await?
        else {
            txn.commit().await?;
            return Ok(None);
        };

        // Roll the daily counter: reset once the stored window date falls
        // behind the current UTC date, otherwise increment in place.
        let today = now.date();
        let count = if attendee.count_date < today {
            1
        } else {
            attendee.request_count + 1
        };
        let rate_limit_exceed = count > event.daily_request_cap;

        let mut active: entities::attendees::ActiveModel = attendee.into();
        active.request_count = ActiveValue::Set(count);
        active.count_date = ActiveValue::Set(today);
        active.updated_at = ActiveValue::Set(now);
        active.update(&txn).await?;

        txn.commit().await?;

        Ok(Some(AuthorizedRow {
            attendee_key: api_key,
            event_id: event.id,
            event_code: event.event_code,
            event_name: event.event_name,
            max_token_cap: event.max_token_cap,
            daily_request_cap: event.daily_request_cap,
            rate_limit_exceed,
            organizer_name: event.organizer_name,
            organizer_email: event.organizer_email,
            event_url: event.event_url,
            event_url_text: event.event_url_text,
        }))
    }

    async fn deployments_for_event(
        &self,
        event_id: i64,
        model_class: Option<&str>,
        deployment_name: Option<&str>,
    ) -> StorageResult<Vec<DeploymentRow>> {
        use entities::deployments::Column;

        let db = self.pool.acquire().await?;
        let mut query = entities::Deployments::find()
            .filter(Column::EventId.eq(event_id))
            .filter(Column::Active.eq(true));
        if let Some(model_class) = model_class {
            query = query.filter(Column::ModelClass.eq(model_class));
        }
        if let Some(deployment_name) = deployment_name {
            query = query.filter(Column::DeploymentName.eq(deployment_name));
        }

        let rows = query.all(&db).await?;
        Ok(rows
            .into_iter()
            .map(|row| DeploymentRow {
                catalog_id: row.id,
                event_id: row.event_id,
                deployment_name: row.deployment_name,
                model_class: row.model_class,
                endpoint_url: row.endpoint_url,
                endpoint_key: row.endpoint_key,
                location: row.location,
            })
            .collect())
    }

    async fn record_usage(&self, row: UsageRow) -> StorageResult<()> {
        let db = self.pool.acquire().await?;
        let active = entities::usage_logs::ActiveModel {
            id: ActiveValue::NotSet,
            attendee_key: ActiveValue::Set(row.attendee_key),
            event_id: ActiveValue::Set(row.event_id),
            catalog_id: ActiveValue::Set(row.catalog_id),
            deployment_name: ActiveValue::Set(row.deployment_name),
            usage: ActiveValue::Set(row.usage),
            at: ActiveValue::Set(row.at),
        };
        entities::UsageLogs::insert(active).exec(&db).await?;
        Ok(())
    }

    async fn upsert_event(&self, input: EventInput) -> StorageResult<i64> {
        use entities::events::Column;

        let db = self.pool.acquire().await?;
        let now = OffsetDateTime::now_utc();
        let existing = entities::Events::find()
            .filter(Column::EventCode.eq(input.event_code.as_str()))
            .one(&db)
            .await?;

        let id = match existing {
            Some(model) => {
                let id = model.id;
                let mut active: entities::events::ActiveModel = model.into();
                active.event_name = ActiveValue::Set(input.event_name);
                active.active = ActiveValue::Set(input.active);
                active.start_utc = ActiveValue::Set(input.start_utc);
                active.end_utc = ActiveValue::Set(input.end_utc);
                active.max_token_cap = ActiveValue::Set(input.max_token_cap);
                active.daily_request_cap = ActiveValue::Set(input.daily_request_cap);
                active.organizer_name = ActiveValue::Set(input.organizer_name);
                active.organizer_email = ActiveValue::Set(input.organizer_email);
                active.event_url = ActiveValue::Set(input.event_url);
                active.event_url_text = ActiveValue::Set(input.event_url_text);
                active.updated_at = ActiveValue::Set(now);
                active.update(&db).await?;
                id
            }
            None => {
                let active = entities::events::ActiveModel {
                    id: ActiveValue::NotSet,
                    event_code: ActiveValue::Set(input.event_code),
                    event_name: ActiveValue::Set(input.event_name),
                    active: ActiveValue::Set(input.active),
                    start_utc: ActiveValue::Set(input.start_utc),
                    end_utc: ActiveValue::Set(input.end_utc),
                    max_token_cap: ActiveValue::Set(input.max_token_cap),
                    daily_request_cap: ActiveValue::Set(input.daily_request_cap),
                    organizer_name: ActiveValue::Set(input.organizer_name),
                    organizer_email: ActiveValue::Set(input.organizer_email),
                    event_url: ActiveValue::Set(input.event_url),
                    event_url_text: ActiveValue::Set(input.event_url_text),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Events::insert(active).exec(&db).await?.last_insert_id
            }
        };
        Ok(id)
    }

    async fn upsert_attendee(
        &self,
        event_id: i64,
        api_key: Uuid,
        active: bool,
    ) -> StorageResult<()> {
        let db = self.pool.acquire().await?;
        let now = OffsetDateTime::now_utc();
        let existing = entities::Attendees::find_by_id(api_key).one(&db).await?;

        match existing {
            Some(model) => {
                let mut model: entities::attendees::ActiveModel = model.into();
                model.event_id = ActiveValue::Set(event_id);
                model.active = ActiveValue::Set(active);
                model.updated_at = ActiveValue::Set(now);
                model.update(&db).await?;
            }
            None => {
                let model = entities::attendees::ActiveModel {
                    api_key: ActiveValue::Set(api_key),
                    event_id: ActiveValue::Set(event_id),
                    active: ActiveValue::Set(active),
                    request_count: ActiveValue::Set(0),
                    count_date: ActiveValue::Set(now.date()),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Attendees::insert(model).exec(&db).await?;
            }
        }
        Ok(())
    }

    async fn upsert_deployment(&self, input: DeploymentInput) -> StorageResult<i64> {
        use entities::deployments::Column;

        let db = self.pool.acquire().await?;
        let now = OffsetDateTime::now_utc();
        let existing = entities::Deployments::find()
            .filter(Column::EventId.eq(input.event_id))
            .filter(Column::DeploymentName.eq(input.deployment_name.as_str()))
            .one(&db)
            .await?;

        let id = match existing {
            Some(model) => {
                let id = model.id;
                let mut active: entities::deployments::ActiveModel = model.into();
                active.model_class = ActiveValue::Set(input.model_class);
                active.endpoint_url = ActiveValue::Set(input.endpoint_url);
                active.endpoint_key = ActiveValue::Set(input.endpoint_key);
                active.location = ActiveValue::Set(input.location);
                active.active = ActiveValue::Set(input.active);
                active.updated_at = ActiveValue::Set(now);
                active.update(&db).await?;
                id
            }
            None => {
                let active = entities::deployments::ActiveModel {
                    id: ActiveValue::NotSet,
                    event_id: ActiveValue::Set(input.event_id),
                    deployment_name: ActiveValue::Set(input.deployment_name),
                    model_class: ActiveValue::Set(input.model_class),
                    endpoint_url: ActiveValue::Set(input.endpoint_url),
                    endpoint_key: ActiveValue::Set(input.endpoint_key),
                    location: ActiveValue::Set(input.location),
                    active: ActiveValue::Set(input.active),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Deployments::insert(active)
                    .exec(&db)
                    .await?
                    .last_insert_id
            }
        };
        Ok(id)
    }
}
