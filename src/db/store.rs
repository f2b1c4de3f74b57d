use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DatabaseTransaction, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::db::models::{signal, signal_update};
use crate::db::schema;
use crate::db::types::{NewSignal, NewSignalUpdate, ReferentialMode, SignalStatus, UpsertAction};
use crate::error::{Error, Result};
use crate::state::KeyLocks;
use crate::utils::{parse_timestamp, text_sha1};

const SIGNAL: &str = "signal";
const SIGNAL_UPDATE: &str = "signal update";

/// Read/write contract of the signal store.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Inserts a signal, or refreshes the mutable fields of the row with the same
    /// `call_message_id`.
    async fn upsert_signal(&self, signal: NewSignal) -> Result<(UpsertAction, signal::Model)>;

    /// Inserts a signal; only an identical replay of an existing row is accepted.
    async fn insert_signal(&self, signal: NewSignal) -> Result<signal::Model>;

    /// Inserts an update, or refreshes the payload of the row with the same composite key.
    async fn upsert_signal_update(
        &self,
        update: NewSignalUpdate,
    ) -> Result<(UpsertAction, signal_update::Model)>;

    /// Inserts an update; only an identical replay of an existing row is accepted.
    async fn insert_signal_update(&self, update: NewSignalUpdate) -> Result<signal_update::Model>;

    async fn get_signal(&self, signal_id: &str) -> Result<signal::Model>;

    async fn get_signal_by_call_message_id(&self, call_message_id: i64) -> Result<signal::Model>;

    /// Updates of one signal ordered by `update_at`, then message id, then type.
    async fn list_updates_for_signal(&self, signal_id: &str) -> Result<Vec<signal_update::Model>>;

    async fn list_updates_by_message(&self, update_message_id: i64) -> Result<Vec<signal_update::Model>>;

    async fn list_signals_by_pair(&self, pair: &str) -> Result<Vec<signal::Model>>;

    async fn list_signals_by_status(&self, status: &SignalStatus) -> Result<Vec<signal::Model>>;

    async fn list_signals(&self) -> Result<Vec<signal::Model>>;

    async fn list_updates(&self) -> Result<Vec<signal_update::Model>>;
}

pub struct SignalStore {
    connection: DatabaseConnection,
    referential: ReferentialMode,
    locks: KeyLocks,
}

impl SignalStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(ConnectOptions::new(database_url.to_owned())).await
    }

    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        let connection = Database::connect(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        info!("✅ Connected to {:?} database", connection.get_database_backend());
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: DatabaseConnection) -> Self {
        Self {
            connection,
            referential: ReferentialMode::default(),
            locks: KeyLocks::new(),
        }
    }

    pub fn with_referential_mode(mut self, mode: ReferentialMode) -> Self {
        self.referential = mode;
        self
    }

    pub fn referential_mode(&self) -> ReferentialMode {
        self.referential
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.connection).await
    }

    /// Updates attached to an already loaded signal, through the entity relation.
    pub async fn updates_for(&self, signal: &signal::Model) -> Result<Vec<signal_update::Model>> {
        let mut updates = signal
            .find_related(signal_update::Entity)
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to load updates of {}: {}", signal.signal_id, e)))?;
        sort_updates(&mut updates);
        Ok(updates)
    }

    async fn begin(&self) -> Result<DatabaseTransaction> {
        self.connection
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Shared body of `upsert_signal` and `insert_signal`.
    async fn write_signal(
        &self,
        new: NewSignal,
        allow_update: bool,
    ) -> Result<(UpsertAction, signal::Model)> {
        let _guard = self.locks.acquire(format!("signal:{}", new.call_message_id)).await;
        let sha1 = text_sha1(&new.raw_text);
        let key = format!("call_message_id={}", new.call_message_id);

        let txn = self.begin().await?;

        let by_call = signal::Entity::find()
            .filter(signal::Column::CallMessageId.eq(new.call_message_id))
            .one(&txn)
            .await
            .map_err(|e| Error::Database(format!("Failed to query signal: {}", e)))?;

        let outcome = match by_call {
            Some(existing) if existing.signal_id != new.signal_id => {
                warn!(
                    "Rejected signal {}: message {} already belongs to {}",
                    new.signal_id, new.call_message_id, existing.signal_id
                );
                return Err(Error::duplicate(SIGNAL, key));
            }
            // Upserts only care about mutable fields; inserts must replay the row exactly.
            Some(existing)
                if (allow_update && !new.mutable_fields_differ(&existing, &sha1))
                    || new.matches(&existing, &sha1) =>
            {
                (UpsertAction::Unchanged, existing)
            }
            Some(existing) => {
                if !allow_update {
                    return Err(Error::duplicate(SIGNAL, key));
                }
                if !new.same_identity(&existing) {
                    debug!("Ignoring identity changes for signal {}", existing.signal_id);
                }

                let mut active: signal::ActiveModel = existing.into();
                active.status = ActiveValue::Set(new.status.as_str().to_string());
                active.target1 = ActiveValue::Set(new.target1);
                active.target2 = ActiveValue::Set(new.target2);
                active.target3 = ActiveValue::Set(new.target3);
                active.target4 = ActiveValue::Set(new.target4);
                active.stop1 = ActiveValue::Set(new.stop1);
                active.stop2 = ActiveValue::Set(new.stop2);
                active.edit_date = ActiveValue::Set(new.edit_date);
                active.raw_text = ActiveValue::Set(new.raw_text);
                active.text_sha1 = ActiveValue::Set(sha1);

                let updated = active
                    .update(&txn)
                    .await
                    .map_err(|e| Error::from_write(e, SIGNAL, key.clone()))?;
                (UpsertAction::Updated, updated)
            }
            None => {
                let taken = signal::Entity::find_by_id(new.signal_id.clone())
                    .one(&txn)
                    .await
                    .map_err(|e| Error::Database(format!("Failed to query signal: {}", e)))?;
                if let Some(existing) = taken {
                    warn!(
                        "Rejected signal {}: id already used by message {}",
                        new.signal_id, existing.call_message_id
                    );
                    return Err(Error::duplicate(SIGNAL, format!("signal_id={}", new.signal_id)));
                }

                let inserted = Self::signal_active_model(new, sha1)
                    .insert(&txn)
                    .await
                    .map_err(|e| Error::from_write(e, SIGNAL, key.clone()))?;
                (UpsertAction::Inserted, inserted)
            }
        };

        txn.commit()
            .await
            .map_err(|e| Error::from_write(e, SIGNAL, key))?;

        debug!("Signal {} {:?}", outcome.1.signal_id, outcome.0);
        Ok(outcome)
    }

    /// Shared body of `upsert_signal_update` and `insert_signal_update`.
    async fn write_update(
        &self,
        new: NewSignalUpdate,
        allow_update: bool,
    ) -> Result<(UpsertAction, signal_update::Model)> {
        let update_key = new.key();
        let key = update_key.to_string();
        let _guard = self.locks.acquire(format!("update:{}", key)).await;

        let txn = self.begin().await?;

        if self.referential == ReferentialMode::Enforced {
            let parent = signal::Entity::find_by_id(new.signal_id.clone())
                .one(&txn)
                .await
                .map_err(|e| Error::Database(format!("Failed to query signal: {}", e)))?;
            if parent.is_none() {
                warn!("Rejected update {}: unknown signal {}", key, new.signal_id);
                return Err(Error::OrphanUpdate {
                    signal_id: new.signal_id,
                });
            }
        }

        let existing = signal_update::Entity::find_by_id((
            update_key.channel_id,
            update_key.update_message_id,
            update_key.update_type.clone(),
        ))
        .one(&txn)
        .await
        .map_err(|e| Error::Database(format!("Failed to query signal update: {}", e)))?;

        let outcome = match existing {
            Some(row) if row.signal_id != new.signal_id => {
                warn!(
                    "Rejected update {}: belongs to {}, not {}",
                    key, row.signal_id, new.signal_id
                );
                return Err(Error::duplicate(SIGNAL_UPDATE, key));
            }
            Some(row) if !new.payload_differs(&row) => (UpsertAction::Unchanged, row),
            Some(row) => {
                if !allow_update {
                    return Err(Error::duplicate(SIGNAL_UPDATE, key));
                }

                let mut active: signal_update::ActiveModel = row.into();
                active.message_link = ActiveValue::Set(new.message_link);
                active.price = ActiveValue::Set(new.price);
                active.update_at = ActiveValue::Set(new.update_at);
                active.raw_text = ActiveValue::Set(new.raw_text);
                active.reply_to_msg_id = ActiveValue::Set(new.reply_to_msg_id);
                active.linked_msg_id = ActiveValue::Set(new.linked_msg_id);

                let updated = active
                    .update(&txn)
                    .await
                    .map_err(|e| Error::from_write(e, SIGNAL_UPDATE, key.clone()))?;
                (UpsertAction::Updated, updated)
            }
            None => {
                let inserted = Self::update_active_model(new)
                    .insert(&txn)
                    .await
                    .map_err(|e| Error::from_write(e, SIGNAL_UPDATE, key.clone()))?;
                (UpsertAction::Inserted, inserted)
            }
        };

        txn.commit()
            .await
            .map_err(|e| Error::from_write(e, SIGNAL_UPDATE, key.clone()))?;

        debug!("Signal update {} {:?}", key, outcome.0);
        Ok(outcome)
    }

    fn signal_active_model(new: NewSignal, text_sha1: String) -> signal::ActiveModel {
        signal::ActiveModel {
            signal_id: ActiveValue::Set(new.signal_id),
            channel_id: ActiveValue::Set(new.channel_id),
            call_message_id: ActiveValue::Set(new.call_message_id),
            message_link: ActiveValue::Set(new.message_link),
            pair: ActiveValue::Set(new.pair),
            entry: ActiveValue::Set(new.entry),
            target1: ActiveValue::Set(new.target1),
            target2: ActiveValue::Set(new.target2),
            target3: ActiveValue::Set(new.target3),
            target4: ActiveValue::Set(new.target4),
            stop1: ActiveValue::Set(new.stop1),
            stop2: ActiveValue::Set(new.stop2),
            risk_level: ActiveValue::Set(new.risk_level),
            volume_rank_num: ActiveValue::Set(new.volume_rank_num),
            volume_rank_den: ActiveValue::Set(new.volume_rank_den),
            created_at: ActiveValue::Set(new.created_at),
            status: ActiveValue::Set(new.status.as_str().to_string()),
            raw_text: ActiveValue::Set(new.raw_text),
            text_sha1: ActiveValue::Set(text_sha1),
            edit_date: ActiveValue::Set(new.edit_date),
        }
    }

    fn update_active_model(new: NewSignalUpdate) -> signal_update::ActiveModel {
        signal_update::ActiveModel {
            signal_id: ActiveValue::Set(new.signal_id),
            channel_id: ActiveValue::Set(new.channel_id),
            update_message_id: ActiveValue::Set(new.update_message_id),
            message_link: ActiveValue::Set(new.message_link),
            update_type: ActiveValue::Set(new.update_type),
            price: ActiveValue::Set(new.price),
            update_at: ActiveValue::Set(new.update_at),
            raw_text: ActiveValue::Set(new.raw_text),
            reply_to_msg_id: ActiveValue::Set(new.reply_to_msg_id),
            linked_msg_id: ActiveValue::Set(new.linked_msg_id),
        }
    }
}

#[async_trait]
impl SignalRepository for SignalStore {
    async fn upsert_signal(&self, signal: NewSignal) -> Result<(UpsertAction, signal::Model)> {
        self.write_signal(signal, true).await
    }

    async fn insert_signal(&self, signal: NewSignal) -> Result<signal::Model> {
        self.write_signal(signal, false).await.map(|(_, row)| row)
    }

    async fn upsert_signal_update(
        &self,
        update: NewSignalUpdate,
    ) -> Result<(UpsertAction, signal_update::Model)> {
        self.write_update(update, true).await
    }

    async fn insert_signal_update(&self, update: NewSignalUpdate) -> Result<signal_update::Model> {
        self.write_update(update, false).await.map(|(_, row)| row)
    }

    async fn get_signal(&self, signal_id: &str) -> Result<signal::Model> {
        signal::Entity::find_by_id(signal_id.to_owned())
            .one(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to query signal: {}", e)))?
            .ok_or_else(|| Error::not_found(SIGNAL, format!("signal_id={}", signal_id)))
    }

    async fn get_signal_by_call_message_id(&self, call_message_id: i64) -> Result<signal::Model> {
        signal::Entity::find()
            .filter(signal::Column::CallMessageId.eq(call_message_id))
            .one(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to query signal: {}", e)))?
            .ok_or_else(|| Error::not_found(SIGNAL, format!("call_message_id={}", call_message_id)))
    }

    async fn list_updates_for_signal(&self, signal_id: &str) -> Result<Vec<signal_update::Model>> {
        let mut updates = signal_update::Entity::find()
            .filter(signal_update::Column::SignalId.eq(signal_id))
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list updates of {}: {}", signal_id, e)))?;
        sort_updates(&mut updates);
        Ok(updates)
    }

    async fn list_updates_by_message(&self, update_message_id: i64) -> Result<Vec<signal_update::Model>> {
        signal_update::Entity::find()
            .filter(signal_update::Column::UpdateMessageId.eq(update_message_id))
            .order_by_asc(signal_update::Column::ChannelId)
            .order_by_asc(signal_update::Column::UpdateType)
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list updates of message {}: {}", update_message_id, e)))
    }

    async fn list_signals_by_pair(&self, pair: &str) -> Result<Vec<signal::Model>> {
        let mut signals = signal::Entity::find()
            .filter(signal::Column::Pair.eq(pair))
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list signals for {}: {}", pair, e)))?;
        sort_signals(&mut signals);
        Ok(signals)
    }

    async fn list_signals_by_status(&self, status: &SignalStatus) -> Result<Vec<signal::Model>> {
        let mut signals = signal::Entity::find()
            .filter(signal::Column::Status.eq(status.as_str()))
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list {} signals: {}", status, e)))?;
        sort_signals(&mut signals);
        Ok(signals)
    }

    async fn list_signals(&self) -> Result<Vec<signal::Model>> {
        let mut signals = signal::Entity::find()
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list signals: {}", e)))?;
        sort_signals(&mut signals);
        Ok(signals)
    }

    async fn list_updates(&self) -> Result<Vec<signal_update::Model>> {
        let mut updates = signal_update::Entity::find()
            .all(&self.connection)
            .await
            .map_err(|e| Error::Database(format!("Failed to list signal updates: {}", e)))?;
        updates.sort_by_cached_key(|u| {
            (
                u.signal_id.clone(),
                time_key(&u.update_at),
                u.update_message_id,
                u.update_type.clone(),
            )
        });
        Ok(updates)
    }
}

/// Sort key for a text timestamp: parsed instants in time order, unparseable values last
/// in text order.
fn time_key(raw: &str) -> (bool, Option<DateTime<Utc>>, String) {
    match parse_timestamp(raw) {
        Some(ts) => (false, Some(ts), String::new()),
        None => (true, None, raw.to_owned()),
    }
}

fn sort_updates(updates: &mut [signal_update::Model]) {
    updates.sort_by_cached_key(|u| {
        (time_key(&u.update_at), u.update_message_id, u.update_type.clone())
    });
}

fn sort_signals(signals: &mut [signal::Model]) {
    signals.sort_by_cached_key(|s| {
        (time_key(&s.created_at), s.signal_id.clone())
    });
}
