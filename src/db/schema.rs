use sea_orm::sea_query::{ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend};
use tracing::info;

use crate::db::models::{signal, signal_update};
use crate::error::{Error, Result};

pub const IDX_SIGNALS_PAIR: &str = "idx_signals_pair";
pub const IDX_SIGNALS_STATUS: &str = "idx_signals_status";
pub const IDX_UPDATES_SIGNAL_ID: &str = "idx_signal_updates_signal_id";
pub const IDX_UPDATES_MESSAGE_ID: &str = "idx_signal_updates_update_message_id";

/// Creates both tables and their indexes if they are missing.
///
/// MySQL/TiDB has no `CREATE INDEX IF NOT EXISTS`, so there the indexes are declared inline
/// in the table statement. Other backends get separate index statements.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<()> {
    let backend = db.get_database_backend();
    let inline = backend == DatabaseBackend::MySql;

    info!("Creating signals table...");
    execute(db, backend.build(&signals_table(inline)), "signals").await?;

    info!("Creating signal_updates table...");
    execute(db, backend.build(&signal_updates_table(inline)), "signal_updates").await?;

    if !inline {
        for index in indexes() {
            execute(db, backend.build(&index), "index").await?;
        }
    }

    info!("✅ Signal store schema ready");
    Ok(())
}

async fn execute<C: ConnectionTrait>(
    db: &C,
    stmt: sea_orm::Statement,
    what: &str,
) -> Result<()> {
    db.execute(stmt)
        .await
        .map_err(|e| Error::Database(format!("Failed to create {}: {}", what, e)))?;
    Ok(())
}

pub fn signals_table(inline_indexes: bool) -> TableCreateStatement {
    use signal::Column;

    let mut stmt = Table::create()
        .table(signal::Entity)
        .if_not_exists()
        .col(ColumnDef::new(Column::SignalId).string().not_null().primary_key())
        .col(ColumnDef::new(Column::ChannelId).big_integer().not_null())
        .col(ColumnDef::new(Column::CallMessageId).big_integer().not_null().unique_key())
        .col(ColumnDef::new(Column::MessageLink).string().not_null())
        .col(ColumnDef::new(Column::Pair).string().not_null())
        .col(ColumnDef::new(Column::Entry).double().not_null())
        .col(ColumnDef::new(Column::Target1).double())
        .col(ColumnDef::new(Column::Target2).double())
        .col(ColumnDef::new(Column::Target3).double())
        .col(ColumnDef::new(Column::Target4).double())
        .col(ColumnDef::new(Column::Stop1).double())
        .col(ColumnDef::new(Column::Stop2).double())
        .col(ColumnDef::new(Column::RiskLevel).string().not_null())
        .col(ColumnDef::new(Column::VolumeRankNum).integer().not_null())
        .col(ColumnDef::new(Column::VolumeRankDen).integer().not_null())
        .col(ColumnDef::new(Column::CreatedAt).string().not_null())
        .col(ColumnDef::new(Column::Status).string().not_null())
        .col(ColumnDef::new(Column::RawText).text().not_null())
        .col(ColumnDef::new(Column::TextSha1).string_len(40).not_null())
        .col(ColumnDef::new(Column::EditDate).string())
        .to_owned();

    if inline_indexes {
        stmt.index(Index::create().name(IDX_SIGNALS_PAIR).col(Column::Pair))
            .index(Index::create().name(IDX_SIGNALS_STATUS).col(Column::Status));
    }

    stmt
}

pub fn signal_updates_table(inline_indexes: bool) -> TableCreateStatement {
    use signal_update::Column;

    let mut stmt = Table::create()
        .table(signal_update::Entity)
        .if_not_exists()
        .col(ColumnDef::new(Column::SignalId).string().not_null())
        .col(ColumnDef::new(Column::ChannelId).big_integer().not_null())
        .col(ColumnDef::new(Column::UpdateMessageId).big_integer().not_null())
        .col(ColumnDef::new(Column::MessageLink).string().not_null())
        .col(ColumnDef::new(Column::UpdateType).string().not_null())
        .col(ColumnDef::new(Column::Price).double())
        .col(ColumnDef::new(Column::UpdateAt).string().not_null())
        .col(ColumnDef::new(Column::RawText).text().not_null())
        .col(ColumnDef::new(Column::ReplyToMsgId).big_integer())
        .col(ColumnDef::new(Column::LinkedMsgId).big_integer())
        .primary_key(
            Index::create()
                .col(Column::ChannelId)
                .col(Column::UpdateMessageId)
                .col(Column::UpdateType),
        )
        .to_owned();

    if inline_indexes {
        stmt.index(Index::create().name(IDX_UPDATES_SIGNAL_ID).col(Column::SignalId))
            .index(Index::create().name(IDX_UPDATES_MESSAGE_ID).col(Column::UpdateMessageId));
    }

    stmt
}

pub fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name(IDX_SIGNALS_PAIR)
            .table(signal::Entity)
            .col(signal::Column::Pair)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name(IDX_SIGNALS_STATUS)
            .table(signal::Entity)
            .col(signal::Column::Status)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name(IDX_UPDATES_SIGNAL_ID)
            .table(signal_update::Entity)
            .col(signal_update::Column::SignalId)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name(IDX_UPDATES_MESSAGE_ID)
            .table(signal_update::Entity)
            .col(signal_update::Column::UpdateMessageId)
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder};

    #[test]
    fn signal_updates_uses_composite_primary_key() {
        let sql = signal_updates_table(false).to_string(SqliteQueryBuilder);
        assert!(sql.contains("PRIMARY KEY"));
        assert!(sql.contains(r#""channel_id", "update_message_id", "update_type""#));
        assert!(sql.contains("IF NOT EXISTS"));
    }

    #[test]
    fn signals_declares_unique_call_message_id() {
        let sql = signals_table(false).to_string(PostgresQueryBuilder);
        assert!(sql.contains("UNIQUE"));
        assert!(!sql.contains(IDX_SIGNALS_PAIR));
    }

    #[test]
    fn open_vocabulary_columns_are_not_narrowed() {
        let updates = signal_updates_table(false).to_string(PostgresQueryBuilder);
        assert!(updates.contains(r#""update_type" varchar NOT NULL"#));

        let signals = signals_table(false).to_string(PostgresQueryBuilder);
        assert!(signals.contains(r#""status" varchar NOT NULL"#));
        assert!(signals.contains(r#""text_sha1" varchar(40) NOT NULL"#));
    }

    #[test]
    fn mysql_tables_carry_inline_indexes() {
        let sql = signals_table(true).to_string(MysqlQueryBuilder);
        assert!(sql.contains(IDX_SIGNALS_PAIR));
        assert!(sql.contains(IDX_SIGNALS_STATUS));

        let sql = signal_updates_table(true).to_string(MysqlQueryBuilder);
        assert!(sql.contains(IDX_UPDATES_SIGNAL_ID));
        assert!(sql.contains(IDX_UPDATES_MESSAGE_ID));
    }

    #[test]
    fn separate_indexes_are_idempotent() {
        let statements: Vec<String> = indexes()
            .iter()
            .map(|i| i.to_string(SqliteQueryBuilder))
            .collect();
        assert_eq!(statements.len(), 4);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
