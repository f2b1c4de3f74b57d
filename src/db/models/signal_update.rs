use sea_orm::entity::prelude::*;

/// One observed event (target hit, stop hit, status change, ...) carried by a message.
///
/// Keyed by (`channel_id`, `update_message_id`, `update_type`): a message may carry several
/// updates, but at most one of each type.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "signal_updates")]
pub struct Model {
    pub signal_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: i64,

    #[sea_orm(primary_key, auto_increment = false)]
    pub update_message_id: i64,

    pub message_link: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub update_type: String,

    #[sea_orm(nullable)]
    pub price: Option<f64>,

    pub update_at: String,

    #[sea_orm(column_type = "Text")]
    pub raw_text: String,

    #[sea_orm(nullable)]
    pub reply_to_msg_id: Option<i64>,

    #[sea_orm(nullable)]
    pub linked_msg_id: Option<i64>,
}

// Not a declared foreign key: the schema has no FK constraint, the relation exists for joins.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::signal::Entity",
        from = "Column::SignalId",
        to = "super::signal::Column::SignalId"
    )]
    Signal,
}

impl Related<super::signal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Signal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
