use sea_orm::entity::prelude::*;

/// One trading call, created from the first observation of its source message.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "signals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub signal_id: String,

    pub channel_id: i64,

    #[sea_orm(unique)]
    pub call_message_id: i64,

    pub message_link: String,

    pub pair: String,

    pub entry: f64,

    #[sea_orm(nullable)]
    pub target1: Option<f64>,

    #[sea_orm(nullable)]
    pub target2: Option<f64>,

    #[sea_orm(nullable)]
    pub target3: Option<f64>,

    #[sea_orm(nullable)]
    pub target4: Option<f64>,

    #[sea_orm(nullable)]
    pub stop1: Option<f64>,

    #[sea_orm(nullable)]
    pub stop2: Option<f64>,

    pub risk_level: String,

    pub volume_rank_num: i32,

    pub volume_rank_den: i32,

    pub created_at: String,

    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub raw_text: String,

    pub text_sha1: String,

    #[sea_orm(nullable)]
    pub edit_date: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::signal_update::Entity")]
    Updates,
}

impl Related<super::signal_update::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Updates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn targets(&self) -> [Option<f64>; 4] {
        [self.target1, self.target2, self.target3, self.target4]
    }

    pub fn stops(&self) -> [Option<f64>; 2] {
        [self.stop1, self.stop2]
    }
}
