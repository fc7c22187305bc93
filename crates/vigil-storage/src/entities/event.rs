use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "monitor_events")]
pub struct Model {
    /// Snowflake ID，入库前由引擎生成。
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub alert_id: i64,
    pub policy_id: i64,
    pub instance_id: String,
    pub value: Option<f64>,
    pub level: String,
    pub content: String,
    pub notice_result: Option<String>,
    pub event_time: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
