use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "monitor_alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub policy_id: i64,
    pub instance_id: String,
    pub instance_name: String,
    pub alert_type: String,
    pub level: String,
    pub value: Option<f64>,
    pub content: String,
    pub status: String,
    pub start_event_time: DateTimeWithTimeZone,
    pub end_event_time: Option<DateTimeWithTimeZone>,
    pub info_event_count: i32,
    pub operator: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
