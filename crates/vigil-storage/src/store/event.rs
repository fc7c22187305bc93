use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::{event, event_raw_data};
use crate::store::SqlMonitorStore;

/// 检测事件数据行（monitor_events 表，入库后不可变）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub alert_id: i64,
    pub policy_id: i64,
    pub instance_id: String,
    pub value: Option<f64>,
    pub level: String,
    pub content: String,
    pub notice_result: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// 待入库的检测事件（主键由引擎生成，入库前 alert_id 必须已解析）。
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: String,
    pub alert_id: i64,
    pub policy_id: i64,
    pub instance_id: String,
    pub value: Option<f64>,
    pub level: String,
    pub content: String,
    pub event_time: DateTime<Utc>,
}

impl SqlMonitorStore {
    pub async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<EventRow>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now().fixed_offset();
        let models: Vec<event::ActiveModel> = events
            .iter()
            .map(|e| event::ActiveModel {
                id: Set(e.id.clone()),
                alert_id: Set(e.alert_id),
                policy_id: Set(e.policy_id),
                instance_id: Set(e.instance_id.clone()),
                value: Set(e.value),
                level: Set(e.level.clone()),
                content: Set(e.content.clone()),
                notice_result: Set(None),
                event_time: Set(e.event_time.fixed_offset()),
                created_at: Set(now),
            })
            .collect();
        event::Entity::insert_many(models).exec(self.db()).await?;

        // 主键为引擎生成的 Snowflake ID，无需回查即可返回行视图
        Ok(events
            .into_iter()
            .map(|e| EventRow {
                id: e.id,
                alert_id: e.alert_id,
                policy_id: e.policy_id,
                instance_id: e.instance_id,
                value: e.value,
                level: e.level,
                content: e.content,
                notice_result: None,
                event_time: e.event_time,
            })
            .collect())
    }

    /// 原始数据逐条写入。底层存储在单条保存时才触发上传副作用，
    /// 不能改写为批量插入。
    pub async fn insert_event_raw_data(
        &self,
        event_id: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let am = event_raw_data::ActiveModel {
            id: NotSet,
            event_id: Set(event_id.to_string()),
            data: Set(serde_json::to_string(data)?),
            created_at: Set(Utc::now().fixed_offset()),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn set_event_notice_results(&self, results: Vec<(String, String)>) -> Result<()> {
        for (event_id, notice_result) in results {
            event::Entity::update_many()
                .filter(event::Column::Id.eq(event_id))
                .col_expr(event::Column::NoticeResult, Expr::value(Some(notice_result)))
                .exec(self.db())
                .await?;
        }
        Ok(())
    }
}
