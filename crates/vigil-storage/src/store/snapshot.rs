use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::alert_snapshot::{self, Column, Entity};
use crate::store::SqlMonitorStore;

/// 告警快照行视图：条目列表 + 是否本次新建。
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub alert_id: i64,
    pub entries: Vec<serde_json::Value>,
    pub created: bool,
}

impl SqlMonitorStore {
    /// 获取或创建告警的快照行（每个 alert_id 至多一行）。
    pub async fn get_or_create_snapshot(
        &self,
        alert_id: i64,
        policy_id: i64,
        instance_id: &str,
    ) -> Result<SnapshotRow> {
        if let Some(m) = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .one(self.db())
            .await?
        {
            let entries: Vec<serde_json::Value> =
                serde_json::from_str(&m.snapshots).unwrap_or_default();
            return Ok(SnapshotRow { alert_id, entries, created: false });
        }

        let now = Utc::now().fixed_offset();
        let am = alert_snapshot::ActiveModel {
            id: NotSet,
            alert_id: Set(alert_id),
            policy_id: Set(policy_id),
            instance_id: Set(instance_id.to_string()),
            snapshots: Set("[]".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        am.insert(self.db()).await?;
        Ok(SnapshotRow { alert_id, entries: Vec::new(), created: true })
    }

    /// 覆盖写入快照条目列表。调用方保证条目只增不删。
    pub async fn save_snapshot_entries(
        &self,
        alert_id: i64,
        entries: &[serde_json::Value],
    ) -> Result<()> {
        let payload = serde_json::to_string(entries)?;
        Entity::update_many()
            .filter(Column::AlertId.eq(alert_id))
            .col_expr(Column::Snapshots, Expr::value(payload))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .exec(self.db())
            .await?;
        Ok(())
    }
}
