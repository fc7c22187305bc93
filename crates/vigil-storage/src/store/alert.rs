use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::alert::{self, Column, Entity};
use crate::store::SqlMonitorStore;

/// 告警数据行（monitor_alerts 表）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: i64,
    pub policy_id: i64,
    pub instance_id: String,
    pub instance_name: String,
    pub alert_type: String,
    pub level: String,
    pub value: Option<f64>,
    pub content: String,
    pub status: String,
    pub start_event_time: DateTime<Utc>,
    pub end_event_time: Option<DateTime<Utc>>,
    pub info_event_count: i32,
    pub operator: String,
}

/// 待创建的告警（主键由数据库生成）。
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub policy_id: i64,
    pub instance_id: String,
    pub instance_name: String,
    pub alert_type: String,
    pub level: String,
    pub value: Option<f64>,
    pub content: String,
    pub start_event_time: DateTime<Utc>,
}

/// 告警升级更新（level/value/content 同步覆盖）。
#[derive(Debug, Clone)]
pub struct AlertEscalation {
    pub alert_id: i64,
    pub level: String,
    pub value: Option<f64>,
    pub content: String,
}

fn to_row(m: alert::Model) -> AlertRow {
    AlertRow {
        id: m.id,
        policy_id: m.policy_id,
        instance_id: m.instance_id,
        instance_name: m.instance_name,
        alert_type: m.alert_type,
        level: m.level,
        value: m.value,
        content: m.content,
        status: m.status,
        start_event_time: m.start_event_time.with_timezone(&Utc),
        end_event_time: m.end_event_time.map(|t| t.with_timezone(&Utc)),
        info_event_count: m.info_event_count,
        operator: m.operator,
    }
}

impl SqlMonitorStore {
    pub async fn active_alerts(
        &self,
        policy_id: i64,
        instance_ids: Option<&[String]>,
    ) -> Result<Vec<AlertRow>> {
        let mut q = Entity::find()
            .filter(Column::PolicyId.eq(policy_id))
            .filter(Column::Status.eq("new"));
        if let Some(ids) = instance_ids {
            q = q.filter(Column::InstanceId.is_in(ids.iter().cloned()));
        }
        let rows = q.order_by(Column::Id, Order::Asc).all(self.db()).await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// 批量创建告警。批量插入不回传自增主键，
    /// 统一按自然键（policy + instance 集合 + start_event_time + status=new）回查。
    pub async fn create_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<AlertRow>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }
        let policy_id = alerts[0].policy_id;
        let start_event_time = alerts[0].start_event_time;
        let instance_ids: Vec<String> = alerts.iter().map(|a| a.instance_id.clone()).collect();

        let now = Utc::now().fixed_offset();
        let models: Vec<alert::ActiveModel> = alerts
            .into_iter()
            .map(|a| alert::ActiveModel {
                id: NotSet,
                policy_id: Set(a.policy_id),
                instance_id: Set(a.instance_id),
                instance_name: Set(a.instance_name),
                alert_type: Set(a.alert_type),
                level: Set(a.level),
                value: Set(a.value),
                content: Set(a.content),
                status: Set("new".to_string()),
                start_event_time: Set(a.start_event_time.fixed_offset()),
                end_event_time: Set(None),
                info_event_count: Set(0),
                operator: Set(String::new()),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect();

        Entity::insert_many(models).exec(self.db()).await?;

        let rows = Entity::find()
            .filter(Column::PolicyId.eq(policy_id))
            .filter(Column::InstanceId.is_in(instance_ids))
            .filter(Column::StartEventTime.eq(start_event_time.fixed_offset()))
            .filter(Column::Status.eq("new"))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn update_alert_escalations(&self, updates: Vec<AlertEscalation>) -> Result<()> {
        for u in updates {
            Entity::update_many()
                .filter(Column::Id.eq(u.alert_id))
                .col_expr(Column::Level, Expr::value(u.level))
                .col_expr(Column::Value, Expr::value(u.value))
                .col_expr(Column::Content, Expr::value(u.content))
                .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
                .exec(self.db())
                .await?;
        }
        Ok(())
    }

    pub async fn increment_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        if alert_ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::update_many()
            .filter(Column::Id.is_in(alert_ids.iter().copied()))
            .col_expr(
                Column::InfoEventCount,
                Expr::col(Column::InfoEventCount).add(1),
            )
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn reset_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        if alert_ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::update_many()
            .filter(Column::Id.is_in(alert_ids.iter().copied()))
            .col_expr(Column::InfoEventCount, Expr::value(0))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    /// 恢复连续正常次数达到恢复条件的阈值告警。
    pub async fn recover_threshold_alerts(
        &self,
        alert_ids: &[i64],
        recovery_condition: i32,
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        if alert_ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::update_many()
            .filter(Column::Id.is_in(alert_ids.iter().copied()))
            .filter(Column::Status.eq("new"))
            .filter(Column::InfoEventCount.gte(recovery_condition))
            .col_expr(Column::Status, Expr::value("recovered"))
            .col_expr(Column::EndEventTime, Expr::value(Some(end_time.fixed_offset())))
            .col_expr(Column::Operator, Expr::value("system"))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    /// 恢复数据重新出现的无数据告警。按 status=new 过滤，天然幂等。
    pub async fn recover_no_data_alerts(
        &self,
        policy_id: i64,
        instance_ids: &[String],
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        if instance_ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::update_many()
            .filter(Column::PolicyId.eq(policy_id))
            .filter(Column::InstanceId.is_in(instance_ids.iter().cloned()))
            .filter(Column::AlertType.eq("no_data"))
            .filter(Column::Status.eq("new"))
            .col_expr(Column::Status, Expr::value("recovered"))
            .col_expr(Column::EndEventTime, Expr::value(Some(end_time.fixed_offset())))
            .col_expr(Column::Operator, Expr::value("system"))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
