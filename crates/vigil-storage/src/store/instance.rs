use anyhow::Result;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::{instance, instance_organization, metric};
use crate::store::SqlMonitorStore;

/// 监控实例数据行（monitor_instances 表，对引擎只读）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRow {
    pub id: String,
    pub name: String,
}

/// 指标定义数据行（monitor_metrics 表，对引擎只读）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: String,
    pub name: String,
    pub query: String,
    pub instance_id_keys: Vec<String>,
}

impl SqlMonitorStore {
    pub async fn instances_by_ids(
        &self,
        monitor_object_id: i64,
        ids: &[String],
    ) -> Result<Vec<InstanceRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = instance::Entity::find()
            .filter(instance::Column::MonitorObjectId.eq(monitor_object_id))
            .filter(instance::Column::Id.is_in(ids.iter().cloned()))
            .filter(instance::Column::IsDeleted.eq(false))
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| InstanceRow { id: m.id, name: m.name })
            .collect())
    }

    pub async fn instances_by_organizations(
        &self,
        monitor_object_id: i64,
        organizations: &[String],
    ) -> Result<Vec<InstanceRow>> {
        if organizations.is_empty() {
            return Ok(Vec::new());
        }
        let memberships = instance_organization::Entity::find()
            .filter(
                instance_organization::Column::Organization
                    .is_in(organizations.iter().cloned()),
            )
            .all(self.db())
            .await?;
        let ids: Vec<String> = memberships.into_iter().map(|m| m.instance_id).collect();
        self.instances_by_ids(monitor_object_id, &ids).await
    }

    pub async fn metric_by_id(&self, id: &str) -> Result<Option<MetricRow>> {
        let model = metric::Entity::find_by_id(id).one(self.db()).await?;
        match model {
            Some(m) => {
                let keys: Vec<String> = serde_json::from_str(&m.instance_id_keys)?;
                Ok(Some(MetricRow {
                    id: m.id,
                    name: m.name,
                    query: m.query,
                    instance_id_keys: keys,
                }))
            }
            None => Ok(None),
        }
    }
}
