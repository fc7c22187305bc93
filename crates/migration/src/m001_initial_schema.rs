use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS monitor_instances (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    monitor_object_id INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instances_object ON monitor_instances(monitor_object_id);

CREATE TABLE IF NOT EXISTS monitor_instance_organizations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL,
    organization TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instance_orgs_instance ON monitor_instance_organizations(instance_id);
CREATE INDEX IF NOT EXISTS idx_instance_orgs_org ON monitor_instance_organizations(organization);

CREATE TABLE IF NOT EXISTS monitor_metrics (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    query TEXT NOT NULL,
    instance_id_keys TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS monitor_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    policy_id INTEGER NOT NULL,
    instance_id TEXT NOT NULL,
    instance_name TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    level TEXT NOT NULL,
    value REAL,
    content TEXT NOT NULL,
    status TEXT NOT NULL,
    start_event_time TEXT NOT NULL,
    end_event_time TEXT,
    info_event_count INTEGER NOT NULL DEFAULT 0,
    operator TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_policy_status ON monitor_alerts(policy_id, status);
CREATE INDEX IF NOT EXISTS idx_alerts_instance ON monitor_alerts(instance_id);
CREATE INDEX IF NOT EXISTS idx_alerts_start_time ON monitor_alerts(start_event_time);

CREATE TABLE IF NOT EXISTS monitor_events (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id INTEGER NOT NULL,
    policy_id INTEGER NOT NULL,
    instance_id TEXT NOT NULL,
    value REAL,
    level TEXT NOT NULL,
    content TEXT NOT NULL,
    notice_result TEXT,
    event_time TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_alert ON monitor_events(alert_id);
CREATE INDEX IF NOT EXISTS idx_events_policy_time ON monitor_events(policy_id, event_time);

CREATE TABLE IF NOT EXISTS monitor_event_raw_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS monitor_alert_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id INTEGER NOT NULL UNIQUE,
    policy_id INTEGER NOT NULL,
    instance_id TEXT NOT NULL,
    snapshots TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_policy ON monitor_alert_snapshots(policy_id);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS monitor_alert_snapshots;
DROP TABLE IF EXISTS monitor_event_raw_data;
DROP TABLE IF EXISTS monitor_events;
DROP TABLE IF EXISTS monitor_alerts;
DROP TABLE IF EXISTS monitor_metrics;
DROP TABLE IF EXISTS monitor_instance_organizations;
DROP TABLE IF EXISTS monitor_instances;
";
