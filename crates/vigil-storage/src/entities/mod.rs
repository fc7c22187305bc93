pub mod alert;
pub mod alert_snapshot;
pub mod event;
pub mod event_raw_data;
pub mod instance;
pub mod instance_organization;
pub mod metric;
