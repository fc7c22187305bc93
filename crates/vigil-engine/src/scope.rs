use std::collections::BTreeMap;

use vigil_common::types::{Policy, SourceType};
use vigil_storage::MonitorStore;

use crate::error::ScanError;

/// Resolves the set of instances a policy applies to in one run.
pub struct InstanceScopeResolver<'a> {
    store: &'a dyn MonitorStore,
}

impl<'a> InstanceScopeResolver<'a> {
    pub fn new(store: &'a dyn MonitorStore) -> Self {
        Self { store }
    }

    /// Returns `instance_id -> instance_name`.
    ///
    /// An absent `source` yields an empty, unconstrained scope: downstream
    /// components skip scope filtering entirely. An unknown source type
    /// yields an empty constrained scope without error, which makes the
    /// orchestrator skip the run.
    pub async fn resolve(&self, policy: &Policy) -> Result<BTreeMap<String, String>, ScanError> {
        let Some(source) = &policy.source else {
            return Ok(BTreeMap::new());
        };

        let instances = match source.source_type {
            SourceType::Instance => {
                self.store
                    .instances_by_ids(policy.monitor_object_id, &source.values)
                    .await
            }
            SourceType::Organization => {
                self.store
                    .instances_by_organizations(policy.monitor_object_id, &source.values)
                    .await
            }
            SourceType::Unknown => return Ok(BTreeMap::new()),
        }
        .map_err(ScanError::Persistence)?;

        Ok(instances.into_iter().map(|i| (i.id, i.name)).collect())
    }
}
