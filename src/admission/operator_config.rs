//! SriovOperatorConfig validation

use super::{AdmissionValidator, Verdict};
use crate::crd::{SriovOperatorConfig, SyncStatus, DEFAULT_CONFIG_NAME};
use crate::error::{Error, Result};
use kube::core::admission::Operation;
use kube::ResourceExt;
use tracing::info;

impl AdmissionValidator {
    /// Validate an operator config create, update or delete
    pub async fn validate_operator_config(
        &self,
        config: &SriovOperatorConfig,
        operation: Operation,
    ) -> Verdict {
        let mut warnings = Vec::new();

        if matches!(operation, Operation::Delete) {
            return Verdict::allow(warnings);
        }

        let namespace = &self.config.operator_namespace;
        if config.name_any() != DEFAULT_CONFIG_NAME
            || config.namespace().as_deref() != Some(namespace.as_str())
        {
            return Verdict::deny(
                warnings,
                Error::rejected(format!(
                    "only default SriovOperatorConfig in {} namespace is used",
                    namespace
                )),
            );
        }

        if config.spec.disable_drain {
            warnings.push(
                "Node draining is disabled for applying SriovNetworkNodePolicy, it may result in workload interruption."
                    .to_string(),
            );
        }

        match self.check_disable_drain_transition(config).await {
            Ok(()) => Verdict::allow(warnings),
            Err(e) => {
                info!("Rejecting SriovOperatorConfig {}: {}", config.name_any(), e);
                Verdict::deny(warnings, e)
            }
        }
    }

    /// Turning drain off while a node is mid-reconfiguration would let that
    /// node continue without the drain it started with
    async fn check_disable_drain_transition(&self, config: &SriovOperatorConfig) -> Result<()> {
        if !config.spec.disable_drain {
            return Ok(());
        }

        let namespace = &self.config.operator_namespace;
        let previous = self
            .store
            .get_operator_config(namespace, &config.name_any())
            .await?;
        let Some(previous) = previous else {
            return Ok(());
        };
        if previous.spec.disable_drain {
            return Ok(());
        }

        let states = self.store.list_node_states(namespace).await?;
        if let Some(busy) = states
            .iter()
            .find(|s| s.sync_status() == SyncStatus::InProgress)
        {
            return Err(Error::rejected(format!(
                "can't set Spec.DisableDrain = true while node[{}] is updating",
                busy.name_any()
            )));
        }
        Ok(())
    }
}
