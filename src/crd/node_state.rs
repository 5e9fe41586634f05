//! SriovNetworkNodeState CRD
//!
//! Per-node desired interface configuration (spec) and the hardware the
//! config daemon observed (status). This crate only reads it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// SriovNetworkNodeState is named after the node it describes.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkNodeState",
    plural = "sriovnetworknodestates",
    status = "SriovNetworkNodeStateStatus",
    printcolumn = r#"{"name": "Sync Status", "type": "string", "jsonPath": ".status.syncStatus"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodeStateSpec {
    /// Interfaces the reconciliation loop wants configured
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
}

/// Desired configuration of one PF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSpec {
    pub pci_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub num_vfs: u32,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub link_type: String,
    #[serde(default, rename = "eSwitchMode")]
    pub eswitch_mode: String,
    #[serde(default)]
    pub externally_managed: bool,
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodeStateStatus {
    /// Interfaces observed on the node
    #[serde(default)]
    pub interfaces: Vec<InterfaceExt>,

    /// Progress of the last configuration attempt
    #[serde(default)]
    pub sync_status: SyncStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
}

/// An observed physical function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceExt {
    #[serde(default)]
    pub name: String,
    pub pci_address: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default, rename = "deviceID")]
    pub device_id: String,
    #[serde(default, rename = "totalvfs")]
    pub total_vfs: u32,
    #[serde(default)]
    pub num_vfs: u32,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub link_type: String,
    #[serde(default)]
    pub net_filter: String,
    #[serde(default, rename = "eSwitchMode")]
    pub eswitch_mode: String,
    #[serde(default)]
    pub driver: String,
}

/// Sync progress reported by the config daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SyncStatus {
    #[default]
    #[serde(alias = "")]
    Idle,
    InProgress,
    Succeeded,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::InProgress => write!(f, "InProgress"),
            SyncStatus::Succeeded => write!(f, "Succeeded"),
            SyncStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl SriovNetworkNodeState {
    /// Observed interfaces, empty when no status was reported yet
    pub fn observed_interfaces(&self) -> &[InterfaceExt] {
        self.status
            .as_ref()
            .map(|s| s.interfaces.as_slice())
            .unwrap_or(&[])
    }

    /// Current sync status, Idle when no status was reported yet
    pub fn sync_status(&self) -> SyncStatus {
        self.status
            .as_ref()
            .map(|s| s.sync_status)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decodes_upstream_fields() {
        let status: SriovNetworkNodeStateStatus = serde_json::from_value(serde_json::json!({
            "interfaces": [{
                "name": "ens785f0",
                "pciAddress": "0000:86:00.0",
                "vendor": "8086",
                "deviceID": "158b",
                "totalvfs": 64,
                "numVfs": 0,
                "mtu": 1500,
                "linkType": "ETH"
            }],
            "syncStatus": "InProgress"
        }))
        .unwrap();

        assert_eq!(status.interfaces[0].total_vfs, 64);
        assert_eq!(status.interfaces[0].device_id, "158b");
        assert_eq!(status.sync_status, SyncStatus::InProgress);
    }

    #[test]
    fn test_empty_sync_status_is_idle() {
        let status: SriovNetworkNodeStateStatus =
            serde_json::from_value(serde_json::json!({"syncStatus": ""})).unwrap();
        assert_eq!(status.sync_status, SyncStatus::Idle);
    }

    #[test]
    fn test_missing_status_defaults() {
        let state = SriovNetworkNodeState::new("worker-0", SriovNetworkNodeStateSpec::default());
        assert!(state.observed_interfaces().is_empty());
        assert_eq!(state.sync_status(), SyncStatus::Idle);
    }
}
