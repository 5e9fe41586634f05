//! SriovNetworkNodePolicy CRD
//!
//! A policy selects physical functions on a set of nodes and describes how
//! many virtual functions to create on them and how to expose them.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Node;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the deprecated policy that is admitted without validation
pub const DEFAULT_POLICY_NAME: &str = "default";

/// Device types
pub const DEVICE_TYPE_NETDEVICE: &str = "netdevice";
pub const DEVICE_TYPE_VFIO_PCI: &str = "vfio-pci";

/// Link types
pub const LINK_TYPE_ETH: &str = "eth";
pub const LINK_TYPE_IB: &str = "ib";

/// E-switch modes
pub const ESWITCH_MODE_LEGACY: &str = "legacy";
pub const ESWITCH_MODE_SWITCHDEV: &str = "switchdev";

/// vDPA types
pub const VDPA_TYPE_VIRTIO: &str = "virtio";
pub const VDPA_TYPE_VHOST: &str = "vhost";

// =============================================================================
// SriovNetworkNodePolicy CRD
// =============================================================================

/// SriovNetworkNodePolicy describes the SR-IOV configuration wanted on the
/// physical functions selected by `nicSelector` on nodes matching `nodeSelector`.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkNodePolicy",
    plural = "sriovnetworknodepolicies",
    printcolumn = r#"{"name": "Resource", "type": "string", "jsonPath": ".spec.resourceName"}"#,
    printcolumn = r#"{"name": "NumVfs", "type": "integer", "jsonPath": ".spec.numVfs"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodePolicySpec {
    /// Name of the device plugin resource exposing the VFs
    pub resource_name: String,

    /// Node labels the policy applies to
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Priority of the policy, lower is higher priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// MTU of the VFs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Number of VFs per selected PF
    pub num_vfs: u32,

    /// Physical function selector
    pub nic_selector: SriovNetworkNicSelector,

    /// Driver type of the VFs: netdevice or vfio-pci
    #[serde(default)]
    pub device_type: String,

    /// Expose RDMA devices
    #[serde(default)]
    pub is_rdma: bool,

    /// Link type of the PF: eth or ib
    #[serde(default)]
    pub link_type: String,

    /// NIC device mode: legacy or switchdev
    #[serde(default, rename = "eSwitchMode")]
    pub eswitch_mode: String,

    /// vDPA device type: virtio or vhost
    #[serde(default)]
    pub vdpa_type: String,

    /// Do not report NUMA topology for the resource
    #[serde(default)]
    pub exclude_topology: bool,

    /// VFs are created by something other than the operator
    #[serde(default)]
    pub externally_managed: bool,

    /// Software bridge the VFs attach to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeConfig>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Selects physical functions on a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNicSelector {
    /// PCI vendor ID, e.g. "8086"
    #[serde(default)]
    pub vendor: String,

    /// PCI device ID of the PF, e.g. "158b"
    #[serde(default, rename = "deviceID")]
    pub device_id: String,

    /// PCI addresses of the PFs
    #[serde(default)]
    pub root_devices: Vec<String>,

    /// Interface names, optionally with a VF range suffix `#start-end`
    #[serde(default)]
    pub pf_names: Vec<String>,

    /// Infrastructure network the PF is attached to (virtual platforms)
    #[serde(default)]
    pub net_filter: String,
}

impl SriovNetworkNicSelector {
    /// True when no selection dimension is set
    pub fn is_empty(&self) -> bool {
        self.vendor.is_empty()
            && self.device_id.is_empty()
            && self.pf_names.is_empty()
            && self.root_devices.is_empty()
            && self.net_filter.is_empty()
    }

    /// Interface names with any range suffix stripped
    pub fn pf_interface_names(&self) -> impl Iterator<Item = &str> {
        self.pf_names
            .iter()
            .map(|pf| pf.split('#').next().unwrap_or(pf.as_str()))
    }
}

/// Software bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Open vSwitch bridge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovs: Option<OvsConfig>,
}

impl BridgeConfig {
    pub fn is_empty(&self) -> bool {
        self.ovs.is_none()
    }
}

/// Open vSwitch bridge and uplink settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsConfig {
    #[serde(default)]
    pub bridge: OvsBridgeConfig,
    #[serde(default)]
    pub uplink: OvsUplinkConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsBridgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapath_type: Option<String>,
    #[serde(default, rename = "externalIDs")]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub other_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsUplinkConfig {
    #[serde(default)]
    pub interface: OvsInterfaceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvsInterfaceConfig {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, rename = "externalIDs")]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub other_config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu_request: Option<u32>,
}

// =============================================================================
// PF names and VF ranges
// =============================================================================

/// Inclusive VF index range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfRange {
    pub start: u32,
    pub end: u32,
}

impl VfRange {
    /// Ranges overlap unless one ends strictly before the other starts
    pub fn overlaps(&self, other: &VfRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }
}

/// A parsed `pfNames` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfName {
    pub name: String,
    pub range: Option<VfRange>,
}

impl PfName {
    /// Parse `name` or `name#start-end`
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.contains('#') {
            return Ok(Self {
                name: raw.to_string(),
                range: None,
            });
        }

        let fields: Vec<&str> = raw.split('#').collect();
        if fields.len() != 2 {
            return Err(Error::rejected(format!(
                "failed to parse {} PF name in nicSelector, probably incorrect separator character usage",
                raw
            )));
        }

        let bounds: Vec<&str> = fields[1].split('-').collect();
        if bounds.len() != 2 {
            return Err(Error::rejected(format!(
                "failed to parse {} PF name nicSelector, probably incorrect range character usage",
                raw
            )));
        }

        let start: u32 = bounds[0].parse().map_err(|_| {
            Error::rejected(format!(
                "failed to parse {} PF name nicSelector, start range is incorrect",
                raw
            ))
        })?;
        let end: u32 = bounds[1].parse().map_err(|_| {
            Error::rejected(format!(
                "failed to parse {} PF name nicSelector, end range is incorrect",
                raw
            ))
        })?;

        if end < start {
            return Err(Error::rejected(format!(
                "failed to parse {} PF name nicSelector, end range shall not be smaller than start range",
                raw
            )));
        }

        Ok(Self {
            name: fields[0].to_string(),
            range: Some(VfRange { start, end }),
        })
    }

    /// Whether two entries naming the same PF claim overlapping VFs.
    ///
    /// Two whole-PF entries overlap; a whole-PF entry does not overlap a
    /// ranged one.
    pub fn overlaps(&self, other: &PfName) -> bool {
        if self.name != other.name {
            return false;
        }
        match (self.range, other.range) {
            (Some(a), Some(b)) => a.overlaps(&b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PfName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.range {
            Some(r) => write!(f, "{}#{}-{}", self.name, r.start, r.end),
            None => write!(f, "{}", self.name),
        }
    }
}

// =============================================================================
// Policy helpers
// =============================================================================

impl SriovNetworkNodePolicy {
    /// True when every nodeSelector entry matches the node's labels
    pub fn selects(&self, node: &Node) -> bool {
        let labels = node.labels();
        self.spec
            .node_selector
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }

    /// True for the deprecated default policy in the operator namespace
    pub fn is_default_in(&self, namespace: &str) -> bool {
        self.name_any() == DEFAULT_POLICY_NAME && self.namespace().as_deref() == Some(namespace)
    }

    /// Identity of the policy
    pub fn identity(&self) -> (String, Option<String>) {
        (self.name_any(), self.namespace())
    }

    /// True when a vDPA type is requested
    pub fn uses_vdpa(&self) -> bool {
        self.spec.vdpa_type == VDPA_TYPE_VIRTIO || self.spec.vdpa_type == VDPA_TYPE_VHOST
    }

    /// True when a software bridge is requested
    pub fn uses_bridge(&self) -> bool {
        self.spec.bridge.as_ref().map(|b| !b.is_empty()).unwrap_or(false)
    }
}
