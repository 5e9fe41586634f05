//! SriovNetworkNodePolicy validation
//!
//! Static checks look at the policy alone. Dynamic checks look at the nodes
//! it selects, the interfaces those nodes report, and the other policies
//! that select the same nodes.

use super::nic_match::match_interface;
use super::{AdmissionValidator, Verdict};
use crate::crd::{
    InterfaceExt, PfName, SriovNetworkNodePolicy, SriovNetworkNodeState, DEFAULT_POLICY_NAME,
    DEVICE_TYPE_NETDEVICE, DEVICE_TYPE_VFIO_PCI, ESWITCH_MODE_SWITCHDEV, LINK_TYPE_ETH,
};
use crate::domain::nics::{MELLANOX_MAX_VFS, VENDOR_INTEL, VENDOR_MELLANOX};
use crate::domain::selector;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Node;
use kube::core::admission::Operation;
use kube::ResourceExt;
use tracing::{debug, info};

/// What a policy selected during one dynamic check
#[derive(Debug, Default)]
pub struct SelectionReport {
    /// At least one node matched the nodeSelector
    pub node_selected: bool,
    /// At least one interface on a selected node matched the nicSelector
    pub interface_selected: bool,
    /// Per node, why each of its interfaces was not selected
    pub reasons: Vec<(String, Vec<String>)>,
}

fn is_valid_resource_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl AdmissionValidator {
    /// Validate a policy create, update or delete
    pub async fn validate_policy(
        &self,
        policy: &SriovNetworkNodePolicy,
        operation: Operation,
    ) -> Verdict {
        let namespace = &self.config.operator_namespace;
        let name = policy.name_any();
        let mut warnings = Vec::new();

        if policy.is_default_in(namespace) {
            debug!("Skipping validation of the default policy");
            return Verdict::allow(warnings);
        }

        if policy.namespace().as_deref() != Some(namespace.as_str()) {
            warnings.push(format!(
                "{} is created or updated but not used. Only policy in {} namespace is respected.",
                name, namespace
            ));
        }

        if matches!(operation, Operation::Delete) {
            return Verdict::allow(warnings);
        }

        if let Err(e) = self.static_policy_check(policy) {
            info!("Rejecting policy {}: {}", name, e);
            return Verdict::deny(warnings, e);
        }

        match self.dynamic_policy_check(policy).await {
            Ok(_) => Verdict::allow(warnings),
            Err(e) => {
                info!("Rejecting policy {}: {}", name, e);
                Verdict::deny(warnings, e)
            }
        }
    }

    // =========================================================================
    // Static checks
    // =========================================================================

    /// Checks that need nothing but the policy itself
    pub fn static_policy_check(&self, policy: &SriovNetworkNodePolicy) -> Result<()> {
        let spec = &policy.spec;
        let name = policy.name_any();
        let selector = &spec.nic_selector;
        let nics = &self.config.supported_nics;

        if !is_valid_resource_name(&spec.resource_name) {
            return Err(Error::rejected(format!(
                "resource name \"{}\" contains invalid characters, the accepted syntax of the regular expressions is: \"^[a-zA-Z0-9_]+$\"",
                spec.resource_name
            )));
        }

        if selector.is_empty() {
            return Err(Error::rejected(format!(
                "at least one of these parameters (vendor, deviceID, pfNames, rootDevices or netFilter) has to be defined in nicSelector in CR {}",
                name
            )));
        }

        if self.config.dev_mode {
            debug!("Dev mode, skipping supported NIC checks for policy {}", name);
        } else {
            if !selector.vendor.is_empty() && !nics.is_supported_vendor(&selector.vendor) {
                return Err(Error::rejected(format!(
                    "vendor {} is not supported",
                    selector.vendor
                )));
            }
            if !selector.vendor.is_empty()
                && !selector.device_id.is_empty()
                && !nics.is_supported_model(&selector.vendor, &selector.device_id)
            {
                return Err(Error::rejected(format!(
                    "vendor/device {}/{} is not supported",
                    selector.vendor, selector.device_id
                )));
            }
            if selector.vendor.is_empty()
                && !selector.device_id.is_empty()
                && !nics.is_supported_device(&selector.device_id)
            {
                return Err(Error::rejected(format!(
                    "device {} is not supported",
                    selector.device_id
                )));
            }
        }

        for raw in &selector.pf_names {
            let pf = PfName::parse(raw)?;
            if let Some(range) = pf.range {
                if range.end >= spec.num_vfs {
                    return Err(Error::rejected(format!(
                        "failed to parse {} PF name nicSelector, end range exceeds the maximum VF index",
                        raw
                    )));
                }
            }
        }

        let device_type = if spec.device_type.is_empty() {
            DEVICE_TYPE_NETDEVICE
        } else {
            spec.device_type.as_str()
        };

        if device_type == DEVICE_TYPE_VFIO_PCI && spec.is_rdma {
            return Err(Error::rejected(
                "'deviceType: vfio-pci' conflicts with 'isRdma: true'; Set 'deviceType' to (string)'netdevice' Or Set 'isRdma' to (bool)'false'",
            ));
        }

        if !spec.link_type.is_empty()
            && !spec.link_type.eq_ignore_ascii_case(LINK_TYPE_ETH)
            && spec.eswitch_mode == ESWITCH_MODE_SWITCHDEV
        {
            return Err(Error::rejected(
                "'eSwitchMode: switchdev' can be used only with ethernet links",
            ));
        }

        if policy.uses_vdpa() {
            if device_type != DEVICE_TYPE_NETDEVICE {
                return Err(Error::rejected(format!(
                    "'deviceType: {}' conflicts with '{}'; Set 'deviceType' to (string)'netdevice' Or Remove 'vdpaType'",
                    device_type, spec.vdpa_type
                )));
            }
            if spec.eswitch_mode != ESWITCH_MODE_SWITCHDEV {
                return Err(Error::rejected(
                    "vdpa requires the device to be configured in switchdev mode",
                ));
            }
        }

        if policy.uses_bridge() {
            if spec.eswitch_mode != ESWITCH_MODE_SWITCHDEV {
                return Err(Error::rejected(
                    "software bridge management requires the device to be configured in switchdev mode",
                ));
            }
            if spec.externally_managed {
                return Err(Error::rejected(
                    "software bridge management can't be used when the device externally managed",
                ));
            }
        }

        Ok(())
    }

    // =========================================================================
    // Dynamic checks
    // =========================================================================

    /// Checks against the selected nodes, their interfaces and the policies
    /// sharing them
    pub async fn dynamic_policy_check(
        &self,
        policy: &SriovNetworkNodePolicy,
    ) -> Result<SelectionReport> {
        let namespace = &self.config.operator_namespace;
        let name = policy.name_any();

        let nodes = self
            .store
            .list_nodes(&selector::from_labels(&policy.spec.node_selector))
            .await?;
        let states = self.store.list_node_states(namespace).await?;
        let policies = self.store.list_node_policies(namespace).await?;

        let identity = policy.identity();
        let mut report = SelectionReport::default();

        for node in nodes.iter().filter(|n| policy.selects(n)) {
            report.node_selected = true;
            let node_name = node.name_any();

            if let Some(state) = states.iter().find(|s| s.name_any() == node_name) {
                self.check_node_state(policy, state, node, &mut report)?;
            }

            for other in policies
                .iter()
                .filter(|o| o.identity() != identity && o.selects(node))
            {
                check_policy_conflict(policy, other)?;
            }
        }

        if !report.node_selected {
            return Err(Error::NoMatchedNode { policy: name });
        }

        if !report.interface_selected {
            for (node, reasons) in &report.reasons {
                info!("Policy {} selects no interface on node {}: {:?}", name, node, reasons);
            }
            return Err(Error::NoSupportedNic {
                policy: name,
                reasons: report.reasons,
            });
        }

        Ok(report)
    }

    fn check_node_state(
        &self,
        policy: &SriovNetworkNodePolicy,
        state: &SriovNetworkNodeState,
        node: &Node,
        report: &mut SelectionReport,
    ) -> Result<()> {
        let mut selected_here = false;
        let mut reasons = Vec::new();

        for iface in state.observed_interfaces() {
            match match_interface(
                &policy.spec.nic_selector,
                iface,
                node,
                &self.config.supported_nics,
            ) {
                Ok(()) => {
                    selected_here = true;
                    report.interface_selected = true;
                    check_selected_interface(policy, iface)?;
                }
                Err(reason) => {
                    let reason = format!(
                        "Interface: {} was not selected, since NIC model could not be validated due to the following error: {}",
                        iface.name, reason
                    );
                    debug!("{}", reason);
                    reasons.push(reason);
                }
            }
        }

        if !selected_here {
            report.reasons.push((node.name_any(), reasons));
        }
        Ok(())
    }
}

/// Hard limits on an interface the policy selected
fn check_selected_interface(policy: &SriovNetworkNodePolicy, iface: &InterfaceExt) -> Result<()> {
    let spec = &policy.spec;
    let name = policy.name_any();

    if spec.num_vfs == 0 && name != DEFAULT_POLICY_NAME {
        return Err(Error::rejected(format!(
            "numVfs({}) in CR {} is not allowed",
            spec.num_vfs, name
        )));
    }

    if iface.vendor.eq_ignore_ascii_case(VENDOR_INTEL) && spec.num_vfs > iface.total_vfs {
        return Err(Error::rejected(format!(
            "numVfs({}) in CR {} exceed the maximum allowed value({}) interface({})",
            spec.num_vfs, name, iface.total_vfs, iface.name
        )));
    }

    if iface.vendor.eq_ignore_ascii_case(VENDOR_MELLANOX) && spec.num_vfs > MELLANOX_MAX_VFS {
        return Err(Error::rejected(format!(
            "numVfs({}) in CR {} exceed the maximum allowed value({}) interface({})",
            spec.num_vfs, name, MELLANOX_MAX_VFS, iface.name
        )));
    }

    for pf in spec.nic_selector.pf_names.iter().filter_map(|raw| PfName::parse(raw).ok()) {
        if pf.name != iface.name {
            continue;
        }
        if let Some(range) = pf.range {
            if range.end >= iface.total_vfs {
                return Err(Error::rejected(format!(
                    "VF range end {} in CR {} exceeds the VFs supported by interface({}) totalVfs({})",
                    range.end, name, iface.name, iface.total_vfs
                )));
            }
        }
    }

    if spec.externally_managed {
        if spec.num_vfs > iface.num_vfs {
            return Err(Error::rejected(format!(
                "numVfs({}) in CR {} is higher than the virtual functions allocated for the PF externally value({})",
                spec.num_vfs, name, iface.num_vfs
            )));
        }

        if let Some(mtu) = spec.mtu {
            if mtu > iface.mtu {
                return Err(Error::rejected(format!(
                    "MTU({}) in CR {} is higher than the MTU for the PF externally value({})",
                    mtu, name, iface.mtu
                )));
            }
        }

        if !spec.link_type.is_empty() && !spec.link_type.eq_ignore_ascii_case(&iface.link_type) {
            return Err(Error::rejected(format!(
                "LinkType({}) in CR {} is not equal to the LinkType for the PF externally value({})",
                spec.link_type, name, iface.link_type
            )));
        }
    }

    if policy.uses_vdpa() && !iface.vendor.eq_ignore_ascii_case(VENDOR_MELLANOX) {
        return Err(Error::rejected(format!(
            "vendor({}) in CR {} not supported for vdpa interface({})",
            iface.vendor, name, iface.name
        )));
    }

    Ok(())
}

// =============================================================================
// Cross-policy conflicts
// =============================================================================

/// Reject `current` if it claims resources `existing` already claims on a
/// node both select
pub fn check_policy_conflict(
    current: &SriovNetworkNodePolicy,
    existing: &SriovNetworkNodePolicy,
) -> Result<()> {
    let existing_name = existing.name_any();
    let conflict = |reason: String| Error::ConfigurationConflict {
        existing: existing_name.clone(),
        reason,
    };

    let existing_pfs: Vec<PfName> = existing
        .spec
        .nic_selector
        .pf_names
        .iter()
        .filter_map(|raw| PfName::parse(raw).ok())
        .collect();

    for raw in &current.spec.nic_selector.pf_names {
        let pf = PfName::parse(raw)
            .map_err(|e| Error::rejected(format!("invalid PF name: {}", e)))?;

        for other in existing_pfs.iter().filter(|o| o.name == pf.name) {
            if current.spec.externally_managed != existing.spec.externally_managed {
                return Err(conflict(format!(
                    "externallyManage is inconsistent with existing policy {}",
                    existing_name
                )));
            }
            if pf.overlaps(other) {
                return Err(conflict(format!(
                    "VF index range in {} is overlapped with existing policy {}",
                    pf.name, existing_name
                )));
            }
        }
    }

    for device in &current.spec.nic_selector.root_devices {
        if existing.spec.nic_selector.root_devices.contains(device) {
            return Err(conflict(format!(
                "root device {} is overlapped with existing policy {}",
                device, existing_name
            )));
        }
    }

    if current.spec.resource_name == existing.spec.resource_name
        && current.spec.exclude_topology != existing.spec.exclude_topology
    {
        return Err(conflict(format!(
            "excludeTopology[{}] field conflicts with policy [{}].ExcludeTopology[{}] as they target the same resource[{}]",
            current.spec.exclude_topology,
            existing_name,
            existing.spec.exclude_topology,
            current.spec.resource_name
        )));
    }

    Ok(())
}
