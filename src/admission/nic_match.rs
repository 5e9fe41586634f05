//! Matching observed interfaces against a policy's NIC selector

use crate::crd::{InterfaceExt, SriovNetworkNicSelector};
use crate::domain::nics::{is_virtual_platform, SupportedNics};
use k8s_openapi::api::core::v1::Node;

/// Check whether `iface` on `node` is selected.
///
/// Conditions are evaluated in order and the first one that fails is
/// returned as the reason. A physical interface must be a supported model;
/// on virtual platforms a VF passed through to the node is accepted when
/// its network filter matches and its VF model is supported.
pub fn match_interface(
    selector: &SriovNetworkNicSelector,
    iface: &InterfaceExt,
    node: &Node,
    nics: &SupportedNics,
) -> std::result::Result<(), String> {
    if !selector.vendor.is_empty() && !selector.vendor.eq_ignore_ascii_case(&iface.vendor) {
        return Err(format!(
            "vendor {} does not match nicSelector vendor {}",
            iface.vendor, selector.vendor
        ));
    }

    if !selector.device_id.is_empty() && !selector.device_id.eq_ignore_ascii_case(&iface.device_id) {
        return Err(format!(
            "device ID {} does not match nicSelector deviceID {}",
            iface.device_id, selector.device_id
        ));
    }

    if !selector.root_devices.is_empty()
        && !selector.root_devices.iter().any(|d| d == &iface.pci_address)
    {
        return Err(format!(
            "PCI address {} is not listed in nicSelector rootDevices",
            iface.pci_address
        ));
    }

    if !selector.pf_names.is_empty() && !selector.pf_interface_names().any(|n| n == iface.name) {
        return Err(format!(
            "interface name {} is not listed in nicSelector pfNames",
            iface.name
        ));
    }

    if nics.is_supported_model(&iface.vendor, &iface.device_id) {
        return Ok(());
    }

    let provider_id = node
        .spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .unwrap_or_default();
    if !is_virtual_platform(provider_id) {
        return Err(format!(
            "NIC model {} {} is not supported",
            iface.vendor, iface.device_id
        ));
    }

    if selector.net_filter.is_empty() {
        return Err(format!(
            "NIC model {} {} is not supported and nicSelector has no netFilter",
            iface.vendor, iface.device_id
        ));
    }

    if selector.net_filter != iface.net_filter {
        return Err(format!(
            "network filter {:?} does not match nicSelector netFilter {:?}",
            iface.net_filter, selector.net_filter
        ));
    }

    if !nics.is_vf_supported_model(&iface.vendor, &iface.device_id) {
        return Err(format!(
            "VF model {} {} is not supported",
            iface.vendor, iface.device_id
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::fixtures::{intel_pf, worker};
    use k8s_openapi::api::core::v1::NodeSpec;

    fn selector(vendor: &str) -> SriovNetworkNicSelector {
        SriovNetworkNicSelector {
            vendor: vendor.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_vendor_mismatch_reported_first() {
        let nics = SupportedNics::default();
        let iface = intel_pf("ens785f0", "0000:86:00.0");
        let mut sel = selector("15b3");
        sel.root_devices = vec!["0000:00:00.0".into()];

        let reason = match_interface(&sel, &iface, &worker("w"), &nics).unwrap_err();
        assert!(reason.starts_with("vendor"));
    }

    #[test]
    fn test_pf_names_match_without_range() {
        let nics = SupportedNics::default();
        let iface = intel_pf("ens785f0", "0000:86:00.0");
        let mut sel = selector("8086");
        sel.pf_names = vec!["ens785f0#0-3".into()];

        assert!(match_interface(&sel, &iface, &worker("w"), &nics).is_ok());

        sel.pf_names = vec!["ens785f1".into()];
        let reason = match_interface(&sel, &iface, &worker("w"), &nics).unwrap_err();
        assert!(reason.contains("pfNames"));
    }

    #[test]
    fn test_root_devices() {
        let nics = SupportedNics::default();
        let iface = intel_pf("ens785f0", "0000:86:00.0");
        let mut sel = selector("");
        sel.root_devices = vec!["0000:86:00.0".into()];
        assert!(match_interface(&sel, &iface, &worker("w"), &nics).is_ok());
    }

    #[test]
    fn test_unsupported_model_on_bare_metal() {
        let nics = SupportedNics::default();
        let mut iface = intel_pf("eno1", "0000:01:00.0");
        iface.device_id = "dead".into();

        let reason = match_interface(&selector("8086"), &iface, &worker("w"), &nics).unwrap_err();
        assert!(reason.contains("not supported"));
    }

    #[test]
    fn test_virtual_platform_matches_by_net_filter() {
        let nics = SupportedNics::default();
        let mut node = worker("vm");
        node.spec = Some(NodeSpec {
            provider_id: Some("openstack:///4f5c".into()),
            ..Default::default()
        });

        // a VF seen by the guest: its device ID is the VF model
        let mut iface = intel_pf("ens4", "0000:00:04.0");
        iface.device_id = "154c".into();
        iface.net_filter = "openstack/NetworkID:ada9ec67".into();

        let mut sel = selector("8086");
        sel.net_filter = "openstack/NetworkID:ada9ec67".into();
        assert!(match_interface(&sel, &iface, &node, &nics).is_ok());

        sel.net_filter = "openstack/NetworkID:other".into();
        let reason = match_interface(&sel, &iface, &node, &nics).unwrap_err();
        assert!(reason.contains("network filter"));
    }

    #[test]
    fn test_virtual_platform_requires_net_filter() {
        let nics = SupportedNics::default();
        let mut node = worker("vm");
        node.spec = Some(NodeSpec {
            provider_id: Some("openstack:///abc".into()),
            ..Default::default()
        });

        let mut iface = intel_pf("ens4", "0000:00:04.0");
        iface.device_id = "154c".into();
        iface.net_filter = String::new();

        let reason = match_interface(&selector("8086"), &iface, &node, &nics).unwrap_err();
        assert!(reason.contains("no netFilter"));
    }
}
