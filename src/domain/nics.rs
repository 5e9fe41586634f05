//! Supported NIC models
//!
//! The table of (vendor, PF device ID, VF device ID) triples the operator is
//! qualified for. Entries use the same `"vendor pf vf"` value format as the
//! operator's supported-nic-ids config map, keyed by a descriptive name.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// PCI vendor ID of Intel
pub const VENDOR_INTEL: &str = "8086";
/// PCI vendor ID of Mellanox / NVIDIA
pub const VENDOR_MELLANOX: &str = "15b3";
/// Upper bound on VFs per PF enforced for Mellanox devices
pub const MELLANOX_MAX_VFS: u32 = 128;

/// Provider ID fragments of virtualized platforms where VFs are passed
/// through to the node and matched by network filter
pub const VIRTUAL_PLATFORMS: &[&str] = &["openstack"];

const DEFAULT_MODELS: &[(&str, &str)] = &[
    ("Intel_i40e_XXV710", "8086 158a 154c"),
    ("Intel_i40e_25G_SFP28", "8086 158b 154c"),
    ("Intel_i40e_10G_X710_SFP", "8086 1572 154c"),
    ("Intel_ixgbe_10G_X550", "8086 1563 1565"),
    ("Intel_ixgbe_82576", "8086 10c9 10ca"),
    ("Intel_i40e_X710_X557_AT_10G", "8086 1589 154c"),
    ("Intel_i40e_10G_X710_BACKPLANE", "8086 1581 154c"),
    ("Intel_i40e_10G_X710_BASE_T", "8086 15ff 154c"),
    ("Intel_i40e_XL710_40G_QSFP", "8086 1583 154c"),
    ("Intel_ice_Columbiaville_E810-CQDA2_2CQDA2", "8086 1592 1889"),
    ("Intel_ice_Columbiaville_E810-XXVDA4", "8086 1593 1889"),
    ("Intel_ice_Columbiaville_E810-XXVDA2", "8086 159b 1889"),
    ("Intel_ice_Columbiaville_E810", "8086 1591 1889"),
    ("Nvidia_mlx5_ConnectX-4", "15b3 1013 1014"),
    ("Nvidia_mlx5_ConnectX-4LX", "15b3 1015 1016"),
    ("Nvidia_mlx5_ConnectX-5", "15b3 1017 1018"),
    ("Nvidia_mlx5_ConnectX-5_Ex", "15b3 1019 101a"),
    ("Nvidia_mlx5_ConnectX-6", "15b3 101b 101c"),
    ("Nvidia_mlx5_ConnectX-6_Dx", "15b3 101d 101e"),
    ("Nvidia_mlx5_ConnectX-6_Lx", "15b3 101f 101e"),
    ("Nvidia_mlx5_MT42822_BlueField-2_integrated_ConnectX-6_Dx", "15b3 a2d6 101e"),
    ("Nvidia_mlx5_ConnectX-7", "15b3 1021 101e"),
    ("Broadcom_bnxt_BCM57414_2x25G", "14e4 16d7 16dc"),
    ("Broadcom_bnxt_BCM75508_2x100G", "14e4 1750 1806"),
    ("Qlogic_qede_QL45000_50G", "1077 1654 1664"),
    ("Red_Hat_Virtio_network_device", "1af4 1000 1000"),
];

/// One qualified device model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicModel {
    pub name: String,
    pub vendor: String,
    pub pf_device: String,
    pub vf_device: String,
}

impl NicModel {
    fn parse(name: &str, value: &str) -> Result<Self> {
        let ids: Vec<&str> = value.split_whitespace().collect();
        if ids.len() != 3 {
            return Err(Error::Configuration(format!(
                "supported NIC entry {} must be \"<vendor> <pf device> <vf device>\", got {:?}",
                name, value
            )));
        }
        Ok(Self {
            name: name.to_string(),
            vendor: ids[0].to_lowercase(),
            pf_device: ids[1].to_lowercase(),
            vf_device: ids[2].to_lowercase(),
        })
    }
}

/// Table of supported NIC models
#[derive(Debug, Clone)]
pub struct SupportedNics {
    models: Vec<NicModel>,
}

impl Default for SupportedNics {
    fn default() -> Self {
        let models = DEFAULT_MODELS
            .iter()
            .filter_map(|(name, value)| NicModel::parse(name, value).ok())
            .collect();
        Self { models }
    }
}

impl SupportedNics {
    /// Build a table from `name -> "vendor pf vf"` entries
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Result<Self> {
        let models = entries
            .iter()
            .map(|(name, value)| NicModel::parse(name, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { models })
    }

    /// Load a table from a YAML map file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: BTreeMap<String, String> = serde_yaml::from_str(&raw)?;
        Self::from_entries(&entries)
    }

    pub fn models(&self) -> &[NicModel] {
        &self.models
    }

    pub fn is_supported_vendor(&self, vendor: &str) -> bool {
        self.models.iter().any(|m| m.vendor.eq_ignore_ascii_case(vendor))
    }

    /// PF device ID is qualified for some vendor
    pub fn is_supported_device(&self, device_id: &str) -> bool {
        self.models.iter().any(|m| m.pf_device.eq_ignore_ascii_case(device_id))
    }

    /// Vendor + PF device ID pair is qualified
    pub fn is_supported_model(&self, vendor: &str, device_id: &str) -> bool {
        self.models.iter().any(|m| {
            m.vendor.eq_ignore_ascii_case(vendor) && m.pf_device.eq_ignore_ascii_case(device_id)
        })
    }

    /// Vendor + VF device ID pair is qualified
    pub fn is_vf_supported_model(&self, vendor: &str, device_id: &str) -> bool {
        self.models.iter().any(|m| {
            m.vendor.eq_ignore_ascii_case(vendor) && m.vf_device.eq_ignore_ascii_case(device_id)
        })
    }
}

/// True when a node's provider ID names a virtualized platform
pub fn is_virtual_platform(provider_id: &str) -> bool {
    let provider_id = provider_id.to_lowercase();
    VIRTUAL_PLATFORMS.iter().any(|p| provider_id.contains(p))
}
