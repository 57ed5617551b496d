use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use virtseed_system::{CpuCount, DiskSize, Hostname, MachineName, MemorySize, NetworkName};

pub const DEFAULT_DNS_DOMAIN: &str = ".local";
pub const DEFAULT_VOLUME_SIZE: &str = "40";
pub const DEFAULT_ANSIBLE_USER: &str = "sysmaint";

/// Settings of one machine after `common` and per-machine keys are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSettings {
    pub hostname: Hostname,
    pub variant: String,
    pub directory: PathBuf,
    #[serde(rename = "backingdisk")]
    pub backing_disk: PathBuf,
    #[serde(default)]
    pub network: NetworkName,
    /// DNS suffix. Replaced by the network's domain on create.
    #[serde(rename = "domain", default = "default_dns_domain")]
    pub dns_domain: String,
    #[serde(default)]
    pub cpu: CpuCount,
    #[serde(default)]
    pub mem: MemorySize,
    #[serde(default)]
    pub size: Option<DiskSize>,
    #[serde(default)]
    pub volumes: Vec<VolumeSettings>,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default)]
    pub userdata: Map<String, Value>,
    #[serde(default)]
    pub nameservers: Option<Vec<String>>,
    #[serde(default = "default_ansible_user")]
    pub ansible_user: String,
}

impl MachineSettings {
    pub fn name(&self) -> MachineName {
        MachineName::new(&self.network, &self.hostname)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_volume_size")]
    pub size: DiskSize,
    #[serde(rename = "dir", default)]
    pub directory: Option<PathBuf>,
}

fn default_dns_domain() -> String {
    DEFAULT_DNS_DOMAIN.to_owned()
}

fn default_volume_size() -> DiskSize {
    DiskSize::new(DEFAULT_VOLUME_SIZE)
}

fn default_ansible_user() -> String {
    DEFAULT_ANSIBLE_USER.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let settings: MachineSettings = serde_saphyr::from_str(
            "hostname: web\nvariant: debian12\ndirectory: /vms\nbackingdisk: /images/debian.qcow2\n",
        )
        .unwrap();

        assert_eq!(settings.network, NetworkName::default());
        assert_eq!(settings.dns_domain, ".local");
        assert_eq!(settings.cpu, CpuCount::new(1));
        assert_eq!(settings.mem, MemorySize::from_mib(512));
        assert_eq!(settings.size, None);
        assert!(settings.volumes.is_empty());
        assert_eq!(settings.ansible_user, "sysmaint");
        assert_eq!(settings.name().to_string(), "default_web");
    }

    #[test]
    fn volume_size_defaults_to_forty() {
        let volume: VolumeSettings = serde_saphyr::from_str("name: data\n").unwrap();
        assert_eq!(volume.size.to_string(), "40");
        assert_eq!(volume.directory, None);
    }

    #[test]
    fn missing_backing_disk_is_rejected() {
        let result: Result<MachineSettings, _> =
            serde_saphyr::from_str("hostname: web\nvariant: debian12\ndirectory: /vms\n");
        assert!(result.is_err());
    }
}
