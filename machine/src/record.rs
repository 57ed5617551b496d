use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};
use virtseed_cloud_init::{CloudInitPayload, MetaData, NetworkConfig, UserData};
use virtseed_system::{CpuCount, DiskSize, Hostname, MachineName, MemorySize, NetworkName};

use crate::{MachineSettings, VolumeSettings};

const NAMED_VOLUME_PREFIX: &str = "vol_";

/// Everything needed to create or delete one machine.
///
/// Built fresh for every operation; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisioningRecord {
    pub name: MachineName,
    pub hostname: Hostname,
    pub network: NetworkName,
    pub dns_domain: String,
    pub fqdn: String,
    pub variant: String,
    pub cpu: CpuCount,
    pub mem: MemorySize,
    pub directory: PathBuf,
    pub disk: OverlayDisk,
    pub volumes: Vec<Volume>,
    pub ssh_keys: Vec<String>,
    pub nameservers: Option<Vec<String>>,
    pub ansible_user: String,
    #[serde(skip)]
    pub userdata: UserData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayDisk {
    pub backing: PathBuf,
    pub size: Option<DiskSize>,
    pub target: PathBuf,
}

/// An extra disk, with its file stem already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub file_stem: String,
    pub size: DiskSize,
    pub directory: PathBuf,
    /// Unnamed volumes are owned by the machine and removed on delete.
    pub unnamed: bool,
}

impl Volume {
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.qcow2", self.file_stem))
    }
}

impl ProvisioningRecord {
    pub fn new(settings: MachineSettings) -> Self {
        let name = settings.name();
        let MachineSettings {
            hostname,
            variant,
            directory,
            backing_disk,
            network,
            dns_domain,
            cpu,
            mem,
            size,
            volumes,
            ssh_keys,
            userdata,
            nameservers,
            ansible_user,
        } = settings;

        let disk = OverlayDisk {
            backing: backing_disk,
            size,
            target: directory.join(format!("{name}.qcow2")),
        };
        let volumes = resolve_volumes(&name, &directory, volumes);
        let fqdn = format!("{hostname}.{dns_domain}");

        Self {
            name,
            hostname,
            network,
            dns_domain,
            fqdn,
            variant,
            cpu,
            mem,
            directory,
            disk,
            volumes,
            ssh_keys,
            nameservers,
            ansible_user,
            userdata,
        }
    }

    /// Adopt the DNS domain reported by the machine's network.
    pub fn resolve_domain(&mut self, dns_domain: impl Into<String>) {
        self.dns_domain = dns_domain.into();
        self.fqdn = format!("{}.{}", self.hostname, self.dns_domain);
    }

    pub fn iso_path(&self) -> PathBuf {
        self.directory.join(format!("{}.iso", self.name))
    }

    pub fn unnamed_volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter(|volume| volume.unnamed)
    }

    pub fn meta_data(&self) -> MetaData {
        MetaData {
            instance_id: self.name.to_string(),
            local_hostname: self.hostname.to_string(),
        }
    }

    /// Configured userdata plus the resolver, identity and ssh keys.
    pub fn user_data(&self) -> UserData {
        let mut resolv_conf = serde_json::Map::new();
        if let Some(nameservers) = &self.nameservers {
            resolv_conf.insert("nameservers".to_owned(), json!(nameservers));
        }
        if !self.dns_domain.is_empty() {
            resolv_conf.insert("domain".to_owned(), json!(self.dns_domain));
            resolv_conf.insert("searchdomains".to_owned(), json!([self.dns_domain]));
        }

        let mut user_data = self.userdata.clone();
        user_data.insert("manage_resolv_conf".to_owned(), Value::Bool(true));
        user_data.insert("resolv_conf".to_owned(), Value::Object(resolv_conf));
        user_data.insert("hostname".to_owned(), json!(self.hostname));
        user_data.insert("fqdn".to_owned(), json!(self.fqdn));
        user_data.insert("ssh_authorized_keys".to_owned(), json!(self.ssh_keys));
        user_data
    }

    pub fn cloud_init_payload(&self) -> CloudInitPayload {
        CloudInitPayload {
            meta_data: self.meta_data(),
            user_data: self.user_data(),
            network_config: NetworkConfig::dhcp(),
            iso_path: self.iso_path(),
        }
    }
}

fn resolve_volumes(name: &MachineName, directory: &Path, volumes: Vec<VolumeSettings>) -> Vec<Volume> {
    let mut unnamed_index = 0;
    volumes
        .into_iter()
        .map(|volume| {
            let (file_stem, unnamed) = match volume.name {
                Some(volume_name) => (format!("{NAMED_VOLUME_PREFIX}{volume_name}"), false),
                None => {
                    unnamed_index += 1;
                    (format!("{name}_disk{unnamed_index}"), true)
                }
            };
            Volume {
                file_stem,
                size: volume.size,
                directory: volume.directory.unwrap_or_else(|| directory.to_path_buf()),
                unnamed,
            }
        })
        .collect()
}
