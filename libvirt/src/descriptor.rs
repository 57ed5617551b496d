use std::path::PathBuf;

use regex::Regex;
use virtseed_system::{CpuCount, DiskSize, MachineName, MemorySize, NetworkName};

pub const DISK_FORMAT: &str = "qcow2";
pub const CLOUD_INIT_TARGET: &str = "vdz";
const CDROM_DEVICE: &str = "cdrom";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneDisk {
    pub backing: PathBuf,
    pub target: PathBuf,
    pub size: Option<DiskSize>,
}

impl CloneDisk {
    /// Arguments to `qemu-img`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_owned(),
            "-b".to_owned(),
            self.backing.display().to_string(),
            "-f".to_owned(),
            DISK_FORMAT.to_owned(),
            "-F".to_owned(),
            DISK_FORMAT.to_owned(),
            self.target.display().to_string(),
        ];
        if let Some(size) = &self.size {
            args.push(size.to_string());
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDisk {
    pub path: PathBuf,
    pub size: DiskSize,
}

/// Everything `virt-install --print-xml` needs to render a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRequest {
    pub name: MachineName,
    pub title: String,
    pub variant: String,
    pub network: NetworkName,
    pub cpu: CpuCount,
    pub mem: MemorySize,
    pub disk: PathBuf,
    pub volumes: Vec<VolumeDisk>,
}

impl DescriptorRequest {
    /// Arguments to `virt-install`, after `--connect <uri>`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--import".to_owned(),
            format!("--os-variant={}", self.variant),
            "--autostart".to_owned(),
            "--metadata".to_owned(),
            format!("title={}", self.title),
            "--noautoconsole".to_owned(),
            "--network".to_owned(),
            format!("network={},model=virtio", self.network),
            "--vcpus".to_owned(),
            self.cpu.to_string(),
            "--ram".to_owned(),
            self.mem.to_string(),
            "--print-xml".to_owned(),
            "--name".to_owned(),
            self.name.to_string(),
            "--disk".to_owned(),
            format!("{},format={DISK_FORMAT},bus=virtio", self.disk.display()),
            "--check".to_owned(),
            "disk_size=off".to_owned(),
        ];
        for volume in &self.volumes {
            args.push("--disk".to_owned());
            args.push(format!(
                "{},format={DISK_FORMAT},bus=virtio,size={}",
                volume.path.display(),
                volume.size
            ));
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachDisk {
    pub name: MachineName,
    pub source: PathBuf,
    pub target: String,
}

impl AttachDisk {
    pub fn cloud_init(name: MachineName, source: PathBuf) -> Self {
        Self {
            name,
            source,
            target: CLOUD_INIT_TARGET.to_owned(),
        }
    }

    /// Arguments to `virsh`, after `--connect <uri>`.
    ///
    /// `--persistent` applies to the config and, when running, the live domain.
    pub fn args(&self) -> Vec<String> {
        vec![
            "attach-disk".to_owned(),
            "--persistent".to_owned(),
            self.name.to_string(),
            self.source.display().to_string(),
            self.target.clone(),
            "--type".to_owned(),
            CDROM_DEVICE.to_owned(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMetadata {
    pub name: MachineName,
    pub uri: String,
    pub key: String,
    pub xml: String,
}

impl SetMetadata {
    pub fn args(&self) -> Vec<String> {
        vec![
            "metadata".to_owned(),
            self.name.to_string(),
            self.uri.clone(),
            "--key".to_owned(),
            self.key.clone(),
            "--set".to_owned(),
            self.xml.clone(),
            "--config".to_owned(),
            "--live".to_owned(),
        ]
    }
}

/// First interface hardware address in a domain descriptor.
pub fn mac_address(descriptor: &str) -> Option<String> {
    let pattern = Regex::new(r#"<mac\s+address\s*=\s*['"]([0-9A-Fa-f:]+)['"]"#).ok()?;
    pattern
        .captures(descriptor)
        .map(|captures| captures[1].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DescriptorRequest {
        DescriptorRequest {
            name: MachineName::new(&NetworkName::default(), &"web".parse().unwrap()),
            title: "web.lab.example".to_owned(),
            variant: "debian12".to_owned(),
            network: NetworkName::default(),
            cpu: CpuCount::new(2),
            mem: MemorySize::from_mib(1024),
            disk: PathBuf::from("/vms/default_web.qcow2"),
            volumes: vec![
                VolumeDisk {
                    path: PathBuf::from("/vms/default_web_disk1.qcow2"),
                    size: DiskSize::new("10"),
                },
                VolumeDisk {
                    path: PathBuf::from("/data/vol_data.qcow2"),
                    size: DiskSize::new("40"),
                },
            ],
        }
    }

    #[test]
    fn descriptor_args() {
        assert_eq!(
            request().args().join(" "),
            "--import --os-variant=debian12 --autostart --metadata title=web.lab.example \
             --noautoconsole --network network=default,model=virtio --vcpus 2 --ram 1024 \
             --print-xml --name default_web --disk /vms/default_web.qcow2,format=qcow2,bus=virtio \
             --check disk_size=off \
             --disk /vms/default_web_disk1.qcow2,format=qcow2,bus=virtio,size=10 \
             --disk /data/vol_data.qcow2,format=qcow2,bus=virtio,size=40"
        );
    }

    #[test]
    fn clone_args_with_and_without_size() {
        let mut clone = CloneDisk {
            backing: PathBuf::from("/images/debian.qcow2"),
            target: PathBuf::from("/vms/default_web.qcow2"),
            size: None,
        };
        assert_eq!(
            clone.args().join(" "),
            "create -b /images/debian.qcow2 -f qcow2 -F qcow2 /vms/default_web.qcow2"
        );
        clone.size = Some(DiskSize::new("20G"));
        assert_eq!(clone.args().last().map(String::as_str), Some("20G"));
    }

    #[test]
    fn attach_args() {
        let attach = AttachDisk::cloud_init(request().name, PathBuf::from("/vms/default_web.iso"));
        assert_eq!(
            attach.args().join(" "),
            "attach-disk --persistent default_web /vms/default_web.iso vdz --type cdrom"
        );
    }

    #[test]
    fn finds_first_mac_address() {
        let descriptor = r#"<domain type="kvm">
  <devices>
    <interface type="network">
      <source network="default"/>
      <mac address="52:54:00:12:34:56"/>
    </interface>
    <interface type="network">
      <mac address='52:54:00:ff:ff:ff'/>
    </interface>
  </devices>
</domain>"#;
        assert_eq!(mac_address(descriptor).as_deref(), Some("52:54:00:12:34:56"));
    }

    #[test]
    fn no_mac_address() {
        assert_eq!(mac_address("<domain><devices/></domain>"), None);
    }
}
