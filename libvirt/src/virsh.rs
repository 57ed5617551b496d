use async_trait::async_trait;
use tracing::debug;
use virtseed_cmd::{Command, CommandOutput};
use virtseed_system::{MachineName, NetworkName};

use crate::{
    AttachDisk, CloneDisk, DescriptorRequest, Hypervisor, HypervisorError, InstanceProbe,
    NetworkInfo, NetworkInfoClient, SetMetadata,
};

pub const DEFAULT_CONNECT_URI: &str = "qemu:///system";

/// Host adapter driving `virsh`, `virt-install` and `qemu-img`.
#[derive(Debug, Clone)]
pub struct Virsh {
    connect: String,
}

impl Default for Virsh {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_URI)
    }
}

impl Virsh {
    pub fn new(connect: impl Into<String>) -> Self {
        Self {
            connect: connect.into(),
        }
    }

    pub fn connect_uri(&self) -> &str {
        &self.connect
    }

    fn virsh(&self) -> Command {
        let mut cmd = Command::new("virsh");
        // Untranslated messages in captured output.
        cmd.env("LC_ALL", "C").arg("--connect").arg(&self.connect);
        cmd
    }

    fn virt_install(&self) -> Command {
        let mut cmd = Command::new("virt-install");
        cmd.arg("--connect").arg(&self.connect);
        cmd
    }
}

#[async_trait]
impl NetworkInfoClient for Virsh {
    async fn network_info(&self, network: &NetworkName) -> Result<NetworkInfo, HypervisorError> {
        let output = self
            .virsh()
            .args(["net-dumpxml", network.as_ref()])
            .run()
            .await?;
        let info = NetworkInfo::from_xml(&output.stdout_lossy());
        debug!(%network, ?info, "network info");
        Ok(info)
    }
}

#[async_trait]
impl InstanceProbe for Virsh {
    async fn is_defined(&self, name: &MachineName) -> Result<bool, HypervisorError> {
        let output = self.virsh().args(["dominfo", name.as_ref()]).output().await?;
        Ok(output.success())
    }
}

#[async_trait]
impl Hypervisor for Virsh {
    async fn clone_disk(&self, request: &CloneDisk) -> Result<CommandOutput, HypervisorError> {
        Ok(Command::new("qemu-img").args(request.args()).run().await?)
    }

    async fn render_descriptor(
        &self,
        request: &DescriptorRequest,
    ) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virt_install().args(request.args()).run().await?)
    }

    async fn define(&self, descriptor: &str) -> Result<CommandOutput, HypervisorError> {
        Ok(self
            .virsh()
            .args(["define", "/dev/stdin"])
            .stdin(descriptor)
            .run()
            .await?)
    }

    async fn attach_disk(&self, request: &AttachDisk) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(request.args()).run().await?)
    }

    async fn start(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(["start", name.as_ref()]).run().await?)
    }

    async fn destroy(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(["destroy", name.as_ref()]).run().await?)
    }

    async fn undefine(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(["undefine", name.as_ref()]).run().await?)
    }

    async fn set_metadata(&self, request: &SetMetadata) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(request.args()).run().await?)
    }

    async fn dump_descriptor(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        Ok(self.virsh().args(["dumpxml", name.as_ref()]).output().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virsh_carries_connect_uri() {
        let virsh = Virsh::new("qemu+ssh://host/system");
        let mut cmd = virsh.virsh();
        assert_eq!(
            cmd.arg("list").to_string(),
            "virsh --connect qemu+ssh://host/system list"
        );
    }

    #[test]
    fn default_connects_to_system_instance() {
        assert_eq!(Virsh::default().connect_uri(), "qemu:///system");
        let mut cmd = Virsh::default().virt_install();
        assert_eq!(
            cmd.arg("--import").to_string(),
            "virt-install --connect qemu:///system --import"
        );
    }
}
