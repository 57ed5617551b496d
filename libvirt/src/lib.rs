//! Ports to the hypervisor host, and the `virsh` adapter implementing them.
//!
//! Every operation is an external command. Mutating operations fail on a
//! non-zero exit with the captured output; probes hand back the raw output
//! and leave the exit status to the caller.

mod descriptor;
mod network;
mod virsh;

pub use crate::descriptor::*;
pub use crate::network::*;
pub use crate::virsh::*;

use async_trait::async_trait;
use thiserror::Error;
use virtseed_cmd::{CommandError, CommandOutput};
use virtseed_system::{MachineName, NetworkName};

#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[async_trait]
pub trait NetworkInfoClient: Send + Sync {
    async fn network_info(&self, network: &NetworkName) -> Result<NetworkInfo, HypervisorError>;
}

#[async_trait]
pub trait InstanceProbe: Send + Sync {
    async fn is_defined(&self, name: &MachineName) -> Result<bool, HypervisorError>;
}

#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Create a copy-on-write overlay on top of a backing image.
    async fn clone_disk(&self, request: &CloneDisk) -> Result<CommandOutput, HypervisorError>;

    /// Render a domain descriptor without defining it. The descriptor is stdout.
    async fn render_descriptor(
        &self,
        request: &DescriptorRequest,
    ) -> Result<CommandOutput, HypervisorError>;

    /// Define a domain from a descriptor.
    async fn define(&self, descriptor: &str) -> Result<CommandOutput, HypervisorError>;

    async fn attach_disk(&self, request: &AttachDisk) -> Result<CommandOutput, HypervisorError>;

    async fn start(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError>;

    async fn destroy(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError>;

    async fn undefine(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError>;

    async fn set_metadata(&self, request: &SetMetadata) -> Result<CommandOutput, HypervisorError>;

    /// Dump the domain descriptor. Succeeds whatever the exit status.
    async fn dump_descriptor(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError>;
}
