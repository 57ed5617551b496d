//! Machine lifecycle: create and delete one machine against the hypervisor
//! host, and run an operation over a batch of machines.

mod batch;
mod create;
mod delete;
mod metadata;

pub use crate::batch::{BatchReport, MachineFailure, run_batch};
pub use crate::create::{CreateError, CreateOutcome};
pub use crate::delete::DeleteError;
pub use crate::metadata::{METADATA_KEY, METADATA_URI, metadata_xml};

use std::{fmt::Display, sync::Arc};

use thiserror::Error;
use virtseed_cloud_init::CloudInitBuilder;
use virtseed_libvirt::{Hypervisor, InstanceProbe, NetworkInfoClient, Virsh};
use virtseed_machine::ProvisioningRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MachineError {
    #[error(transparent)]
    Create(#[from] CreateError),

    #[error(transparent)]
    Delete(#[from] DeleteError),
}

/// Drives one machine at a time through its lifecycle.
///
/// The hypervisor is the only source of truth for whether a machine exists;
/// nothing is cached between calls.
#[derive(Clone)]
pub struct Orchestrator {
    network: Arc<dyn NetworkInfoClient>,
    probe: Arc<dyn InstanceProbe>,
    hypervisor: Arc<dyn Hypervisor>,
    cloud_init: CloudInitBuilder,
}

impl Orchestrator {
    pub fn new(
        network: Arc<dyn NetworkInfoClient>,
        probe: Arc<dyn InstanceProbe>,
        hypervisor: Arc<dyn Hypervisor>,
    ) -> Self {
        Self {
            network,
            probe,
            hypervisor,
            cloud_init: CloudInitBuilder::new(),
        }
    }

    pub fn virsh(virsh: Virsh) -> Self {
        let virsh = Arc::new(virsh);
        Self::new(virsh.clone(), virsh.clone(), virsh)
    }

    pub async fn apply(
        &self,
        operation: Operation,
        record: ProvisioningRecord,
    ) -> Result<(), MachineError> {
        match operation {
            Operation::Create => {
                self.create(record).await?;
            }
            Operation::Delete => self.delete(&record).await?,
        }
        Ok(())
    }
}
