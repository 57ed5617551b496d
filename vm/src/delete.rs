use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, instrument};
use virtseed_fs::{self as fs, FsError};
use virtseed_libvirt::HypervisorError;
use virtseed_machine::ProvisioningRecord;

use crate::Orchestrator;

#[derive(Error, Debug)]
pub enum DeleteError {
    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error(transparent)]
    FileRemoval(#[from] FsError),
}

impl Orchestrator {
    /// Remove one machine: domain, overlay disk, cloud-init image, unnamed
    /// volumes, and the working directory once empty.
    ///
    /// Missing pieces are skipped; a file that exists but cannot be removed
    /// aborts the rest.
    pub async fn delete(&self, record: &ProvisioningRecord) -> Result<(), DeleteError> {
        let probe = self.hypervisor.dump_descriptor(&record.name).await?;
        if probe.success() {
            self.cleanup_domain(record).await;
        } else {
            info!("domain is not defined, hypervisor needs no cleanup");
        }

        remove_if_present(&record.disk.target, "overlay disk").await?;
        remove_if_present(&record.iso_path(), "cloud-init image").await?;
        for volume in record.unnamed_volumes() {
            remove_if_present(&volume.path(), "volume").await?;
        }

        if fs::remove_dir_if_empty(&record.directory).await? {
            info!("removed empty directory {}", record.directory.display());
        }

        info!("deleted");
        Ok(())
    }

    /// Stop then undefine. Neither failure stops file cleanup.
    #[instrument(skip_all)]
    async fn cleanup_domain(&self, record: &ProvisioningRecord) {
        if let Err(error) = self.hypervisor.destroy(&record.name).await {
            debug!("destroy failed, domain was probably not running: {error}");
        }

        match self.hypervisor.undefine(&record.name).await {
            Ok(_) => info!("stopped and undefined domain"),
            Err(error) => error!("failed to undefine domain: {error}"),
        }
    }
}

async fn remove_if_present(path: &Path, what: &str) -> Result<(), FsError> {
    if fs::is_file(path).await? {
        fs::remove_file(path).await?;
        info!("removed {what} {}", path.display());
    } else {
        info!("{what} {} does not exist", path.display());
    }
    Ok(())
}
