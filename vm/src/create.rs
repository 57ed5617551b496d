use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use virtseed_cloud_init::CloudInitError;
use virtseed_fs::{self as fs, FsError};
use virtseed_libvirt::{
    AttachDisk, CloneDisk, DescriptorRequest, HypervisorError, SetMetadata, VolumeDisk,
    mac_address,
};
use virtseed_machine::ProvisioningRecord;
use virtseed_system::{MachineName, NetworkName};

use crate::{
    Orchestrator,
    metadata::{METADATA_KEY, METADATA_URI, metadata_xml},
};

#[derive(Error, Debug)]
pub enum CreateError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error(transparent)]
    CloudInit(#[from] CloudInitError),

    #[error("backing disk for '{name}' does not exist: {path}")]
    BackingDiskMissing { name: MachineName, path: PathBuf },

    #[error("no domain name configured for network '{network}'")]
    NetworkDomainMissing { network: NetworkName },

    #[error("no mac address found in descriptor of '{name}'")]
    NoMacAddressFound { name: MachineName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The instance was already defined and left untouched.
    AlreadyDefined,
    Created,
}

impl Orchestrator {
    /// Provision one machine: overlay disk, domain, cloud-init image, start.
    ///
    /// A failure after the domain is defined leaves it partially configured.
    pub async fn create(
        &self,
        mut record: ProvisioningRecord,
    ) -> Result<CreateOutcome, CreateError> {
        fs::create_dir(&record.directory).await?;

        if self.probe.is_defined(&record.name).await? {
            info!("instance is already defined");
            return Ok(CreateOutcome::AlreadyDefined);
        }

        self.ensure_disk(&record).await?;
        self.resolve_domain(&mut record).await?;
        let descriptor = self.define_domain(&record).await?;

        let mac = mac_address(&descriptor).ok_or_else(|| CreateError::NoMacAddressFound {
            name: record.name.clone(),
        })?;
        debug!(%mac, "primary interface");

        let payload = record.cloud_init_payload();
        self.cloud_init.build(&payload).await?;
        info!("created cloud-init image at {}", payload.iso_path.display());

        self.hypervisor
            .attach_disk(&AttachDisk::cloud_init(
                record.name.clone(),
                payload.iso_path.clone(),
            ))
            .await?;
        info!("attached cloud-init image");

        self.hypervisor.start(&record.name).await?;
        info!("started");

        self.sync_metadata(&record).await;

        Ok(CreateOutcome::Created)
    }

    #[instrument(skip_all)]
    async fn ensure_disk(&self, record: &ProvisioningRecord) -> Result<(), CreateError> {
        let disk = &record.disk;

        if fs::is_file(&disk.target).await? {
            info!("overlay disk already exists at {}", disk.target.display());
            return Ok(());
        }

        if !fs::is_file(&disk.backing).await? {
            return Err(CreateError::BackingDiskMissing {
                name: record.name.clone(),
                path: disk.backing.clone(),
            });
        }

        self.hypervisor
            .clone_disk(&CloneDisk {
                backing: disk.backing.clone(),
                target: disk.target.clone(),
                size: disk.size.clone(),
            })
            .await?;
        info!("created overlay disk at {}", disk.target.display());

        Ok(())
    }

    #[instrument(skip_all)]
    async fn resolve_domain(&self, record: &mut ProvisioningRecord) -> Result<(), CreateError> {
        let info = self.network.network_info(&record.network).await?;
        let domain = info.domain.ok_or_else(|| CreateError::NetworkDomainMissing {
            network: record.network.clone(),
        })?;
        record.resolve_domain(domain);
        debug!(fqdn = %record.fqdn, "resolved domain");
        Ok(())
    }

    /// Render the descriptor and define the domain from it.
    #[instrument(skip_all)]
    async fn define_domain(&self, record: &ProvisioningRecord) -> Result<String, CreateError> {
        let rendered = self
            .hypervisor
            .render_descriptor(&descriptor_request(record))
            .await?;
        let descriptor = rendered.stdout_lossy();

        self.hypervisor.define(&descriptor).await?;
        info!("defined domain");

        Ok(descriptor)
    }

    async fn sync_metadata(&self, record: &ProvisioningRecord) {
        let xml = match metadata_xml(record) {
            Ok(xml) => xml,
            Err(error) => {
                warn!("failed to render instance metadata: {error}");
                return;
            }
        };

        let request = SetMetadata {
            name: record.name.clone(),
            uri: METADATA_URI.to_owned(),
            key: METADATA_KEY.to_owned(),
            xml,
        };
        match self.hypervisor.set_metadata(&request).await {
            Ok(_) => info!("updated instance metadata"),
            Err(error) => warn!("failed to save instance metadata: {error}"),
        }
    }
}

fn descriptor_request(record: &ProvisioningRecord) -> DescriptorRequest {
    DescriptorRequest {
        name: record.name.clone(),
        title: record.fqdn.clone(),
        variant: record.variant.clone(),
        network: record.network.clone(),
        cpu: record.cpu,
        mem: record.mem,
        disk: std::path::absolute(&record.disk.target)
            .unwrap_or_else(|_| record.disk.target.clone()),
        volumes: record
            .volumes
            .iter()
            .map(|volume| VolumeDisk {
                path: volume.path(),
                size: volume.size.clone(),
            })
            .collect(),
    }
}
