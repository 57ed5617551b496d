//! NoCloud first-boot payload: `meta-data`, `user-data` and `network-config`
//! packed into an ISO image labelled `cidata`.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use virtseed_fs::{self as fs, FsError};
use virtseed_iso::{IsoBuilder, IsoError, IsoTimestamp};

pub const VOLUME_ID: &str = "cidata";
pub const SYSTEM_ID: &str = "LINUX";
pub const USER_DATA_HEADER: &str = "#cloud-config";

const META_DATA_NAMES: (&str, &str) = ("METADATA.;1", "meta-data");
const USER_DATA_NAMES: (&str, &str) = ("USERDATA.;1", "user-data");
const NETWORK_CONFIG_NAMES: (&str, &str) = ("NETWORKCONFIG.;1", "network-config");

#[derive(Error, Debug)]
pub enum CloudInitError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Yaml(#[from] serde_saphyr::ser::Error),

    #[error(transparent)]
    Iso(#[from] IsoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    pub instance_id: String,
    #[serde(rename = "local-hostname")]
    pub local_hostname: String,
}

/// Free-form `#cloud-config` document.
pub type UserData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub version: u8,
    pub ethernets: BTreeMap<String, Ethernet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ethernet {
    pub dhcp4: bool,
}

impl NetworkConfig {
    /// DHCP on the primary guest interface.
    pub fn dhcp() -> Self {
        Self {
            version: 2,
            ethernets: BTreeMap::from([("eno1".to_owned(), Ethernet { dhcp4: true })]),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::dhcp()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudInitPayload {
    pub meta_data: MetaData,
    pub user_data: UserData,
    pub network_config: NetworkConfig,
    pub iso_path: PathBuf,
}

/// The three rendered documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInitDocuments {
    pub meta_data: String,
    pub user_data: String,
    pub network_config: String,
}

impl CloudInitPayload {
    /// Emit the three documents as YAML 1.2.
    ///
    /// String values shaped like `12:30` are written unquoted, and cloud-init's
    /// YAML 1.1 loader reads those as base-60 integers. Such values must be
    /// quoted inside the userdata strings that need them.
    pub fn render(&self) -> Result<CloudInitDocuments, CloudInitError> {
        Ok(CloudInitDocuments {
            meta_data: serde_saphyr::to_string(&self.meta_data)?,
            user_data: format!(
                "{USER_DATA_HEADER}\n{}",
                serde_saphyr::to_string(&self.user_data)?
            ),
            network_config: serde_saphyr::to_string(&self.network_config)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CloudInitBuilder {
    timestamp: Option<IsoTimestamp>,
}

impl Default for CloudInitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudInitBuilder {
    pub fn new() -> Self {
        Self { timestamp: None }
    }

    /// Fix the recorded image time instead of using the current time.
    pub fn timestamp(mut self, timestamp: IsoTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn image(&self, payload: &CloudInitPayload) -> Result<Vec<u8>, CloudInitError> {
        let documents = payload.render()?;

        let mut iso = IsoBuilder::new(VOLUME_ID).system_id(SYSTEM_ID);
        if let Some(timestamp) = self.timestamp {
            iso = iso.timestamp(timestamp);
        }
        for ((iso_name, joliet_name), document) in [
            (USER_DATA_NAMES, documents.user_data),
            (META_DATA_NAMES, documents.meta_data),
            (NETWORK_CONFIG_NAMES, documents.network_config),
        ] {
            iso.add_file(iso_name, joliet_name, document)?;
        }

        Ok(iso.build()?)
    }

    /// Render the payload and write the image to its `iso_path`.
    pub async fn build(&self, payload: &CloudInitPayload) -> Result<(), CloudInitError> {
        let image = self.image(payload)?;
        debug!(
            path = %payload.iso_path.display(),
            bytes = image.len(),
            "writing cloud-init image"
        );
        fs::write_file(&payload.iso_path, &image).await?;
        Ok(())
    }
}
