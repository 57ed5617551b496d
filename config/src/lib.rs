use comfy_table::Table;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};
use virtseed_fs::{self as fs, FsError};
use virtseed_machine::{MachineSettings, ProvisioningRecord};
use virtseed_system::MachineName;

pub const DEFAULT_CONFIG_FILE: &str = "virtseed.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] FsError),

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_saphyr::Error,
    },

    #[error("invalid settings for machine '{hostname}': {source}")]
    Machine {
        hostname: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("machine #{index} has no hostname")]
    MissingHostname { index: usize },

    #[error("machine '{name}' is declared more than once")]
    DuplicateMachine { name: MachineName },
}

type Settings = Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    common: Settings,
    #[serde(default)]
    import_common: Option<PathBuf>,
    vms: Vec<Settings>,
}

// Only `common` is taken from an imported document.
#[derive(Debug, Clone, Deserialize)]
struct CommonDocument {
    #[serde(default)]
    common: Settings,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub machines: IndexMap<MachineName, MachineSettings>,
}

impl Config {
    /// Compile a config document into per-machine settings, keyed by machine name
    /// in declaration order.
    ///
    /// Any failure aborts the whole compilation.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = if fs::is_dir(path).await? {
            path.join(DEFAULT_CONFIG_FILE)
        } else {
            path.to_owned()
        };

        let ConfigDocument {
            common,
            import_common,
            vms,
        } = load_document(&path).await?;

        let mut base = match import_common {
            Some(import) => {
                let import = resolve_relative(&path, &import);
                debug!(path = %import.display(), "importing common settings");
                let CommonDocument { common } = load_document(&import).await?;
                common
            }
            None => Settings::new(),
        };
        base.extend(common);

        let machines = compile_machines(&base, vms)?;
        Ok(Config { path, machines })
    }

    /// Fresh provisioning records, one per machine.
    pub fn records(&self) -> impl Iterator<Item = ProvisioningRecord> + '_ {
        self.machines
            .values()
            .map(|settings| ProvisioningRecord::new(settings.clone()))
    }

    pub fn print_machines(&self) {
        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_FULL)
            .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
            .set_content_arrangement(comfy_table::ContentArrangement::Dynamic)
            .set_header(vec![
                "name", "hostname", "network", "cpu", "mem", "variant", "disk",
            ]);

        for record in self.records() {
            table.add_row(vec![
                record.name.to_string(),
                record.hostname.to_string(),
                record.network.to_string(),
                record.cpu.to_string(),
                record.mem.to_string(),
                record.variant.clone(),
                record.disk.target.display().to_string(),
            ]);
        }

        println!("{table}")
    }
}

async fn load_document<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let string = fs::read_file_to_string(path).await?;
    serde_saphyr::from_str(&string).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

fn resolve_relative(base_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base_path.parent() {
        Some(parent) => parent.join(path),
        None => path.to_path_buf(),
    }
}

/// Overlay each machine's keys on its own copy of `base`.
fn compile_machines(
    base: &Settings,
    vms: Vec<Settings>,
) -> Result<IndexMap<MachineName, MachineSettings>, ConfigError> {
    let mut machines = IndexMap::with_capacity(vms.len());

    for (index, overrides) in vms.into_iter().enumerate() {
        let mut merged = base.clone();
        merged.extend(overrides);

        let hostname = merged
            .get("hostname")
            .and_then(Value::as_str)
            .ok_or(ConfigError::MissingHostname { index })?
            .to_owned();

        let settings: MachineSettings =
            serde_json::from_value(Value::Object(merged)).map_err(|source| {
                error!(%hostname, "failed to compile machine settings: {source}");
                ConfigError::Machine {
                    hostname: hostname.clone(),
                    source,
                }
            })?;

        let name = settings.name();
        if machines.contains_key(&name) {
            return Err(ConfigError::DuplicateMachine { name });
        }
        debug!(%name, "machine settings ready");
        machines.insert(name, settings);
    }

    Ok(machines)
}
