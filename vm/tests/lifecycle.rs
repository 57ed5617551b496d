use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::json;
use virtseed_cmd::{CommandError, CommandOutput};
use virtseed_fs::FsError;
use virtseed_iso::read_volume;
use virtseed_libvirt::{
    AttachDisk, CloneDisk, DescriptorRequest, Hypervisor, HypervisorError, InstanceProbe,
    NetworkInfo, NetworkInfoClient, SetMetadata,
};
use virtseed_machine::{MachineSettings, ProvisioningRecord};
use virtseed_system::{MachineName, NetworkName};
use virtseed_vm::{
    CreateError, CreateOutcome, DeleteError, MachineError, Operation, Orchestrator, run_batch,
};

const DESCRIPTOR: &str = r#"<domain type="kvm">
  <devices>
    <interface type="network">
      <mac address="52:54:00:12:34:56"/>
    </interface>
  </devices>
</domain>"#;

/// Records every mutating call and keeps the set of defined domains.
#[derive(Default)]
struct FakeHost {
    domain: Option<String>,
    descriptor: Option<String>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
    defined: Mutex<HashSet<String>>,
    rendering: Mutex<Option<MachineName>>,
    metadata: Mutex<Vec<String>>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            domain: Some("lab.example".to_owned()),
            ..Default::default()
        }
    }

    fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, operation: &'static str, target: &str) -> Result<CommandOutput, HypervisorError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation} {target}"));
        if self.failing.contains(operation) {
            return Err(HypervisorError::Command(CommandError::Failure {
                command: format!("virsh {operation} {target}"),
                status: "exit code 1".to_owned(),
                output: format!("error: {operation} refused"),
            }));
        }
        Ok(CommandOutput::new(Some(0), "", ""))
    }
}

#[async_trait]
impl NetworkInfoClient for FakeHost {
    async fn network_info(&self, _network: &NetworkName) -> Result<NetworkInfo, HypervisorError> {
        Ok(NetworkInfo {
            domain: self.domain.clone(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl InstanceProbe for FakeHost {
    async fn is_defined(&self, name: &MachineName) -> Result<bool, HypervisorError> {
        Ok(self.defined.lock().unwrap().contains(name.as_ref()))
    }
}

#[async_trait]
impl Hypervisor for FakeHost {
    async fn clone_disk(&self, request: &CloneDisk) -> Result<CommandOutput, HypervisorError> {
        let output = self.call("clone", &request.target.display().to_string())?;
        std::fs::write(&request.target, b"qcow2").unwrap();
        Ok(output)
    }

    async fn render_descriptor(
        &self,
        request: &DescriptorRequest,
    ) -> Result<CommandOutput, HypervisorError> {
        self.call("render", request.name.as_ref())?;
        *self.rendering.lock().unwrap() = Some(request.name.clone());
        let descriptor = self.descriptor.as_deref().unwrap_or(DESCRIPTOR);
        Ok(CommandOutput::new(Some(0), descriptor, ""))
    }

    async fn define(&self, _descriptor: &str) -> Result<CommandOutput, HypervisorError> {
        let name = self.rendering.lock().unwrap().clone().unwrap();
        let output = self.call("define", name.as_ref())?;
        self.defined.lock().unwrap().insert(name.to_string());
        Ok(output)
    }

    async fn attach_disk(&self, request: &AttachDisk) -> Result<CommandOutput, HypervisorError> {
        self.call("attach", request.name.as_ref())
    }

    async fn start(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        self.call("start", name.as_ref())
    }

    async fn destroy(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        self.call("destroy", name.as_ref())
    }

    async fn undefine(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        let output = self.call("undefine", name.as_ref())?;
        self.defined.lock().unwrap().remove(name.as_ref());
        Ok(output)
    }

    async fn set_metadata(&self, request: &SetMetadata) -> Result<CommandOutput, HypervisorError> {
        self.metadata.lock().unwrap().push(request.xml.clone());
        self.call("metadata", request.name.as_ref())
    }

    async fn dump_descriptor(&self, name: &MachineName) -> Result<CommandOutput, HypervisorError> {
        let code = if self.defined.lock().unwrap().contains(name.as_ref()) {
            0
        } else {
            1
        };
        Ok(CommandOutput::new(Some(code), "", ""))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    host: Arc<FakeHost>,
    orchestrator: Orchestrator,
}

impl Fixture {
    fn new(host: FakeHost) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("debian.qcow2"), b"base").unwrap();
        let host = Arc::new(host);
        let orchestrator = Orchestrator::new(host.clone(), host.clone(), host.clone());
        Self {
            _dir: dir,
            root,
            host,
            orchestrator,
        }
    }

    fn vms(&self) -> PathBuf {
        self.root.join("vms")
    }

    fn record(&self, hostname: &str) -> ProvisioningRecord {
        self.record_with(hostname, &self.root.join("debian.qcow2"))
    }

    fn record_with(&self, hostname: &str, backing: &Path) -> ProvisioningRecord {
        let settings: MachineSettings = serde_json::from_value(json!({
            "hostname": hostname,
            "variant": "debian12",
            "directory": self.vms(),
            "backingdisk": backing,
            "ssh_keys": ["ssh-ed25519 AAAA"],
            "volumes": [{ "size": 10 }, { "name": "data", "size": 20 }],
        }))
        .unwrap();
        ProvisioningRecord::new(settings)
    }
}

#[tokio::test]
async fn create_runs_every_step() {
    let fx = Fixture::new(FakeHost::new());
    let record = fx.record("web");
    let iso_path = record.iso_path();

    let outcome = fx.orchestrator.create(record).await.unwrap();

    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(
        fx.host.calls(),
        [
            format!("clone {}", fx.vms().join("default_web.qcow2").display()),
            "render default_web".to_owned(),
            "define default_web".to_owned(),
            "attach default_web".to_owned(),
            "start default_web".to_owned(),
            "metadata default_web".to_owned(),
        ]
    );

    let volume = read_volume(&std::fs::read(iso_path).unwrap()).unwrap();
    assert_eq!(volume.volume_id, "cidata");
    let user_data = String::from_utf8(volume.joliet_file("user-data").unwrap().data.clone()).unwrap();
    assert!(user_data.starts_with("#cloud-config\n"));
    assert!(user_data.contains("web.lab.example"));

    let metadata = fx.host.metadata.lock().unwrap().clone();
    assert!(metadata[0].contains("<ansible_host>web.lab.example</ansible_host>"));
}

#[tokio::test]
async fn second_create_makes_no_mutating_calls() {
    let fx = Fixture::new(FakeHost::new());

    fx.orchestrator.create(fx.record("web")).await.unwrap();
    let after_first = fx.host.calls().len();

    let outcome = fx.orchestrator.create(fx.record("web")).await.unwrap();

    assert_eq!(outcome, CreateOutcome::AlreadyDefined);
    assert_eq!(fx.host.calls().len(), after_first);
}

#[tokio::test]
async fn existing_overlay_is_not_cloned_again() {
    let fx = Fixture::new(FakeHost::new());
    std::fs::create_dir_all(fx.vms()).unwrap();
    std::fs::write(fx.vms().join("default_web.qcow2"), b"overlay").unwrap();

    fx.orchestrator.create(fx.record("web")).await.unwrap();

    assert!(!fx.host.calls().iter().any(|call| call.starts_with("clone")));
}

#[tokio::test]
async fn missing_backing_disk_stops_before_any_call() {
    let fx = Fixture::new(FakeHost::new());
    let record = fx.record_with("web", &fx.root.join("missing.qcow2"));

    let err = fx.orchestrator.create(record).await.unwrap_err();

    assert!(matches!(err, CreateError::BackingDiskMissing { .. }));
    assert!(fx.host.calls().is_empty());
}

#[tokio::test]
async fn network_without_domain_fails() {
    let fx = Fixture::new(FakeHost {
        domain: None,
        ..FakeHost::new()
    });

    let err = fx.orchestrator.create(fx.record("web")).await.unwrap_err();

    match err {
        CreateError::NetworkDomainMissing { network } => assert_eq!(network.to_string(), "default"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn descriptor_without_mac_fails_after_define() {
    let fx = Fixture::new(FakeHost {
        descriptor: Some("<domain/>".to_owned()),
        ..FakeHost::new()
    });

    let err = fx.orchestrator.create(fx.record("web")).await.unwrap_err();

    assert!(matches!(err, CreateError::NoMacAddressFound { .. }));
    assert_eq!(fx.host.calls().last().map(String::as_str), Some("define default_web"));
}

#[tokio::test]
async fn start_failure_is_fatal() {
    let fx = Fixture::new(FakeHost::new().failing("start"));

    let err = fx.orchestrator.create(fx.record("web")).await.unwrap_err();

    assert!(matches!(err, CreateError::Hypervisor(_)));
    assert!(err.to_string().contains("start refused"));
    assert!(!fx.host.calls().iter().any(|call| call.starts_with("metadata")));
}

#[tokio::test]
async fn metadata_failure_is_only_a_warning() {
    let fx = Fixture::new(FakeHost::new().failing("metadata"));

    let outcome = fx.orchestrator.create(fx.record("web")).await.unwrap();

    assert_eq!(outcome, CreateOutcome::Created);
}

#[tokio::test]
async fn delete_without_prior_create_completes() {
    let fx = Fixture::new(FakeHost::new());

    fx.orchestrator.delete(&fx.record("web")).await.unwrap();

    assert!(fx.host.calls().is_empty());
}

#[tokio::test]
async fn delete_removes_domain_and_files() {
    let fx = Fixture::new(FakeHost::new());
    let record = fx.record("web");
    fx.orchestrator.create(record.clone()).await.unwrap();
    let unnamed = fx.vms().join("default_web_disk1.qcow2");
    std::fs::write(&unnamed, b"volume").unwrap();

    fx.orchestrator.delete(&record).await.unwrap();

    let calls = fx.host.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        ["destroy default_web", "undefine default_web"]
    );
    assert!(!record.disk.target.exists());
    assert!(!record.iso_path().exists());
    assert!(!unnamed.exists());
    assert!(!fx.vms().exists());
}

#[tokio::test]
async fn undefine_failure_still_removes_files() {
    let fx = Fixture::new(FakeHost::new().failing("undefine").failing("destroy"));
    let record = fx.record("web");
    fx.orchestrator.create(record.clone()).await.unwrap();

    fx.orchestrator.delete(&record).await.unwrap();

    assert!(!record.disk.target.exists());
    assert!(!record.iso_path().exists());
}

#[tokio::test]
async fn file_removal_failure_aborts_remaining_cleanup() {
    let fx = Fixture::new(FakeHost::new());
    let mut record = fx.record("web");
    fx.orchestrator.create(record.clone()).await.unwrap();
    let unnamed = fx.vms().join("default_web_disk1.qcow2");
    std::fs::write(&unnamed, b"volume").unwrap();

    // A path below a regular file cannot be inspected, even by root.
    let blocker = fx.vms().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    record.disk.target = blocker.join("default_web.qcow2");

    let err = fx.orchestrator.delete(&record).await.unwrap_err();

    assert!(matches!(err, DeleteError::FileRemoval(FsError::Metadata { .. })));
    let calls = fx.host.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        ["destroy default_web", "undefine default_web"]
    );
    assert!(record.iso_path().exists());
    assert!(unnamed.exists());
    assert!(fx.vms().exists());
}

#[tokio::test]
async fn batch_isolates_failures() {
    let fx = Fixture::new(FakeHost::new());
    let records = vec![
        fx.record_with("broken", &fx.root.join("missing.qcow2")),
        fx.record("web"),
    ];

    let report = run_batch(&fx.orchestrator, Operation::Create, records).await;

    assert!(!report.is_success());
    assert_eq!(
        report.failed_names().map(ToString::to_string).collect::<Vec<_>>(),
        ["default_broken"]
    );
    assert!(matches!(
        report.failed[0].error,
        MachineError::Create(CreateError::BackingDiskMissing { .. })
    ));
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].to_string(), "default_web");
}
