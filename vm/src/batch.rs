use std::error::Error;

use tracing::{Instrument, error, info, info_span};
use virtseed_machine::ProvisioningRecord;
use virtseed_system::MachineName;

use crate::{MachineError, Operation, Orchestrator};

#[derive(Debug)]
pub struct MachineFailure {
    pub name: MachineName,
    pub error: MachineError,
}

#[derive(Debug)]
pub struct BatchReport {
    pub operation: Operation,
    pub succeeded: Vec<MachineName>,
    pub failed: Vec<MachineFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &MachineName> {
        self.failed.iter().map(|failure| &failure.name)
    }
}

/// Apply `operation` to each machine in turn.
///
/// A machine's failure is logged and recorded, then the batch moves on.
pub async fn run_batch<I>(
    orchestrator: &Orchestrator,
    operation: Operation,
    records: I,
) -> BatchReport
where
    I: IntoIterator<Item = ProvisioningRecord>,
{
    let mut report = BatchReport {
        operation,
        succeeded: Vec::new(),
        failed: Vec::new(),
    };

    for record in records {
        let name = record.name.clone();
        let span = info_span!("machine", name = %name, op = %operation);

        match orchestrator
            .apply(operation, record)
            .instrument(span.clone())
            .await
        {
            Ok(()) => {
                span.in_scope(|| info!("operation {operation} successful"));
                report.succeeded.push(name);
            }
            Err(err) => {
                span.in_scope(|| error!("operation {operation} failed: {}", error_chain(&err)));
                report.failed.push(MachineFailure { name, error: err });
            }
        }
    }

    report
}

fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
