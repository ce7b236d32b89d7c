use thiserror::Error;

use crate::core::common::{AllocationVerdict, PmId, VmId};
use crate::core::pm::PmState;
use crate::core::vm::VmState;

/// Errors returned by operations on the live infrastructure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IaasError {
    #[error("host {0} not found")]
    HostNotFound(PmId),
    #[error("vm {0} not found")]
    VmNotFound(VmId),
    #[error("host {host} is {state}, expected {expected}")]
    UnexpectedHostState {
        host: PmId,
        state: PmState,
        expected: PmState,
    },
    #[error("vm {vm} is {state}, expected RUNNING")]
    VmNotRunning { vm: VmId, state: VmState },
    #[error("host {0} still hosts virtual machines or incoming migrations")]
    HostNotEmpty(PmId),
    #[error("migration of vm {vm} to host {target} rejected: {verdict:?}")]
    MigrationRejected {
        vm: VmId,
        target: PmId,
        verdict: AllocationVerdict,
    },
    #[error("no network connection between hosts {from} and {to}")]
    NetworkUnavailable { from: PmId, to: PmId },
}
