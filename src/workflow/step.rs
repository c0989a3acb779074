//! The ordered step catalog and its mapping onto the demo scripts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::session::{Role, Session};

use super::orchestrator::WorkflowError;

/// Every script after install-cli expects the demo virtualenv on PATH.
const VENV_PREFIX: &str = "source venv/bin/activate && ";

/// One discrete unit of the workflow, backed by one external command.
///
/// The declaration order below is the workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    InstallCli,
    ContractSetup,
    CreateDidProvider,
    VerifyDid,
    SignContractProvider,
    RegisterContractProvider,
    ViewReceipt,
    Validate,
    CreateDidConsumer,
    RetrieveContract,
    SignContractConsumer,
    RegisterContractConsumer,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Step::InstallCli,
        Step::ContractSetup,
        Step::CreateDidProvider,
        Step::VerifyDid,
        Step::SignContractProvider,
        Step::RegisterContractProvider,
        Step::ViewReceipt,
        Step::Validate,
        Step::CreateDidConsumer,
        Step::RetrieveContract,
        Step::SignContractConsumer,
        Step::RegisterContractConsumer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::InstallCli => "install-cli",
            Step::ContractSetup => "contract-setup",
            Step::CreateDidProvider => "create-did-provider",
            Step::VerifyDid => "verify-did",
            Step::SignContractProvider => "sign-contract-provider",
            Step::RegisterContractProvider => "register-contract-provider",
            Step::ViewReceipt => "view-receipt",
            Step::Validate => "validate",
            Step::CreateDidConsumer => "create-did-consumer",
            Step::RetrieveContract => "retrieve-contract",
            Step::SignContractConsumer => "sign-contract-consumer",
            Step::RegisterContractConsumer => "register-contract-consumer",
        }
    }

    /// Position in the fixed workflow order, starting at 1.
    pub fn ordinal(&self) -> usize {
        Step::ALL
            .iter()
            .position(|step| step == self)
            .map(|index| index + 1)
            .unwrap_or(0)
    }

    /// Whether this step's output carries a fresh ledger sequence number.
    pub fn extracts_sequence_number(&self) -> bool {
        matches!(
            self,
            Step::RegisterContractProvider | Step::RegisterContractConsumer
        )
    }

    /// The party whose DID document this step creates, if any.
    pub fn creates_did_for(&self) -> Option<Role> {
        match self {
            Step::CreateDidProvider => Some(Role::DataProvider),
            Step::CreateDidConsumer => Some(Role::DataConsumer),
            _ => None,
        }
    }

    /// Build the shell command line for this step against the given session.
    ///
    /// Fails up front (before anything is spawned) when the session lacks a
    /// fact the command line needs: the provider username for verify-did, or
    /// the sequence number for the consumer-side contract steps.
    pub fn command(&self, session: &Session) -> Result<String, WorkflowError> {
        let command = match self {
            Step::InstallCli => "./demo/contract/0-install-cli.sh".to_string(),
            Step::ContractSetup => format!("{VENV_PREFIX}./demo/contract/1-contract-setup.sh"),
            Step::CreateDidProvider => format!("{VENV_PREFIX}./demo/contract/2-create-did.sh"),
            Step::VerifyDid => {
                let username = session.username_for(Role::DataProvider).ok_or(
                    WorkflowError::MissingConfig {
                        key: Role::DataProvider.username_key(),
                        step: *self,
                    },
                )?;
                format!("curl -s https://{username}.github.io/.well-known/did.json")
            }
            Step::SignContractProvider => format!("{VENV_PREFIX}./demo/contract/3-sign-contract.sh"),
            Step::RegisterContractProvider => {
                format!("{VENV_PREFIX}./demo/contract/4-register-contract.sh")
            }
            Step::ViewReceipt => format!("{VENV_PREFIX}./demo/contract/5-view-receipt.sh"),
            Step::Validate => format!("{VENV_PREFIX}./demo/contract/6-validate.sh"),
            Step::CreateDidConsumer => format!("{VENV_PREFIX}./demo/contract/7-create-did.sh"),
            Step::RetrieveContract => {
                let seq = self.required_sequence_number(session)?;
                format!("{VENV_PREFIX}./demo/contract/8-retrieve-contract.sh {seq}")
            }
            Step::SignContractConsumer => {
                let seq = self.required_sequence_number(session)?;
                format!("{VENV_PREFIX}./demo/contract/9-sign-contract.sh {seq}")
            }
            Step::RegisterContractConsumer => {
                format!("{VENV_PREFIX}./demo/contract/10-register-contract.sh")
            }
        };
        Ok(command)
    }

    fn required_sequence_number(&self, session: &Session) -> Result<u64, WorkflowError> {
        session
            .sequence_number
            .ok_or(WorkflowError::SequenceNumberRequired { step: *self })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = Step::ALL.iter().map(Step::as_str).collect();
                format!("unknown step '{s}' (expected one of: {})", names.join(", "))
            })
    }
}
