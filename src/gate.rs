//! Precondition artifacts for dependent workflow steps.
//!
//! The external scripts drop their outputs at well-known locations: ledger
//! entries as `2.<seq>.cose` under the contracts directory, identity
//! documents as `did.json` under a per-username directory. Later steps must
//! not run until those files exist, and a miss has to tell the operator which
//! file is absent and which step was supposed to produce it. A bare "No such
//! file or directory" from the script itself helps nobody.

use std::fmt;
use std::path::{Path, PathBuf};

/// Kind prefix the registration scripts use for contract ledger entries.
const LEDGER_ENTRY_PREFIX: &str = "2";

/// Resolves artifact locations shared between this process and the demo
/// scripts it invokes. The paths must match what the scripts themselves
/// write, exactly.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    contracts_dir: PathBuf,
    identity_root: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            contracts_dir: PathBuf::from("/tmp/contracts"),
            identity_root: PathBuf::from("/tmp"),
        }
    }
}

impl ArtifactPaths {
    pub fn new(contracts_dir: impl Into<PathBuf>, identity_root: impl Into<PathBuf>) -> Self {
        Self {
            contracts_dir: contracts_dir.into(),
            identity_root: identity_root.into(),
        }
    }

    /// Location of the ledger entry for the given sequence number.
    pub fn ledger_entry(&self, sequence_number: u64) -> PathBuf {
        self.contracts_dir
            .join(format!("{LEDGER_ENTRY_PREFIX}.{sequence_number}.cose"))
    }

    /// Location of a party's DID document.
    pub fn did_document(&self, username: &str) -> PathBuf {
        self.identity_root.join(username).join("did.json")
    }

    /// Pure existence test with no caching, so a file created
    /// a moment ago is visible immediately.
    pub fn exists(&self, artifact: &Path) -> bool {
        artifact.exists()
    }

    /// Gate on the ledger entry produced (locally) by the retrieve step.
    pub fn require_ledger_entry(
        &self,
        sequence_number: u64,
        produced_by: &'static str,
    ) -> Result<(), MissingArtifact> {
        let path = self.ledger_entry(sequence_number);
        if self.exists(&path) {
            return Ok(());
        }
        Err(MissingArtifact {
            artifact: path,
            produced_by,
            guidance: format!(
                "Make sure the contract with sequence number {sequence_number} was retrieved \
                 and the step completed successfully."
            ),
        })
    }

    /// Gate on a party's DID document.
    pub fn require_did_document(
        &self,
        username: &str,
        produced_by: &'static str,
    ) -> Result<(), MissingArtifact> {
        let path = self.did_document(username);
        if self.exists(&path) {
            return Ok(());
        }
        Err(MissingArtifact {
            artifact: path,
            produced_by,
            guidance: format!("Make sure the DID for {username} was created first."),
        })
    }
}

/// A required artifact is absent. Names the file and the step expected to
/// have produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingArtifact {
    pub artifact: PathBuf,
    pub produced_by: &'static str,
    pub guidance: String,
}

impl fmt::Display for MissingArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Required file not found: {} (expected from step '{}'). {}",
            self.artifact.display(),
            self.produced_by,
            self.guidance
        )
    }
}

impl std::error::Error for MissingArtifact {}
