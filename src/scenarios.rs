//! Named demo scenarios and their variable substitutions.
//!
//! Each scenario binds a contract template to the storage-container names
//! the template expects. The orchestrator folds these variables into every
//! step environment once a session selects a scenario.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Brats,
    Covid,
    CreditRisk,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Brats, Scenario::Covid, Scenario::CreditRisk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Brats => "brats",
            Scenario::Covid => "covid",
            Scenario::CreditRisk => "credit-risk",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Scenario::Brats => "BraTS (Brain Tumor Segmentation)",
            Scenario::Covid => "COVID-19",
            Scenario::CreditRisk => "Credit Risk Assessment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Brats => {
                "Medical imaging scenario with 4 data providers sharing brain MRI scans \
                 for tumor segmentation model training."
            }
            Scenario::Covid => {
                "Population-scale disease surveillance scenario combining ICMR, CoWIN and \
                 hospitalization data for COVID-19 pandemic response analytics."
            }
            Scenario::CreditRisk => {
                "Financial services scenario with multiple banks and bureaus collaborating \
                 on credit risk models."
            }
        }
    }

    /// Contract template file under `quick-demos/`.
    pub fn template(&self) -> &'static str {
        match self {
            Scenario::Brats => "brats-contract-template.json",
            Scenario::Covid => "covid-contract-template.json",
            Scenario::CreditRisk => "credit-risk-contract-template.json",
        }
    }

    /// Variable substitutions the scenario's template expects in the
    /// environment (consumed by envsubst inside the setup scripts).
    pub fn variables(&self) -> HashMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            Scenario::Brats => &[
                ("AZURE_BRATS_A_CONTAINER_NAME", "bratsacontainer"),
                ("AZURE_BRATS_B_CONTAINER_NAME", "bratsbcontainer"),
                ("AZURE_BRATS_C_CONTAINER_NAME", "bratsccontainer"),
                ("AZURE_BRATS_D_CONTAINER_NAME", "bratsdcontainer"),
            ],
            Scenario::Covid => &[
                ("AZURE_ICMR_CONTAINER_NAME", "icmrcontainer"),
                ("AZURE_COWIN_CONTAINER_NAME", "cowincontainer"),
                ("AZURE_INDEX_CONTAINER_NAME", "indexcontainer"),
            ],
            Scenario::CreditRisk => &[
                ("AZURE_BANK_A_CONTAINER_NAME", "bankacontainer"),
                ("AZURE_BANK_B_CONTAINER_NAME", "bankbcontainer"),
                ("AZURE_BUREAU_CONTAINER_NAME", "bureaucontainer"),
                ("AZURE_FINTECH_CONTAINER_NAME", "fintechcontainer"),
            ],
        };
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brats" => Ok(Scenario::Brats),
            "covid" => Ok(Scenario::Covid),
            "credit-risk" => Ok(Scenario::CreditRisk),
            other => Err(format!(
                "unknown scenario '{other}' (expected one of: brats, covid, credit-risk)"
            )),
        }
    }
}
