use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Service tiers a patient can pay for and consult under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Nurse,
    ClinicalOfficer,
    Pharmacist,
    Gp,
    Specialist,
    Psychologist,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Nurse,
        ServiceType::ClinicalOfficer,
        ServiceType::Pharmacist,
        ServiceType::Gp,
        ServiceType::Specialist,
        ServiceType::Psychologist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Nurse => "nurse",
            ServiceType::ClinicalOfficer => "clinical_officer",
            ServiceType::Pharmacist => "pharmacist",
            ServiceType::Gp => "gp",
            ServiceType::Specialist => "specialist",
            ServiceType::Psychologist => "psychologist",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .iter()
            .copied()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| format!("Unknown service type: {}", s))
    }
}
