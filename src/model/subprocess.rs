//! Subprocess: one input/output leg within a process.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Direction, Status, Totals};

/// One leg of a process, such as a pickup at a facility.
///
/// `subprocess_id` is only unique together with `process_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subprocess {
    /// Stamped from the parent when flattening a remote hierarchy.
    #[serde(default)]
    pub process_id: String,
    pub subprocess_id: String,
    #[serde(rename = "DirectionId")]
    pub direction: Direction,
    #[serde(rename = "StatusId", default)]
    pub status: Status,
    pub source_facility_id: Option<String>,
    pub destination_facility_id: Option<String>,
    pub source_party_id: Option<String>,
    pub destination_party_id: Option<String>,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    #[serde(default)]
    pub title: String,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub totals: Totals,
}

impl Subprocess {
    /// The facility this leg happens at: the source for inputs, the
    /// destination for outputs.
    pub fn facility_id(&self) -> Option<&str> {
        match self.direction {
            Direction::Input => self.source_facility_id.as_deref(),
            Direction::Output => self.destination_facility_id.as_deref(),
        }
    }
}
