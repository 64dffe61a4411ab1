//! Process: the top-level unit of work, e.g. one transport run.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Status, Totals};

/// A top-level unit of work.
///
/// Subprocesses and tasks reference a process through its `process_id`;
/// the process itself owns nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Process {
    pub process_id: String,
    pub service_type_id: String,
    pub resource_id: String,
    #[serde(rename = "StatusId", default)]
    pub status: Status,
    pub order_id: Option<String>,
    pub start_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub initial_latitude: Option<f64>,
    pub initial_longitude: Option<f64>,
    pub final_latitude: Option<f64>,
    pub final_longitude: Option<f64>,
    #[serde(default)]
    pub title: String,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub totals: Totals,
}

impl Process {
    /// A process is closed once its end date has been stamped.
    pub fn is_closed(&self) -> bool {
        self.end_date.is_some() || self.status.is_terminal()
    }
}
