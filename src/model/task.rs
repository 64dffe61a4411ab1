//! Task: the leaf unit of measurable work.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Direction, Status};

/// A single measured movement of material.
///
/// Once `status` is terminal the measures are frozen and have been added
/// to the parent totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    /// Stamped from the parent when flattening a remote hierarchy.
    #[serde(default)]
    pub process_id: String,
    pub subprocess_id: Option<String>,
    pub task_id: String,
    pub material_id: String,
    #[serde(rename = "StatusId", default)]
    pub status: Status,
    #[serde(rename = "DirectionId")]
    pub direction: Direction,
    pub quantity: Option<f64>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
    pub package_id: Option<String>,
    /// Encoded images attached by the worker.
    #[serde(default)]
    pub photos: Vec<String>,
    pub execution_date: Option<Timestamp>,
    pub request_date: Option<Timestamp>,
    pub scheduled_date: Option<Timestamp>,
}

impl Task {
    pub fn belongs_to(&self, process_id: &str, subprocess_id: Option<&str>) -> bool {
        self.process_id == process_id && self.subprocess_id.as_deref() == subprocess_id
    }
}
