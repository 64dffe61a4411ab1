//! Lifecycle status, leg direction, and running totals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an entity stands in its lifecycle.
///
/// Transitions are monotonic: `Pending` may become `Approved` or
/// `Rejected`, and a terminal status never changes again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Status {
    /// Whether the lifecycle has ended.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: Self) -> bool {
        self == Self::Pending && next.is_terminal()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// Whether a leg or task brings material in or sends it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Running totals of material moved, accumulated from resolved tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Totals {
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Totals {
    pub fn add(&mut self, quantity: Option<f64>, weight: Option<f64>, volume: Option<f64>) {
        self.quantity += quantity.unwrap_or_default();
        self.weight += weight.unwrap_or_default();
        self.volume += volume.unwrap_or_default();
    }
}
