//! Wire shapes of the remote hierarchy, and their normalization.
//!
//! The remote has served processes under two schemas: the current one keys
//! a process by `ProcessId`, the older one by `IdProceso`. Both are mapped
//! to the canonical entity types here, so nothing past the transport
//! boundary ever sees the legacy name.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::{Process, Subprocess, Task};

use super::{Result, TransportError};

/// A remote process with its nested legs and directly attached tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProcess {
    pub process: Process,
    pub subprocesses: Vec<RemoteSubprocess>,
    pub tasks: Vec<Task>,
}

/// A remote leg with its nested tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSubprocess {
    pub subprocess: Subprocess,
    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireProcess {
    process_id: Option<String>,
    #[serde(rename = "IdProceso")]
    legacy_id: Option<String>,
    #[serde(default)]
    subprocesses: Vec<WireSubprocess>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSubprocess {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Decodes the body of a hierarchy download.
pub fn decode_hierarchy(body: Value) -> Result<Vec<RemoteProcess>> {
    let wire: Vec<WireProcess> =
        serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    wire.into_iter().map(RemoteProcess::try_from).collect()
}

impl TryFrom<WireProcess> for RemoteProcess {
    type Error = TransportError;

    fn try_from(wire: WireProcess) -> Result<Self> {
        let id = wire
            .process_id
            .filter(|id| !id.is_empty())
            .or(wire.legacy_id.filter(|id| !id.is_empty()))
            .ok_or_else(|| TransportError::Decode("process without ProcessId".into()))?;

        let mut fields = wire.rest;
        fields.insert("ProcessId".into(), Value::String(id.clone()));
        let process: Process = serde_json::from_value(Value::Object(fields))
            .map_err(|e| TransportError::Decode(format!("process {id}: {e}")))?;

        let subprocesses = wire
            .subprocesses
            .into_iter()
            .map(|s| {
                let subprocess: Subprocess = serde_json::from_value(Value::Object(s.rest))
                    .map_err(|e| TransportError::Decode(format!("subprocess of {id}: {e}")))?;
                Ok(RemoteSubprocess {
                    subprocess,
                    tasks: s.tasks,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            process,
            subprocesses,
            tasks: wire.tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn process_json(id_field: &str, id: &str) -> Value {
        let mut body = json!({
            "ServiceTypeId": "transport",
            "ResourceId": "truck-7",
            "StatusId": "pending",
            "StartDate": "2024-03-01T08:00:00Z",
            "Title": "Morning run",
            "Quantity": 12.0
        });
        body[id_field] = json!(id);
        body
    }

    #[test]
    fn canonical_id_is_used() {
        let decoded = decode_hierarchy(json!([process_json("ProcessId", "P1")])).unwrap();
        assert_eq!(decoded[0].process.process_id, "P1");
        assert!((decoded[0].process.totals.quantity - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn legacy_id_is_accepted() {
        let decoded = decode_hierarchy(json!([process_json("IdProceso", "P-old")])).unwrap();
        assert_eq!(decoded[0].process.process_id, "P-old");
    }

    #[test]
    fn canonical_id_wins_over_legacy() {
        let mut body = process_json("ProcessId", "P1");
        body["IdProceso"] = json!("P-old");
        let decoded = decode_hierarchy(json!([body])).unwrap();
        assert_eq!(decoded[0].process.process_id, "P1");
    }

    #[test]
    fn missing_id_is_a_decode_error() {
        let mut body = process_json("ProcessId", "P1");
        body.as_object_mut().unwrap().remove("ProcessId");
        let err = decode_hierarchy(json!([body])).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn nested_children_are_split_off() {
        let mut body = process_json("ProcessId", "P1");
        body["Tasks"] = json!([{
            "TaskId": "T1", "MaterialId": "glass", "DirectionId": "input"
        }]);
        body["Subprocesses"] = json!([{
            "SubprocessId": "S1",
            "DirectionId": "output",
            "Tasks": [{ "TaskId": "T2", "MaterialId": "paper", "DirectionId": "output" }]
        }]);

        let decoded = decode_hierarchy(json!([body])).unwrap();
        let p = &decoded[0];
        assert_eq!(p.tasks.len(), 1);
        assert_eq!(p.subprocesses.len(), 1);
        assert_eq!(p.subprocesses[0].subprocess.subprocess_id, "S1");
        assert_eq!(p.subprocesses[0].tasks[0].task_id, "T2");
    }
}
