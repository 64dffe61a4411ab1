//! HTTP transport: the remote authority's REST API, via `ureq`.
//!
//! Routes, relative to the configured base URL:
//!
//! ```text
//! GET  /processes                              hierarchy download
//! POST /processes                              create process
//! PUT  /processes/{id}                         update process
//! PUT  /processes/{id}/start                   update process start
//! POST /subprocesses                           create subprocess
//! PUT  /subprocesses/{process}/{subprocess}    update subprocess
//! POST /subprocesses/{process}/{subprocess}/certificate
//! POST /tasks                                  create task
//! PUT  /tasks/{id}                             update task
//! ```

use std::time::Duration;

use serde::Serialize;
use ureq::Agent;

use crate::model::{Process, Subprocess, Task};

use super::{Ack, Remote, RemoteProcess, Result, TransportError, decode_hierarchy};

/// Remote reached over HTTP with an optional bearer token.
pub struct HttpRemote {
    agent: Agent,
    base_url: String,
    token: Option<String>,
}

#[derive(Clone, Copy)]
enum Verb {
    Post,
    Put,
}

impl HttpRemote {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn send(&self, verb: Verb, path: &str, body: &impl Serialize) -> Result<Ack> {
        let url = self.url(path);
        let mut request = match verb {
            Verb::Post => self.agent.post(&url),
            Verb::Put => self.agent.put(&url),
        };
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", &auth);
        }
        let response = request.send_json(body)?;
        let text = response.into_body().read_to_string()?;
        Ok(parse_ack(&text))
    }
}

/// Reads the optional `{"Id": "..."}` a write may answer with.
fn parse_ack(body: &str) -> Ack {
    let assigned_id = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("Id") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });
    Ack { assigned_id }
}

impl Remote for HttpRemote {
    fn fetch_hierarchy(&self) -> Result<Vec<RemoteProcess>> {
        let mut request = self.agent.get(&self.url("processes"));
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", &auth);
        }
        let body: serde_json::Value = request
            .call()?
            .into_body()
            .read_json()
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        decode_hierarchy(body)
    }

    fn create_process(&self, process: &Process) -> Result<Ack> {
        self.send(Verb::Post, "processes", process)
    }

    fn update_process(&self, process: &Process) -> Result<Ack> {
        let path = format!("processes/{}", process.process_id);
        self.send(Verb::Put, &path, process)
    }

    fn update_process_start(&self, process: &Process) -> Result<Ack> {
        let path = format!("processes/{}/start", process.process_id);
        self.send(Verb::Put, &path, process)
    }

    fn create_subprocess(&self, subprocess: &Subprocess) -> Result<Ack> {
        self.send(Verb::Post, "subprocesses", subprocess)
    }

    fn update_subprocess(&self, subprocess: &Subprocess) -> Result<Ack> {
        let path = format!(
            "subprocesses/{}/{}",
            subprocess.process_id, subprocess.subprocess_id
        );
        self.send(Verb::Put, &path, subprocess)
    }

    fn create_task(&self, task: &Task) -> Result<Ack> {
        self.send(Verb::Post, "tasks", task)
    }

    fn update_task(&self, task: &Task) -> Result<Ack> {
        let path = format!("tasks/{}", task.task_id);
        self.send(Verb::Put, &path, task)
    }

    fn emit_certificate(&self, subprocess: &Subprocess) -> Result<Ack> {
        let path = format!(
            "subprocesses/{}/{}/certificate",
            subprocess.process_id, subprocess.subprocess_id
        );
        self.send(Verb::Post, &path, subprocess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let remote = HttpRemote::new("https://ops.example.com/api/", None, Duration::from_secs(5));
        assert_eq!(
            remote.url("/processes"),
            "https://ops.example.com/api/processes"
        );
    }

    #[test]
    fn bearer_only_with_token() {
        let anon = HttpRemote::new("http://x", None, Duration::from_secs(5));
        assert_eq!(anon.bearer(), None);

        let authed = HttpRemote::new("http://x", Some("abc".into()), Duration::from_secs(5));
        assert_eq!(authed.bearer().as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn ack_reads_assigned_id() {
        assert_eq!(parse_ack(r#"{"Id":"P-900"}"#).assigned_id.as_deref(), Some("P-900"));
        assert_eq!(parse_ack(r#"{"Id":42}"#).assigned_id.as_deref(), Some("42"));
    }

    #[test]
    fn ack_tolerates_empty_or_opaque_bodies() {
        assert_eq!(parse_ack(""), Ack::default());
        assert_eq!(parse_ack("OK"), Ack::default());
        assert_eq!(parse_ack(r#"{"ok":true}"#), Ack::default());
    }
}
