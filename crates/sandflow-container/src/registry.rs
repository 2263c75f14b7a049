//! Container listing and state records
//!
//! Parses `lxc-ls -f` tabular output into [`ContainerRecord`] values. On
//! constrained hosts, where lxc-ls cannot be scoped to a container
//! directory, the directory is scanned instead and liveness is derived from
//! `lxc-ls --active` membership.

use crate::error::{ContainerError, Result};
use crate::lxc::{ATTRIBUTES, Lxc};
use sandflow_config::SandflowConfig;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// State of a container as reported by lxc-ls.
///
/// Only Running and Stopped drive any logic here; the transient states are
/// observable while an lxc command is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Starting,
    Stopping,
    Aborting,
}

impl FromStr for ContainerState {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "STOPPED" => Ok(Self::Stopped),
            "STARTING" => Ok(Self::Starting),
            "STOPPING" => Ok(Self::Stopping),
            "ABORTING" => Ok(Self::Aborting),
            other => Err(ContainerError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
            Self::Aborting => "ABORTING",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one container's externally observable state.
///
/// Produced fresh on every listing; never mutated in place. lxc-ls can also
/// report ipv4, pid, memory and friends, but they are not collected for
/// performance reasons, matching the attribute list in [`ATTRIBUTES`].
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub name: String,
    pub state: ContainerState,
    pub ipv4: Option<String>,
    pub pid: Option<u32>,
}

impl ContainerRecord {
    /// Look up an attribute by its lxc-ls column name.
    fn attribute(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "state" => Some(self.state.to_string()),
            "ipv4" => self.ipv4.clone(),
            "pid" => self.pid.map(|p| p.to_string()),
            _ => None,
        }
    }
}

/// Filter for container listings. `name` and `state` are the supported
/// keys; arbitrary keys are accepted but match nothing in full listing
/// mode and are rejected on constrained hosts.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    entries: Vec<(String, String)>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.entries.push(("name".to_string(), name.into()));
        self
    }

    pub fn state(mut self, state: ContainerState) -> Self {
        self.entries.push(("state".to_string(), state.to_string()));
        self
    }

    /// Filter on an arbitrary lxc-ls attribute column.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn matches(&self, record: &ContainerRecord) -> bool {
        self.entries
            .iter()
            .all(|(key, value)| record.attribute(key).as_deref() == Some(value.as_str()))
    }
}

/// Answers "what containers exist in this directory, and in what state".
///
/// Stateless: every call re-queries the external tool, so there is no
/// staleness to manage.
#[derive(Clone)]
pub struct ContainerRegistry {
    lxc: Lxc,
    config: Arc<SandflowConfig>,
}

impl ContainerRegistry {
    pub fn new(lxc: Lxc, config: Arc<SandflowConfig>) -> Self {
        Self { lxc, config }
    }

    /// List containers in the container directory, optionally filtered.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerRecord>> {
        if self.config.constrained_listing {
            self.list_constrained(filter).await
        } else {
            let output = self.lxc.ls_formatted().await?;
            let records = parse_listing(&output)?;
            Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
        }
    }

    /// Listing for hosts whose lxc-ls cannot be scoped by path: scan the
    /// container directory directly and treat `lxc-ls --active` membership
    /// as RUNNING.
    async fn list_constrained(&self, filter: &ListFilter) -> Result<Vec<ContainerRecord>> {
        for key in filter.keys() {
            if key != "name" && key != "state" {
                return Err(ContainerError::UnsupportedFilter(key.to_string()));
            }
        }

        let active = self.lxc.ls_active().await?;

        let mut records = Vec::new();
        let entries = match std::fs::read_dir(self.lxc.container_path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Skip plain files and directories without a rootfs subtree.
            if !entry.path().join("rootfs").is_dir() {
                continue;
            }
            let state = if active.contains(&name) {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            };
            let record = ContainerRecord {
                name,
                state,
                ipv4: None,
                pid: None,
            };
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Parse `lxc-ls -f` output. The first two lines are the column header and
/// the separator; the remaining rows carry the attributes positionally in
/// [`ATTRIBUTES`] order.
///
/// ```text
/// NAME      STATE
/// ----------------
/// base      STOPPED
/// test_123  RUNNING
/// ```
pub fn parse_listing(output: &str) -> Result<Vec<ContainerRecord>> {
    let mut records = Vec::new();
    for line in output.lines().skip(2) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < ATTRIBUTES.len() {
            continue;
        }
        records.push(ContainerRecord {
            name: fields[0].to_string(),
            state: fields[1].parse()?,
            ipv4: None,
            pid: None,
        });
    }
    Ok(records)
}
