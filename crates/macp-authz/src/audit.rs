//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::action::{ActionTarget, ManagementAction};
use crate::caller::Caller;

/// Entry recorded in the authorization decision log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    /// Timestamp when the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Caller display name, or `in-vm` for unauthenticated calls.
    pub caller: String,
    /// Operation name of the requested action.
    pub operation: String,
    /// Description of the action target.
    pub target: String,
    /// Role names the caller resolved to.
    pub roles: Vec<String>,
    /// Outcome label (`granted`, `denied`, or an error class).
    pub outcome: String,
    /// SHA-256 hash of the entry contents and previous hash.
    pub hash: String,
    /// Hash of the previous entry (or zero string for the first entry).
    pub previous_hash: String,
}

impl DecisionRecord {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        caller: &str,
        operation: &str,
        target: &str,
        roles: &[String],
        outcome: &str,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(caller.as_bytes());
        hasher.update(operation.as_bytes());
        hasher.update(target.as_bytes());
        for role in roles {
            hasher.update(role.as_bytes());
        }
        hasher.update(outcome.as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Authorization decision log backed by a newline-delimited JSON file.
/// Entries are hash-chained so tampering is detectable after the fact.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
    last_hash: String,
}

impl DecisionLog {
    /// Create a decision log at the given path. Existing entries are loaded
    /// to determine the head hash.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut log = Self {
            path: path.clone(),
            last_hash: "0".repeat(64),
        };
        if path.exists() {
            for line in BufReader::new(fs::File::open(&path)?).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: DecisionRecord = serde_json::from_str(&line)?;
                log.last_hash = record.hash.clone();
            }
        }
        Ok(log)
    }

    /// Append a decision for the given request to the log.
    pub fn record(
        &mut self,
        caller: &Caller,
        action: &ManagementAction,
        target: &ActionTarget,
        roles: &[String],
        outcome: &str,
    ) -> Result<DecisionRecord> {
        let timestamp = Utc::now();
        let caller_name = caller.display_name().unwrap_or("in-vm").to_owned();
        let target_description = target.describe();
        let roles = roles.to_vec();
        let hash = DecisionRecord::compute_hash(
            timestamp,
            &caller_name,
            action.operation(),
            &target_description,
            &roles,
            outcome,
            &self.last_hash,
        );
        let record = DecisionRecord {
            timestamp,
            caller: caller_name,
            operation: action.operation().to_owned(),
            target: target_description,
            roles,
            outcome: outcome.to_owned(),
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open decision log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&record)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = hash;
        Ok(record)
    }

    /// Verify integrity of the log (detect tampering).
    pub fn verify(&self) -> Result<bool> {
        let mut previous = "0".repeat(64);
        if !self.path.exists() {
            return Ok(true);
        }
        for line in BufReader::new(fs::File::open(&self.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DecisionRecord = serde_json::from_str(&line)?;
            let expected = DecisionRecord::compute_hash(
                record.timestamp,
                &record.caller,
                &record.operation,
                &record.target,
                &record.roles,
                &record.outcome,
                &previous,
            );
            if expected != record.hash {
                return Ok(false);
            }
            previous = record.hash;
        }
        Ok(true)
    }
}
