//! Append-only JSONL audit file with hash chaining.
//! - Each line includes: record, prev_hash, hash
//! - Hash is computed over canonical JSON of (record + prev_hash)
//! - `verify_log` replays and checks integrity end-to-end

use crate::{AuditLogError, AuditSink};
use async_trait::async_trait;
use fe_audit_spec::ProviderAuditRecord;
use fe_common::sha256_canonical_json;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLine {
    pub prev_hash: String, // sha256:... or "sha256:00..00" for genesis
    pub hash: String,
    pub record: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct HashPayload<'a> {
    prev_hash: &'a str,
    record: &'a serde_json::Value,
}

pub fn genesis_hash() -> String {
    "sha256:0000000000000000000000000000000000000000000000000000000000000000".to_string()
}

pub fn compute_line_hash(prev_hash: &str, record: &serde_json::Value) -> Result<String, AuditLogError> {
    Ok(sha256_canonical_json(&HashPayload { prev_hash, record })?)
}

struct Appender {
    file: File,
    last_hash: String,
}

impl Appender {
    fn append(&mut self, record: &ProviderAuditRecord) -> Result<(), AuditLogError> {
        let record = serde_json::to_value(record)?;
        let prev_hash = self.last_hash.clone();
        let hash = compute_line_hash(&prev_hash, &record)?;
        let line = serde_json::to_string(&AuditLine { prev_hash, hash: hash.clone(), record })?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.last_hash = hash;
        Ok(())
    }
}

#[derive(Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
    inner: Arc<Mutex<Appender>>,
}

impl JsonlAuditSink {
    /// Open (or create) the file. An existing file is verified first and the
    /// chain continues from its last hash.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let last_hash = if path.exists() { verify_log(&path)? } else { genesis_hash() };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Arc::new(Mutex::new(Appender { file, last_hash })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn save(&self, record: &ProviderAuditRecord) -> Result<(), AuditLogError> {
        let inner = Arc::clone(&self.inner);
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let mut appender = inner
                .lock()
                .map_err(|e| AuditLogError::Task(format!("jsonl appender poisoned: {e}")))?;
            appender.append(&record)
        })
        .await
        .map_err(|e| AuditLogError::Task(e.to_string()))?
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ProviderAuditRecord>, AuditLogError> {
        let path = self.path.clone();
        let wanted = correlation_id.to_string();
        tokio::task::spawn_blocking(move || {
            let reader = BufReader::new(File::open(path)?);
            let mut out = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: AuditLine = serde_json::from_str(&line)?;
                let rec: ProviderAuditRecord = serde_json::from_value(parsed.record)?;
                if rec.correlation_id.as_str() == wanted {
                    out.push(rec);
                }
            }
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        })
        .await
        .map_err(|e| AuditLogError::Task(e.to_string()))?
    }

    fn label(&self) -> &'static str {
        "file"
    }
}

/// Replay the chain and return the final hash.
pub fn verify_log(path: impl AsRef<Path>) -> Result<String, AuditLogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut expected_prev = genesis_hash();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: AuditLine = serde_json::from_str(&line)?;
        if parsed.prev_hash != expected_prev {
            return Err(AuditLogError::HashMismatch {
                line: line_no,
                expected: expected_prev,
                got: parsed.prev_hash,
            });
        }
        let computed = compute_line_hash(&parsed.prev_hash, &parsed.record)?;
        if computed != parsed.hash {
            return Err(AuditLogError::HashMismatch {
                line: line_no,
                expected: computed,
                got: parsed.hash,
            });
        }
        expected_prev = parsed.hash;
    }

    Ok(expected_prev)
}
