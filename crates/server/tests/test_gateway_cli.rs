use assert_cmd::prelude::*;
use fe_audit_log::{AuditSink, JsonlAuditSink};
use fe_audit_spec::{CorrelationId, ProviderAuditRecord};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn write_audit_log(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("logs").join("provider_audit.jsonl");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let sink = JsonlAuditSink::open(&path).unwrap();
        for (corr, status) in [("corr-1", 200), ("corr-2", 401)] {
            let mut rec = ProviderAuditRecord::new(
                CorrelationId(corr.into()),
                "numrot",
                "register_document",
                "POST",
                "https://numrot.example/api/documentos/registrar",
            );
            rec.status = Some(status);
            rec.body_resp = Some(serde_json::json!({ "lote": "L-1" }));
            sink.save(&rec).await.unwrap();
        }
    });
    path
}

fn gateway(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fe-gateway").unwrap();
    cmd.env_clear().current_dir(cwd);
    cmd
}

#[test]
fn verify_audit_prints_final_hash() {
    let dir = TempDir::new().unwrap();
    let log = write_audit_log(&dir);

    gateway(dir.path())
        .args(["verify-audit", "--audit-log"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256:"));
}

#[test]
fn verify_audit_rejects_tampered_log() {
    let dir = TempDir::new().unwrap();
    let log = write_audit_log(&dir);
    let text = fs::read_to_string(&log).unwrap();
    fs::write(&log, text.replace("\"status\":401", "\"status\":200")).unwrap();

    gateway(dir.path())
        .args(["verify-audit", "--audit-log"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("hash mismatch at line 2"));
}

#[test]
fn serve_refuses_to_start_without_issuer_identity() {
    let dir = TempDir::new().unwrap();

    gateway(dir.path())
        .env("NUMROT_BASE_URL", "http://127.0.0.1:9")
        .env("NUMROT_EMISOR_NIT", "860011153")
        .assert()
        .failure()
        .stderr(predicate::str::contains("NUMROT_RAZON_SOCIAL is required"));
}

#[test]
fn serve_rejects_unknown_environment_code() {
    let dir = TempDir::new().unwrap();

    gateway(dir.path())
        .arg("serve")
        .env("NUMROT_BASE_URL", "http://127.0.0.1:9")
        .env("NUMROT_EMISOR_NIT", "860011153")
        .env("NUMROT_RAZON_SOCIAL", "ACME S.A.S.")
        .env("CDO_AMBIENTE_DEFAULT", "3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CDO_AMBIENTE_DEFAULT"));
}
