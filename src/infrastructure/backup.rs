use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Periodically snapshots the audit database to a timestamped file plus a
/// SHA-256 sidecar, and prunes snapshots past the retention window (spec
/// §4.15), grounded in the original `packages/audit_backup` module.
pub struct BackupService {
    source_log_path: PathBuf,
    backup_dir: PathBuf,
    retention: chrono::Duration,
}

impl BackupService {
    pub fn new(source_log_path: PathBuf, backup_dir: PathBuf, retention: chrono::Duration) -> Self {
        Self {
            source_log_path,
            backup_dir,
            retention,
        }
    }

    /// Copy the source audit log to `audit_YYYYMMDD_HHMMSS.jsonl` and write a
    /// `.sha256` sidecar alongside it.
    pub async fn run_backup(&self, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.backup_dir)?;

        let filename = format!("audit_{}.jsonl", now.format("%Y%m%d_%H%M%S"));
        let dest = self.backup_dir.join(&filename);
        std::fs::copy(&self.source_log_path, &dest)?;

        let digest = hash_file(&dest)?;
        std::fs::write(dest.with_extension("jsonl.sha256"), format!("{digest}  {filename}\n"))?;

        self.prune_expired(now)?;
        Ok(dest)
    }

    pub fn verify(&self, backup_path: &Path) -> anyhow::Result<bool> {
        let sidecar = backup_path.with_extension("jsonl.sha256");
        let recorded = std::fs::read_to_string(&sidecar)?;
        let recorded_digest = recorded.split_whitespace().next().unwrap_or_default();
        let actual_digest = hash_file(backup_path)?;
        Ok(recorded_digest == actual_digest)
    }

    pub fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let cutoff = now - self.retention;
        for entry in std::fs::read_dir(&self.backup_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(stem) = backup_timestamp(&path) else {
                continue;
            };
            if stem < cutoff {
                let _ = std::fs::remove_file(&path);
                let _ = std::fs::remove_file(path.with_extension("jsonl.sha256"));
            }
        }
        Ok(())
    }
}

fn backup_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?;
    let ts_part = stem.strip_prefix("audit_")?;
    let naive = chrono::NaiveDateTime::parse_from_str(ts_part, "%Y%m%d_%H%M%S").ok()?;
    Some(naive.and_utc())
}

fn hash_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backup_produces_log_and_sidecar_that_verify() {
        let tmp = std::env::temp_dir().join(format!("backup-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&tmp).unwrap();
        let source = tmp.join("audit.jsonl");
        std::fs::write(&source, b"{\"event_type\":\"ORDER_SUBMITTED\"}\n").unwrap();
        let backup_dir = tmp.join("backups");

        let service = BackupService::new(source, backup_dir, chrono::Duration::days(30));
        let now = Utc::now();
        let backup_path = service.run_backup(now).await.unwrap();

        assert!(backup_path.exists());
        assert!(service.verify(&backup_path).unwrap());

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn prune_removes_backups_past_retention() {
        let tmp = std::env::temp_dir().join(format!("backup-prune-{}", uuid::Uuid::new_v4()));
        let backup_dir = tmp.join("backups");
        std::fs::create_dir_all(&backup_dir).unwrap();
        let source = tmp.join("audit.jsonl");
        std::fs::write(&source, b"{\"event_type\":\"ORDER_SUBMITTED\"}\n").unwrap();

        let service = BackupService::new(source, backup_dir.clone(), chrono::Duration::days(1));
        let old_time = Utc::now() - chrono::Duration::days(10);
        let stale_filename = format!("audit_{}.jsonl", old_time.format("%Y%m%d_%H%M%S"));
        std::fs::write(backup_dir.join(&stale_filename), b"stale").unwrap();
        std::fs::write(backup_dir.join(format!("{stale_filename}.sha256")), b"deadbeef  stale\n").unwrap();

        service.prune_expired(Utc::now()).unwrap();

        let remaining: Vec<_> = std::fs::read_dir(&backup_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
            .collect();
        assert!(remaining.is_empty());

        std::fs::remove_dir_all(&tmp).ok();
    }
}
