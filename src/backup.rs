use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};

use crate::audit::log::append_audit;
use crate::db;
use crate::error::AppError;
use crate::files::archive;
use crate::models::BackupReport;
use crate::settings;
use crate::AppState;

const DEBOUNCE_DELAY: Duration = Duration::from_secs(120);
const RETRY_DELAY: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;
const KEEP_ARCHIVES: usize = 10;
const ARCHIVE_PREFIX: &str = "spesenbuch_";

pub struct BackupState {
  running: AtomicBool,
  debounce_generation: AtomicU64,
}

impl BackupState {
  pub fn new() -> Self {
    Self {
      running: AtomicBool::new(false),
      debounce_generation: AtomicU64::new(0),
    }
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }
}

impl Default for BackupState {
  fn default() -> Self {
    Self::new()
  }
}

// Non-reentrant: a second caller fails fast instead of queueing.
pub fn perform_backup(app: &AppState) -> Result<BackupReport, AppError> {
  if app.backup.running.swap(true, Ordering::SeqCst) {
    return Err(AppError::BackupRunning);
  }

  let result = run_backup(app);
  app.backup.running.store(false, Ordering::SeqCst);

  match &result {
    Ok(report) => log::info!("Backup erstellt: {}", report.archive_path),
    Err(err) => log::warn!("Backup fehlgeschlagen: {err}"),
  }
  result
}

fn run_backup(app: &AppState) -> Result<BackupReport, AppError> {
  let current = db::with_conn(&app.db, |conn| settings::get_settings(conn))?;
  if current.backup_folder.trim().is_empty() {
    return Err(AppError::validation("Kein Backup-Ordner konfiguriert"));
  }

  let folder = PathBuf::from(current.backup_folder.trim());
  fs::create_dir_all(&folder).map_err(map_destination_error)?;

  let stamp = Utc::now().format("%Y%m%d_%H%M%S");
  let archive_path = folder.join(format!("{ARCHIVE_PREFIX}{stamp}.zip"));
  let file = File::create(&archive_path).map_err(map_destination_error)?;

  let finished_at = db::with_conn(&app.db, |conn| {
    let metadata = archive::write_backup_archive(conn, file)?;
    let now = Utc::now().timestamp_millis();
    settings::set_last_backup(conn, now)?;

    let payload = serde_json::to_string(&serde_json::json!({
      "path": archive_path.to_string_lossy(),
      "expenseCount": metadata.expense_count,
      "categoryCount": metadata.category_count,
    }))
    .unwrap_or_else(|_| "{}".to_string());
    append_audit(
      conn,
      None,
      "BACKUP_CREATED",
      "BACKUP",
      Some(archive_path.to_string_lossy().to_string()),
      payload,
      None,
    )?;
    Ok(now)
  })?;

  if let Err(err) = prune_old_archives(&folder) {
    log::warn!("Alte Backups konnten nicht aufgeraeumt werden: {err}");
  }

  Ok(BackupReport {
    archive_path: archive_path.to_string_lossy().to_string(),
    finished_at,
  })
}

pub fn schedule_debounced(app: &Arc<AppState>) {
  schedule_after(app, DEBOUNCE_DELAY);
}

// Trailing-edge debounce: every call bumps the generation, so earlier timers
// wake up stale and do nothing.
pub fn schedule_after(app: &Arc<AppState>, delay: Duration) {
  let generation = app.backup.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
  let app = Arc::clone(app);

  std::thread::spawn(move || {
    std::thread::sleep(delay);
    if app.backup.debounce_generation.load(Ordering::SeqCst) != generation {
      return;
    }
    if let Err(err) = perform_backup(&app) {
      log::warn!("Automatisches Backup fehlgeschlagen: {err}");
    }
  });
}

pub fn start_nightly_backup(app: Arc<AppState>) {
  std::thread::spawn(move || loop {
    let hour = match db::with_conn(&app.db, |conn| settings::get_settings(conn)) {
      Ok(current) => current.backup_hour,
      Err(err) => {
        log::warn!("Einstellungen nicht lesbar: {err}");
        std::thread::sleep(Duration::from_secs(3600));
        continue;
      }
    };

    let wait = secs_until_hour(Local::now(), hour);
    std::thread::sleep(Duration::from_secs(wait));

    match db::with_conn(&app.db, |conn| settings::get_settings(conn)) {
      Ok(current) if current.backup_enabled => run_with_retries(&app),
      Ok(_) => {}
      Err(err) => log::warn!("Einstellungen nicht lesbar: {err}"),
    }
  });
}

// Permission loss does not self-heal, so it is never retried; a backup that
// is already running counts as handled.
fn run_with_retries(app: &AppState) {
  for attempt in 0..=MAX_RETRIES {
    match perform_backup(app) {
      Ok(_) => return,
      Err(AppError::BackupRunning) => return,
      Err(AppError::Permission(message)) => {
        log::warn!("Backup-Ziel nicht mehr erreichbar: {message}");
        record_failure(app, "PERMISSION", &message);
        return;
      }
      Err(err) if attempt < MAX_RETRIES => {
        log::warn!("Backup-Versuch {} fehlgeschlagen: {err}", attempt + 1);
        std::thread::sleep(RETRY_DELAY);
      }
      Err(err) => {
        log::warn!("Backup nach {} Versuchen aufgegeben: {err}", MAX_RETRIES + 1);
        record_failure(app, err.code(), &err.to_string());
      }
    }
  }
}

fn record_failure(app: &AppState, code: &str, message: &str) {
  let payload = serde_json::to_string(&serde_json::json!({"code": code, "message": message}))
    .unwrap_or_else(|_| "{}".to_string());
  let logged = db::with_conn(&app.db, |conn| {
    append_audit(conn, None, "BACKUP_FAILED", "BACKUP", None, payload, None)
  });
  if let Err(err) = logged {
    log::warn!("Backup-Fehler konnte nicht protokolliert werden: {err}");
  }
}

pub fn secs_until_hour(now: DateTime<Local>, hour: u32) -> u64 {
  let now_naive = now.naive_local();
  let target_time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
  let mut target = now_naive.date().and_time(target_time);
  if target <= now_naive {
    target += chrono::Duration::days(1);
  }
  (target - now_naive).num_seconds().max(1) as u64
}

fn map_destination_error(err: io::Error) -> AppError {
  if err.kind() == io::ErrorKind::PermissionDenied {
    AppError::Permission(err.to_string())
  } else {
    AppError::Io(err)
  }
}

fn prune_old_archives(folder: &Path) -> Result<(), AppError> {
  let mut archives: Vec<PathBuf> = Vec::new();
  for entry in fs::read_dir(folder)? {
    let entry = entry?;
    let name = entry.file_name().to_string_lossy().to_string();
    if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".zip") && entry.file_type()?.is_file() {
      archives.push(entry.path());
    }
  }

  // the timestamp in the name sorts chronologically
  archives.sort();
  if archives.len() > KEEP_ARCHIVES {
    for path in archives.iter().take(archives.len() - KEEP_ARCHIVES) {
      fs::remove_file(path)?;
    }
  }
  Ok(())
}
