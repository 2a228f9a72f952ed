use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::models::Settings;

const KEY_BACKUP_FOLDER: &str = "backup_folder";
const KEY_BACKUP_HOUR: &str = "backup_hour";
const KEY_BACKUP_ENABLED: &str = "backup_enabled";
const KEY_NOTIFY_FAILURE: &str = "notify_backup_failure";
const KEY_LAST_BACKUP: &str = "last_backup_at";

pub fn ensure_defaults(conn: &Connection) -> Result<(), AppError> {
  conn.execute(
    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_FOLDER, ""],
  )?;
  conn.execute(
    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_HOUR, "2"],
  )?;
  conn.execute(
    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_ENABLED, "1"],
  )?;
  conn.execute(
    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_NOTIFY_FAILURE, "0"],
  )?;
  Ok(())
}

pub fn get_settings(conn: &Connection) -> Result<Settings, AppError> {
  let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
  let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

  let mut backup_folder = String::new();
  let mut backup_hour = 2_u32;
  let mut backup_enabled = true;
  let mut notify_backup_failure = false;
  let mut last_backup_at = None;

  for row in rows {
    let (key, value) = row?;
    match key.as_str() {
      KEY_BACKUP_FOLDER => {
        backup_folder = value;
      }
      KEY_BACKUP_HOUR => {
        backup_hour = value.parse().unwrap_or(backup_hour);
      }
      KEY_BACKUP_ENABLED => {
        backup_enabled = value == "1";
      }
      KEY_NOTIFY_FAILURE => {
        notify_backup_failure = value == "1";
      }
      KEY_LAST_BACKUP => {
        last_backup_at = value.parse().ok();
      }
      _ => {}
    }
  }

  Ok(Settings {
    backup_folder,
    backup_hour: backup_hour.min(23),
    backup_enabled,
    notify_backup_failure,
    last_backup_at,
  })
}

pub fn update_settings(conn: &Connection, settings: &Settings) -> Result<(), AppError> {
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_FOLDER, settings.backup_folder.clone()],
  )?;
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_HOUR, settings.backup_hour.min(23).to_string()],
  )?;
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_BACKUP_ENABLED, if settings.backup_enabled { "1" } else { "0" }],
  )?;
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_NOTIFY_FAILURE, if settings.notify_backup_failure { "1" } else { "0" }],
  )?;
  Ok(())
}

pub fn set_last_backup(conn: &Connection, timestamp: i64) -> Result<(), AppError> {
  conn.execute(
    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
    params![KEY_LAST_BACKUP, timestamp.to_string()],
  )?;
  Ok(())
}
