use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::models::AuditLogEntry;

pub fn append_audit(
  conn: &Connection,
  actor: Option<String>,
  action: &str,
  entity_type: &str,
  entity_id: Option<String>,
  payload_json: String,
  details: Option<String>,
) -> Result<(), AppError> {
  let ts = Utc::now().to_rfc3339();
  conn.execute(
    "INSERT INTO audit_log (ts, actor, action, entity_type, entity_id, payload_json, details) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![ts, actor, action, entity_type, entity_id, payload_json, details],
  )?;
  Ok(())
}

pub fn list_audit(conn: &Connection, limit: i64) -> Result<Vec<AuditLogEntry>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT id, ts, actor, action, entity_type, entity_id, payload_json, details
     FROM audit_log
     ORDER BY id DESC
     LIMIT ?1",
  )?;
  let rows = stmt.query_map(params![limit.max(1)], |row| {
    Ok(AuditLogEntry {
      id: row.get(0)?,
      ts: row.get(1)?,
      actor: row.get(2)?,
      action: row.get(3)?,
      entity_type: row.get(4)?,
      entity_id: row.get(5)?,
      payload_json: row.get(6)?,
      details: row.get(7)?,
    })
  })?;

  let mut entries = Vec::new();
  for row in rows {
    entries.push(row?);
  }
  Ok(entries)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_conn;

  #[test]
  fn appended_entries_come_back_newest_first() {
    let conn = test_conn();
    append_audit(&conn, Some("test".into()), "IMPORT", "EXPENSE", None, "{}".into(), None).unwrap();
    append_audit(&conn, None, "BACKUP_CREATED", "BACKUP", Some("x.zip".into()), "{}".into(), None).unwrap();

    let entries = list_audit(&conn, 10).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "BACKUP_CREATED");
    assert_eq!(entries[1].action, "IMPORT");
    assert_eq!(entries[1].actor.as_deref(), Some("test"));
  }
}
