use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use rusqlite::Connection;

use crate::csv;
use crate::db::SCHEMA_VERSION;
use crate::error::AppError;
use crate::models::{BackupMetadata, Category, ExportRow};

pub const EXPENSES_HEADER: &str = "id,date,category,category_icon,amount,note,created_at";
pub const CATEGORIES_HEADER: &str = "id,name,icon,parent_path,full_path";

// Oldest first, the reverse of the UI list order.
pub fn export_all(conn: &Connection) -> Result<Vec<ExportRow>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT e.id, e.date, c.full_path, c.icon, e.amount, e.note, e.created_at
     FROM expenses e
     JOIN categories c ON c.id = e.category_id
     ORDER BY e.date ASC, e.created_at ASC",
  )?;
  let rows = stmt.query_map([], |row| {
    Ok(ExportRow {
      id: row.get(0)?,
      date: row.get(1)?,
      category_path: row.get(2)?,
      category_icon: row.get(3)?,
      amount: row.get(4)?,
      note: row.get(5)?,
      created_at: row.get(6)?,
    })
  })?;

  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

pub fn write_expenses_csv<W: Write>(writer: &mut W, rows: &[ExportRow]) -> Result<(), AppError> {
  writeln!(writer, "{EXPENSES_HEADER}")?;
  for row in rows {
    let id = row.id.to_string();
    let amount = row.amount.to_string();
    let created_at = row.created_at.to_string();
    let line = csv::write_row(&[
      &id,
      &row.date,
      &row.category_path,
      &row.category_icon,
      &amount,
      row.note.as_deref().unwrap_or(""),
      &created_at,
    ]);
    writeln!(writer, "{line}")?;
  }
  Ok(())
}

pub fn write_categories_csv<W: Write>(writer: &mut W, categories: &[Category]) -> Result<(), AppError> {
  writeln!(writer, "{CATEGORIES_HEADER}")?;
  for category in categories {
    let id = category.id.to_string();
    let parent = crate::categories::parent_path(&category.full_path).unwrap_or("");
    let line = csv::write_row(&[
      &id,
      &category.name,
      &category.icon,
      parent,
      &category.full_path,
    ]);
    writeln!(writer, "{line}")?;
  }
  Ok(())
}

pub fn build_metadata(conn: &Connection) -> Result<BackupMetadata, AppError> {
  let expense_count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
  let category_count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;

  Ok(BackupMetadata {
    app_version: env!("CARGO_PKG_VERSION").to_string(),
    schema_version: SCHEMA_VERSION,
    export_timestamp: Utc::now().timestamp_millis(),
    expense_count,
    category_count,
  })
}

pub fn export_csv_file(conn: &Connection, path: &Path) -> Result<usize, AppError> {
  let rows = export_all(conn)?;
  let file = File::create(path)?;
  let mut writer = BufWriter::new(file);
  write_expenses_csv(&mut writer, &rows)?;
  writer.flush()?;
  Ok(rows.len())
}
