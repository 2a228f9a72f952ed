use std::collections::HashMap;
use std::io::{Read, Seek};

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::audit::log::append_audit;
use crate::cache::LruCache;
use crate::categories::{self, DEFAULT_ICON};
use crate::csv;
use crate::db;
use crate::domain::validation;
use crate::error::AppError;
use crate::files::archive;
use crate::models::ImportSummary;

const RESOLVER_CACHE_CAPACITY: usize = 1000;

pub struct ImportOptions {
  pub progress_every: usize,
  pub actor: Option<String>,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self {
      progress_every: 100,
      actor: None,
    }
  }
}

struct Columns {
  date: usize,
  category: usize,
  amount: usize,
  id: Option<usize>,
  note: Option<usize>,
  category_icon: Option<usize>,
  created_at: Option<usize>,
}

impl Columns {
  fn from_header(header: &str) -> Result<Columns, AppError> {
    let fields = csv::parse_line(header);
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, name) in fields.iter().enumerate() {
      index.entry(name.trim().to_ascii_lowercase()).or_insert(i);
    }

    let required = |name: &str| {
      index
        .get(name)
        .copied()
        .ok_or_else(|| AppError::format(format!("Spalte '{name}' fehlt")))
    };

    Ok(Columns {
      date: required("date")?,
      category: required("category")?,
      amount: required("amount")?,
      id: index.get("id").copied(),
      note: index.get("note").copied(),
      category_icon: index.get("category_icon").copied(),
      created_at: index.get("created_at").copied(),
    })
  }

  fn max_required(&self) -> usize {
    self.date.max(self.category).max(self.amount)
  }
}

// Streams expenses from a plain CSV or a backup ZIP into the store. The
// whole row loop runs inside one transaction; any fatal error rolls
// everything back. Duplicate ids are counted as skipped, not errors.
pub fn import_backup<R, F>(
  conn: &mut Connection,
  reader: R,
  options: &ImportOptions,
  mut on_progress: F,
) -> Result<ImportSummary, AppError>
where
  R: Read + Seek + 'static,
  F: FnMut(usize),
{
  let (mut stream, is_zip) = archive::open_import_source(reader)?;

  let header = csv::read_record(&mut stream)?.ok_or_else(|| AppError::format("Datei ist leer"))?;
  let columns = Columns::from_header(&header)?;
  let progress_every = options.progress_every.max(1);

  let tx = conn.transaction()?;
  let mut resolver_cache: LruCache<String, i64> = LruCache::new(RESOLVER_CACHE_CAPACITY);
  let mut inserted = 0_i64;
  let mut skipped = 0_i64;
  let mut row_number = 0_usize;

  {
    let mut exists_stmt = tx.prepare("SELECT EXISTS(SELECT 1 FROM expenses WHERE id = ?1)")?;
    let mut insert_stmt = tx.prepare(
      "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_with_id_stmt = tx.prepare(
      "INSERT INTO expenses (id, amount, category_id, date, created_at, note) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    while let Some(record) = csv::read_record(&mut stream)? {
      row_number += 1;

      let fields = csv::parse_line(&record);
      if fields.len() <= columns.max_required() {
        return Err(AppError::row(row_number, "zu wenige Spalten"));
      }

      let date = fields[columns.date].trim();
      if !validation::is_date_shaped(date) {
        return Err(AppError::row(row_number, "ungueltiges Datum"));
      }

      let amount: i64 = match fields[columns.amount].trim().parse() {
        Ok(value) if value > 0 => value,
        _ => return Err(AppError::row(row_number, "ungueltiger Betrag")),
      };

      let file_id: Option<i64> = columns
        .id
        .and_then(|i| fields.get(i))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0);

      if let Some(id) = file_id {
        let exists: bool = exists_stmt.query_row(params![id], |row| row.get(0))?;
        if exists {
          skipped += 1;
          let processed = (inserted + skipped) as usize;
          if processed % progress_every == 0 {
            on_progress(processed);
          }
          continue;
        }
      }

      let path_key = fields[columns.category].trim().to_string();
      let default_icon = columns
        .category_icon
        .and_then(|i| fields.get(i))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ICON);

      let cached = resolver_cache.get(&path_key).copied();
      let category_id = match cached {
        Some(id) => id,
        None => {
          let category =
            categories::resolve_or_create(&tx, &path_key, default_icon).map_err(|err| match err {
              AppError::Validation(message) => AppError::row(row_number, message),
              other => other,
            })?;
          resolver_cache.insert(path_key, category.id);
          category.id
        }
      };

      let created_at = columns
        .created_at
        .and_then(|i| fields.get(i))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or_else(|| Utc::now().timestamp_millis());

      let note = columns
        .note
        .and_then(|i| fields.get(i))
        .map(|value| value.as_str())
        .filter(|value| !value.is_empty());

      match file_id {
        Some(id) => {
          insert_with_id_stmt.execute(params![id, amount, category_id, date, created_at, note])?
        }
        None => insert_stmt.execute(params![amount, category_id, date, created_at, note])?,
      };
      inserted += 1;

      let processed = (inserted + skipped) as usize;
      if processed % progress_every == 0 {
        on_progress(processed);
      }
    }
  }

  db::rebuild_caches(&tx)?;

  let payload = serde_json::to_string(&serde_json::json!({
    "inserted": inserted,
    "skipped": skipped,
    "zip": is_zip,
  }))
  .unwrap_or_else(|_| "{}".to_string());
  append_audit(&tx, options.actor.clone(), "IMPORT", "EXPENSE", None, payload, None)?;

  tx.commit()?;

  on_progress((inserted + skipped) as usize);
  log::info!("Import abgeschlossen: {inserted} neu, {skipped} uebersprungen");
  Ok(ImportSummary { inserted, skipped })
}
