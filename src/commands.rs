use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use crate::audit::log::{append_audit, list_audit};
use crate::backup;
use crate::categories;
use crate::db;
use crate::error::AppError;
use crate::expenses;
use crate::export;
use crate::import::{self, ImportOptions};
use crate::models::{
  AuditLogEntry, BackupReport, Category, CategoryInput, CategoryTotal, CategoryUpdateInput,
  Expense, ExpenseFilter, ExpenseInput, ExpenseListItem, ExpenseUpdateInput, ImportSummary,
  MonthlyTotal, Paginated, Settings,
};
use crate::reports;
use crate::settings;
use crate::AppState;

pub fn get_settings(app: &AppState) -> Result<Settings, AppError> {
  db::with_conn(&app.db, |conn| settings::get_settings(conn))
}

pub fn update_settings(
  app: &AppState,
  settings_input: Settings,
  actor: Option<String>,
) -> Result<Settings, AppError> {
  if !settings_input.backup_folder.trim().is_empty() {
    fs::create_dir_all(settings_input.backup_folder.trim())?;
  }

  db::with_conn(&app.db, |conn| {
    settings::update_settings(conn, &settings_input)?;
    append_audit(
      conn,
      actor,
      "UPDATE_SETTINGS",
      "SETTINGS",
      None,
      serde_json::to_string(&settings_input).unwrap_or_else(|_| "{}".to_string()),
      None,
    )?;
    Ok(settings_input)
  })
}

pub fn list_categories(app: &AppState) -> Result<Vec<Category>, AppError> {
  db::with_conn(&app.db, |conn| categories::list_categories(conn))
}

pub fn create_category(
  app: &Arc<AppState>,
  input: CategoryInput,
  actor: Option<String>,
) -> Result<Category, AppError> {
  let payload = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let category = db::with_conn(&app.db, |conn| {
    let category = categories::create_category(conn, input)?;
    append_audit(
      conn,
      actor,
      "CATEGORY_CREATE",
      "CATEGORY",
      Some(category.id.to_string()),
      payload,
      None,
    )?;
    Ok(category)
  })?;
  backup::schedule_debounced(app);
  Ok(category)
}

pub fn update_category(
  app: &Arc<AppState>,
  input: CategoryUpdateInput,
  actor: Option<String>,
) -> Result<Category, AppError> {
  let payload = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let category = db::with_conn(&app.db, |conn| {
    let category = categories::update_category(conn, input)?;
    append_audit(
      conn,
      actor,
      "CATEGORY_UPDATE",
      "CATEGORY",
      Some(category.id.to_string()),
      payload,
      None,
    )?;
    Ok(category)
  })?;
  backup::schedule_debounced(app);
  Ok(category)
}

pub fn delete_category(
  app: &Arc<AppState>,
  id: i64,
  actor: Option<String>,
) -> Result<(), AppError> {
  db::with_conn(&app.db, |conn| {
    categories::delete_category(conn, id)?;
    append_audit(
      conn,
      actor,
      "CATEGORY_DELETE",
      "CATEGORY",
      Some(id.to_string()),
      "{}".to_string(),
      None,
    )
  })?;
  backup::schedule_debounced(app);
  Ok(())
}

pub fn create_expense(
  app: &Arc<AppState>,
  input: ExpenseInput,
  actor: Option<String>,
) -> Result<Expense, AppError> {
  let payload = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let expense = db::with_conn(&app.db, |conn| {
    let expense = expenses::create_expense(conn, input)?;
    append_audit(
      conn,
      actor,
      "EXPENSE_CREATE",
      "EXPENSE",
      Some(expense.id.to_string()),
      payload,
      None,
    )?;
    Ok(expense)
  })?;
  backup::schedule_debounced(app);
  Ok(expense)
}

pub fn update_expense(
  app: &Arc<AppState>,
  input: ExpenseUpdateInput,
  actor: Option<String>,
) -> Result<Expense, AppError> {
  let payload = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
  let expense = db::with_conn(&app.db, |conn| {
    let expense = expenses::update_expense(conn, input)?;
    append_audit(
      conn,
      actor,
      "EXPENSE_UPDATE",
      "EXPENSE",
      Some(expense.id.to_string()),
      payload,
      None,
    )?;
    Ok(expense)
  })?;
  backup::schedule_debounced(app);
  Ok(expense)
}

pub fn delete_expense(app: &Arc<AppState>, id: i64, actor: Option<String>) -> Result<(), AppError> {
  db::with_conn(&app.db, |conn| {
    expenses::delete_expense(conn, id)?;
    append_audit(
      conn,
      actor,
      "EXPENSE_DELETE",
      "EXPENSE",
      Some(id.to_string()),
      "{}".to_string(),
      None,
    )
  })?;
  backup::schedule_debounced(app);
  Ok(())
}

pub fn list_expenses(app: &AppState, filter: ExpenseFilter) -> Result<Paginated<ExpenseListItem>, AppError> {
  db::with_conn(&app.db, |conn| expenses::list_expenses(conn, &filter))
}

pub fn search_expenses(app: &AppState, query: String, limit: i64) -> Result<Vec<ExpenseListItem>, AppError> {
  db::with_conn(&app.db, |conn| expenses::search_expenses(conn, &query, limit))
}

pub fn monthly_series(app: &AppState, year: i32) -> Result<Vec<MonthlyTotal>, AppError> {
  db::with_conn(&app.db, |conn| reports::monthly_series(conn, year))
}

pub fn category_rollup(app: &AppState, month: Option<String>) -> Result<Vec<CategoryTotal>, AppError> {
  db::with_conn(&app.db, |conn| reports::category_rollup(conn, month.as_deref()))
}

pub fn list_audit_log(app: &AppState, limit: i64) -> Result<Vec<AuditLogEntry>, AppError> {
  db::with_conn(&app.db, |conn| list_audit(conn, limit))
}

pub fn import_backup_file(
  app: &Arc<AppState>,
  path: &Path,
  actor: Option<String>,
  on_progress: impl FnMut(usize),
) -> Result<ImportSummary, AppError> {
  let file =
    File::open(path).map_err(|err| AppError::format(format!("Datei nicht lesbar: {err}")))?;
  let options = ImportOptions {
    actor,
    ..ImportOptions::default()
  };

  let summary = db::with_conn(&app.db, |conn| {
    import::import_backup(conn, file, &options, on_progress)
  })?;
  backup::schedule_debounced(app);
  Ok(summary)
}

pub fn export_csv_file(app: &AppState, path: &Path, actor: Option<String>) -> Result<usize, AppError> {
  db::with_conn(&app.db, |conn| {
    let rows = export::export_csv_file(conn, path)?;
    append_audit(
      conn,
      actor,
      "EXPORT",
      "EXPENSE",
      Some(path.to_string_lossy().to_string()),
      serde_json::to_string(&serde_json::json!({"rows": rows}))
        .unwrap_or_else(|_| "{}".to_string()),
      None,
    )?;
    Ok(rows)
  })
}

pub fn create_backup(app: &AppState) -> Result<BackupReport, AppError> {
  backup::perform_backup(app)
}
