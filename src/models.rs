use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
  pub backup_folder: String,
  pub backup_hour: u32,
  pub backup_enabled: bool,
  pub notify_backup_failure: bool,
  pub last_backup_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
  pub id: i64,
  pub name: String,
  pub icon: String,
  pub parent_id: Option<i64>,
  pub full_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryInput {
  pub name: String,
  pub icon: Option<String>,
  pub parent_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryUpdateInput {
  pub id: i64,
  pub name: String,
  pub icon: String,
  pub parent_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Expense {
  pub id: i64,
  pub amount: i64,
  pub category_id: i64,
  pub date: String,
  pub created_at: i64,
  pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExpenseInput {
  pub amount: i64,
  pub category_id: i64,
  pub date: String,
  pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExpenseUpdateInput {
  pub id: i64,
  pub amount: i64,
  pub category_id: i64,
  pub date: String,
  pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpenseListItem {
  pub id: i64,
  pub amount: i64,
  pub date: String,
  pub created_at: i64,
  pub note: Option<String>,
  pub category_id: i64,
  pub category_name: String,
  pub category_path: String,
  pub category_icon: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpenseFilter {
  pub month: Option<String>,
  pub category_id: Option<i64>,
  pub page: i64,
  pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub total: i64,
  pub items: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExportRow {
  pub id: i64,
  pub date: String,
  pub category_path: String,
  pub category_icon: String,
  pub amount: i64,
  pub note: Option<String>,
  pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
  pub app_version: String,
  pub schema_version: i64,
  pub export_timestamp: i64,
  pub expense_count: i64,
  pub category_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImportSummary {
  pub inserted: i64,
  pub skipped: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupReport {
  pub archive_path: String,
  pub finished_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonthlyTotal {
  pub month: String,
  pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryTotal {
  pub category: String,
  pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub id: i64,
  pub ts: String,
  pub actor: Option<String>,
  pub action: String,
  pub entity_type: String,
  pub entity_id: Option<String>,
  pub payload_json: String,
  pub details: Option<String>,
}
