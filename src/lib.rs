pub mod audit;
pub mod backup;
pub mod cache;
pub mod categories;
pub mod commands;
pub mod csv;
pub mod db;
pub mod domain;
pub mod error;
pub mod expenses;
pub mod export;
pub mod files;
pub mod import;
pub mod models;
pub mod reports;
pub mod settings;

use std::path::{Path, PathBuf};

use backup::BackupState;
use db::Db;
use error::AppError;

pub struct AppState {
  pub db: Db,
  pub app_dir: PathBuf,
  pub backup: BackupState,
}

pub fn init(app_dir: &Path) -> Result<AppState, AppError> {
  let db = db::init_db(app_dir)?;
  Ok(AppState {
    db,
    app_dir: app_dir.to_path_buf(),
    backup: BackupState::new(),
  })
}
