use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Formatfehler: {0}")]
  Format(String),

  #[error("Ungueltige Eingabe: {0}")]
  Validation(String),

  #[error("Zeile {row}: {message}")]
  Row { row: usize, message: String },

  #[error("Zugriff auf das Backup-Ziel verloren: {0}")]
  Permission(String),

  #[error("Backup laeuft bereits")]
  BackupRunning,

  #[error("Datenbankfehler: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("IO-Fehler: {0}")]
  Io(#[from] std::io::Error),

  #[error("ZIP-Fehler: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("JSON-Fehler: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Datenbank-Lock fehlgeschlagen")]
  Lock,
}

impl AppError {
  pub fn format(message: impl Into<String>) -> Self {
    AppError::Format(message.into())
  }

  pub fn validation(message: impl Into<String>) -> Self {
    AppError::Validation(message.into())
  }

  pub fn row(row: usize, message: impl Into<String>) -> Self {
    AppError::Row {
      row,
      message: message.into(),
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      AppError::Format(_) => "FORMAT",
      AppError::Validation(_) => "VALIDATION",
      AppError::Row { .. } => "ROW",
      AppError::Permission(_) => "PERMISSION",
      AppError::BackupRunning => "BACKUP_RUNNING",
      AppError::Database(_) => "DB_ERROR",
      AppError::Io(_) => "IO_ERROR",
      AppError::Zip(_) => "ZIP_ERROR",
      AppError::Json(_) => "JSON_ERROR",
      AppError::Lock => "LOCK_ERROR",
    }
  }

  pub fn row_number(&self) -> Option<usize> {
    match self {
      AppError::Row { row, .. } => Some(*row),
      _ => None,
    }
  }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    AppError::Lock
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn row_errors_carry_their_line() {
    let err = AppError::row(7, "ungueltiger Betrag");
    assert_eq!(err.row_number(), Some(7));
    assert_eq!(err.code(), "ROW");
    assert_eq!(err.to_string(), "Zeile 7: ungueltiger Betrag");
  }

  #[test]
  fn file_level_errors_have_no_line() {
    assert_eq!(AppError::format("Datei ist leer").row_number(), None);
    assert_eq!(AppError::BackupRunning.code(), "BACKUP_RUNNING");
  }
}
