use chrono::NaiveDate;

use crate::error::AppError;

pub const MAX_CATEGORY_DEPTH: usize = 3;
pub const PATH_SEPARATOR: &str = " > ";

pub fn is_date_shaped(date: &str) -> bool {
  let bytes = date.as_bytes();
  bytes.len() == 10
    && bytes
      .iter()
      .enumerate()
      .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() })
}

pub fn ensure_date_shape(date: &str) -> Result<(), AppError> {
  if is_date_shaped(date) {
    Ok(())
  } else {
    Err(AppError::validation("Datum muss YYYY-MM-DD sein"))
  }
}

pub fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
  ensure_date_shape(date)?;
  NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|_| AppError::validation("Datum muss YYYY-MM-DD sein"))
}

pub fn ensure_amount_positive(amount: i64) -> Result<(), AppError> {
  if amount <= 0 {
    Err(AppError::validation("Betrag muss > 0 sein"))
  } else {
    Ok(())
  }
}

pub fn validate_category_name(name: &str) -> Result<(), AppError> {
  if name.trim().is_empty() {
    return Err(AppError::validation("Kategoriename darf nicht leer sein"));
  }
  if name.contains('>') || name.contains('%') || name.contains('_') {
    return Err(AppError::validation(
      "Kategoriename darf '>', '%' und '_' nicht enthalten",
    ));
  }
  Ok(())
}
