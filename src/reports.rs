use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::models::{CategoryTotal, MonthlyTotal};

// Full recompute of the monthly rollup cache. Runs inside the caller's
// transaction when one is open.
pub fn rebuild_monthly_totals(conn: &Connection) -> Result<(), AppError> {
  conn.execute("DELETE FROM monthly_totals", [])?;
  conn.execute(
    "INSERT INTO monthly_totals (month, total)
     SELECT substr(date, 1, 7), SUM(amount) FROM expenses GROUP BY substr(date, 1, 7)",
    [],
  )?;
  Ok(())
}

pub fn monthly_series(conn: &Connection, year: i32) -> Result<Vec<MonthlyTotal>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT month, total FROM monthly_totals WHERE month LIKE ?1 ORDER BY month",
  )?;
  let rows = stmt.query_map(params![format!("{year:04}-%")], |row| {
    Ok(MonthlyTotal {
      month: row.get(0)?,
      total: row.get(1)?,
    })
  })?;

  let mut series = Vec::new();
  for row in rows {
    series.push(row?);
  }
  Ok(series)
}

// Spending grouped under each root category, derived from the materialized
// path (everything before the first " > ").
pub fn category_rollup(conn: &Connection, month: Option<&str>) -> Result<Vec<CategoryTotal>, AppError> {
  let sql = "SELECT
      CASE WHEN instr(c.full_path, ' > ') > 0
           THEN substr(c.full_path, 1, instr(c.full_path, ' > ') - 1)
           ELSE c.full_path END AS root,
      SUM(e.amount)
     FROM expenses e
     JOIN categories c ON c.id = e.category_id
     WHERE ?1 IS NULL OR e.date LIKE ?1 || '%'
     GROUP BY root
     ORDER BY SUM(e.amount) DESC";

  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(params![month], |row| {
    Ok(CategoryTotal {
      category: row.get(0)?,
      total: row.get(1)?,
    })
  })?;

  let mut totals = Vec::new();
  for row in rows {
    totals.push(row?);
  }
  Ok(totals)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::categories;
  use crate::db::test_conn;

  fn insert_expense(conn: &Connection, path: &str, date: &str, amount: i64) {
    let category =
      categories::resolve_or_create(conn, path, categories::DEFAULT_ICON).unwrap();
    conn
      .execute(
        "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (?1, ?2, ?3, 0, NULL)",
        params![amount, category.id, date],
      )
      .unwrap();
  }

  #[test]
  fn monthly_series_reads_the_rollup_cache() {
    let conn = test_conn();
    insert_expense(&conn, "Essen", "2024-01-10", 100);
    insert_expense(&conn, "Essen", "2024-01-20", 250);
    insert_expense(&conn, "Essen", "2024-02-01", 400);
    insert_expense(&conn, "Essen", "2023-12-31", 999);
    rebuild_monthly_totals(&conn).unwrap();

    let series = monthly_series(&conn, 2024).unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].month, "2024-01");
    assert_eq!(series[0].total, 350);
    assert_eq!(series[1].month, "2024-02");
    assert_eq!(series[1].total, 400);
  }

  #[test]
  fn category_rollup_groups_under_root() {
    let conn = test_conn();
    insert_expense(&conn, "Essen > Snacks > Chips", "2024-01-10", 100);
    insert_expense(&conn, "Essen > Restaurant", "2024-01-11", 200);
    insert_expense(&conn, "Transport", "2024-01-12", 50);

    let totals = category_rollup(&conn, Some("2024-01")).unwrap();
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].category, "Essen");
    assert_eq!(totals[0].total, 300);
    assert_eq!(totals[1].category, "Transport");
    assert_eq!(totals[1].total, 50);

    let none = category_rollup(&conn, Some("2024-02")).unwrap();
    assert!(none.is_empty());
  }
}
