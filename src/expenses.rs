use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::categories;
use crate::domain::validation;
use crate::error::AppError;
use crate::models::{Expense, ExpenseFilter, ExpenseInput, ExpenseListItem, ExpenseUpdateInput, Paginated};
use crate::reports;

pub fn create_expense(conn: &mut Connection, input: ExpenseInput) -> Result<Expense, AppError> {
  validation::parse_date(&input.date)?;
  validation::ensure_amount_positive(input.amount)?;
  categories::get_category(conn, input.category_id)?;

  let tx = conn.transaction()?;
  let created_at = Utc::now().timestamp_millis();
  tx.execute(
    "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (?1, ?2, ?3, ?4, ?5)",
    params![input.amount, input.category_id, input.date, created_at, input.note],
  )?;
  let id = tx.last_insert_rowid();
  reports::rebuild_monthly_totals(&tx)?;
  tx.commit()?;

  Ok(Expense {
    id,
    amount: input.amount,
    category_id: input.category_id,
    date: input.date,
    created_at,
    note: input.note,
  })
}

pub fn update_expense(conn: &mut Connection, input: ExpenseUpdateInput) -> Result<Expense, AppError> {
  validation::parse_date(&input.date)?;
  validation::ensure_amount_positive(input.amount)?;
  categories::get_category(conn, input.category_id)?;
  let existing = get_expense(conn, input.id)?;

  let tx = conn.transaction()?;
  tx.execute(
    "UPDATE expenses SET amount = ?1, category_id = ?2, date = ?3, note = ?4 WHERE id = ?5",
    params![input.amount, input.category_id, input.date, input.note, input.id],
  )?;
  reports::rebuild_monthly_totals(&tx)?;
  tx.commit()?;

  Ok(Expense {
    id: input.id,
    amount: input.amount,
    category_id: input.category_id,
    date: input.date,
    created_at: existing.created_at,
    note: input.note,
  })
}

pub fn delete_expense(conn: &mut Connection, id: i64) -> Result<(), AppError> {
  get_expense(conn, id)?;

  let tx = conn.transaction()?;
  tx.execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
  reports::rebuild_monthly_totals(&tx)?;
  tx.commit()?;
  Ok(())
}

pub fn get_expense(conn: &Connection, id: i64) -> Result<Expense, AppError> {
  conn
    .query_row(
      "SELECT id, amount, category_id, date, created_at, note FROM expenses WHERE id = ?1",
      params![id],
      |row| {
        Ok(Expense {
          id: row.get(0)?,
          amount: row.get(1)?,
          category_id: row.get(2)?,
          date: row.get(3)?,
          created_at: row.get(4)?,
          note: row.get(5)?,
        })
      },
    )
    .optional()?
    .ok_or_else(|| AppError::validation("Ausgabe nicht gefunden"))
}

pub fn count_expenses(conn: &Connection) -> Result<i64, AppError> {
  let count = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
  Ok(count)
}

pub fn list_expenses(conn: &Connection, filter: &ExpenseFilter) -> Result<Paginated<ExpenseListItem>, AppError> {
  let mut conditions = String::new();
  let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

  if let Some(month) = &filter.month {
    conditions.push_str(" AND e.date LIKE ?");
    args.push(Box::new(format!("{month}%")));
  }
  if let Some(category_id) = filter.category_id {
    conditions.push_str(" AND e.category_id = ?");
    args.push(Box::new(category_id));
  }

  let count_sql = format!("SELECT COUNT(*) FROM expenses e WHERE 1=1{conditions}");
  let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|arg| arg.as_ref()).collect();
  let total: i64 = conn.query_row(&count_sql, arg_refs.as_slice(), |row| row.get(0))?;

  let page_size = filter.page_size.clamp(1, 500);
  let offset = filter.page.max(0) * page_size;
  let list_sql = format!(
    "SELECT e.id, e.amount, e.date, e.created_at, e.note, c.id, c.name, c.full_path, c.icon
     FROM expenses e
     JOIN categories c ON c.id = e.category_id
     WHERE 1=1{conditions}
     ORDER BY e.date DESC, e.created_at DESC
     LIMIT ? OFFSET ?"
  );
  let mut args = args;
  args.push(Box::new(page_size));
  args.push(Box::new(offset));
  let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|arg| arg.as_ref()).collect();

  let mut stmt = conn.prepare(&list_sql)?;
  let rows = stmt.query_map(arg_refs.as_slice(), map_list_item)?;

  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(Paginated { total, items })
}

pub fn search_expenses(conn: &Connection, query: &str, limit: i64) -> Result<Vec<ExpenseListItem>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT e.id, e.amount, e.date, e.created_at, e.note, c.id, c.name, c.full_path, c.icon
     FROM expense_fts f
     JOIN expenses e ON e.id = f.rowid
     JOIN categories c ON c.id = e.category_id
     WHERE expense_fts MATCH ?1
     ORDER BY bm25(expense_fts), e.date DESC
     LIMIT ?2",
  )?;
  let rows = stmt.query_map(params![query, limit.clamp(1, 500)], map_list_item)?;

  let mut items = Vec::new();
  for row in rows {
    items.push(row?);
  }
  Ok(items)
}

pub fn rebuild_search_index(conn: &Connection) -> Result<(), AppError> {
  conn.execute("INSERT INTO expense_fts (expense_fts) VALUES ('rebuild')", [])?;
  Ok(())
}

fn map_list_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExpenseListItem> {
  Ok(ExpenseListItem {
    id: row.get(0)?,
    amount: row.get(1)?,
    date: row.get(2)?,
    created_at: row.get(3)?,
    note: row.get(4)?,
    category_id: row.get(5)?,
    category_name: row.get(6)?,
    category_path: row.get(7)?,
    category_icon: row.get(8)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_conn;

  fn seeded_category(conn: &Connection) -> i64 {
    categories::resolve_or_create(conn, "Lebensmittel > Einkauf", categories::DEFAULT_ICON)
      .unwrap()
      .id
  }

  #[test]
  fn create_validates_input() {
    let mut conn = test_conn();
    let category_id = seeded_category(&conn);

    let bad_amount = create_expense(
      &mut conn,
      ExpenseInput {
        amount: 0,
        category_id,
        date: "2024-03-01".to_string(),
        note: None,
      },
    );
    assert!(bad_amount.is_err());

    let bad_date = create_expense(
      &mut conn,
      ExpenseInput {
        amount: 100,
        category_id,
        date: "01.03.2024".to_string(),
        note: None,
      },
    );
    assert!(bad_date.is_err());
    assert_eq!(count_expenses(&conn).unwrap(), 0);
  }

  #[test]
  fn create_updates_monthly_totals() {
    let mut conn = test_conn();
    let category_id = seeded_category(&conn);

    create_expense(
      &mut conn,
      ExpenseInput {
        amount: 450,
        category_id,
        date: "2024-03-01".to_string(),
        note: Some("Brot".to_string()),
      },
    )
    .unwrap();
    create_expense(
      &mut conn,
      ExpenseInput {
        amount: 550,
        category_id,
        date: "2024-03-15".to_string(),
        note: None,
      },
    )
    .unwrap();

    let total: i64 = conn
      .query_row(
        "SELECT total FROM monthly_totals WHERE month = '2024-03'",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(total, 1000);
  }

  #[test]
  fn list_filters_by_month_newest_first() {
    let mut conn = test_conn();
    let category_id = seeded_category(&conn);
    for (date, amount) in [("2024-02-28", 100), ("2024-03-01", 200), ("2024-03-20", 300)] {
      create_expense(
        &mut conn,
        ExpenseInput {
          amount,
          category_id,
          date: date.to_string(),
          note: None,
        },
      )
      .unwrap();
    }

    let page = list_expenses(
      &conn,
      &ExpenseFilter {
        month: Some("2024-03".to_string()),
        category_id: None,
        page: 0,
        page_size: 10,
      },
    )
    .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].date, "2024-03-20");
    assert_eq!(page.items[1].date, "2024-03-01");
    assert_eq!(page.items[0].category_path, "Lebensmittel > Einkauf");
  }

  #[test]
  fn search_finds_notes_via_fts() {
    let mut conn = test_conn();
    let category_id = seeded_category(&conn);
    create_expense(
      &mut conn,
      ExpenseInput {
        amount: 1250,
        category_id,
        date: "2024-03-01".to_string(),
        note: Some("Wochenmarkt Gemuese".to_string()),
      },
    )
    .unwrap();
    create_expense(
      &mut conn,
      ExpenseInput {
        amount: 900,
        category_id,
        date: "2024-03-02".to_string(),
        note: Some("Kino".to_string()),
      },
    )
    .unwrap();

    let hits = search_expenses(&conn, "Gemuese", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].amount, 1250);
  }

  #[test]
  fn delete_removes_row_and_totals() {
    let mut conn = test_conn();
    let category_id = seeded_category(&conn);
    let expense = create_expense(
      &mut conn,
      ExpenseInput {
        amount: 700,
        category_id,
        date: "2024-04-01".to_string(),
        note: Some("Testkauf".to_string()),
      },
    )
    .unwrap();

    delete_expense(&mut conn, expense.id).unwrap();
    assert_eq!(count_expenses(&conn).unwrap(), 0);
    let months: i64 = conn
      .query_row("SELECT COUNT(*) FROM monthly_totals", [], |row| row.get(0))
      .unwrap();
    assert_eq!(months, 0);
    assert!(search_expenses(&conn, "Testkauf", 10).unwrap().is_empty());
  }
}
