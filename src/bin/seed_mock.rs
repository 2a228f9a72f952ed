use std::path::PathBuf;

use chrono::{Datelike, Utc};
use rusqlite::{params, Connection};

use spesenbuch::categories;
use spesenbuch::db;
use spesenbuch::error::AppError;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  let count = std::env::args()
    .nth(1)
    .and_then(|value| value.parse::<usize>().ok())
    .unwrap_or(500);

  let app_dir = if let Ok(path) = std::env::var("SPESENBUCH_SEED_DIR") {
    PathBuf::from(path)
  } else {
    db::resolve_app_dir()?
  };

  let app = spesenbuch::init(&app_dir)?;
  let created = db::with_conn(&app.db, |conn| seed_mock_data(conn, count))?;

  println!("{} Ausgaben angelegt in {}", created, app_dir.display());
  Ok(())
}

fn seed_mock_data(conn: &mut Connection, count: usize) -> Result<usize, AppError> {
  let year = Utc::now().year();
  let mut rng = MockRng::new(Utc::now().timestamp_millis() as u64);

  let paths = [
    "Lebensmittel > Einkauf",
    "Lebensmittel > Restaurant",
    "Transport",
    "Wohnen > Strom",
    "Unterhaltung",
    "Gesundheit",
    "Einkaufen",
    "Diverses",
  ];
  let notes = [
    "Wochenmarkt",
    "Mittagessen",
    "Zugticket",
    "Abo",
    "Kino",
    "Apotheke",
    "Kleider",
    "",
  ];

  let tx = conn.transaction()?;

  let mut category_ids = Vec::new();
  for path in paths {
    category_ids.push(categories::resolve_or_create(&tx, path, categories::DEFAULT_ICON)?.id);
  }

  let mut stmt = tx.prepare(
    "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (?1, ?2, ?3, ?4, ?5)",
  )?;

  for _ in 0..count {
    let month = rng.next_u32() % 12 + 1;
    let day = rng.next_u32() % days_in_month(year, month) + 1;
    let date = format!("{year:04}-{month:02}-{day:02}");
    let amount = (rng.next_u32() % 15_000 + 100) as i64;
    let category_id = category_ids[(rng.next_u32() as usize) % category_ids.len()];
    let note = notes[(rng.next_u32() as usize) % notes.len()];
    let note = if note.is_empty() {
      None
    } else {
      Some(format!("Demo: {note}"))
    };

    stmt.execute(params![
      amount,
      category_id,
      date,
      Utc::now().timestamp_millis(),
      note
    ])?;
  }

  drop(stmt);
  db::rebuild_caches(&tx)?;
  tx.commit()?;
  Ok(count)
}

fn days_in_month(year: i32, month: u32) -> u32 {
  let next = if month == 12 {
    chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
  } else {
    chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
  };
  let next_date = next.unwrap_or_else(|| chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap());
  (next_date - chrono::Duration::days(1)).day()
}

struct MockRng {
  state: u64,
}

impl MockRng {
  fn new(seed: u64) -> Self {
    Self { state: seed }
  }

  fn next_u32(&mut self) -> u32 {
    self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
    (self.state >> 32) as u32
  }
}
