use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::validation::{self, MAX_CATEGORY_DEPTH, PATH_SEPARATOR};
use crate::error::AppError;
use crate::models::{Category, CategoryInput, CategoryUpdateInput};

pub const DEFAULT_ICON: &str = "folder";

const KNOWN_ICONS: &[&str] = &[
  "folder",
  "restaurant",
  "cart",
  "car",
  "home",
  "movie",
  "heart",
  "school",
  "briefcase",
  "gift",
  "bolt",
  "phone",
];

const CANONICAL_ICONS: &[(&str, &str)] = &[
  ("Lebensmittel", "restaurant"),
  ("Lebensmittel > Restaurant", "restaurant"),
  ("Lebensmittel > Einkauf", "cart"),
  ("Transport", "car"),
  ("Wohnen", "home"),
  ("Wohnen > Strom", "bolt"),
  ("Unterhaltung", "movie"),
  ("Gesundheit", "heart"),
  ("Einkaufen", "cart"),
  ("Bildung", "school"),
  ("Arbeit", "briefcase"),
  ("Arbeit > Handy", "phone"),
  ("Geschenke", "gift"),
  ("Diverses", "folder"),
];

const SEED_ROOTS: &[&str] = &[
  "Lebensmittel",
  "Transport",
  "Wohnen",
  "Unterhaltung",
  "Gesundheit",
  "Einkaufen",
  "Bildung",
  "Arbeit",
  "Diverses",
];

pub fn normalize_icon(icon: &str) -> &str {
  if KNOWN_ICONS.contains(&icon) {
    icon
  } else {
    DEFAULT_ICON
  }
}

pub fn canonical_icon(full_path: &str) -> Option<&'static str> {
  CANONICAL_ICONS
    .iter()
    .find(|(path, _)| *path == full_path)
    .map(|(_, icon)| *icon)
}

pub fn path_depth(full_path: &str) -> usize {
  full_path.matches(PATH_SEPARATOR).count() + 1
}

pub fn parent_path(full_path: &str) -> Option<&str> {
  full_path.rsplit_once(PATH_SEPARATOR).map(|(parent, _)| parent)
}

pub fn seed_defaults(conn: &Connection) -> Result<(), AppError> {
  let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
  if count > 0 {
    return Ok(());
  }

  for name in SEED_ROOTS {
    let icon = canonical_icon(name).unwrap_or(DEFAULT_ICON);
    conn.execute(
      "INSERT INTO categories (name, icon, parent_id, full_path) VALUES (?1, ?2, NULL, ?3)",
      params![name, icon, name],
    )?;
  }

  Ok(())
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, AppError> {
  let mut stmt = conn.prepare(
    "SELECT id, name, icon, parent_id, full_path FROM categories ORDER BY full_path",
  )?;
  let rows = stmt.query_map([], map_category)?;

  let mut categories = Vec::new();
  for row in rows {
    categories.push(row?);
  }
  Ok(categories)
}

pub fn find_by_path(conn: &Connection, full_path: &str) -> Result<Option<Category>, AppError> {
  let category = conn
    .query_row(
      "SELECT id, name, icon, parent_id, full_path FROM categories WHERE full_path = ?1",
      params![full_path],
      map_category,
    )
    .optional()?;
  Ok(category)
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category, AppError> {
  conn
    .query_row(
      "SELECT id, name, icon, parent_id, full_path FROM categories WHERE id = ?1",
      params![id],
      map_category,
    )
    .optional()?
    .ok_or_else(|| AppError::validation("Kategorie nicht gefunden"))
}

// Resolves "A > B > C" to its leaf category, creating missing ancestors on
// the way down. A verbatim hit returns before any validation runs.
pub fn resolve_or_create(
  conn: &Connection,
  full_path: &str,
  default_icon: &str,
) -> Result<Category, AppError> {
  if let Some(existing) = find_by_path(conn, full_path)? {
    return Ok(existing);
  }

  let segments: Vec<&str> = full_path.split(PATH_SEPARATOR).collect();
  if segments.len() > MAX_CATEGORY_DEPTH {
    return Err(AppError::validation(
      "Maximale Verschachtelungstiefe ueberschritten",
    ));
  }
  for segment in &segments {
    validation::validate_category_name(segment)?;
  }

  let fallback = normalize_icon(default_icon);
  let mut parent_id: Option<i64> = None;
  let mut parent_icon: Option<String> = None;
  let mut current: Option<Category> = None;
  let mut path = String::new();

  for segment in segments {
    if !path.is_empty() {
      path.push_str(PATH_SEPARATOR);
    }
    path.push_str(segment);

    let node = match find_by_path(conn, &path)? {
      Some(existing) => existing,
      None => {
        let icon = canonical_icon(&path)
          .map(str::to_string)
          .or_else(|| parent_icon.clone())
          .unwrap_or_else(|| fallback.to_string());
        insert_category(conn, segment, &icon, parent_id, &path)?
      }
    };

    parent_id = Some(node.id);
    parent_icon = Some(node.icon.clone());
    current = Some(node);
  }

  current.ok_or_else(|| AppError::validation("Kategoriepfad darf nicht leer sein"))
}

pub fn create_category(conn: &Connection, input: CategoryInput) -> Result<Category, AppError> {
  validation::validate_category_name(&input.name)?;

  let parent = match input.parent_id {
    Some(parent_id) => Some(get_category(conn, parent_id)?),
    None => None,
  };

  let full_path = match &parent {
    Some(parent) => {
      if path_depth(&parent.full_path) + 1 > MAX_CATEGORY_DEPTH {
        return Err(AppError::validation(
          "Maximale Verschachtelungstiefe ueberschritten",
        ));
      }
      format!("{}{}{}", parent.full_path, PATH_SEPARATOR, input.name)
    }
    None => input.name.clone(),
  };

  if find_by_path(conn, &full_path)?.is_some() {
    return Err(AppError::validation("Kategoriepfad existiert bereits"));
  }

  let icon = input
    .icon
    .as_deref()
    .map(|icon| normalize_icon(icon).to_string())
    .or_else(|| canonical_icon(&full_path).map(str::to_string))
    .or_else(|| parent.as_ref().map(|parent| parent.icon.clone()))
    .unwrap_or_else(|| DEFAULT_ICON.to_string());

  insert_category(conn, &input.name, &icon, input.parent_id, &full_path)
}

// Rename, reparent or re-icon a category. Path changes cascade to every
// descendant; the " > " separator in the LIKE prefix keeps the match exact,
// and names cannot contain LIKE wildcards.
pub fn update_category(conn: &Connection, input: CategoryUpdateInput) -> Result<Category, AppError> {
  let existing = get_category(conn, input.id)?;
  validation::validate_category_name(&input.name)?;
  let icon = normalize_icon(&input.icon).to_string();

  let parent = match input.parent_id {
    Some(parent_id) => Some(get_category(conn, parent_id)?),
    None => None,
  };
  let new_full_path = match &parent {
    Some(parent) => format!("{}{}{}", parent.full_path, PATH_SEPARATOR, input.name),
    None => input.name.clone(),
  };

  if new_full_path != existing.full_path {
    if let Some(parent) = &parent {
      let subtree_prefix = format!("{}{}", existing.full_path, PATH_SEPARATOR);
      if parent.id == existing.id || parent.full_path.starts_with(&subtree_prefix) {
        return Err(AppError::validation(
          "Kategorie kann nicht unter sich selbst verschoben werden",
        ));
      }
    }

    if find_by_path(conn, &new_full_path)?.is_some() {
      return Err(AppError::validation("Kategoriepfad existiert bereits"));
    }

    let old_depth = path_depth(&existing.full_path);
    let subtree_extra = deepest_subtree_depth(conn, &existing.full_path)?
      .map(|deepest| deepest - old_depth)
      .unwrap_or(0);
    if path_depth(&new_full_path) + subtree_extra > MAX_CATEGORY_DEPTH {
      return Err(AppError::validation(
        "Maximale Verschachtelungstiefe ueberschritten",
      ));
    }

    conn.execute(
      "UPDATE categories SET name = ?1, icon = ?2, parent_id = ?3, full_path = ?4 WHERE id = ?5",
      params![input.name, icon, input.parent_id, new_full_path, input.id],
    )?;
    conn.execute(
      "UPDATE categories SET full_path = ?1 || substr(full_path, ?2) WHERE full_path LIKE ?3",
      params![
        new_full_path,
        existing.full_path.chars().count() as i64 + 1,
        format!("{}{}%", existing.full_path, PATH_SEPARATOR)
      ],
    )?;
  } else {
    conn.execute(
      "UPDATE categories SET icon = ?1 WHERE id = ?2",
      params![icon, input.id],
    )?;
  }

  get_category(conn, input.id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBlocker {
  Children,
  Expenses,
}

pub fn delete_blocker(conn: &Connection, id: i64) -> Result<Option<DeleteBlocker>, AppError> {
  let category = get_category(conn, id)?;

  let children: i64 = conn.query_row(
    "SELECT COUNT(*) FROM categories WHERE parent_id = ?1",
    params![id],
    |row| row.get(0),
  )?;
  if children > 0 {
    return Ok(Some(DeleteBlocker::Children));
  }

  let expenses: i64 = conn.query_row(
    "SELECT COUNT(*) FROM expenses e
     JOIN categories c ON c.id = e.category_id
     WHERE c.full_path = ?1 OR c.full_path LIKE ?2",
    params![
      category.full_path,
      format!("{}{}%", category.full_path, PATH_SEPARATOR)
    ],
    |row| row.get(0),
  )?;
  if expenses > 0 {
    return Ok(Some(DeleteBlocker::Expenses));
  }

  Ok(None)
}

pub fn delete_category(conn: &Connection, id: i64) -> Result<(), AppError> {
  match delete_blocker(conn, id)? {
    Some(DeleteBlocker::Children) => Err(AppError::validation("Kategorie hat Unterkategorien")),
    Some(DeleteBlocker::Expenses) => Err(AppError::validation(
      "Kategorie wird von Ausgaben verwendet",
    )),
    None => {
      conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
      Ok(())
    }
  }
}

fn insert_category(
  conn: &Connection,
  name: &str,
  icon: &str,
  parent_id: Option<i64>,
  full_path: &str,
) -> Result<Category, AppError> {
  conn.execute(
    "INSERT INTO categories (name, icon, parent_id, full_path) VALUES (?1, ?2, ?3, ?4)",
    params![name, icon, parent_id, full_path],
  )?;
  Ok(Category {
    id: conn.last_insert_rowid(),
    name: name.to_string(),
    icon: icon.to_string(),
    parent_id,
    full_path: full_path.to_string(),
  })
}

fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
  Ok(Category {
    id: row.get(0)?,
    name: row.get(1)?,
    icon: row.get(2)?,
    parent_id: row.get(3)?,
    full_path: row.get(4)?,
  })
}

fn deepest_subtree_depth(conn: &Connection, full_path: &str) -> Result<Option<usize>, AppError> {
  let deepest: Option<i64> = conn.query_row(
    "SELECT MAX((length(full_path) - length(replace(full_path, ' > ', ''))) / 3 + 1)
     FROM categories WHERE full_path LIKE ?1",
    params![format!("{}{}%", full_path, PATH_SEPARATOR)],
    |row| row.get(0),
  )?;
  Ok(deepest.map(|value| value as usize))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::test_conn;

  #[test]
  fn resolver_creates_missing_chain() {
    let conn = test_conn();
    let leaf = resolve_or_create(&conn, "Essen > Snacks > Chips", DEFAULT_ICON).unwrap();
    assert_eq!(leaf.full_path, "Essen > Snacks > Chips");

    let all = list_categories(&conn).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].full_path, "Essen");
    assert_eq!(all[1].full_path, "Essen > Snacks");
    assert_eq!(all[2].full_path, "Essen > Snacks > Chips");
    assert_eq!(all[1].parent_id, Some(all[0].id));
    assert_eq!(all[2].parent_id, Some(all[1].id));
  }

  #[test]
  fn resolver_is_idempotent() {
    let conn = test_conn();
    let first = resolve_or_create(&conn, "Essen > Snacks > Chips", DEFAULT_ICON).unwrap();
    let second = resolve_or_create(&conn, "Essen > Snacks > Chips", DEFAULT_ICON).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(list_categories(&conn).unwrap().len(), 3);
  }

  #[test]
  fn resolver_rejects_bad_paths() {
    let conn = test_conn();
    assert!(resolve_or_create(&conn, "A > B > C > D", DEFAULT_ICON).is_err());
    assert!(resolve_or_create(&conn, "A >  > C", DEFAULT_ICON).is_err());
    assert!(resolve_or_create(&conn, "A > 100% > C", DEFAULT_ICON).is_err());
    assert!(resolve_or_create(&conn, "", DEFAULT_ICON).is_err());
    assert_eq!(list_categories(&conn).unwrap().len(), 0);
  }

  #[test]
  fn resolver_icons_follow_table_then_parent_then_default() {
    let conn = test_conn();
    let leaf = resolve_or_create(&conn, "Lebensmittel > Einkauf > Getraenke", "movie").unwrap();
    let all = list_categories(&conn).unwrap();
    assert_eq!(all[0].icon, "restaurant");
    assert_eq!(all[1].icon, "cart");
    assert_eq!(leaf.icon, "cart");

    let other = resolve_or_create(&conn, "Hobby", "movie").unwrap();
    assert_eq!(other.icon, "movie");

    let unknown = resolve_or_create(&conn, "Sonstiges", "kein-icon").unwrap();
    assert_eq!(unknown.icon, DEFAULT_ICON);
  }

  #[test]
  fn rename_cascades_to_descendants_only() {
    let conn = test_conn();
    let food = resolve_or_create(&conn, "Essen", DEFAULT_ICON).unwrap();
    resolve_or_create(&conn, "Essen > Snacks", DEFAULT_ICON).unwrap();
    let lookalike = resolve_or_create(&conn, "Essenz", DEFAULT_ICON).unwrap();

    update_category(
      &conn,
      CategoryUpdateInput {
        id: food.id,
        name: "Mahlzeiten".to_string(),
        icon: food.icon.clone(),
        parent_id: None,
      },
    )
    .unwrap();

    assert!(find_by_path(&conn, "Mahlzeiten > Snacks").unwrap().is_some());
    assert!(find_by_path(&conn, "Essen > Snacks").unwrap().is_none());
    assert_eq!(
      get_category(&conn, lookalike.id).unwrap().full_path,
      "Essenz"
    );
  }

  #[test]
  fn reparent_rewrites_subtree_and_checks_depth() {
    let conn = test_conn();
    let travel = resolve_or_create(&conn, "Reisen", DEFAULT_ICON).unwrap();
    let food = resolve_or_create(&conn, "Essen", DEFAULT_ICON).unwrap();
    resolve_or_create(&conn, "Essen > Snacks", DEFAULT_ICON).unwrap();

    update_category(
      &conn,
      CategoryUpdateInput {
        id: food.id,
        name: "Essen".to_string(),
        icon: food.icon.clone(),
        parent_id: Some(travel.id),
      },
    )
    .unwrap();
    assert!(find_by_path(&conn, "Reisen > Essen > Snacks").unwrap().is_some());

    // moving deeper would push the subtree past the depth limit
    let hobby = resolve_or_create(&conn, "Hobby > Lesen", DEFAULT_ICON).unwrap();
    let moved = get_category(&conn, food.id).unwrap();
    let result = update_category(
      &conn,
      CategoryUpdateInput {
        id: moved.id,
        name: moved.name.clone(),
        icon: moved.icon.clone(),
        parent_id: Some(hobby.id),
      },
    );
    assert!(result.is_err());
  }

  #[test]
  fn reparent_under_own_descendant_is_rejected() {
    let conn = test_conn();
    let food = resolve_or_create(&conn, "Essen", DEFAULT_ICON).unwrap();
    let snacks = resolve_or_create(&conn, "Essen > Snacks", DEFAULT_ICON).unwrap();

    let result = update_category(
      &conn,
      CategoryUpdateInput {
        id: food.id,
        name: "Essen".to_string(),
        icon: food.icon.clone(),
        parent_id: Some(snacks.id),
      },
    );
    assert!(result.is_err());
  }

  #[test]
  fn delete_is_restricted_by_children_and_expenses() {
    let conn = test_conn();
    let food = resolve_or_create(&conn, "Essen", DEFAULT_ICON).unwrap();
    let snacks = resolve_or_create(&conn, "Essen > Snacks", DEFAULT_ICON).unwrap();

    assert_eq!(
      delete_blocker(&conn, food.id).unwrap(),
      Some(DeleteBlocker::Children)
    );
    assert!(delete_category(&conn, food.id).is_err());

    conn
      .execute(
        "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (100, ?1, '2024-01-01', 0, NULL)",
        params![snacks.id],
      )
      .unwrap();
    assert_eq!(
      delete_blocker(&conn, snacks.id).unwrap(),
      Some(DeleteBlocker::Expenses)
    );
    assert!(delete_category(&conn, snacks.id).is_err());
    assert_eq!(list_categories(&conn).unwrap().len(), 2);
  }

  #[test]
  fn delete_succeeds_without_references() {
    let conn = test_conn();
    let solo = resolve_or_create(&conn, "Einmalig", DEFAULT_ICON).unwrap();
    delete_category(&conn, solo.id).unwrap();
    assert!(find_by_path(&conn, "Einmalig").unwrap().is_none());
  }

  #[test]
  fn create_category_validates_and_inherits() {
    let conn = test_conn();
    let root = create_category(
      &conn,
      CategoryInput {
        name: "Haustiere".to_string(),
        icon: Some("heart".to_string()),
        parent_id: None,
      },
    )
    .unwrap();
    assert_eq!(root.full_path, "Haustiere");

    let child = create_category(
      &conn,
      CategoryInput {
        name: "Futter".to_string(),
        icon: None,
        parent_id: Some(root.id),
      },
    )
    .unwrap();
    assert_eq!(child.full_path, "Haustiere > Futter");
    assert_eq!(child.icon, "heart");

    let duplicate = create_category(
      &conn,
      CategoryInput {
        name: "Haustiere".to_string(),
        icon: None,
        parent_id: None,
      },
    );
    assert!(duplicate.is_err());
  }
}
