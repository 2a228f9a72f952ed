use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom, Write};

use rusqlite::Connection;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::categories;
use crate::error::AppError;
use crate::export;
use crate::models::BackupMetadata;

const ZIP_MAGIC: [u8; 2] = [0x50, 0x4B];
pub const EXPENSES_ENTRY: &str = "expenses.csv";
pub const CATEGORIES_ENTRY: &str = "categories.csv";
pub const METADATA_ENTRY: &str = "metadata.json";

pub fn write_backup_archive<W: Write + Seek>(
  conn: &Connection,
  writer: W,
) -> Result<BackupMetadata, AppError> {
  let rows = export::export_all(conn)?;
  let cats = categories::list_categories(conn)?;
  let metadata = export::build_metadata(conn)?;

  let mut zip = ZipWriter::new(writer);
  let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

  zip.start_file(EXPENSES_ENTRY, options)?;
  export::write_expenses_csv(&mut zip, &rows)?;

  zip.start_file(CATEGORIES_ENTRY, options)?;
  export::write_categories_csv(&mut zip, &cats)?;

  zip.start_file(METADATA_ENTRY, options)?;
  serde_json::to_writer(&mut zip, &metadata)?;

  zip.finish()?;
  Ok(metadata)
}

// Peeks the first two bytes without consuming the stream. ZIP input is
// narrowed to the expenses.csv entry; anything else passes through as a
// plain CSV.
pub fn open_import_source<R: Read + Seek + 'static>(
  reader: R,
) -> Result<(Box<dyn BufRead>, bool), AppError> {
  let mut reader = BufReader::new(reader);
  let head = reader.fill_buf()?;
  if head.is_empty() {
    return Err(AppError::format("Datei ist leer"));
  }
  if head.len() < 2 || head[..2] != ZIP_MAGIC {
    return Ok((Box::new(reader), false));
  }

  reader.seek(SeekFrom::Start(0))?;
  let mut archive = ZipArchive::new(reader)?;
  let entry_name = archive
    .file_names()
    .find(|name| name.eq_ignore_ascii_case(EXPENSES_ENTRY))
    .map(str::to_string)
    .ok_or_else(|| AppError::format("ZIP enthaelt keine expenses.csv"))?;

  let mut entry = archive.by_name(&entry_name)?;
  let mut content = Vec::new();
  entry.read_to_end(&mut content)?;
  Ok((Box::new(Cursor::new(content)), true))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::csv;
  use crate::db::test_conn;
  use rusqlite::params;

  fn archive_bytes(conn: &Connection) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    write_backup_archive(conn, &mut buffer).unwrap();
    buffer.into_inner()
  }

  #[test]
  fn empty_store_still_yields_three_entries() {
    let conn = test_conn();
    let bytes = archive_bytes(&conn);

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 3);
    let names: Vec<String> = (0..archive.len())
      .map(|i| archive.by_index(i).unwrap().name().to_string())
      .collect();
    assert_eq!(names, vec![EXPENSES_ENTRY, CATEGORIES_ENTRY, METADATA_ENTRY]);

    let mut expenses = String::new();
    archive
      .by_name(EXPENSES_ENTRY)
      .unwrap()
      .read_to_string(&mut expenses)
      .unwrap();
    assert_eq!(expenses.trim_end(), export::EXPENSES_HEADER);

    let mut categories_csv = String::new();
    archive
      .by_name(CATEGORIES_ENTRY)
      .unwrap()
      .read_to_string(&mut categories_csv)
      .unwrap();
    assert_eq!(categories_csv.trim_end(), export::CATEGORIES_HEADER);

    let mut metadata = String::new();
    archive
      .by_name(METADATA_ENTRY)
      .unwrap()
      .read_to_string(&mut metadata)
      .unwrap();
    let parsed: BackupMetadata = serde_json::from_str(&metadata).unwrap();
    assert_eq!(parsed.expense_count, 0);
    assert_eq!(parsed.category_count, 0);
  }

  #[test]
  fn zip_input_is_narrowed_to_the_expenses_entry() {
    let conn = test_conn();
    let category =
      crate::categories::resolve_or_create(&conn, "Essen", crate::categories::DEFAULT_ICON)
        .unwrap();
    conn
      .execute(
        "INSERT INTO expenses (amount, category_id, date, created_at, note) VALUES (150, ?1, '2024-02-02', 7, 'Kaffee')",
        params![category.id],
      )
      .unwrap();

    let bytes = archive_bytes(&conn);
    let (mut stream, is_zip) = open_import_source(Cursor::new(bytes)).unwrap();
    assert!(is_zip);

    let header = csv::read_record(&mut stream).unwrap().unwrap();
    assert_eq!(header, export::EXPENSES_HEADER);
    let row = csv::read_record(&mut stream).unwrap().unwrap();
    assert_eq!(csv::parse_line(&row)[2], "Essen");
  }

  #[test]
  fn plain_csv_passes_through_unchanged() {
    let data = format!("{}\n1,2024-01-01,Essen,folder,100,,0\n", export::EXPENSES_HEADER);
    let (mut stream, is_zip) = open_import_source(Cursor::new(data.into_bytes())).unwrap();
    assert!(!is_zip);
    let header = csv::read_record(&mut stream).unwrap().unwrap();
    assert_eq!(header, export::EXPENSES_HEADER);
  }

  #[test]
  fn entry_name_matching_is_case_insensitive() {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("EXPENSES.CSV", options).unwrap();
    zip
      .write_all(format!("{}\n", export::EXPENSES_HEADER).as_bytes())
      .unwrap();
    zip.finish().unwrap();

    let (mut stream, is_zip) = open_import_source(Cursor::new(buffer.into_inner())).unwrap();
    assert!(is_zip);
    let header = csv::read_record(&mut stream).unwrap().unwrap();
    assert_eq!(header, export::EXPENSES_HEADER);
  }

  #[test]
  fn zip_without_expenses_entry_is_a_format_error() {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("notes.txt", options).unwrap();
    zip.write_all(b"nichts").unwrap();
    zip.finish().unwrap();

    let err = open_import_source(Cursor::new(buffer.into_inner()))
      .err()
      .expect("expected Format error");
    match err {
      AppError::Format(message) => assert!(message.contains("expenses.csv")),
      other => panic!("expected Format error, got {other}"),
    }
  }

  #[test]
  fn empty_input_is_a_format_error() {
    let result = open_import_source(Cursor::new(Vec::new()));
    assert!(matches!(result, Err(AppError::Format(_))));
  }
}
