use std::io::{self, BufRead};

pub fn parse_line(line: &str) -> Vec<String> {
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();

  while let Some(c) = chars.next() {
    if in_quotes {
      if c == '"' {
        if chars.peek() == Some(&'"') {
          field.push('"');
          chars.next();
        } else {
          in_quotes = false;
        }
      } else {
        field.push(c);
      }
    } else {
      match c {
        ',' => fields.push(std::mem::take(&mut field)),
        '"' if field.is_empty() => in_quotes = true,
        _ => field.push(c),
      }
    }
  }

  fields.push(field);
  fields
}

pub fn escape_field(value: &str) -> String {
  if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

pub fn write_row(fields: &[&str]) -> String {
  fields
    .iter()
    .map(|field| escape_field(field))
    .collect::<Vec<_>>()
    .join(",")
}

// Reads one logical record: physical lines are appended until the quote
// count is even, so quoted fields may contain literal newlines.
pub fn read_record<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
  let mut record = String::new();

  loop {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
      if record.is_empty() {
        return Ok(None);
      }
      return Ok(Some(record));
    }

    record.push_str(&line);
    if record.matches('"').count() % 2 == 0 {
      strip_line_ending(&mut record);
      return Ok(Some(record));
    }
  }
}

fn strip_line_ending(record: &mut String) {
  if record.ends_with('\n') {
    record.pop();
    if record.ends_with('\r') {
      record.pop();
    }
  }
}
