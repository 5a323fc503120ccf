//! CSV rendering of list views. Headers are the raw column names, NULL is an
//! empty cell, and a field is quoted only when it has to be.

use mysql::{consts::ColumnType, Row, Value};

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn push_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field.as_ref());
    }
    out.push_str("\r\n");
}

pub fn render<H, S>(headers: &[H], rows: &[Vec<S>]) -> String
where
    H: AsRef<str>,
    S: AsRef<str>,
{
    let mut out = String::new();
    push_record(&mut out, headers);
    for row in rows {
        push_record(&mut out, row);
    }
    out
}

/// Text form of one cell as it would be shown in the table view.
pub fn cell(value: &Value, ty: ColumnType) -> String {
    match value {
        Value::NULL => String::new(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(y, m, d, ..) if ty == ColumnType::MYSQL_TYPE_DATE => {
            format!("{y:04}-{m:02}-{d:02}")
        }
        Value::Date(y, m, d, h, mi, s, _) => {
            format!("{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}")
        }
        Value::Time(neg, days, h, mi, s, _) => {
            let hours = *days * 24 + u32::from(*h);
            format!("{}{hours:02}:{mi:02}:{s:02}", if *neg { "-" } else { "" })
        }
    }
}

/// Renders query rows using their own column names as the header line.
pub fn from_rows(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let headers: Vec<String> = first
        .columns_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.columns_ref()
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    row.as_ref(i)
                        .map(|v| cell(v, col.column_type()))
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();
    render(&headers, &body)
}

/// One row as a JSON object of display strings, leaving out `skip` columns.
pub fn record(row: &Row, skip: &[&str]) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    for (i, col) in row.columns_ref().iter().enumerate() {
        let name = col.name_str();
        if skip.contains(&name.as_ref()) {
            continue;
        }
        let value = row
            .as_ref(i)
            .map(|v| cell(v, col.column_type()))
            .unwrap_or_default();
        out.insert(name.into_owned(), serde_json::Value::String(value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_not_quoted() {
        let csv = render(&["code", "name"], &[vec!["AL0001", "Ravi"]]);
        assert_eq!(csv, "code,name\r\nAL0001,Ravi\r\n");
    }

    #[test]
    fn separators_and_quotes_are_escaped() {
        let csv = render(&["remark"], &[vec!["brake, \"urgent\""], vec!["line\nbreak"]]);
        assert_eq!(
            csv,
            "remark\r\n\"brake, \"\"urgent\"\"\"\r\n\"line\nbreak\"\r\n"
        );
    }

    #[test]
    fn null_is_an_empty_cell() {
        let csv = render(&["a", "b", "c"], &[vec![
            cell(&Value::Int(1), ColumnType::MYSQL_TYPE_LONG),
            cell(&Value::NULL, ColumnType::MYSQL_TYPE_DATETIME),
            cell(&Value::Bytes(b"x".to_vec()), ColumnType::MYSQL_TYPE_VAR_STRING),
        ]]);
        assert_eq!(csv, "a,b,c\r\n1,,x\r\n");
    }

    #[test]
    fn dates_follow_the_column_type() {
        let v = Value::Date(2024, 5, 1, 9, 30, 5, 0);
        assert_eq!(cell(&v, ColumnType::MYSQL_TYPE_DATE), "2024-05-01");
        assert_eq!(cell(&v, ColumnType::MYSQL_TYPE_DATETIME), "2024-05-01 09:30:05");
        let t = Value::Time(false, 0, 18, 0, 0, 0);
        assert_eq!(cell(&t, ColumnType::MYSQL_TYPE_TIME), "18:00:00");
    }

    #[test]
    fn no_rows_renders_nothing() {
        assert_eq!(from_rows(&[]), "");
    }
}
