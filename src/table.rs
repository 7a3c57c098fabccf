use serde_json::Value;

use crate::domain::Record;

/// Display order for the columns of the products table. Unknown keys follow in order of appearance.
pub const PRODUCT_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "category",
    "supplier",
    "price",
    "stock",
    "description",
];

/// Column used for records that are not json objects.
pub const VALUE_COLUMN: &str = "value";

pub const COLUMN_WIDTH_MARGIN: usize = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// Collect the column names over all records.
pub fn column_names(records: &[Record]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut has_scalars = false;
    for record in records {
        match record {
            Value::Object(map) => {
                for key in map.keys() {
                    if !seen.iter().any(|s| s == key) {
                        seen.push(key.clone());
                    }
                }
            }
            _ => has_scalars = true,
        }
    }

    let mut names: Vec<String> = PRODUCT_COLUMNS
        .iter()
        .filter(|known| seen.iter().any(|s| s == *known))
        .map(|known| known.to_string())
        .collect();
    names.extend(
        seen.into_iter()
            .filter(|key| !PRODUCT_COLUMNS.contains(&key.as_str())),
    );
    if has_scalars && !names.iter().any(|n| n == VALUE_COLUMN) {
        names.push(VALUE_COLUMN.to_string());
    }
    names
}

pub fn build_columns(names: &[String], records: &[Record], max_column_width: usize) -> Vec<ColumnView> {
    names
        .iter()
        .map(|name| {
            let data: Vec<String> = records.iter().map(|r| cell_text(field(r, name))).collect();
            let content_width = data
                .iter()
                .map(|d| d.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            ColumnView {
                name: name.clone(),
                width: std::cmp::min(content_width + COLUMN_WIDTH_MARGIN, max_column_width),
                data,
            }
        })
        .collect()
}

fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    match record {
        Value::Object(map) => map.get(name),
        scalar if name == VALUE_COLUMN => Some(scalar),
        _ => None,
    }
}

/// Text shown for a single cell. Missing fields render empty.
pub fn cell_text(value: Option<&Value>) -> String {
    let text = match value {
        None => return String::new(),
        Some(Value::Null) => return String::from("∅"),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    text.replace("\r\n", " ↵ ").replace('\n', " ↵ ")
}
