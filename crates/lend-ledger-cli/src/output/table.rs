use serde_json::Value;
use tabled::{builder::Builder, Table};

/// Format output as a table using the tabled crate. Arrays of objects get
/// one row per element; flat objects render as Field / Value pairs.
pub fn print_table(value: &Value) {
    match value {
        Value::Array(arr) => print_array_table(arr),
        Value::Object(_) => print_flat_object(value),
        _ => println!("{}", value),
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(no rows)");
        return;
    }
    // Column order from the first object row.
    if let Value::Object(first) = &arr[0] {
        let columns: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(columns.iter().map(String::as_str));
        for row in arr {
            if let Value::Object(map) = row {
                builder.push_record(
                    columns
                        .iter()
                        .map(|c| map.get(c).map(format_value).unwrap_or_default()),
                );
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for row in arr {
            println!("{}", format_value(row));
        }
    }
}

fn format_value(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}
