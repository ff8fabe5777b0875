use std::fmt::Write;

use super::ShoppingItem;

const TXT_TITLE: &str = "Список покупок:";
const CSV_HEADER: [&str; 3] = ["Ингредиент", "Количество", "Единица измерения"];

pub(super) fn line(item: &ShoppingItem) -> String {
    format!(
        "- {}: {} {}",
        item.name, item.amount, item.measurement_unit
    )
}

pub(super) fn txt(items: &[ShoppingItem]) -> Vec<u8> {
    let mut out = format!("{TXT_TITLE}\n\n");
    for item in items {
        out.push_str(&line(item));
        out.push('\n');
    }
    out.into_bytes()
}

/// Quotes a field when it holds a separator, quote or line break, doubling
/// embedded quotes.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

pub(super) fn csv(items: &[ShoppingItem]) -> Vec<u8> {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for item in items {
        // writing into a String cannot fail
        let _ = writeln!(
            out,
            "{},{},{}",
            csv_field(&item.name),
            item.amount,
            csv_field(&item.measurement_unit)
        );
    }
    out.into_bytes()
}
