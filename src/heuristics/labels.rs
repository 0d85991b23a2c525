use super::{LabelMatch, non_empty};
use regex::Regex;

/// Identifiers found by the line scan.
#[derive(Debug, Default)]
pub struct OrderIds {
    pub order_number: Option<String>,
    pub invoice_number: Option<String>,
    pub order_date: Option<String>,
    pub invoice_details: Option<String>,
}

/// Scan line by line for the two label pairs that share a physical line in
/// the invoice layout. A label on its own never triggers a match.
pub fn scan(text: &str, policy: LabelMatch) -> OrderIds {
    let mut ids = OrderIds::default();
    let mut numbers_seen = false;
    let mut dates_seen = false;
    let keep = |seen: bool| !(seen && policy == LabelMatch::First);

    for line in text.lines() {
        let lower = line.to_lowercase();

        if lower.contains("order number:") && lower.contains("invoice number") && keep(numbers_seen) {
            ids.order_number = token_after(line, r"Order Number:");
            ids.invoice_number = token_after(line, r"Invoice Number\s*:");
            numbers_seen = true;
        }

        if lower.contains("order date:") && lower.contains("invoice details") && keep(dates_seen) {
            ids.order_date = token_after(line, r"Order Date:");
            ids.invoice_details = token_after(line, r"Invoice Details\s*:");
            dates_seen = true;
        }
    }

    ids
}

/// First non-whitespace run following `label` on the line.
fn token_after(line: &str, label: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?i){label}\s*(\S+)")).ok()?;
    re.captures(line)
        .and_then(|c| non_empty(c[1].to_string()))
}
