// src/heuristics/mod.rs

mod address;
mod labels;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single invoice line item. Every field is kept as text so signs,
/// percent symbols and the invoice's own formatting survive untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sl_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hsn_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit_price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub discount: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub qty: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub net_amount: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_rate: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tax_amount: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_amount: String,
}

impl LineItem {
    /// Cells in sheet column order.
    pub fn cells(&self) -> [&str; 11] {
        [
            &self.sl_no,
            &self.description,
            &self.hsn_code,
            &self.unit_price,
            &self.discount,
            &self.qty,
            &self.net_amount,
            &self.tax_rate,
            &self.tax_type,
            &self.tax_amount,
            &self.total_amount,
        ]
    }
}

/// Header-level fields of an order invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub order_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub order_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub invoice_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub invoice_details: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub billing_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub billing_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub billing_gst: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub shipping_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub shipping_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub shipping_gst: Option<String>,
}

impl InvoiceHeader {
    /// How many fields were successfully extracted.
    pub fn coverage(&self) -> (usize, usize) {
        let fields = self.fields();
        let filled = fields.iter().filter(|f| f.is_some()).count();
        (filled, fields.len())
    }

    fn fields(&self) -> [&Option<String>; 11] {
        [
            &self.order_number,
            &self.order_date,
            &self.invoice_number,
            &self.invoice_date,
            &self.invoice_details,
            &self.billing_name,
            &self.billing_address,
            &self.billing_gst,
            &self.shipping_name,
            &self.shipping_address,
            &self.shipping_gst,
        ]
    }

    /// All header cells in the full (itemized) column order, empty when absent.
    pub fn cells(&self) -> [&str; 11] {
        self.fields().map(|f| f.as_deref().unwrap_or(""))
    }
}

/// Header plus ordered line items for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub header: InvoiceHeader,
    pub items: Vec<LineItem>,
}

impl ExtractionResult {
    pub fn header_only(header: InvoiceHeader) -> Self {
        Self {
            header,
            items: Vec::new(),
        }
    }
}

/// Where an address block stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AddressTerminator {
    /// First blank line; the "Place of Supply" label, then the window, as fallbacks.
    #[default]
    BlankLine,
    /// The "Place of Supply" label; the window as fallback.
    PlaceOfSupply,
}

/// How the address field is rebuilt from its block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AddressStrategy {
    /// Literal block lines joined with ", ".
    Lines,
    /// Runs of all-caps words, deduplicated.
    Highlights,
    /// Lines, falling back to highlights when the lines come out empty.
    #[default]
    LinesThenHighlights,
}

/// Which line wins when a label pair appears on several lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LabelMatch {
    First,
    #[default]
    Last,
}

/// Tuning knobs for the pattern extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternOptions {
    pub terminator: AddressTerminator,
    pub address_strategy: AddressStrategy,
    pub label_match: LabelMatch,
    /// Upper bound on the number of lines an address block may span.
    pub window: usize,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            terminator: AddressTerminator::default(),
            address_strategy: AddressStrategy::default(),
            label_match: LabelMatch::default(),
            window: 20,
        }
    }
}

/// Extract header fields from raw invoice text. Never fails: missing
/// labels leave their fields empty.
pub fn extract_invoice(text: &str, opts: &PatternOptions) -> InvoiceHeader {
    let ids = labels::scan(text, opts.label_match);
    let shipping = address::shipping(text, opts);
    let billing = address::billing(text, opts);

    InvoiceHeader {
        order_number: ids.order_number,
        order_date: ids.order_date,
        invoice_number: ids.invoice_number,
        invoice_date: None,
        invoice_details: ids.invoice_details,
        billing_name: billing.name,
        billing_address: billing.address,
        billing_gst: billing.gst,
        shipping_name: shipping.name,
        shipping_address: shipping.address,
        shipping_gst: shipping.gst,
    }
}

/// Accept strings, numbers and booleans as text; `null` becomes empty.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let s = lenient_string(d)?;
    Ok(non_empty(s))
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE: &str = "\
Tax Invoice/Bill of Supply/Cash Memo
(Original for Recipient)
Sold By :
Cloudtail India Private Limited
Billing Address :
Ravi Kumar
12 MG Road
BENGALURU, KARNATAKA, 560001
IN
GST Registration No: 29AAACR4849R1ZL

Shipping Address :
Ravi Kumar
Flat 4B, Green Park
NEW DELHI, DELHI, 110016
IN
GST Registration No: 07ABCDE1234F1Z5

Place of supply: DELHI
Order Number: 408-1234567-7654321 Invoice Number : DEL5-123456
Order Date: 02.03.2024 Invoice Details : DL-DEL5-1034-2324
";

    #[test]
    fn test_full_invoice() {
        let header = extract_invoice(INVOICE, &PatternOptions::default());
        assert_eq!(header.order_number.as_deref(), Some("408-1234567-7654321"));
        assert_eq!(header.invoice_number.as_deref(), Some("DEL5-123456"));
        assert_eq!(header.order_date.as_deref(), Some("02.03.2024"));
        assert_eq!(header.invoice_details.as_deref(), Some("DL-DEL5-1034-2324"));
        assert_eq!(header.billing_name.as_deref(), Some("Ravi Kumar"));
        assert_eq!(header.billing_gst.as_deref(), Some("29AAACR4849R1ZL"));
        assert_eq!(header.shipping_name.as_deref(), Some("Ravi Kumar"));
        assert_eq!(header.shipping_gst.as_deref(), Some("07ABCDE1234F1Z5"));
        assert_eq!(
            header.shipping_address.as_deref(),
            Some("Ravi Kumar, Flat 4B, Green Park, NEW DELHI, DELHI, 110016, IN")
        );
        assert_eq!(header.invoice_date, None);
        assert_eq!(header.coverage(), (10, 11));
    }

    #[test]
    fn test_no_labels_yields_empty_record() {
        let header = extract_invoice(
            "Hello world\nnothing to see here\n\n",
            &PatternOptions::default(),
        );
        assert_eq!(header, InvoiceHeader::default());
        assert_eq!(header.coverage(), (0, 11));
    }

    #[test]
    fn test_empty_text() {
        let header = extract_invoice("", &PatternOptions::default());
        assert_eq!(header, InvoiceHeader::default());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let opts = PatternOptions::default();
        let first = serde_json::to_string(&extract_invoice(INVOICE, &opts)).unwrap();
        let second = serde_json::to_string(&extract_invoice(INVOICE, &opts)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lenient_item_fields() {
        let item: LineItem = serde_json::from_str(
            r#"{"sl_no": 1, "description": " Widget ", "qty": 2, "tax_rate": "18%", "discount": null}"#,
        )
        .unwrap();
        assert_eq!(item.sl_no, "1");
        assert_eq!(item.description, "Widget");
        assert_eq!(item.qty, "2");
        assert_eq!(item.tax_rate, "18%");
        assert_eq!(item.discount, "");
        assert_eq!(item.hsn_code, "");
    }

    #[test]
    fn test_lenient_header_fields() {
        let header: InvoiceHeader =
            serde_json::from_str(r#"{"order_number": "", "invoice_number": 123}"#).unwrap();
        assert_eq!(header.order_number, None);
        assert_eq!(header.invoice_number.as_deref(), Some("123"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn invoice_line() -> impl Strategy<Value = String> {
            prop_oneof![
                "[ -~]{0,40}",
                Just(String::new()),
                Just("Billing Address :".to_string()),
                Just("Shipping Address :".to_string()),
                Just("GST Registration No: 07ABCDE1234F1Z5".to_string()),
                Just("Place of supply: DELHI".to_string()),
                "Order Number: [A-Z0-9-]{1,12} Invoice Number : [A-Z0-9-]{1,12}",
                "Order Date: [0-9.]{1,10} Invoice Details : [A-Z0-9-]{1,12}",
                "[A-Z]{2,8}( [A-Z]{2,8}){0,2}, [0-9]{6}",
            ]
        }

        fn options() -> impl Strategy<Value = PatternOptions> {
            (
                prop_oneof![
                    Just(AddressTerminator::BlankLine),
                    Just(AddressTerminator::PlaceOfSupply)
                ],
                prop_oneof![
                    Just(AddressStrategy::Lines),
                    Just(AddressStrategy::Highlights),
                    Just(AddressStrategy::LinesThenHighlights)
                ],
                prop_oneof![Just(LabelMatch::First), Just(LabelMatch::Last)],
                1usize..30,
            )
                .prop_map(|(terminator, address_strategy, label_match, window)| PatternOptions {
                    terminator,
                    address_strategy,
                    label_match,
                    window,
                })
        }

        proptest! {
            /// Same text and options, same record; never panics on any input.
            #[test]
            fn extraction_is_idempotent(
                lines in prop::collection::vec(invoice_line(), 0..40),
                opts in options(),
            ) {
                let text = lines.join("\n");
                let first = extract_invoice(&text, &opts);
                let second = extract_invoice(&text, &opts);
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.coverage().1, 11);
                prop_assert_eq!(first.invoice_date, None);
            }

            #[test]
            fn arbitrary_text_never_panics(text in "\\PC{0,500}", opts in options()) {
                let _ = extract_invoice(&text, &opts);
            }
        }
    }
}
