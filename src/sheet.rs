// src/sheet.rs

use crate::error::ExtractError;
use crate::heuristics::{ExtractionResult, InvoiceHeader, LineItem};
use std::io::Write;

const HEADER_COLUMNS: [&str; 9] = [
    "File",
    "Order Number",
    "Order Date",
    "Invoice Number",
    "Invoice Details",
    "Billing Name",
    "Shipping Address",
    "Shipping GST",
    "Billing GST",
];

const ITEMIZED_COLUMNS: [&str; 23] = [
    "File",
    "Order Number",
    "Order Date",
    "Invoice Number",
    "Invoice Date",
    "Invoice Details",
    "Billing Name",
    "Billing Address",
    "Billing GST",
    "Shipping Name",
    "Shipping Address",
    "Shipping GST",
    "Sl No",
    "Description",
    "HSN Code",
    "Unit Price",
    "Discount",
    "Qty",
    "Net Amount",
    "Tax Rate",
    "Tax Type",
    "Tax Amount",
    "Total Amount",
];

/// Fixed column order of the output sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetLayout {
    /// One row per document with the pattern extractor's fields.
    Header,
    /// One row per line item, header fields repeated on each.
    Itemized,
}

impl SheetLayout {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            SheetLayout::Header => &HEADER_COLUMNS,
            SheetLayout::Itemized => &ITEMIZED_COLUMNS,
        }
    }
}

/// Writes the header row up front, then data and error rows as documents
/// are processed.
pub struct SheetWriter<W: Write> {
    writer: csv::Writer<W>,
    layout: SheetLayout,
    rows: usize,
}

impl<W: Write> SheetWriter<W> {
    pub fn new(inner: W, layout: SheetLayout) -> Result<Self, ExtractError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(layout.columns())?;
        Ok(Self {
            writer,
            layout,
            rows: 0,
        })
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write a document's rows; always at least one. Returns the count.
    pub fn write_result(
        &mut self,
        file_name: &str,
        result: &ExtractionResult,
    ) -> Result<usize, ExtractError> {
        let h = &result.header;
        match self.layout {
            SheetLayout::Header => {
                let cell = |f: &Option<String>| f.as_deref().unwrap_or("").to_string();
                self.writer.write_record([
                    file_name.to_string(),
                    cell(&h.order_number),
                    cell(&h.order_date),
                    cell(&h.invoice_number),
                    cell(&h.invoice_details),
                    cell(&h.billing_name),
                    cell(&h.shipping_address),
                    cell(&h.shipping_gst),
                    cell(&h.billing_gst),
                ])?;
                self.rows += 1;
                Ok(1)
            }
            SheetLayout::Itemized => {
                let placeholder = [LineItem::default()];
                let items: &[LineItem] = if result.items.is_empty() {
                    &placeholder
                } else {
                    &result.items
                };
                for item in items {
                    self.write_item_row(file_name, h, item)?;
                }
                Ok(items.len())
            }
        }
    }

    fn write_item_row(
        &mut self,
        file_name: &str,
        header: &InvoiceHeader,
        item: &LineItem,
    ) -> Result<(), ExtractError> {
        let mut record = Vec::with_capacity(ITEMIZED_COLUMNS.len());
        record.push(file_name);
        record.extend(header.cells());
        record.extend(item.cells());
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// A visible marker row for a document that could not be extracted.
    pub fn write_error(&mut self, file_name: &str, message: &str) -> Result<(), ExtractError> {
        let width = self.layout.columns().len();
        let mut record = vec![String::new(); width];
        record[0] = file_name.to_string();
        record[1] = format!("ERROR: {message}");
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W, ExtractError> {
        self.writer
            .into_inner()
            .map_err(|e| ExtractError::Io(e.into_error()))
    }
}
