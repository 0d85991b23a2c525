use super::{AddressStrategy, AddressTerminator, PatternOptions, non_empty};
use regex::Regex;

/// Name, address and GST number pulled from one address block.
#[derive(Debug, Default, PartialEq)]
pub struct Party {
    pub name: Option<String>,
    pub address: Option<String>,
    pub gst: Option<String>,
}

pub fn shipping(text: &str, opts: &PatternOptions) -> Party {
    let Some(block) = block_after(text, r"Shipping Address\s*:", opts) else {
        return Party::default();
    };
    let lines = without_gst(&block);
    Party {
        name: lines.first().cloned(),
        address: rebuild(&lines, opts.address_strategy),
        gst: gst_in_block(&block),
    }
}

/// The billing GST number is searched from the label onwards without a
/// terminator, so it is found even when the block ends early.
pub fn billing(text: &str, opts: &PatternOptions) -> Party {
    let gst = billing_gst(text);
    let Some(block) = block_after(text, r"Billing Address\s*:", opts) else {
        return Party {
            gst,
            ..Party::default()
        };
    };
    let lines = without_gst(&block);
    Party {
        name: lines.first().cloned(),
        address: rebuild(&lines, opts.address_strategy),
        gst,
    }
}

/// Trimmed lines following `label`, leading blank lines skipped, bounded by
/// the configured terminator and never longer than the window. The next
/// address label always ends the block.
fn block_after(text: &str, label: &str, opts: &PatternOptions) -> Option<Vec<String>> {
    let re = Regex::new(&format!("(?i){label}")).ok()?;
    let start = re.find(text)?.end();

    let mut candidates: Vec<&str> = text[start..]
        .lines()
        .map(str::trim)
        .skip_while(|l| l.is_empty())
        .take(opts.window)
        .collect();

    let next_section = Regex::new(r"(?i)(?:Billing|Shipping) Address\s*:").ok()?;
    if let Some(idx) = candidates.iter().position(|l| next_section.is_match(l)) {
        let line = candidates[idx];
        let head = next_section
            .find(line)
            .map_or("", |m| line[..m.start()].trim());
        candidates.truncate(idx);
        if !head.is_empty() {
            candidates.push(head);
        }
    }

    let sentinel = Regex::new(r"(?i)place of supply").ok()?;
    let until_sentinel = |lines: &[&str]| -> Option<Vec<String>> {
        let idx = lines.iter().position(|l| sentinel.is_match(l))?;
        let mut block: Vec<String> = lines[..idx].iter().map(|l| l.to_string()).collect();
        if let Some(m) = sentinel.find(lines[idx]) {
            let head = lines[idx][..m.start()].trim();
            if !head.is_empty() {
                block.push(head.to_string());
            }
        }
        Some(block)
    };

    let block = match opts.terminator {
        AddressTerminator::BlankLine => match candidates.iter().position(|l| l.is_empty()) {
            Some(idx) => until_sentinel(&candidates[..idx])
                .unwrap_or_else(|| candidates[..idx].iter().map(|l| l.to_string()).collect()),
            None => until_sentinel(&candidates)
                .unwrap_or_else(|| candidates.iter().map(|l| l.to_string()).collect()),
        },
        AddressTerminator::PlaceOfSupply => until_sentinel(&candidates)
            .unwrap_or_else(|| candidates.iter().map(|l| l.to_string()).collect()),
    };

    Some(block)
}

fn gst_in_block(block: &[String]) -> Option<String> {
    let re = Regex::new(r"(?i)GST Registration No\s*:\s*(.*)").ok()?;
    block
        .iter()
        .find_map(|l| re.captures(l))
        .and_then(|c| non_empty(c[1].trim().to_string()))
}

fn billing_gst(text: &str) -> Option<String> {
    let re =
        Regex::new(r"(?s)(?i:Billing Address).*?(?i:GST Registration No)\s*:\s*([A-Z0-9]+)").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

/// Block lines with the GST label and everything after it removed; blank
/// lines dropped.
fn without_gst(block: &[String]) -> Vec<String> {
    let Ok(label) = Regex::new(r"(?i)GST Registration No") else {
        return block.to_vec();
    };
    block
        .iter()
        .map(|l| match label.find(l) {
            Some(m) => l[..m.start()].trim().to_string(),
            None => l.clone(),
        })
        .filter(|l| !l.is_empty())
        .collect()
}

fn rebuild(lines: &[String], strategy: AddressStrategy) -> Option<String> {
    match strategy {
        AddressStrategy::Lines => non_empty(lines.join(", ")),
        AddressStrategy::Highlights => highlights(lines),
        AddressStrategy::LinesThenHighlights => {
            non_empty(lines.join(", ")).or_else(|| highlights(lines))
        }
    }
}

/// Runs of all-caps words anywhere in the block, first-seen order, no
/// repeats. A run may wrap onto the next line.
fn highlights(lines: &[String]) -> Option<String> {
    let re = Regex::new(r"\b[A-Z]{2,}(?:\s+[A-Z]{2,})*\b").ok()?;
    let block = lines.join("\n");
    let mut seen: Vec<String> = Vec::new();
    for m in re.find_iter(&block) {
        let word = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if !seen.contains(&word) {
            seen.push(word);
        }
    }
    non_empty(seen.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(terminator: AddressTerminator, strategy: AddressStrategy) -> PatternOptions {
        PatternOptions {
            terminator,
            address_strategy: strategy,
            ..PatternOptions::default()
        }
    }

    const BLANK_LAYOUT: &str = "\
Shipping Address :
Asha Verma
221B Park Street
KOLKATA, WEST BENGAL, 700016
GST Registration No: 19AABCU9603R1ZM

Order Number: 1 Invoice Number: 2
";

    const SENTINEL_LAYOUT: &str = "\
Shipping Address :
Asha Verma
221B Park Street
KOLKATA, WEST BENGAL, 700016
GST Registration No: 19AABCU9603R1ZM
Place of supply: WEST BENGAL
Place of delivery: WEST BENGAL
";

    #[test]
    fn test_blank_line_layout() {
        let party = shipping(
            BLANK_LAYOUT,
            &opts(AddressTerminator::BlankLine, AddressStrategy::Lines),
        );
        assert_eq!(party.name.as_deref(), Some("Asha Verma"));
        assert_eq!(
            party.address.as_deref(),
            Some("Asha Verma, 221B Park Street, KOLKATA, WEST BENGAL, 700016")
        );
        assert_eq!(party.gst.as_deref(), Some("19AABCU9603R1ZM"));
    }

    #[test]
    fn test_sentinel_layout() {
        let party = shipping(
            SENTINEL_LAYOUT,
            &opts(AddressTerminator::PlaceOfSupply, AddressStrategy::Lines),
        );
        assert_eq!(
            party.address.as_deref(),
            Some("Asha Verma, 221B Park Street, KOLKATA, WEST BENGAL, 700016")
        );
        assert_eq!(party.gst.as_deref(), Some("19AABCU9603R1ZM"));
    }

    #[test]
    fn test_blank_line_falls_back_to_sentinel() {
        let party = shipping(
            SENTINEL_LAYOUT,
            &opts(AddressTerminator::BlankLine, AddressStrategy::Lines),
        );
        let address = party.address.unwrap();
        assert!(!address.contains("Place of"));
        assert!(address.ends_with("700016"));
    }

    #[test]
    fn test_window_bounds_runaway_block() {
        let mut text = String::from("Shipping Address :\n");
        for i in 0..50 {
            text.push_str(&format!("line {i}\n"));
        }
        let options = PatternOptions {
            window: 3,
            ..opts(AddressTerminator::PlaceOfSupply, AddressStrategy::Lines)
        };
        let party = shipping(&text, &options);
        assert_eq!(party.address.as_deref(), Some("line 0, line 1, line 2"));
    }

    #[test]
    fn test_gst_line_is_stripped_from_address() {
        for terminator in [AddressTerminator::BlankLine, AddressTerminator::PlaceOfSupply] {
            for strategy in [AddressStrategy::Lines, AddressStrategy::Highlights] {
                let party = shipping(SENTINEL_LAYOUT, &opts(terminator, strategy));
                let address = party.address.unwrap_or_default();
                assert!(!address.contains("GST"), "{terminator:?}/{strategy:?}: {address}");
                assert!(!address.contains("19AABCU9603R1ZM"));
            }
        }
    }

    #[test]
    fn test_highlight_words() {
        let text = "Shipping Address : Sector 18 DELHI NCR near metro GST Registration No: 07ABCDE1234F1Z5\n";
        let party = shipping(
            text,
            &opts(AddressTerminator::BlankLine, AddressStrategy::Highlights),
        );
        assert_eq!(party.gst.as_deref(), Some("07ABCDE1234F1Z5"));
        let address = party.address.unwrap();
        assert!(address.contains("DELHI NCR"));
        assert!(!address.contains("GST"));
    }

    #[test]
    fn test_highlights_are_deduplicated_in_order() {
        let lines = vec![
            "NEW DELHI, DELHI, 110016".to_string(),
            "IN, 110016".to_string(),
            "DELHI".to_string(),
        ];
        assert_eq!(
            highlights(&lines).as_deref(),
            Some("NEW DELHI, DELHI, IN")
        );
    }

    #[test]
    fn test_highlight_run_wraps_across_lines() {
        let lines = vec!["Flat 4b, NEW".to_string(), "DELHI 110016".to_string()];
        assert_eq!(highlights(&lines).as_deref(), Some("NEW DELHI"));
    }

    #[test]
    fn test_lines_then_highlights_fallback() {
        assert_eq!(rebuild(&[], AddressStrategy::LinesThenHighlights), None);
        let lines = vec!["Plot 7, MUMBAI".to_string()];
        assert_eq!(
            rebuild(&lines, AddressStrategy::LinesThenHighlights).as_deref(),
            Some("Plot 7, MUMBAI")
        );
    }

    #[test]
    fn test_billing_gst_found_past_block() {
        let text = "\
Billing Address :
Ravi Kumar
12 MG Road

Some other section
GST Registration No: 29AAACR4849R1ZL
";
        let party = billing(text, &PatternOptions::default());
        assert_eq!(party.name.as_deref(), Some("Ravi Kumar"));
        assert_eq!(party.address.as_deref(), Some("Ravi Kumar, 12 MG Road"));
        assert_eq!(party.gst.as_deref(), Some("29AAACR4849R1ZL"));
    }

    #[test]
    fn test_billing_block_ends_at_shipping_label() {
        let text = "\
Billing Address :
Ravi Kumar
12 MG Road
BENGALURU, KARNATAKA
IN
Shipping Address :
Asha
KOLKATA
GST Registration No: 19AABCU9603R1ZM
";
        for terminator in [AddressTerminator::BlankLine, AddressTerminator::PlaceOfSupply] {
            let options = opts(terminator, AddressStrategy::Lines);
            let billing = billing(text, &options);
            assert_eq!(
                billing.address.as_deref(),
                Some("Ravi Kumar, 12 MG Road, BENGALURU, KARNATAKA, IN")
            );
            let shipping = shipping(text, &options);
            assert_eq!(shipping.address.as_deref(), Some("Asha, KOLKATA"));
            assert_eq!(shipping.gst.as_deref(), Some("19AABCU9603R1ZM"));
        }
    }

    #[test]
    fn test_side_by_side_labels() {
        let text = "Billing Address : Ravi Kumar Shipping Address : Asha Verma\n";
        let party = billing(text, &PatternOptions::default());
        assert_eq!(party.address.as_deref(), Some("Ravi Kumar"));
    }

    #[test]
    fn test_missing_block() {
        assert_eq!(shipping("no labels", &PatternOptions::default()), Party::default());
        assert_eq!(billing("no labels", &PatternOptions::default()), Party::default());
    }
}
