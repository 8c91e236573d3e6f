//! Fee text handling: numeric extraction and label scanning.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use tenderbid_shared::FeeFields;

/// First run of digits and thousands separators, e.g. `2,000` in `Rs. 2,000/-`.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d,]+").unwrap());

static TENDER_FEE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:tender|document)[ \t]+(?:fee|cost)\b(.*)$").unwrap()
});

static EMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:emd|earnest[ \t]+money(?:[ \t]+deposit)?)\b(.*)$").unwrap()
});

/// Pull the first number out of free text.
///
/// Commas are dropped before parsing. Returns `0.0` when the text is absent,
/// holds no digits, or does not parse to a finite number; the result is
/// never negative.
pub fn extract_number(text: Option<&str>) -> f64 {
    let Some(text) = text else {
        return 0.0;
    };
    if text.trim().is_empty() {
        return 0.0;
    }

    let Some(run) = NUMBER_RE.find(text) else {
        warn!(text, "no numeric value in fee text, using 0");
        return 0.0;
    };

    let digits: String = run.as_str().chars().filter(|c| *c != ',').collect();
    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        Ok(_) | Err(_) => {
            warn!(text, run = run.as_str(), "unparseable fee value, using 0");
            0.0
        }
    }
}

/// Find tender-fee and EMD statements in document text.
///
/// Takes the remainder of the first line mentioning "tender fee" /
/// "document fee" (or "... cost") and the first line mentioning "EMD" /
/// "earnest money". When the remainder has a label colon, only the part after
/// it is kept so qualifiers such as `(2%)` are not read as the amount. A
/// colon between two digits, as in a `12:00` deadline, is not a label colon.
pub fn scan_fee_fields(text: &str) -> FeeFields {
    FeeFields {
        tender_fee_text: labelled_value(&TENDER_FEE_RE, text),
        emd_text: labelled_value(&EMD_RE, text),
    }
}

fn labelled_value(re: &Regex, text: &str) -> String {
    let Some(rest) = re.captures(text).and_then(|c| c.get(1)) else {
        return String::new();
    };
    let rest = rest.as_str();
    let value = match label_colon(rest) {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    value.trim().to_string()
}

/// Byte offset of the first colon that is not part of a clock time.
fn label_colon(rest: &str) -> Option<usize> {
    rest.match_indices(':').map(|(idx, _)| idx).find(|&idx| {
        let digit_before = rest[..idx].ends_with(|c: char| c.is_ascii_digit());
        let digit_after = rest[idx + 1..].starts_with(|c: char| c.is_ascii_digit());
        !(digit_before && digit_after)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rupee_amounts() {
        assert_eq!(extract_number(Some("Rs. 2,000/-")), 2000.0);
        assert_eq!(extract_number(Some("Rs. 500/-")), 500.0);
        assert_eq!(extract_number(Some("INR 1,25,000 only")), 125000.0);
    }

    #[test]
    fn fallbacks_are_zero() {
        assert_eq!(extract_number(Some("N/A")), 0.0);
        assert_eq!(extract_number(Some("")), 0.0);
        assert_eq!(extract_number(None), 0.0);
        assert_eq!(extract_number(Some("nil, exempted")), 0.0);
    }

    #[test]
    fn takes_only_the_first_run() {
        // The decimal point ends the run; only the integer part is read.
        assert_eq!(extract_number(Some("Rs. 1,500.50 + GST 18%")), 1500.0);
        assert_eq!(extract_number(Some("fee 300 or 400")), 300.0);
    }

    #[test]
    fn never_negative() {
        assert_eq!(extract_number(Some("-750")), 750.0);
    }

    #[test]
    fn overflowing_digits_fall_back_to_zero() {
        let huge = "9".repeat(400);
        assert_eq!(extract_number(Some(&huge)), 0.0);
    }

    #[test]
    fn scans_labelled_fees() {
        let text = "NOTICE INVITING TENDER\n\
                    Tender Fee (Non-refundable): Rs. 500/-\n\
                    EMD (2%): Rs. 10,000/-\n";
        let fees = scan_fee_fields(text);
        assert_eq!(fees.tender_fee_text, "Rs. 500/-");
        assert_eq!(fees.emd_text, "Rs. 10,000/-");
        assert_eq!(extract_number(Some(&fees.emd_text)), 10000.0);
    }

    #[test]
    fn scans_alternative_labels() {
        let text = "Cost of document: see portal\nDocument cost Rs 1,180\nEarnest Money Deposit Rs 25,000";
        let fees = scan_fee_fields(text);
        assert_eq!(fees.tender_fee_text, "Rs 1,180");
        assert_eq!(fees.emd_text, "Rs 25,000");
    }

    #[test]
    fn colon_after_the_amount_is_not_a_label_separator() {
        let fees = scan_fee_fields("EMD Rs 10,000 by 12:00");
        assert_eq!(fees.emd_text, "Rs 10,000 by 12:00");
        assert_eq!(extract_number(Some(&fees.emd_text)), 10000.0);

        let fees = scan_fee_fields("EMD: Rs 5,000 payable before 17:30");
        assert_eq!(fees.emd_text, "Rs 5,000 payable before 17:30");
    }

    #[test]
    fn scan_without_labels_is_empty() {
        assert!(scan_fee_fields("Supply of steel pipes").is_empty());
    }
}
