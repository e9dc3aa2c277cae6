//! Free-text quantity parsing for legacy shopping items ("2", "1,5 kg", "a few").

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*(.*?)\s*$").expect("quantity pattern compiles")
});

/// Used when nothing numeric can be recovered from the text.
pub const FALLBACK_QUANTITY: f64 = 1.0;

/// Largest quantity a list item may carry.
pub const MAX_LIST_QUANTITY: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuantity {
    pub value: f64,
    pub label: Option<String>,
}

/// Split `raw` into a numeric value and an optional label.
///
/// A leading number becomes the value and any trailing text ("kg", "boxes")
/// the label. Text without a leading number, or with one above
/// [`MAX_LIST_QUANTITY`], keeps value [`FALLBACK_QUANTITY`] and is preserved
/// verbatim as the label.
pub fn parse_quantity(raw: Option<&str>) -> ParsedQuantity {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ParsedQuantity {
            value: FALLBACK_QUANTITY,
            label: None,
        };
    };

    if let Some(caps) = LEADING_NUMBER.captures(raw) {
        let number = caps[1].replace(',', ".");
        if let Some(value) = number
            .parse::<f64>()
            .ok()
            .filter(|v| *v <= MAX_LIST_QUANTITY)
        {
            let suffix = caps[2].trim();
            return ParsedQuantity {
                value,
                label: (!suffix.is_empty()).then(|| suffix.to_string()),
            };
        }
    }

    ParsedQuantity {
        value: FALLBACK_QUANTITY,
        label: Some(raw.to_string()),
    }
}

/// Stock moves in whole units; list quantities may be fractional.
pub fn to_stock_units(value: f64) -> i64 {
    if value.is_finite() && value > 0.0 {
        value.round() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_integer() {
        assert_eq!(
            parse_quantity(Some("3")),
            ParsedQuantity {
                value: 3.0,
                label: None
            }
        );
    }

    #[test]
    fn decimal_comma_with_unit() {
        assert_eq!(
            parse_quantity(Some(" 1,5 kg ")),
            ParsedQuantity {
                value: 1.5,
                label: Some("kg".into())
            }
        );
    }

    #[test]
    fn unparsable_text_is_kept_as_label() {
        assert_eq!(
            parse_quantity(Some("a few")),
            ParsedQuantity {
                value: FALLBACK_QUANTITY,
                label: Some("a few".into())
            }
        );
    }

    #[test]
    fn oversized_number_falls_back_to_label() {
        assert_eq!(
            parse_quantity(Some("99999999999999999999 bags")),
            ParsedQuantity {
                value: FALLBACK_QUANTITY,
                label: Some("99999999999999999999 bags".into())
            }
        );
    }

    #[test]
    fn missing_quantity_defaults() {
        assert_eq!(parse_quantity(None).value, FALLBACK_QUANTITY);
        assert_eq!(parse_quantity(Some("   ")).label, None);
    }

    #[test]
    fn stock_units_round_and_clamp() {
        assert_eq!(to_stock_units(2.4), 2);
        assert_eq!(to_stock_units(2.5), 3);
        assert_eq!(to_stock_units(0.0), 0);
        assert_eq!(to_stock_units(-4.0), 0);
        assert_eq!(to_stock_units(f64::NAN), 0);
    }

    proptest! {
        #[test]
        fn integers_parse_exactly(n in 0u32..1_000_000, unit in "[a-z]{0,6}") {
            let text = format!("{n} {unit}");
            let parsed = parse_quantity(Some(&text));
            prop_assert_eq!(parsed.value, n as f64);
            let expected = (!unit.is_empty()).then(|| unit.clone());
            prop_assert_eq!(parsed.label, expected);
        }

        #[test]
        fn never_panics_and_keeps_non_numeric_text(s in "[a-zA-Z ]{1,20}") {
            let parsed = parse_quantity(Some(&s));
            prop_assert_eq!(parsed.value, FALLBACK_QUANTITY);
            let trimmed = s.trim();
            let expected = (!trimmed.is_empty()).then(|| trimmed.to_string());
            prop_assert_eq!(parsed.label, expected);
        }
    }
}
