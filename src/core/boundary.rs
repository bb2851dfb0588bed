//! Purpose: Turn user-supplied start/stop key literals into encoded scan bounds.
//! Exports: `resolve_boundary`, `resolve_scan_boundary`, `resolve_row_key`, `resolve_cache_size`,
//!          `split_mask_override`.
//! Role: Decides how a literal is read (text, hex, number, date) from the declared key type.
//! Invariants: String and binary keys never consult a conversion mask.
//! Invariants: A literal with exactly one `@` followed by text carries its own mask.
//! Invariants: The stop literal is only resolved when a start literal is present.
//! Invariants: Every failure is a `Parse` error naming the literal and the bound.
use crate::core::error::{Bound, Error, ErrorKind};
use crate::core::key::{KeyEncoder, KeyType, KeyValue};
use crate::core::log::LogChannel;
use crate::core::mask::{DateMask, DecimalMask};
use crate::core::plan::ScanBoundary;
use crate::core::vars::VariableSpace;

pub fn resolve_boundary(
    literal: Option<&str>,
    bound: Bound,
    key_type: KeyType,
    declared_mask: Option<&str>,
    vars: &dyn VariableSpace,
    encoder: &dyn KeyEncoder,
) -> Result<Option<Vec<u8>>, Error> {
    let Some(literal) = literal.filter(|literal| !literal.is_empty()) else {
        return Ok(None);
    };
    let literal = vars.substitute(literal);
    let (text, encoded) = encode_literal(&literal, key_type, declared_mask, encoder);
    encoded.map(Some).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message(format!("unable to parse {bound} bound key value '{text}'"))
            .with_bound(bound)
            .with_literal(text)
            .with_source(err)
    })
}

/// Encodes one row key literal with the same rules as a scan bound.
pub fn resolve_row_key(
    literal: &str,
    key_type: KeyType,
    declared_mask: Option<&str>,
    vars: &dyn VariableSpace,
    encoder: &dyn KeyEncoder,
) -> Result<Vec<u8>, Error> {
    if literal.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("row key must not be empty"));
    }
    let literal = vars.substitute(literal);
    let (text, encoded) = encode_literal(&literal, key_type, declared_mask, encoder);
    encoded.map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message(format!("unable to parse row key '{text}'"))
            .with_literal(text)
            .with_source(err)
    })
}

// Returns the text actually parsed (mask suffix removed) alongside the outcome.
fn encode_literal<'a>(
    literal: &'a str,
    key_type: KeyType,
    declared_mask: Option<&'a str>,
    encoder: &dyn KeyEncoder,
) -> (&'a str, Result<Vec<u8>, Error>) {
    match key_type {
        KeyType::String | KeyType::Binary => (
            literal,
            encoder.encode(&KeyValue::Text(literal.to_string()), key_type),
        ),
        _ => {
            let (text, mask) = split_mask_override(literal, declared_mask);
            let encoded = match mask {
                Some(mask) => parse_masked(text, mask, key_type)
                    .and_then(|value| encoder.encode(&value, key_type)),
                None => encoder.encode(&KeyValue::Text(text.to_string()), key_type),
            };
            (text, encoded)
        }
    }
}

/// Splits `literal@mask`; the embedded mask wins over the declared one.
/// Zero or several `@`, or an empty embedded mask, leave the literal whole.
pub fn split_mask_override<'a>(
    literal: &'a str,
    declared_mask: Option<&'a str>,
) -> (&'a str, Option<&'a str>) {
    let declared_mask = declared_mask.filter(|mask| !mask.is_empty());
    let mut parts = literal.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(text), Some(mask), None) if !mask.is_empty() => (text, Some(mask)),
        _ => (literal, declared_mask),
    }
}

fn parse_masked(text: &str, mask: &str, key_type: KeyType) -> Result<KeyValue, Error> {
    if key_type.is_date() {
        let date = DateMask::compile(mask)?.parse(text)?;
        Ok(KeyValue::Date(date))
    } else {
        let number = DecimalMask::compile(mask)?.parse(text)?;
        Ok(KeyValue::Number(number))
    }
}

pub fn resolve_scan_boundary(
    start: Option<&str>,
    stop: Option<&str>,
    key_type: KeyType,
    declared_mask: Option<&str>,
    vars: &dyn VariableSpace,
    encoder: &dyn KeyEncoder,
) -> Result<ScanBoundary, Error> {
    let lower = resolve_boundary(start, Bound::Lower, key_type, declared_mask, vars, encoder)?;
    // An upper bound is only honoured alongside a lower bound.
    if lower.is_none() {
        return Ok(ScanBoundary::unbounded());
    }
    let upper = resolve_boundary(stop, Bound::Upper, key_type, declared_mask, vars, encoder)?;
    Ok(ScanBoundary::new(lower, upper))
}

pub fn resolve_cache_size(
    literal: Option<&str>,
    vars: &dyn VariableSpace,
    log: Option<&dyn LogChannel>,
) -> Result<u32, Error> {
    let Some(literal) = literal.filter(|literal| !literal.is_empty()) else {
        return Ok(0);
    };
    let substituted = vars.substitute(literal);
    let cache_size = substituted.trim().parse::<u32>().map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message(format!("unable to parse scanner cache size '{substituted}'"))
            .with_literal(substituted.clone())
            .with_hint("Scanner caching must be a non-negative whole number of rows.")
            .with_source(err)
    })?;
    if let Some(log) = log {
        log.log_basic(&format!("setting scanner caching to {cache_size} rows"));
    }
    Ok(cache_size)
}

#[cfg(test)]
mod tests {
    use super::{
        resolve_boundary, resolve_cache_size, resolve_row_key, resolve_scan_boundary,
        split_mask_override,
    };
    use crate::core::error::{Bound, ErrorKind};
    use crate::core::key::{KeyEncoder, KeyType, KeyValue, Number, OrderedKeyEncoder};
    use crate::core::log::testing::RecordingLog;
    use crate::core::vars::Variables;
    use time::macros::datetime;

    fn resolve(literal: &str, key_type: KeyType, mask: Option<&str>) -> Option<Vec<u8>> {
        resolve_boundary(
            Some(literal),
            Bound::Lower,
            key_type,
            mask,
            &Variables::new(),
            &OrderedKeyEncoder,
        )
        .expect("resolve")
    }

    fn encoded(value: KeyValue, key_type: KeyType) -> Vec<u8> {
        OrderedKeyEncoder.encode(&value, key_type).expect("encode")
    }

    #[test]
    fn empty_or_absent_literal_is_unbounded() {
        let vars = Variables::new();
        for literal in [None, Some("")] {
            let out = resolve_boundary(
                literal,
                Bound::Lower,
                KeyType::Long,
                None,
                &vars,
                &OrderedKeyEncoder,
            )
            .expect("resolve");
            assert_eq!(out, None);
        }
    }

    #[test]
    fn string_keys_ignore_masks() {
        for mask in [None, Some("yyyy-MM-dd"), Some("#0")] {
            assert_eq!(
                resolve("2020-01-01@yyyy", KeyType::String, mask),
                Some(b"2020-01-01@yyyy".to_vec())
            );
        }
    }

    #[test]
    fn binary_keys_are_hex_without_mask_split() {
        assert_eq!(
            resolve("0a0b", KeyType::Binary, Some("#0")),
            Some(vec![0x0a, 0x0b])
        );
        let err = resolve_boundary(
            Some("0a0b@#0"),
            Bound::Lower,
            KeyType::Binary,
            None,
            &Variables::new(),
            &OrderedKeyEncoder,
        )
        .expect_err("@ is not hex");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.literal(), Some("0a0b@#0"));
    }

    #[test]
    fn embedded_mask_overrides_declared_mask() {
        let expected = encoded(
            KeyValue::Date(datetime!(2020-03-04 0:00 UTC)),
            KeyType::Date,
        );
        assert_eq!(
            resolve("04/03/2020@dd/MM/yyyy", KeyType::Date, Some("yyyy-MM-dd")),
            Some(expected)
        );
    }

    #[test]
    fn split_requires_exactly_one_at_sign() {
        assert_eq!(split_mask_override("1@#0", Some("x")), ("1", Some("#0")));
        assert_eq!(split_mask_override("1", Some("x")), ("1", Some("x")));
        assert_eq!(split_mask_override("1@2@#0", Some("x")), ("1@2@#0", Some("x")));
        assert_eq!(split_mask_override("1@", Some("x")), ("1@", Some("x")));
        assert_eq!(split_mask_override("1", Some("")), ("1", None));
    }

    #[test]
    fn numeric_literal_with_decimal_mask() {
        assert_eq!(
            resolve("1,234", KeyType::Long, Some("#,##0")),
            Some(encoded(KeyValue::Number(Number::Long(1234)), KeyType::Long))
        );
        assert_eq!(
            resolve("2.5@#0.0", KeyType::Double, None),
            Some(encoded(KeyValue::Number(Number::Double(2.5)), KeyType::Double))
        );
    }

    #[test]
    fn no_mask_falls_back_to_plain_text() {
        assert_eq!(
            resolve("42", KeyType::Integer, None),
            Some(encoded(KeyValue::Text("42".into()), KeyType::Integer))
        );
        assert_eq!(
            resolve("86400000", KeyType::Date, Some("")),
            Some(encoded(KeyValue::Number(Number::Long(86_400_000)), KeyType::Date))
        );
    }

    #[test]
    fn variables_are_substituted_before_splitting() {
        let vars = Variables::new().with("DAY", "2021-06-30").with("FMT", "yyyy-MM-dd");
        let out = resolve_boundary(
            Some("${DAY}@${FMT}"),
            Bound::Upper,
            KeyType::UnsignedDate,
            None,
            &vars,
            &OrderedKeyEncoder,
        )
        .expect("resolve");
        assert_eq!(
            out,
            Some(encoded(
                KeyValue::Date(datetime!(2021-06-30 0:00 UTC)),
                KeyType::UnsignedDate
            ))
        );
    }

    #[test]
    fn parse_failures_name_the_bound() {
        let vars = Variables::new();
        let err = resolve_scan_boundary(
            Some("2020-99-01"),
            Some("2020-12-31"),
            KeyType::Date,
            Some("yyyy-MM-dd"),
            &vars,
            &OrderedKeyEncoder,
        )
        .expect_err("lower fails");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.bound(), Some(Bound::Lower));
        assert_eq!(err.literal(), Some("2020-99-01"));

        let err = resolve_scan_boundary(
            Some("2020-01-01"),
            Some("not-a-date"),
            KeyType::Date,
            Some("yyyy-MM-dd"),
            &vars,
            &OrderedKeyEncoder,
        )
        .expect_err("upper fails");
        assert_eq!(err.bound(), Some(Bound::Upper));
        assert!(err.message().unwrap_or_default().contains("upper bound"));
        assert!(err.message().unwrap_or_default().contains("not-a-date"));
    }

    #[test]
    fn stop_literal_is_ignored_without_start() {
        let vars = Variables::new();
        for start in [None, Some("")] {
            let bounds = resolve_scan_boundary(
                start,
                Some("definitely not parseable"),
                KeyType::Date,
                Some("yyyy-MM-dd"),
                &vars,
                &OrderedKeyEncoder,
            )
            .expect("resolve");
            assert_eq!(bounds.lower, None);
            assert_eq!(bounds.upper, None);
        }
    }

    #[test]
    fn date_range_orders_lower_before_upper() {
        let bounds = resolve_scan_boundary(
            Some("2020-01-01"),
            Some("2020-12-31"),
            KeyType::Date,
            Some("yyyy-MM-dd"),
            &Variables::new(),
            &OrderedKeyEncoder,
        )
        .expect("resolve");
        let lower = bounds.lower.expect("lower");
        let upper = bounds.upper.expect("upper");
        assert_eq!(
            lower,
            encoded(KeyValue::Date(datetime!(2020-01-01 0:00 UTC)), KeyType::Date)
        );
        assert_eq!(
            upper,
            encoded(KeyValue::Date(datetime!(2020-12-31 0:00 UTC)), KeyType::Date)
        );
        assert!(lower < upper);
    }

    #[test]
    fn cache_size_defaults_to_zero_and_logs_when_set() {
        let vars = Variables::new().with("CACHE", "250");
        let log = RecordingLog::default();
        assert_eq!(resolve_cache_size(None, &vars, Some(&log)).expect("none"), 0);
        assert_eq!(resolve_cache_size(Some(""), &vars, Some(&log)).expect("empty"), 0);
        assert!(log.lines.borrow().is_empty());

        assert_eq!(
            resolve_cache_size(Some("${CACHE}"), &vars, Some(&log)).expect("set"),
            250
        );
        assert_eq!(log.lines.borrow().as_slice(), ["setting scanner caching to 250 rows"]);
    }

    #[test]
    fn malformed_cache_size_is_parse_error() {
        for literal in ["lots", "-5"] {
            let err = resolve_cache_size(Some(literal), &Variables::new(), None).expect_err("err");
            assert_eq!(err.kind(), ErrorKind::Parse);
            assert_eq!(err.literal(), Some(literal));
        }
    }

    #[test]
    fn row_keys_use_scan_literal_rules() {
        let vars = Variables::new().with("ID", "42");
        let key = resolve_row_key("${ID}", KeyType::Long, None, &vars, &OrderedKeyEncoder)
            .expect("row key");
        assert_eq!(key, encoded(KeyValue::Number(Number::Long(42)), KeyType::Long));

        let err = resolve_row_key("abc@0", KeyType::Long, None, &vars, &OrderedKeyEncoder)
            .expect_err("bad number");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.literal(), Some("abc"));
        assert_eq!(err.bound(), None);

        let err = resolve_row_key("", KeyType::String, None, &vars, &OrderedKeyEncoder)
            .expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
