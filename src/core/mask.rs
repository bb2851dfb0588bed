//! Purpose: Parse key literals through user-supplied conversion masks.
//! Exports: `DateMask`, `DecimalMask`.
//! Role: Turns `yyyy-MM-dd` style date masks and `#,##0.00` style decimal masks into values.
//! Invariants: Masks are compiled once per literal; parsing never consults global state.
//! Invariants: Dates without an explicit offset are interpreted in UTC.
use std::num::{NonZeroU8, NonZeroU16};

use time::parsing::Parsed;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::core::error::{Error, ErrorKind};
use crate::core::key::Number;

/// Date mask in the SimpleDateFormat letter vocabulary, translated to `time`
/// format descriptions. `S` runs are millisecond counts and are read by hand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DateMask {
    pattern: String,
    segments: Vec<DateSegment>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum DateSegment {
    Description(String),
    /// Millisecond count; `max_digits` is set when another field follows directly.
    Millis { max_digits: Option<usize> },
}

impl DateMask {
    pub fn compile(pattern: &str) -> Result<Self, Error> {
        let segments = translate_date_pattern(pattern)?;
        // Reject descriptions `time` cannot read up front, not on first parse.
        for segment in &segments {
            if let DateSegment::Description(description) = segment {
                compile_description(pattern, description)?;
            }
        }
        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Parses the leading part of `text`; anything after the last mask field is ignored.
    pub fn parse(&self, text: &str) -> Result<OffsetDateTime, Error> {
        let mut parsed = Parsed::new();
        let mut millis = 0i64;
        let mut rest = text.as_bytes();
        for segment in &self.segments {
            rest = match segment {
                DateSegment::Description(description) => {
                    let items = compile_description(&self.pattern, description)?;
                    parsed
                        .parse_items(rest, &items)
                        .map_err(|err| self.mismatch(text).with_source(err))?
                }
                DateSegment::Millis { max_digits } => {
                    let limit = max_digits.unwrap_or(usize::MAX);
                    let len = rest
                        .iter()
                        .take(limit)
                        .take_while(|byte| byte.is_ascii_digit())
                        .count();
                    // At most 18 digits fit an i64 without overflow.
                    if len == 0 || len > 18 {
                        return Err(self.mismatch(text));
                    }
                    millis += rest[..len]
                        .iter()
                        .fold(0i64, |acc, byte| acc * 10 + i64::from(byte - b'0'));
                    &rest[len..]
                }
            };
        }
        let datetime = assemble_datetime(&parsed).map_err(|err| err.with_literal(text))?;
        datetime
            .checked_add(Duration::milliseconds(millis))
            .ok_or_else(|| {
                Error::new(ErrorKind::Parse)
                    .with_message("date value out of range")
                    .with_literal(text)
            })
    }

    fn mismatch(&self, text: &str) -> Error {
        Error::new(ErrorKind::Parse)
            .with_message(format!("'{text}' does not match date mask '{}'", self.pattern))
            .with_literal(text)
    }
}

fn compile_description<'a>(
    pattern: &str,
    description: &'a str,
) -> Result<Vec<time::format_description::BorrowedFormatItem<'a>>, Error> {
    time::format_description::parse(description).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid date mask '{pattern}'"))
            .with_source(err)
    })
}

fn assemble_datetime(parsed: &Parsed) -> Result<OffsetDateTime, Error> {
    let year = match (parsed.year(), parsed.year_last_two()) {
        (Some(year), _) => year,
        (None, Some(last_two)) => pivot_two_digit_year(last_two),
        (None, None) => 1970,
    };
    let date = match parsed.ordinal() {
        Some(ordinal) => Date::from_ordinal_date(year, NonZeroU16::get(ordinal)),
        None => Date::from_calendar_date(
            year,
            parsed.month().unwrap_or(Month::January),
            parsed.day().map_or(1, NonZeroU8::get),
        ),
    }
    .map_err(component_error)?;

    let hour = match (parsed.hour_24(), parsed.hour_12(), parsed.hour_12_is_pm()) {
        (Some(hour), _, _) => hour,
        (None, Some(hour), is_pm) => {
            let hour = hour.get() % 12;
            if is_pm == Some(true) { hour + 12 } else { hour }
        }
        (None, None, Some(true)) => 12,
        (None, None, _) => 0,
    };
    let time = Time::from_hms(
        hour,
        parsed.minute().unwrap_or(0),
        parsed.second().unwrap_or(0),
    )
    .map_err(component_error)?;
    let offset = UtcOffset::from_hms(
        parsed.offset_hour().unwrap_or(0),
        parsed.offset_minute_signed().unwrap_or(0),
        0,
    )
    .map_err(component_error)?;

    Ok(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

fn pivot_two_digit_year(last_two: u8) -> i32 {
    let last_two = i32::from(last_two);
    if last_two < 70 { 2000 + last_two } else { 1900 + last_two }
}

fn component_error(err: time::error::ComponentRange) -> Error {
    Error::new(ErrorKind::Parse)
        .with_message("date value out of range")
        .with_source(err)
}

fn translate_date_pattern(pattern: &str) -> Result<Vec<DateSegment>, Error> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut segments = Vec::new();
    let mut out = String::with_capacity(pattern.len() * 4);
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if ch == '\'' {
            idx += 1;
            if chars.get(idx) == Some(&'\'') {
                out.push('\'');
                idx += 1;
                continue;
            }
            loop {
                match chars.get(idx) {
                    None => {
                        return Err(Error::new(ErrorKind::Usage)
                            .with_message(format!("unterminated quote in date mask '{pattern}'")));
                    }
                    Some('\'') if chars.get(idx + 1) == Some(&'\'') => {
                        out.push('\'');
                        idx += 2;
                    }
                    Some('\'') => {
                        idx += 1;
                        break;
                    }
                    Some(literal) => {
                        push_literal(&mut out, *literal);
                        idx += 1;
                    }
                }
            }
            continue;
        }
        if !ch.is_ascii_alphabetic() {
            push_literal(&mut out, ch);
            idx += 1;
            continue;
        }

        let mut run = 1;
        while chars.get(idx + run) == Some(&ch) {
            run += 1;
        }
        idx += run;
        if ch == 'S' {
            if !out.is_empty() {
                segments.push(DateSegment::Description(std::mem::take(&mut out)));
            }
            let followed_by_field = chars
                .get(idx)
                .is_some_and(|next| next.is_ascii_alphabetic());
            segments.push(DateSegment::Millis {
                max_digits: followed_by_field.then_some(run),
            });
            continue;
        }
        let component = match (ch, run) {
            ('y', 2) => "[year repr:last_two]".to_string(),
            ('y', _) => "[year]".to_string(),
            ('M', 1) => "[month padding:none]".to_string(),
            ('M', 2) => "[month]".to_string(),
            ('M', 3) => "[month repr:short case_sensitive:false]".to_string(),
            ('M', _) => "[month repr:long case_sensitive:false]".to_string(),
            ('d', 1) => "[day padding:none]".to_string(),
            ('d', _) => "[day]".to_string(),
            ('D', _) => "[ordinal padding:none]".to_string(),
            ('H', 1) => "[hour padding:none]".to_string(),
            ('H', _) => "[hour]".to_string(),
            ('h', 1) => "[hour repr:12 padding:none]".to_string(),
            ('h', _) => "[hour repr:12]".to_string(),
            ('m', 1) => "[minute padding:none]".to_string(),
            ('m', _) => "[minute]".to_string(),
            ('s', 1) => "[second padding:none]".to_string(),
            ('s', _) => "[second]".to_string(),
            ('a', _) => "[period case_sensitive:false]".to_string(),
            ('E', 1..=3) => "[weekday repr:short case_sensitive:false]".to_string(),
            ('E', _) => "[weekday case_sensitive:false]".to_string(),
            ('Z', _) => "[offset_hour sign:mandatory][offset_minute]".to_string(),
            ('X', 1) => "[offset_hour sign:mandatory]".to_string(),
            ('X', 2) => "[offset_hour sign:mandatory][offset_minute]".to_string(),
            ('X', _) => "[offset_hour sign:mandatory]:[offset_minute]".to_string(),
            (letter, _) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "unsupported letter '{letter}' in date mask '{pattern}'"
                    ))
                    .with_hint("Supported letters: y M d D H h m s S a E Z X."));
            }
        };
        out.push_str(&component);
    }
    if !out.is_empty() {
        segments.push(DateSegment::Description(out));
    }
    Ok(segments)
}

fn push_literal(out: &mut String, ch: char) {
    if ch == '[' {
        out.push_str("[[");
    } else {
        out.push(ch);
    }
}

/// Decimal mask in the DecimalFormat vocabulary. Parsing is lenient: it reads
/// the longest numeric prefix after the mask prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecimalMask {
    pattern: String,
    positive_prefix: String,
    positive_suffix: String,
    negative_prefix: String,
    negative_suffix: String,
    grouping: bool,
    multiplier: u32,
}

struct Affixes {
    prefix: String,
    suffix: String,
    grouping: bool,
    multiplier: u32,
}

impl DecimalMask {
    pub fn compile(pattern: &str) -> Result<Self, Error> {
        let (positive, negative) = split_subpatterns(pattern);
        let positive = compile_affixes(positive, pattern)?;
        let (negative_prefix, negative_suffix) = match negative {
            Some(negative) => {
                let negative = compile_affixes(negative, pattern)?;
                (negative.prefix, negative.suffix)
            }
            None => (
                format!("-{}", positive.prefix),
                positive.suffix.clone(),
            ),
        };
        Ok(Self {
            pattern: pattern.to_string(),
            positive_prefix: positive.prefix,
            positive_suffix: positive.suffix,
            negative_prefix,
            negative_suffix,
            grouping: positive.grouping,
            multiplier: positive.multiplier,
        })
    }

    pub fn parse(&self, text: &str) -> Result<Number, Error> {
        let positive = text.starts_with(&self.positive_prefix);
        let negative = text.starts_with(&self.negative_prefix);
        let (is_negative, rest) = match (positive, negative) {
            (true, true) if self.negative_prefix.len() > self.positive_prefix.len() => {
                (true, &text[self.negative_prefix.len()..])
            }
            (true, _) => (false, &text[self.positive_prefix.len()..]),
            (false, true) => (true, &text[self.negative_prefix.len()..]),
            (false, false) => return Err(self.mismatch(text, "prefix does not match")),
        };

        let digits = scan_digits(rest, self.grouping);
        if digits.integer.is_empty() && digits.fraction.is_empty() {
            return Err(self.mismatch(text, "no digits found"));
        }
        let suffix = if is_negative {
            &self.negative_suffix
        } else {
            &self.positive_suffix
        };
        if !suffix.is_empty() && !rest[digits.consumed..].starts_with(suffix.as_str()) {
            return Err(self.mismatch(text, "suffix does not match"));
        }

        let fraction_is_zero = digits.fraction.trim_end_matches('0').is_empty();
        if fraction_is_zero && digits.exponent.is_none() && self.multiplier == 1 {
            let integer = if digits.integer.is_empty() { "0" } else { digits.integer.as_str() };
            if let Ok(value) = integer.parse::<i64>() {
                return Ok(Number::Long(if is_negative { -value } else { value }));
            }
        }

        let literal = format!(
            "{}.{}e{}",
            if digits.integer.is_empty() { "0" } else { digits.integer.as_str() },
            if digits.fraction.is_empty() { "0" } else { digits.fraction.as_str() },
            digits.exponent.unwrap_or(0)
        );
        let mut value = literal
            .parse::<f64>()
            .map_err(|err| self.mismatch(text, "number out of range").with_source(err))?;
        value /= f64::from(self.multiplier);
        if is_negative {
            value = -value;
        }
        // Integral results within the exact f64 integer range come back as longs.
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
            return Ok(Number::Long(value as i64));
        }
        Ok(Number::Double(value))
    }

    fn mismatch(&self, text: &str, reason: &str) -> Error {
        Error::new(ErrorKind::Parse)
            .with_message(format!(
                "'{text}' does not match decimal mask '{}': {reason}",
                self.pattern
            ))
            .with_literal(text)
    }
}

struct Digits {
    integer: String,
    fraction: String,
    exponent: Option<i32>,
    consumed: usize,
}

fn scan_digits(input: &str, grouping: bool) -> Digits {
    let bytes = input.as_bytes();
    let mut digits = Digits {
        integer: String::new(),
        fraction: String::new(),
        exponent: None,
        consumed: 0,
    };
    let mut seen_decimal = false;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match byte {
            b'0'..=b'9' => {
                if seen_decimal {
                    digits.fraction.push(byte as char);
                } else {
                    digits.integer.push(byte as char);
                }
                idx += 1;
                digits.consumed = idx;
            }
            b',' if grouping && !seen_decimal => idx += 1,
            b'.' if !seen_decimal => {
                seen_decimal = true;
                idx += 1;
                digits.consumed = idx;
            }
            b'E' if !(digits.integer.is_empty() && digits.fraction.is_empty()) => {
                if let Some((exponent, len)) = scan_exponent(&bytes[idx + 1..]) {
                    digits.exponent = Some(exponent);
                    digits.consumed = idx + 1 + len;
                }
                break;
            }
            _ => break,
        }
    }
    digits
}

fn scan_exponent(bytes: &[u8]) -> Option<(i32, usize)> {
    let (negative, start) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let len = bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    let text = std::str::from_utf8(&bytes[start..start + len]).ok()?;
    let value = text.parse::<i32>().ok()?;
    Some((if negative { -value } else { value }, start + len))
}

fn split_subpatterns(pattern: &str) -> (&str, Option<&str>) {
    let mut in_quote = false;
    for (idx, ch) in pattern.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return (&pattern[..idx], Some(&pattern[idx + 1..])),
            _ => {}
        }
    }
    (pattern, None)
}

fn compile_affixes(subpattern: &str, pattern: &str) -> Result<Affixes, Error> {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut number = String::new();
    let mut multiplier = 1u32;
    // 0 = prefix, 1 = number part, 2 = suffix.
    let mut phase = 0;
    let mut in_quote = false;
    let mut chars = subpattern.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                push_affix(&mut phase, &mut prefix, &mut suffix, '\'');
            } else {
                in_quote = !in_quote;
            }
            continue;
        }
        if in_quote {
            push_affix(&mut phase, &mut prefix, &mut suffix, ch);
            continue;
        }
        let is_number_char = matches!(ch, '#' | '0'..='9' | ',' | '.')
            || (ch == 'E' && phase == 1);
        if is_number_char && phase < 2 {
            phase = 1;
            number.push(ch);
            continue;
        }
        match ch {
            '%' => multiplier = 100,
            '\u{2030}' => multiplier = 1000,
            _ => {}
        }
        push_affix(&mut phase, &mut prefix, &mut suffix, ch);
    }
    if in_quote {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unterminated quote in decimal mask '{pattern}'")));
    }
    if !number.chars().any(|ch| ch == '#' || ch.is_ascii_digit()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("decimal mask '{pattern}' has no digit placeholders")));
    }
    Ok(Affixes {
        prefix,
        suffix,
        grouping: number.contains(','),
        multiplier,
    })
}

fn push_affix(phase: &mut u8, prefix: &mut String, suffix: &mut String, ch: char) {
    match *phase {
        0 => prefix.push(ch),
        _ => {
            *phase = 2;
            suffix.push(ch);
        }
    }
}
