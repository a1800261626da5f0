//! Best-effort parsing of the free-text values upstream sends.
//!
//! Nothing in here fails: values that cannot be read come back as an
//! `Unparseable` variant so callers can tell "zero" apart from "garbage".

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Currency {
    Amount(f64),
    Unparseable,
}

impl Currency {
    pub fn amount(self) -> Option<f64> {
        match self {
            Currency::Amount(v) => Some(v),
            Currency::Unparseable => None,
        }
    }

    pub fn amount_or_zero(self) -> f64 {
        self.amount().unwrap_or(0.0)
    }
}

/// Parses strings such as `"$1,250.50"`. `$`, `,` and surrounding whitespace
/// are dropped; what remains must be a plain decimal number.
pub fn parse_currency(s: &str) -> Currency {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    if !is_plain_decimal(&cleaned) {
        return Currency::Unparseable;
    }

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Currency::Amount(v),
        _ => Currency::Unparseable,
    }
}

// Same shape the SQL range filter accepts: optional sign, digits, optional fraction.
fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match frac_part {
        Some(f) => !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    At(DateTime<Utc>),
    Unparseable,
}

impl EventTime {
    pub fn at(self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::At(t) => Some(t),
            EventTime::Unparseable => None,
        }
    }
}

/// Upstream timestamps are RFC 3339 (e.g. `2025-02-19T00:30:05.837606216Z`).
pub fn parse_event_time(s: &str) -> EventTime {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(t) => EventTime::At(t.with_timezone(&Utc)),
        Err(_) => EventTime::Unparseable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_currency_strings() {
        assert_eq!(parse_currency("$1,250.50"), Currency::Amount(1250.50));
        assert_eq!(parse_currency("$150.00"), Currency::Amount(150.0));
        assert_eq!(parse_currency(" 42 "), Currency::Amount(42.0));
        assert_eq!(parse_currency("-3.5"), Currency::Amount(-3.5));
    }

    #[test]
    fn invalid_currency_is_tagged_and_counts_as_zero() {
        let parsed = parse_currency("invalid");
        assert_eq!(parsed, Currency::Unparseable);
        assert_eq!(parsed.amount_or_zero(), 0.0);

        assert_eq!(parse_currency(""), Currency::Unparseable);
        assert_eq!(parse_currency("$"), Currency::Unparseable);
        assert_eq!(parse_currency("1e5"), Currency::Unparseable);
        assert_eq!(parse_currency("12."), Currency::Unparseable);
        assert_eq!(parse_currency("inf"), Currency::Unparseable);
    }

    #[test]
    fn genuine_zero_is_not_unparseable() {
        assert_eq!(parse_currency("$0.00"), Currency::Amount(0.0));
    }

    #[test]
    fn parses_rfc3339_event_times() {
        let t = parse_event_time("2025-02-19T00:30:05.837606216Z");
        let expected = Utc.with_ymd_and_hms(2025, 2, 19, 0, 30, 5).unwrap();
        let got = t.at().unwrap();
        assert_eq!(got.timestamp(), expected.timestamp());

        let offset = parse_event_time("2025-02-19T09:30:05+09:00");
        assert_eq!(offset.at().unwrap().timestamp(), expected.timestamp());
    }

    #[test]
    fn unparseable_event_time() {
        assert_eq!(parse_event_time("yesterday"), EventTime::Unparseable);
        assert_eq!(parse_event_time(""), EventTime::Unparseable);
        assert_eq!(parse_event_time("2025-02-19 00:30:05"), EventTime::Unparseable);
    }
}
