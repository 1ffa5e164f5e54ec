//! Turns decrypted strings back into typed values.
//!
//! Conversion is best effort. Collections that cannot be parsed become empty,
//! while every other failure is logged and yields `None`, which callers treat as
//! "leave the field unset". Nothing here returns an error.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use tracing::warn;

/// Semantic target type of a field or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Passed through unconverted.
    Text,
    Number,
    Bool,
    List,
    /// Sorted, without duplicates.
    Set,
    /// Sorted in natural order.
    Queue,
    Map,
    /// An instant. Readings without an offset are local wall-clock time.
    Date,
    LocalDateTime,
    LocalDate,
    LocalTime,
    OffsetDateTime,
    /// Offset date-time with an optional trailing `[Region/Zone]`.
    ZonedDateTime,
}

/// A successfully converted value.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Text(String),
    Number(Number),
    Bool(bool),
    List(Vec<String>),
    Map(Map<String, Value>),
    Date(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    OffsetDateTime(DateTime<FixedOffset>),
}

impl CoercedValue {
    /// JSON form accepted by the `serde` impls of the matching Rust types.
    pub fn into_json(self) -> Value {
        match self {
            CoercedValue::Text(s) => Value::String(s),
            CoercedValue::Number(n) => Value::Number(n),
            CoercedValue::Bool(b) => Value::Bool(b),
            CoercedValue::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            CoercedValue::Map(map) => Value::Object(map),
            CoercedValue::Date(d) => Value::String(d.to_rfc3339()),
            CoercedValue::LocalDateTime(dt) => {
                Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            CoercedValue::LocalDate(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            CoercedValue::LocalTime(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            CoercedValue::OffsetDateTime(dt) => Value::String(dt.to_rfc3339()),
        }
    }
}

// ---------------------------------------------------------------------------
// Date patterns
// ---------------------------------------------------------------------------

/// Tried after the configured patterns, in order.
pub const DEFAULT_DATE_PATTERNS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.3f",
    "%Y-%m-%d",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S%.3f",
    "%Y/%m/%d",
    "%Y%m%d",
    "%Y年%m月%d日",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M:%S%.3f",
    "%H:%M:%S",
    "%I:%M:%S %p",
    "%H:%M:%S%.3f",
    "%I:%M:%S%.3f %p",
    "%H:%M:%S%.f",
    "%H:%M",
    "%I:%M %p",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.3f",
    "%Y-%m-%dT%H:%M:%S%.3f%z",
    "%Y-%m-%dT%H:%M:%S%.3fZ",
    "%Y-%m-%dT%H:%M:%S%.3f%:z",
    "%a %b %d %H:%M:%S %Z %Y",
    "%a, %d %b %Y %H:%M:%S %Z",
];

/// Ordered `chrono` format strings: configured ones first, then the defaults,
/// then ISO-8601 and RFC 3339 / 2822 parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePatterns {
    patterns: Vec<String>,
}

impl DatePatterns {
    pub fn new<I, S>(configured: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = Vec::new();
        let defaults = DEFAULT_DATE_PATTERNS.iter().map(|p| (*p).to_owned());
        for pattern in configured.into_iter().map(Into::into).chain(defaults) {
            if !pattern.is_empty() && !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn local_date_time(&self, s: &str) -> Option<NaiveDateTime> {
        self.patterns
            .iter()
            .find_map(|p| NaiveDateTime::parse_from_str(s, p).ok())
            .or_else(|| s.parse::<NaiveDateTime>().ok())
            .or_else(|| self.offset_date_time(s).map(|dt| dt.naive_local()))
    }

    pub fn local_date(&self, s: &str) -> Option<NaiveDate> {
        self.patterns
            .iter()
            .find_map(|p| NaiveDate::parse_from_str(s, p).ok())
            .or_else(|| s.parse::<NaiveDate>().ok())
            .or_else(|| NaiveDate::parse_from_str(s, "%Y-%j").ok())
            .or_else(|| NaiveDate::parse_from_str(s, "%G-W%V-%u").ok())
            .or_else(|| self.local_date_time(s).map(|dt| dt.date()))
    }

    pub fn local_time(&self, s: &str) -> Option<NaiveTime> {
        self.patterns
            .iter()
            .find_map(|p| NaiveTime::parse_from_str(s, p).ok())
            .or_else(|| s.parse::<NaiveTime>().ok())
            .or_else(|| self.local_date_time(s).map(|dt| dt.time()))
    }

    pub fn offset_date_time(&self, s: &str) -> Option<DateTime<FixedOffset>> {
        self.patterns
            .iter()
            .find_map(|p| DateTime::parse_from_str(s, p).ok())
            .or_else(|| DateTime::parse_from_rfc3339(s).ok())
            .or_else(|| DateTime::parse_from_rfc2822(s).ok())
    }

    /// Like [`offset_date_time`](Self::offset_date_time), ignoring a trailing
    /// `[Zone/Id]` such as `2024-08-06T09:32:02Z[UTC]`.
    pub fn zoned_date_time(&self, s: &str) -> Option<DateTime<FixedOffset>> {
        let without_zone = match (s.rfind('['), s.ends_with(']')) {
            (Some(open), true) => &s[..open],
            _ => s,
        };
        self.offset_date_time(without_zone)
    }

    /// An instant. Readings without an offset are local wall-clock time.
    pub fn date(&self, s: &str) -> Option<DateTime<Utc>> {
        if let Some(dt) = self.offset_date_time(s) {
            return Some(dt.with_timezone(&Utc));
        }
        self.local_date_time(s)
            .and_then(|dt| Local.from_local_datetime(&dt).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Default for DatePatterns {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Parse `[a,b,c]`, `["a", "b"]` or a JSON array. Anything else is empty.
pub fn parse_list(raw: &str) -> Vec<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return Vec::new();
        }
        if inner.starts_with('"') {
            if let Some(items) = json_list(s) {
                return items;
            }
            if inner.len() > 1 && inner.ends_with('"') {
                let unquoted = &inner[1..inner.len() - 1];
                return split_elements(&unquoted.replace("\", \"", ",").replace("\",\"", ","));
            }
        }
        return split_elements(&inner.replace(", ", ","));
    }
    json_list(s).unwrap_or_else(|| {
        warn!(value = raw, "not a list, using an empty list");
        Vec::new()
    })
}

fn json_list(s: &str) -> Option<Vec<String>> {
    let values: Vec<Value> = serde_json::from_str(s).ok()?;
    Some(
        values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

/// Comma split that drops trailing empty elements.
fn split_elements(s: &str) -> Vec<String> {
    let mut items: Vec<String> = s.split(',').map(str::to_owned).collect();
    while items.last().is_some_and(String::is_empty) {
        items.pop();
    }
    items
}

/// Parse a JSON object or a `{k=v, k2=v2}` literal. Empty input is an empty
/// map; literal values stay strings and end at the next `=`, so `k=a=b`
/// maps `k` to `a`.
pub fn parse_map(raw: &str) -> Option<Map<String, Value>> {
    let s = strip_quotes(raw.trim());
    if let Ok(map) = serde_json::from_str::<Map<String, Value>>(s) {
        return Some(map);
    }
    let body = s
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(s);
    if body.split(',').next().map_or(true, |first| first.trim().is_empty()) {
        return Some(Map::new());
    }
    let mut map = Map::new();
    for pair in body.split(',') {
        let Some((key, rest)) = pair.split_once('=') else {
            warn!(value = raw, "not a map, leaving the field unset");
            return None;
        };
        let value = rest.split('=').next().unwrap_or(rest);
        map.insert(key.replace(' ', ""), Value::String(value.to_owned()));
    }
    Some(map)
}

/// Drop one pair of wrapping double quotes.
pub fn strip_quotes(s: &str) -> &str {
    if s.len() > 1 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

// ---------------------------------------------------------------------------
// Coder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TypedValueCoder {
    patterns: DatePatterns,
}

impl TypedValueCoder {
    pub fn new(patterns: DatePatterns) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &DatePatterns {
        &self.patterns
    }

    /// Convert `raw` to `tag`, or `None` when nothing matched.
    pub fn coerce(&self, raw: &str, tag: TypeTag) -> Option<CoercedValue> {
        match tag {
            TypeTag::Text => return Some(CoercedValue::Text(raw.to_owned())),
            TypeTag::List => return Some(CoercedValue::List(parse_list(raw))),
            TypeTag::Set => {
                let mut items = parse_list(raw);
                items.sort();
                items.dedup();
                return Some(CoercedValue::List(items));
            }
            TypeTag::Queue => {
                let mut items = parse_list(raw);
                items.sort();
                return Some(CoercedValue::List(items));
            }
            TypeTag::Map => return parse_map(raw).map(CoercedValue::Map),
            _ if raw.trim().is_empty() => return None,
            _ => {}
        }

        let value = match tag {
            TypeTag::Number => parse_number(raw).map(CoercedValue::Number),
            TypeTag::Bool => Some(CoercedValue::Bool(raw.trim().eq_ignore_ascii_case("true"))),
            TypeTag::Date => self.patterns.date(raw).map(CoercedValue::Date),
            TypeTag::LocalDateTime => self.patterns.local_date_time(raw).map(CoercedValue::LocalDateTime),
            TypeTag::LocalDate => self.patterns.local_date(raw).map(CoercedValue::LocalDate),
            TypeTag::LocalTime => self.patterns.local_time(raw).map(CoercedValue::LocalTime),
            TypeTag::OffsetDateTime => self.patterns.offset_date_time(raw).map(CoercedValue::OffsetDateTime),
            TypeTag::ZonedDateTime => self.patterns.zoned_date_time(raw).map(CoercedValue::OffsetDateTime),
            TypeTag::Text | TypeTag::List | TypeTag::Set | TypeTag::Queue | TypeTag::Map => None,
        };
        if value.is_none() {
            warn!(value = raw, ?tag, "no conversion matched, leaving the field unset");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn coder() -> TypedValueCoder {
        TypedValueCoder::new(DatePatterns::new([
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d",
            "%H:%M:%S",
        ]))
    }

    #[test]
    fn bracket_list() {
        assert_eq!(parse_list("[a,b,c]"), ["a", "b", "c"]);
        assert_eq!(parse_list("[a, b, c]"), ["a", "b", "c"]);
    }

    #[test]
    fn quoted_list() {
        assert_eq!(parse_list("[\"a\", \"b\"]"), ["a", "b"]);
        assert_eq!(parse_list("[\"a\",\"b\"]"), ["a", "b"]);
    }

    #[test]
    fn json_list_with_numbers() {
        assert_eq!(parse_list("[1, 2]"), ["1", "2"]);
        assert_eq!(parse_list("[\"x\", 3]"), ["x", "3"]);
    }

    #[test]
    fn empty_and_malformed_lists_are_empty() {
        assert!(parse_list("").is_empty());
        assert!(parse_list("[]").is_empty());
        assert!(parse_list("[").is_empty());
        assert!(parse_list("not a list").is_empty());
    }

    #[test]
    fn trailing_empty_elements_are_dropped() {
        assert_eq!(parse_list("[a,b,,]"), ["a", "b"]);
    }

    #[test]
    fn literal_map() {
        let map = parse_map("{a=1,b=2}").unwrap();
        assert_eq!(map.get("a"), Some(&Value::String("1".into())));
        assert_eq!(map.get("b"), Some(&Value::String("2".into())));
    }

    #[test]
    fn literal_map_with_spaces_and_quotes() {
        let map = parse_map("\"{a=1, b c=2}\"").unwrap();
        assert_eq!(map.get("bc"), Some(&Value::String("2".into())));
    }

    #[test]
    fn literal_map_value_stops_at_the_next_equals() {
        let map = parse_map("{k=a=b, n=1}").unwrap();
        assert_eq!(map.get("k"), Some(&Value::String("a".into())));
        assert_eq!(map.get("n"), Some(&Value::String("1".into())));
    }

    #[test]
    fn json_map() {
        let map = parse_map("{\"a\":1,\"b\":\"x=y\"}").unwrap();
        assert_eq!(map.get("a"), Some(&Value::from(1)));
        assert_eq!(map.get("b"), Some(&Value::String("x=y".into())));
    }

    #[test]
    fn empty_map() {
        assert!(parse_map("").unwrap().is_empty());
        assert!(parse_map("{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_map_is_none() {
        assert!(parse_map("{a}").is_none());
    }

    #[test]
    fn configured_local_date_time() {
        let value = coder().coerce("2024-08-06 09:32:02", TypeTag::LocalDateTime).unwrap();
        let CoercedValue::LocalDateTime(dt) = value else {
            panic!("expected a local date-time");
        };
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 8, 6));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (9, 32, 2));
    }

    #[test]
    fn unmatched_date_is_none() {
        assert!(coder().coerce("next tuesday", TypeTag::LocalDateTime).is_none());
        assert!(coder().coerce("", TypeTag::LocalDate).is_none());
    }

    #[test]
    fn regional_and_iso_dates() {
        let coder = coder();
        assert_eq!(
            coder.coerce("2024年08月06日", TypeTag::LocalDate),
            Some(CoercedValue::LocalDate(NaiveDate::from_ymd_opt(2024, 8, 6).unwrap()))
        );
        assert_eq!(
            coder.coerce("2024-08-06T09:32:02", TypeTag::LocalDate),
            Some(CoercedValue::LocalDate(NaiveDate::from_ymd_opt(2024, 8, 6).unwrap()))
        );
        assert_eq!(
            coder.coerce("09:32:02", TypeTag::LocalTime),
            Some(CoercedValue::LocalTime(NaiveTime::from_hms_opt(9, 32, 2).unwrap()))
        );
    }

    #[test]
    fn offset_and_zoned() {
        let coder = coder();
        let Some(CoercedValue::OffsetDateTime(dt)) =
            coder.coerce("2024-08-06T09:32:02+08:00", TypeTag::OffsetDateTime)
        else {
            panic!("expected an offset date-time");
        };
        assert_eq!(dt.offset().local_minus_utc(), 8 * 3600);

        let Some(CoercedValue::OffsetDateTime(dt)) =
            coder.coerce("2024-08-06T09:32:02Z[UTC]", TypeTag::ZonedDateTime)
        else {
            panic!("expected a zoned date-time");
        };
        assert_eq!(dt.offset().local_minus_utc(), 0);
    }

    #[test]
    fn date_with_explicit_offset_is_exact() {
        let Some(CoercedValue::Date(instant)) =
            coder().coerce("2024-08-06T09:32:02+00:00", TypeTag::Date)
        else {
            panic!("expected a date");
        };
        assert_eq!(instant.to_rfc3339(), "2024-08-06T09:32:02+00:00");
    }

    #[test]
    fn scalars() {
        let coder = coder();
        assert_eq!(coder.coerce("42", TypeTag::Number), Some(CoercedValue::Number(42.into())));
        assert_eq!(coder.coerce("TRUE", TypeTag::Bool), Some(CoercedValue::Bool(true)));
        assert_eq!(coder.coerce("yes", TypeTag::Bool), Some(CoercedValue::Bool(false)));
        assert!(coder.coerce("forty", TypeTag::Number).is_none());
        assert_eq!(coder.coerce("raw", TypeTag::Text), Some(CoercedValue::Text("raw".into())));
    }

    #[test]
    fn set_and_queue_are_sorted() {
        let coder = coder();
        assert_eq!(
            coder.coerce("[b,a,b]", TypeTag::Set),
            Some(CoercedValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            coder.coerce("[b,a,b]", TypeTag::Queue),
            Some(CoercedValue::List(vec!["a".into(), "b".into(), "b".into()]))
        );
    }

    #[test]
    fn configured_patterns_come_first_without_duplicates() {
        let patterns = DatePatterns::new(["%d.%m.%Y", "%Y-%m-%d"]);
        assert_eq!(patterns.patterns()[0], "%d.%m.%Y");
        assert_eq!(patterns.patterns()[1], "%Y-%m-%d");
        assert_eq!(
            patterns.patterns().iter().filter(|p| *p == "%Y-%m-%d").count(),
            1
        );
    }

    #[test]
    fn json_forms_deserialize_into_chrono_types() {
        let dt = NaiveDate::from_ymd_opt(2024, 8, 6).unwrap().and_hms_opt(9, 32, 2).unwrap();
        let json = CoercedValue::LocalDateTime(dt).into_json();
        assert_eq!(serde_json::from_value::<NaiveDateTime>(json).unwrap(), dt);
    }
}
