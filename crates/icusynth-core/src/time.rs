use chrono::{Duration, NaiveDateTime};

/// Timestamp layout used by every table of every variant.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S+00:00";
/// Calendar date layout.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// Closed time interval `[start, end]` with `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    /// Builds a span, collapsing a negative interval onto its start.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    pub fn days(&self) -> f64 {
        self.duration().num_seconds() as f64 / 86_400.0
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, value: NaiveDateTime) -> bool {
        self.start <= value && value <= self.end
    }

    pub fn clamp(&self, value: NaiveDateTime) -> NaiveDateTime {
        value.clamp(self.start, self.end)
    }

    /// Point `offset` after the start, kept strictly before the end when the
    /// span is non-empty so that a half-open sequence from it is non-empty.
    pub fn at(&self, offset: Duration) -> NaiveDateTime {
        if self.is_empty() {
            return self.start;
        }
        let latest = (self.end - Duration::minutes(1)).max(self.start);
        (self.start + offset).clamp(self.start, latest)
    }

    /// Sub-span starting at `start` (clamped) and lasting at most `length`.
    pub fn window(&self, start: NaiveDateTime, length: Duration) -> Span {
        let start = self.clamp(start);
        Span::new(start, (start + length).min(self.end))
    }

    /// Same span with its end pulled in to `cutoff` when the cutoff is earlier.
    pub fn truncated(&self, cutoff: NaiveDateTime) -> Span {
        Span::new(self.start, self.end.min(cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn formats_with_utc_offset_literal() {
        assert_eq!(format_timestamp(&ts(2, 7)), "2024-01-02 07:00:00+00:00");
        assert_eq!(parse_timestamp("2024-01-02 07:00:00+00:00"), Some(ts(2, 7)));
        assert_eq!(parse_timestamp("2024-01-02T07:00:00"), None);
    }

    #[test]
    fn negative_span_collapses() {
        let span = Span::new(ts(3, 0), ts(2, 0));
        assert_eq!(span.end, span.start);
        assert!(span.is_empty());
    }

    #[test]
    fn at_stays_before_end() {
        let span = Span::new(ts(1, 0), ts(1, 10));
        assert_eq!(span.at(Duration::hours(2)), ts(1, 2));
        let late = span.at(Duration::hours(48));
        assert!(late < span.end);
        assert!(span.contains(late));
    }

    #[test]
    fn window_is_clipped() {
        let span = Span::new(ts(1, 0), ts(1, 10));
        let window = span.window(ts(1, 8), Duration::hours(5));
        assert_eq!(window.start, ts(1, 8));
        assert_eq!(window.end, ts(1, 10));
    }
}
