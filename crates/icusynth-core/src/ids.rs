/// Identifier layout: alphabetic prefix followed by a zero-padded number.
///
/// Identifiers are opaque strings to consumers; the numeric part only
/// exists to keep them unique and sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFormat {
    pub prefix: &'static str,
    pub width: usize,
}

impl IdFormat {
    pub const fn new(prefix: &'static str, width: usize) -> Self {
        Self { prefix, width }
    }

    pub fn format(&self, number: u64) -> String {
        format!("{}{:0width$}", self.prefix, number, width = self.width)
    }
}

/// Monotonic identifier allocator for one table.
#[derive(Debug, Clone)]
pub struct IdSequence {
    format: IdFormat,
    next: u64,
}

impl IdSequence {
    pub fn new(format: IdFormat, start: u64) -> Self {
        Self {
            format,
            next: start,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = self.format.format(self.next);
        self.next += 1;
        id
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self, start: u64) -> u64 {
        self.next.saturating_sub(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_width() {
        let format = IdFormat::new("P", 6);
        assert_eq!(format.format(123), "P000123");
        assert_eq!(IdFormat::new("H", 8).format(1234), "H00001234");
    }

    #[test]
    fn wider_numbers_are_not_truncated() {
        assert_eq!(IdFormat::new("S", 2).format(12345), "S12345");
    }

    #[test]
    fn sequence_is_monotonic() {
        let mut seq = IdSequence::new(IdFormat::new("H", 8), 1000);
        assert_eq!(seq.next_id(), "H00001000");
        assert_eq!(seq.next_id(), "H00001001");
        assert_eq!(seq.issued(1000), 2);
    }
}
