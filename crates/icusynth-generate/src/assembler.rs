//! Builds child rows from parent entities and checks the finished dataset.

use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::info;

use icusynth_core::{Dataset, Record, Span, Table, TableSchema, validate_dataset};

/// Entity that child rows hang off: it owns a key and a time span.
pub trait Parent {
    /// Column name the key is written under in child tables.
    fn key_column(&self) -> &'static str;
    fn key(&self) -> &str;
    fn span(&self) -> Span;

    /// Empty child row already carrying the foreign key.
    fn child(&self) -> Record {
        Record::new().with(self.key_column(), self.key())
    }

    fn clamp(&self, time: NaiveDateTime) -> NaiveDateTime {
        self.span().clamp(time)
    }
}

/// Rows of one table under construction.
#[derive(Debug)]
pub struct TableBuilder {
    table: Table,
    started: Instant,
}

impl TableBuilder {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            table: Table::new(schema),
            started: Instant::now(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.table.push(record);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Collects tables in dependency order and refuses to hand out a dataset
/// with dangling references.
#[derive(Debug)]
pub struct RecordAssembler {
    variant: &'static str,
    dataset: Dataset,
}

impl RecordAssembler {
    pub fn new(variant: &'static str) -> Self {
        Self {
            variant,
            dataset: Dataset::new(),
        }
    }

    pub fn commit(&mut self, builder: TableBuilder) {
        info!(
            variant = self.variant,
            table = %builder.table.name(),
            rows = builder.table.len(),
            duration_ms = builder.started.elapsed().as_millis() as u64,
            "table generated"
        );
        self.dataset.push(builder.table);
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Final integrity pass. Any orphan or out-of-span row is an error.
    pub fn finish(self) -> icusynth_core::Result<Dataset> {
        validate_dataset(&self.dataset)?;
        info!(
            variant = self.variant,
            tables = self.dataset.tables.len(),
            rows = self.dataset.total_rows(),
            "referential integrity verified"
        );
        Ok(self.dataset)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use icusynth_core::Error;

    use super::*;

    struct Stay {
        id: String,
        span: Span,
    }

    impl Parent for Stay {
        fn key_column(&self) -> &'static str {
            "stay_id"
        }

        fn key(&self) -> &str {
            &self.id
        }

        fn span(&self) -> Span {
            self.span
        }
    }

    fn schemas() -> (TableSchema, TableSchema) {
        let stays = TableSchema::new("stays", &["stay_id", "start", "end"])
            .primary_key("stay_id")
            .spanning("start", "end");
        let events = TableSchema::new("events", &["stay_id", "at"])
            .references("stay_id", "stays", "stay_id")
            .within("at", "stay_id", "start", "end");
        (stays, events)
    }

    fn stay() -> Stay {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid timestamp");
        Stay {
            id: "H00001000".to_string(),
            span: Span::new(start, start + Duration::hours(6)),
        }
    }

    #[test]
    fn clamped_children_pass_validation() {
        let (stays_schema, events_schema) = schemas();
        let stay = stay();
        let mut assembler = RecordAssembler::new("test");

        let mut stays = TableBuilder::new(stays_schema);
        stays.push(
            Record::new()
                .with("stay_id", stay.key())
                .with("start", stay.span.start)
                .with("end", stay.span.end),
        );
        assembler.commit(stays);

        let mut events = TableBuilder::new(events_schema);
        let late = stay.clamp(stay.span.end + Duration::hours(3));
        events.push(stay.child().with("at", late));
        assembler.commit(events);

        let dataset = assembler.finish().expect("valid dataset");
        assert_eq!(dataset.total_rows(), 2);
    }

    #[test]
    fn orphan_child_fails() {
        let (stays_schema, events_schema) = schemas();
        let stay = stay();
        let mut assembler = RecordAssembler::new("test");
        assembler.commit(TableBuilder::new(stays_schema));

        let mut events = TableBuilder::new(events_schema);
        events.push(stay.child().with("at", stay.span.start));
        assembler.commit(events);

        let err = assembler.finish().expect_err("orphan");
        assert!(matches!(err, Error::ReferentialIntegrity(_)));
    }
}
