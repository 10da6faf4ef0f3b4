use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use icusynth_core::Table;

/// Size and fingerprint of a written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub bytes: u64,
    pub sha256: String,
}

/// Write a table as CSV: a header row in schema order, then one line per row.
pub fn write_table_csv(path: &Path, table: &Table) -> Result<WrittenFile, csv::Error> {
    let file = File::create(path).map_err(csv::Error::from)?;
    let hashing = HashingWriter::new(BufWriter::new(file));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(hashing);

    writer.write_record(&table.schema.columns)?;
    for record in table.csv_rows() {
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let hashing = writer.into_inner().map_err(|err| err.into_error())?;
    let (mut inner, written) = hashing.finish();
    inner.flush()?;
    inner
        .into_inner()
        .map_err(|err| err.into_error())?
        .sync_all()?;
    Ok(written)
}

struct HashingWriter<W: Write> {
    inner: W,
    bytes: u64,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> (W, WrittenFile) {
        let written = WrittenFile {
            bytes: self.bytes,
            sha256: hex::encode(self.hasher.finalize()),
        };
        (self.inner, written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.hasher.update(&buf[..size]);
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use icusynth_core::{Record, TableSchema};

    use super::*;

    #[test]
    fn fingerprint_matches_file_contents() {
        let dir = std::env::temp_dir().join(format!("icusynth_csv_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("t.csv");

        let mut table = Table::new(TableSchema::new("t", &["id", "note"]));
        table.push(Record::new().with("id", "A1").with("note", "has, comma"));
        table.push(Record::new().with("id", "A2"));
        let written = write_table_csv(&path, &table).expect("write csv");

        let contents = std::fs::read(&path).expect("read back");
        assert_eq!(contents, b"id,note\nA1,\"has, comma\"\nA2,\n");
        assert_eq!(written.bytes, contents.len() as u64);
        assert_eq!(written.sha256, hex::encode(Sha256::digest(&contents)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
