use warehouse_core::ShreddedRecord;

pub(crate) enum Parsed {
    /// The line is well formed but carries nothing to store.
    Skip(String),
    Job(ParsedJob),
}

pub(crate) struct ParsedJob {
    pub record: ShreddedRecord,
    /// First allocated host, tested against the host filter.
    pub first_host: Option<String>,
    /// Job array indexes; one staging row is written per index.
    pub array_indexes: Vec<i64>,
}

impl ParsedJob {
    pub fn single(record: ShreddedRecord, first_host: Option<String>) -> Self {
        Self {
            record,
            first_host,
            array_indexes: Vec::new(),
        }
    }
}
