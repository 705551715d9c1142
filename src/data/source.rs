//! Record sources handed to the pipeline

use crate::{EventRecord, Result};

/// Anything that can supply the full set of event records for a run.
///
/// Sources are constructed by the caller and passed in; the pipeline never
/// opens connections on its own.
pub trait RecordSource {
    fn load_records(&self) -> Result<Vec<EventRecord>>;

    fn describe(&self) -> String {
        "records".to_string()
    }
}

/// Records already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<EventRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<EventRecord>) -> Self {
        InMemorySource { records }
    }
}

impl RecordSource for InMemorySource {
    fn load_records(&self) -> Result<Vec<EventRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory ({} records)", self.records.len())
    }
}
