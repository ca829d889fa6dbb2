use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::pricing::{QuoteBreakdown, QuoteInput};
use crate::types::QuoteId;

/// A persisted `(input, breakdown)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: QuoteId,
    pub input: QuoteInput,
    pub breakdown: QuoteBreakdown,
}

/// Write-once destination for priced quotes. The engine never sees it.
pub trait QuoteSink {
    fn record(&mut self, input: &QuoteInput, breakdown: &QuoteBreakdown) -> Result<QuoteId, SinkError>;
}

/// Appends one JSON record per line to any writer.
pub struct NdjsonQuoteSink<W: Write> {
    writer: W,
    next_id: u64,
}

impl<W: Write> NdjsonQuoteSink<W> {
    pub fn new(writer: W) -> Self {
        NdjsonQuoteSink { writer, next_id: 0 }
    }

    /// Continue numbering after an existing log of `n` records.
    pub fn starting_at(writer: W, n: u64) -> Self {
        NdjsonQuoteSink { writer, next_id: n }
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> QuoteSink for NdjsonQuoteSink<W> {
    fn record(&mut self, input: &QuoteInput, breakdown: &QuoteBreakdown) -> Result<QuoteId, SinkError> {
        let id = QuoteId(self.next_id);
        let rec = QuoteRecord { id, input: input.clone(), breakdown: *breakdown };
        serde_json::to_writer(&mut self.writer, &rec)?;
        writeln!(self.writer)?;
        self.next_id += 1;
        Ok(id)
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemoryQuoteSink {
    pub records: Vec<QuoteRecord>,
}

impl QuoteSink for MemoryQuoteSink {
    fn record(&mut self, input: &QuoteInput, breakdown: &QuoteBreakdown) -> Result<QuoteId, SinkError> {
        let id = QuoteId(self.records.len() as u64);
        self.records.push(QuoteRecord { id, input: input.clone(), breakdown: *breakdown });
        Ok(id)
    }
}
