use std::collections::VecDeque;

use super::record::ResultRecord;

/// An ordered group of records sent in one upload request.
///
/// A batch is retried or failed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based sequence number, in formation order.
    pub index: u64,
    pub records: Vec<ResultRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// In-memory result queue that cuts records into bounded batches.
#[derive(Debug)]
pub struct ResultQueue {
    records: VecDeque<ResultRecord>,
    batch_size: usize,
    formed: u64,
}

impl ResultQueue {
    /// Creates a queue. A zero batch size is treated as 1.
    pub fn new(batch_size: usize) -> Self {
        Self {
            records: VecDeque::new(),
            batch_size: batch_size.max(1),
            formed: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Appends a record. Never blocks.
    pub fn enqueue(&mut self, record: ResultRecord) {
        self.records.push_back(record);
    }

    /// Forms every full batch available, leaving a partial remainder queued.
    pub fn drain_full(&mut self) -> Vec<Batch> {
        let mut batches = Vec::new();
        while self.records.len() >= self.batch_size {
            batches.push(self.form(self.batch_size));
        }
        batches
    }

    /// Forms batches from everything queued, including a final partial one.
    pub fn drain_all(&mut self) -> Vec<Batch> {
        let mut batches = self.drain_full();
        if !self.records.is_empty() {
            batches.push(self.form(self.records.len()));
        }
        batches
    }

    /// Records waiting to be batched.
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    /// Number of batches formed so far.
    pub fn formed(&self) -> u64 {
        self.formed
    }

    fn form(&mut self, size: usize) -> Batch {
        self.formed += 1;
        Batch {
            index: self.formed,
            records: self.records.drain(..size).collect(),
        }
    }
}
