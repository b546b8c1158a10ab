use std::collections::VecDeque;

use crate::model::LedgerEntry;

use super::{Ledger, LedgerError};

const PAGE_SIZE: usize = 256;

/// Lazy iterator over the ledger in `played_at` order.
///
/// Rows are fetched in keyset pages so the whole ledger is never held in
/// memory and the connection lock is only taken per page. Iteration stops
/// after the first error.
pub struct Entries<'a> {
    ledger: &'a Ledger,
    after: Option<(i64, i64)>,
    buffer: VecDeque<LedgerEntry>,
    exhausted: bool,
}

impl<'a> Entries<'a> {
    pub(super) fn new(ledger: &'a Ledger) -> Self {
        Self {
            ledger,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<LedgerEntry, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.ledger.page(self.after, PAGE_SIZE) {
                Ok(page) => {
                    self.exhausted = page.len() < PAGE_SIZE;
                    if let Some(last) = page.last() {
                        self.after = Some((last.event.played_at.timestamp_millis(), last.id));
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}
