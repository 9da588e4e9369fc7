//! Sort-merge comparison of two key-ordered row sets.

use std::cmp::Ordering;

use super::types::{DiffEvent, Row};

/// Compare two row sets, each sorted ascending by key.
///
/// Events come out in key order.
pub fn diff_rows(a: Vec<Row>, b: Vec<Row>) -> Vec<DiffEvent> {
    let mut events = Vec::new();
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();

    loop {
        let order = match (a.peek(), b.peek()) {
            (Some(ra), Some(rb)) => ra.key.cmp(&rb.key),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                if let Some(row) = a.next() {
                    events.push(DiffEvent::removed(row));
                }
            }
            Ordering::Greater => {
                if let Some(row) = b.next() {
                    events.push(DiffEvent::added(row));
                }
            }
            Ordering::Equal => {
                if let (Some(ra), Some(rb)) = (a.next(), b.next()) {
                    if ra.values != rb.values {
                        events.push(DiffEvent::changed(ra, rb));
                    }
                }
            }
        }
    }

    events
}
