use tsdb_proto::{ParamId, PayloadFlags, Sample, Status, Timestamp};

use crate::node::{Node, Requirements};

/// The reduction a bucket boundary finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Sum,
    Mean,
    Derivative,
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    first: Option<(Timestamp, f64)>,
    last: Option<(Timestamp, f64)>,
    param_id: Option<ParamId>,
}

impl Accumulator {
    fn push(&mut self, param_id: ParamId, ts: Timestamp, value: f64) {
        self.count += 1;
        self.sum += value;
        self.param_id.get_or_insert(param_id);
        self.first.get_or_insert((ts, value));
        self.last = Some((ts, value));
    }

    fn finalize(&mut self, kind: AggKind) -> Option<(ParamId, f64)> {
        if self.count == 0 {
            return None;
        }
        let param_id = self.param_id.unwrap();
        let value = match kind {
            AggKind::Sum => self.sum,
            AggKind::Mean => self.sum / self.count as f64,
            AggKind::Derivative => match (self.first, self.last) {
                (Some((t0, v0)), Some((t1, v1))) if t1 != t0 => {
                    (v1 - v0) / (t1 - t0) as f64
                }
                _ => 0.0,
            },
        };
        *self = Accumulator::default();
        Some((param_id, value))
    }
}

/// Reduces samples between `HI_MARGIN`/`LO_MARGIN` boundaries into a single
/// aggregate sample, emitted when a boundary marker arrives or the chain
/// completes. Markers themselves are always forwarded so downstream group
/// boundaries stay visible. Requires an upstream group-by node — the
/// builder enforces this via `Requirements::GROUP_BY_REQUIRED`.
pub struct Aggregate {
    kind: AggKind,
    acc: Accumulator,
    next: Box<dyn Node>,
}

impl Aggregate {
    pub fn new(kind: AggKind, next: Box<dyn Node>) -> Self {
        Aggregate {
            kind,
            acc: Accumulator::default(),
            next,
        }
    }

    fn flush(&mut self, boundary_ts: Timestamp) -> bool {
        if let Some((param_id, value)) = self.acc.finalize(self.kind) {
            if !self.next.put(Sample::new(param_id, boundary_ts, value)) {
                return false;
            }
        }
        true
    }
}

impl Node for Aggregate {
    fn start(&mut self) {
        self.next.start();
    }

    fn put(&mut self, sample: Sample) -> bool {
        let is_boundary = sample.payload.flags.contains(PayloadFlags::HI_MARGIN)
            || sample.payload.flags.contains(PayloadFlags::LO_MARGIN);
        if is_boundary {
            if !self.flush(sample.timestamp) {
                return false;
            }
            return self.next.put(sample);
        }
        if sample.is_empty() {
            return self.next.put(sample);
        }
        self.acc.push(sample.param_id, sample.timestamp, sample.payload.value);
        true
    }

    fn complete(&mut self) {
        let ts = self.acc.last.map(|(t, _)| t).unwrap_or(0);
        if let Some((param_id, value)) = self.acc.finalize(self.kind) {
            self.next.put(Sample::new(param_id, ts, value));
        }
        self.next.complete();
    }

    fn set_error(&mut self, status: Status) {
        self.next.set_error(status);
    }

    fn requirements(&self) -> Requirements {
        Requirements::GROUP_BY_REQUIRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Terminal;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Shared(Rc<RefCell<Vec<Sample>>>);
    impl crate::Cursor for Shared {
        fn put(&mut self, sample: Sample) -> bool {
            self.0.borrow_mut().push(sample);
            true
        }
        fn set_error(&mut self, _status: Status) {}
        fn complete(&mut self) {}
    }

    #[test]
    fn sums_bucket_then_forwards_marker() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut agg = Aggregate::new(AggKind::Sum, terminal);

        assert!(agg.put(Sample::new(1, 1, 1.0)));
        assert!(agg.put(Sample::new(1, 2, 2.0)));
        assert!(agg.put(Sample::marker(1, 10, PayloadFlags::HI_MARGIN)));
        agg.complete();

        let samples = out.borrow();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, 10);
        assert_eq!(samples[0].payload.value, 3.0);
        assert!(samples[1].payload.flags.contains(PayloadFlags::HI_MARGIN));
    }

    #[test]
    fn mean_divides_by_count() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut agg = Aggregate::new(AggKind::Mean, terminal);
        assert!(agg.put(Sample::new(1, 1, 2.0)));
        assert!(agg.put(Sample::new(1, 2, 4.0)));
        agg.complete();
        assert_eq!(out.borrow()[0].payload.value, 3.0);
    }

    #[test]
    fn complete_mid_bucket_reports_last_sample_timestamp() {
        // No boundary marker ever arrives — the chain completes mid-bucket.
        // The emitted aggregate must carry the last real sample's
        // timestamp, not 0 (accumulator state is cleared by `finalize`
        // before `complete` would otherwise be able to read it back out).
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut agg = Aggregate::new(AggKind::Sum, terminal);

        assert!(agg.put(Sample::new(1, 5, 1.0)));
        assert!(agg.put(Sample::new(1, 9, 2.0)));
        agg.complete();

        let samples = out.borrow();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, 9);
        assert_eq!(samples[0].payload.value, 3.0);
    }
}
