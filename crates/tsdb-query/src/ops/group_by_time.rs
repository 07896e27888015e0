use tsdb_proto::{PayloadFlags, Sample, Status, Timestamp};

use crate::node::{Node, Requirements};

/// Stateful time-bucket operator (spec.md §4.5). Aligns its window to the
/// first non-empty sample, then emits `HI_MARGIN`/`LO_MARGIN` markers as
/// the window slides to cover out-of-range samples, passing every sample
/// (marker or real) through to `next`.
pub struct GroupByTime {
    step: u64,
    lower: Timestamp,
    upper: Timestamp,
    first_hit: bool,
    next: Box<dyn Node>,
}

impl GroupByTime {
    /// `step` must be positive. `build_chain` rejects `step == 0` from
    /// query text with `QueryParserError::InvalidStep` before this is ever
    /// called; the assert only guards direct construction.
    pub fn new(step: u64, next: Box<dyn Node>) -> Self {
        assert!(step > 0, "group-by-time step must be positive");
        GroupByTime {
            step,
            lower: 0,
            upper: step,
            first_hit: false,
            next,
        }
    }

    fn align(&mut self, ts: Timestamp) {
        self.lower = (ts / self.step) * self.step;
        self.upper = self.lower + self.step;
        self.first_hit = true;
    }

    /// Slides the window until `ts` falls in `[lower, upper)`, emitting a
    /// boundary marker for each step. Returns `false` as soon as a marker
    /// `put` is refused downstream.
    fn slide_to(&mut self, param_id: u64, ts: Timestamp) -> bool {
        loop {
            if ts >= self.upper {
                let marker_ts = self.upper;
                if !self.next.put(Sample::marker(param_id, marker_ts, PayloadFlags::HI_MARGIN)) {
                    return false;
                }
                self.lower += self.step;
                self.upper += self.step;
            } else if ts < self.lower {
                let marker_ts = self.upper;
                if !self.next.put(Sample::marker(param_id, marker_ts, PayloadFlags::LO_MARGIN)) {
                    return false;
                }
                self.lower -= self.step;
                self.upper -= self.step;
            } else {
                return true;
            }
        }
    }
}

impl Node for GroupByTime {
    fn start(&mut self) {
        self.next.start();
    }

    fn put(&mut self, sample: Sample) -> bool {
        if sample.is_empty() {
            return self.next.put(sample);
        }
        if !self.first_hit {
            self.align(sample.timestamp);
        }
        if !self.slide_to(sample.param_id, sample.timestamp) {
            return false;
        }
        self.next.put(sample)
    }

    fn complete(&mut self) {
        if self.first_hit {
            // Close the final open bucket before signalling completion.
            self.next
                .put(Sample::marker(0, self.upper, PayloadFlags::HI_MARGIN));
        }
        self.next.complete();
    }

    fn set_error(&mut self, status: Status) {
        self.next.set_error(status);
    }

    fn requirements(&self) -> Requirements {
        Requirements::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Terminal;
    use proptest::prelude::*;

    #[test]
    fn markers_bound_contiguous_segments() {
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

        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut chain = GroupByTime::new(10, terminal);
        chain.start();
        for ts in [3u64, 7, 12, 19, 23] {
            assert!(chain.put(Sample::new(1, ts, ts as f64)));
        }
        chain.complete();

        let samples = out.borrow();
        let markers: Vec<u64> = samples
            .iter()
            .filter(|s| s.payload.flags.contains(PayloadFlags::HI_MARGIN))
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(markers, vec![10, 20, 30]);
    }

    proptest::proptest! {
        /// Spec.md §8's group-by-time law: markers partition the output into
        /// contiguous `[lower, upper)` segments of width `step`. Restricted to
        /// sorted ascending timestamps so the window only ever advances
        /// forward (the `LO_MARGIN` branch needs an out-of-order stream,
        /// covered separately by unit tests on `GroupByTag`/`Aggregate`).
        #[test]
        fn law_holds_over_sorted_forward_stream(
            step in 1u64..50,
            mut ts in proptest::collection::vec(0u64..500, 1..30),
        ) {
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

            ts.sort_unstable();
            let out = Rc::new(RefCell::new(Vec::new()));
            let terminal = Box::new(Terminal::new(Shared(out.clone())));
            let mut chain = GroupByTime::new(step, terminal);
            chain.start();
            for &t in &ts {
                chain.put(Sample::new(1, t, 1.0));
            }
            chain.complete();

            let samples = out.borrow();
            let mut lower = None;
            let mut upper: Option<u64> = None;
            for s in samples.iter() {
                if s.payload.flags.contains(PayloadFlags::HI_MARGIN) {
                    if let Some(u) = upper {
                        prop_assert_eq!(s.timestamp, u);
                    }
                    lower = Some(s.timestamp);
                    upper = Some(s.timestamp + step);
                } else if let (Some(l), Some(u)) = (lower, upper) {
                    prop_assert!(s.timestamp >= l && s.timestamp < u);
                }
            }
        }
    }
}
