use tsdb_proto::{Sample, Status};

use crate::node::{Node, Requirements};

/// Drops samples the predicate rejects. A drop is not backpressure: the
/// node still returns `true` and upstream keeps pulling.
pub struct Filter {
    predicate: Box<dyn Fn(&Sample) -> bool>,
    next: Box<dyn Node>,
}

impl Filter {
    pub fn new(predicate: Box<dyn Fn(&Sample) -> bool>, next: Box<dyn Node>) -> Self {
        Filter { predicate, next }
    }
}

impl Node for Filter {
    fn start(&mut self) {
        self.next.start();
    }

    fn put(&mut self, sample: Sample) -> bool {
        if (self.predicate)(&sample) {
            self.next.put(sample)
        } else {
            true
        }
    }

    fn complete(&mut self) {
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
    fn drops_rejected_samples() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut chain = Filter::new(Box::new(|s: &Sample| s.payload.value > 1.0), terminal);
        assert!(chain.put(Sample::new(1, 1, 0.5)));
        assert!(chain.put(Sample::new(1, 2, 2.0)));
        chain.complete();

        let samples = out.borrow();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, 2);
    }
}
