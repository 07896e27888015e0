use std::collections::HashMap;

use tsdb_proto::{ParamId, Sample, Status};

use crate::node::{Node, Requirements};

/// Rewrites `sample.param_id` through a `source_id -> transient_id` map
/// built at query build time from the query's tag predicates. Samples for
/// series outside the map are dropped (not forwarded, but pulling
/// continues — a drop is not backpressure).
pub struct GroupByTag {
    map: HashMap<ParamId, ParamId>,
    next: Box<dyn Node>,
}

impl GroupByTag {
    pub fn new(map: HashMap<ParamId, ParamId>, next: Box<dyn Node>) -> Self {
        GroupByTag { map, next }
    }
}

impl Node for GroupByTag {
    fn start(&mut self) {
        self.next.start();
    }

    fn put(&mut self, mut sample: Sample) -> bool {
        match self.map.get(&sample.param_id) {
            Some(&transient_id) => {
                sample.param_id = transient_id;
                self.next.put(sample)
            }
            None => true,
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
    fn rewrites_mapped_ids_and_drops_others() {
        let mut map = HashMap::new();
        map.insert(1, 100);

        let out = Rc::new(RefCell::new(Vec::new()));
        let terminal = Box::new(Terminal::new(Shared(out.clone())));
        let mut chain = GroupByTag::new(map, terminal);

        assert!(chain.put(Sample::new(1, 10, 1.0)));
        assert!(chain.put(Sample::new(2, 11, 2.0))); // dropped, no mapping
        chain.complete();

        let samples = out.borrow();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].param_id, 100);
    }
}
