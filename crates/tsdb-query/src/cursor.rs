use tsdb_proto::{Sample, Status};

/// The downstream sink for query results. Implemented by callers (e.g. an
/// in-process channel or a `Vec` collector in tests); the pipeline never
/// constructs one itself.
pub trait Cursor {
    /// Returns `false` to signal the cursor is full or cancelled — the
    /// pipeline must stop delivering samples until the query is rebuilt.
    fn put(&mut self, sample: Sample) -> bool;
    fn set_error(&mut self, status: Status);
    fn complete(&mut self);
}

/// A `Vec`-backed cursor for tests and simple in-process consumers.
/// `capacity` of `None` means unbounded; `Some(n)` stops accepting after
/// `n` samples, exercising backpressure without a real bounded channel.
#[derive(Default)]
pub struct VecCursor {
    pub samples: Vec<Sample>,
    pub error: Option<Status>,
    pub completed: bool,
    pub capacity: Option<usize>,
}

impl VecCursor {
    pub fn bounded(capacity: usize) -> Self {
        VecCursor {
            capacity: Some(capacity),
            ..Default::default()
        }
    }
}

impl Cursor for VecCursor {
    fn put(&mut self, sample: Sample) -> bool {
        if let Some(cap) = self.capacity {
            if self.samples.len() >= cap {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    fn set_error(&mut self, status: Status) {
        self.error = Some(status);
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}
