use std::cell::RefCell;
use std::rc::Rc;

use tsdb_proto::ParamId;

/// A name resolver consulted in place of the registry's own dictionary.
/// Installed for the lifetime of a query via [`NameRegistry::set_matcher`]
/// (e.g. to show transient group-by-tag ids under their grouped label).
pub trait Matcher {
    fn name_of(&self, id: ParamId) -> Option<String>;
}

impl<F: Fn(ParamId) -> Option<String>> Matcher for F {
    fn name_of(&self, id: ParamId) -> Option<String> {
        self(id)
    }
}

#[derive(Clone, Default)]
pub(crate) struct MatcherSlot(Rc<RefCell<Vec<Rc<dyn Matcher>>>>);

impl MatcherSlot {
    pub fn push(&self, m: Rc<dyn Matcher>) -> MatcherScope {
        self.0.borrow_mut().push(m);
        MatcherScope { slot: self.clone() }
    }

    pub fn top_name_of(&self, id: ParamId) -> Option<String> {
        self.0.borrow().last().and_then(|m| m.name_of(id))
    }

    fn pop(&self) {
        self.0.borrow_mut().pop();
    }
}

/// Scope guard returned by `set_matcher`. Dropping it restores whatever
/// matcher (if any) was active before — nested `set`/`clear` pairs behave
/// as a LIFO stack because each guard only ever pops its own push.
#[must_use = "dropping this immediately restores the previous matcher"]
pub struct MatcherScope {
    slot: MatcherSlot,
}

impl Drop for MatcherScope {
    fn drop(&mut self) {
        self.slot.pop();
    }
}
