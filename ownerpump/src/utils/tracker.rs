// Only instantiated by tests, the call vocabulary is shared with real code.
#![allow(unused)]

use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Send,
    Post,
    Complete,
    Drain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    /// `inline` is true when the callback ran in place on the owner thread.
    Send { inline: bool },
    Post { len: usize },
    Complete { pending: usize },
    Drain { executed: usize },
}

/// Records every dispatch call made on a context, so tests observe the real
/// context methods without mocking them.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Send, Vec::new());
        map.insert(Method::Post, Vec::new());
        map.insert(Method::Complete, Vec::new());
        map.insert(Method::Drain, Vec::new());

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }
}
