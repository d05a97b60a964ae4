use std::sync::{Arc, Mutex};

use stakenode_common::TxId;

/// Something a pipeline port was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Process(u64),
    ValidateGenerator(u64),
    Save(u64),
    Revert(u64),
    RestoreRound,
    DeleteRound(u64),
    ClearQueue,
    ResetLastDownloaded,
    LastStored(u64),
    Fork(u64),
    Broadcast(u64),
    Readd(Vec<TxId>),
    Fatal(String),
}

/// Ordered record of port calls, shared by all the fakes of one test
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| matches(e)).count()
    }

    /// Position of the first matching event
    pub fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.lock().unwrap().iter().position(matches)
    }
}
