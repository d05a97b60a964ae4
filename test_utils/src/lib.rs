//! Deterministic fakes for the ports consumed by Stakenode modules

mod chain;
mod journal;
mod keyring;
mod peer;
mod pipeline;

pub use chain::{ChainBuilder, FixedDelegates, InMemoryChain};
pub use journal::{Event, Journal};
pub use keyring::Keyring;
pub use peer::FakePeer;
pub use pipeline::{
    PipelineFakes, RecordingBroadcaster, RecordingFatal, RecordingPool, RecordingRevert,
    RecordingRounds, RecordingSyncState, ScriptedProcessor,
};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, EnvFilter, Registry};

/// Route log events to the test output. Safe to call from every test.
pub fn init_logging() {
    let fmt_layer = fmt::layer()
        .with_test_writer()
        .with_filter(EnvFilter::from_default_env().add_directive(filter::LevelFilter::DEBUG.into()))
        .with_filter(filter::filter_fn(|meta| meta.is_event()));
    let _ = Registry::default().with(fmt_layer).try_init();
}
