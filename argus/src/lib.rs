//! Lock-free kernel-to-userspace network event pipeline, modeled in
//! userspace: probe handlers publish fixed-width records into a bounded
//! MPSC ring under kernel-context constraints (no blocking, no per-event
//! allocation, loss over backpressure), a single consumer drains them, and
//! a bounded correlator pairs send/completion timestamps to surface stalls.

mod error;

pub use self::error::{Error, Result};

pub mod channel;
pub mod config;
pub mod correlator;
pub mod probe;
pub mod worker;
