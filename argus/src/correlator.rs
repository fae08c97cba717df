use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

/// Identity of one in-flight send: socket cookie plus a sequence marker.
/// Volatile by nature; a reused cookie simply overwrites (see
/// [`Correlator::record_start`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
	pub sock: u64,
	pub seq: u32,
}

/// Short-term memory pairing a send timestamp with its later completion.
///
/// Bounded: past `max_entries` the oldest start is evicted first, so a
/// completion for an evicted flow reports not-found. That is the documented
/// trade-off, bounded memory over completeness, since completions may never
/// arrive at all (connection reset without closure).
///
/// Every operation is a bounded number of map steps under a short critical
/// section; no caller is ever held for unbounded time.
pub struct Correlator {
	pending: Mutex<HashMap<FlowKey, u64>>,
	max_entries: usize,
	evicted: AtomicU64,
}

impl Correlator {
	pub fn new(max_entries: usize) -> Self {
		assert!(max_entries > 0, "correlator needs at least one entry");
		Correlator {
			pending: Mutex::new(HashMap::with_capacity(max_entries)),
			max_entries,
			evicted: AtomicU64::new(0),
		}
	}

	/// Remembers the start timestamp for `key`. A pending start for the same
	/// key is overwritten, most-recent-start-wins, the previous operation is
	/// presumed abandoned.
	pub fn record_start(&self, key: FlowKey, ts_ns: u64) {
		let mut pending = match self.pending.lock() {
			Ok(p) => p,
			Err(poisoned) => poisoned.into_inner(),
		};

		if !pending.contains_key(&key) && pending.len() >= self.max_entries {
			// Oldest start goes first. Linear, but bounded by max_entries.
			let oldest = pending.iter().min_by_key(|(_, &ts)| ts).map(|(&k, _)| k);
			if let Some(oldest) = oldest {
				pending.remove(&oldest);
				self.evicted.fetch_add(1, Ordering::Relaxed);
			}
		}

		pending.insert(key, ts_ns);
	}

	/// Consumes the pending start for `key` and returns the elapsed
	/// nanoseconds, or `None` when no start is pending (never seen, or
	/// already evicted). The entry is gone either way.
	pub fn complete(&self, key: FlowKey, ts_ns: u64) -> Option<u64> {
		let mut pending = match self.pending.lock() {
			Ok(p) => p,
			Err(poisoned) => poisoned.into_inner(),
		};

		let start = pending.remove(&key)?;
		Some(ts_ns.saturating_sub(start))
	}

	/// Entries forcibly removed by the size bound since creation.
	pub fn evicted(&self) -> u64 {
		self.evicted.load(Ordering::Relaxed)
	}

	pub fn len(&self) -> usize {
		match self.pending.lock() {
			Ok(p) => p.len(),
			Err(poisoned) => poisoned.into_inner().len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

// region:    --- Tests


// endregion: --- Tests
