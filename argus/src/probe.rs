use std::{
	sync::{Arc, OnceLock},
	time::Instant,
};

use argus_common::{EventKind, NetEvent};
use tracing::trace;

use crate::{
	channel::{ring_channel, RingRx, RingTx},
	config::Config,
	correlator::{Correlator, FlowKey},
};

/// Trigger-supplied context, one per handler invocation. The core only
/// reads what it needs: task identity, magnitude, interface and the flow
/// identity for the send path.
#[derive(Debug, Clone, Copy)]
pub struct ProbeContext<'a> {
	pub pid: u32,
	pub sock: u64,
	pub seq: u32,
	pub bytes: u64,
	pub ifname: &'a [u8],
}

/// Process-wide pipeline state: the producer half of the record channel
/// plus the send-latency table. Created once at attach, handed by reference
/// (or clone, it is cheap) to every registered handler.
///
/// Handlers never block, never allocate per event on the publish path and
/// never propagate failure; a full channel or a missing correlator entry is
/// skipped silently.
#[derive(Clone)]
pub struct ProbeSet {
	tx: RingTx,
	correlator: Arc<Correlator>,
	stall_threshold_ns: u64,
}

impl ProbeSet {
	/// Allocates the channel and correlator and returns the probe side plus
	/// the consumer handle for the drain loop.
	pub fn attach(config: &Config) -> (ProbeSet, RingRx) {
		let (tx, rx) = ring_channel(config.channel_bytes);
		let set = ProbeSet {
			tx,
			correlator: Arc::new(Correlator::new(config.max_entries)),
			stall_threshold_ns: config.stall_threshold.as_nanos() as u64,
		};
		(set, rx)
	}

	/// Tears down the producer side. Records already committed stay
	/// drainable by the consumer handle.
	pub fn detach(self) {}

	/// A segment was retransmitted.
	pub fn on_tcp_retransmit(&self, ctx: &ProbeContext) {
		self.emit(EventKind::Retransmit, ctx.pid, 0, ctx.ifname);
	}

	/// A packet was dropped; `ctx.bytes` carries the dropped byte count.
	pub fn on_skb_drop(&self, ctx: &ProbeContext) {
		self.emit(EventKind::Drop, ctx.pid, ctx.bytes, ctx.ifname);
	}

	/// A send started: remember its timestamp for the completion side.
	/// Publishes nothing by itself.
	pub fn on_tcp_send(&self, ctx: &ProbeContext) {
		self.correlator.record_start(flow_key(ctx), now_ns());
	}

	/// The matching completion arrived. Emits a stall record when the
	/// elapsed time reaches the configured threshold, carrying the elapsed
	/// nanoseconds as its magnitude. A completion with no pending start
	/// (missed at attach time, or evicted) is ignored.
	pub fn on_tcp_send_complete(&self, ctx: &ProbeContext) {
		let Some(elapsed) = self.correlator.complete(flow_key(ctx), now_ns()) else {
			return;
		};

		if elapsed >= self.stall_threshold_ns {
			self.emit(EventKind::Stall, ctx.pid, elapsed, ctx.ifname);
		}
	}

	/// Correlator counters, for the consumer-side observability surface.
	pub fn correlator(&self) -> &Correlator {
		&self.correlator
	}

	fn emit(&self, kind: EventKind, pid: u32, bytes: u64, ifname: &[u8]) {
		let event = NetEvent::new(kind, pid, now_ns(), bytes, ifname);
		if self.tx.publish(&event).is_err() {
			// Expected under load; the channel already counted the loss.
			trace!(kind = kind.name(), "channel full, record dropped");
		}
	}
}

fn flow_key(ctx: &ProbeContext) -> FlowKey {
	FlowKey {
		sock: ctx.sock,
		seq: ctx.seq,
	}
}

/// Monotonic nanoseconds since the first reading in this process.
fn now_ns() -> u64 {
	static EPOCH: OnceLock<Instant> = OnceLock::new();
	EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

// region:    --- Tests


// endregion: --- Tests
