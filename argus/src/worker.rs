use std::time::Duration;

use argus_common::{NetEvent, EVENT_SIZE};
use tracing::debug;
use zerocopy::FromBytes;

use crate::{
	channel::RingRx,
	error::{Error, Result},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn event_channel() -> (EventTx, EventRx) {
	let (tx, rx) = flume::unbounded();

	(EventTx(tx), EventRx(rx))
}

/// Userspace view of one record, decoded off the wire.
#[derive(Debug, Clone)]
pub struct ProbeEvent {
	pub name: &'static str,
	pub pid: u32,
	pub timestamp_ns: u64,
	pub bytes: u64,
	pub ifname: String,
}

#[derive(Clone)]
pub struct EventTx(flume::Sender<ProbeEvent>);

impl EventTx {
	pub fn send_sync(&self, value: ProbeEvent) -> Result<()> {
		self.0.send(value)?;
		Ok(())
	}

	pub async fn send(&self, value: ProbeEvent) -> Result<()> {
		self.0.send_async(value).await?;
		Ok(())
	}
}

#[derive(Clone)]
pub struct EventRx(flume::Receiver<ProbeEvent>);

impl EventRx {
	pub async fn recv(&self) -> Result<ProbeEvent> {
		let res = self.0.recv_async().await?;
		Ok(res)
	}

	pub fn try_recv(&self) -> Option<ProbeEvent> {
		self.0.try_recv().ok()
	}
}

/// Drains the record channel and fans decoded events out to subscribers.
/// Exactly one exists per pipeline; it owns the consumer handle.
pub struct ChannelWorker {
	rx: RingRx,
	tx: EventTx,
}

impl ChannelWorker {
	pub fn new(rx: RingRx, tx: EventTx) -> Self {
		ChannelWorker { rx, tx }
	}

	/// Forwards everything currently committed. Records that fail to decode
	/// are skipped, the stream keeps flowing.
	pub fn drain(&mut self) -> Result<usize> {
		let mut forwarded = 0;
		while let Some(raw) = self.rx.consume_next() {
			match parse_probe_event(&raw) {
				Ok(evt) => {
					self.tx.send_sync(evt)?;
					forwarded += 1;
				}
				Err(_) => continue,
			}
		}
		Ok(forwarded)
	}

	/// Poll loop; a normal exit once the subscriber side goes away.
	pub async fn run(mut self) -> Result<()> {
		debug!("channel worker started");
		loop {
			if self.drain().is_err() {
				// Last subscriber gone, nothing left to forward to.
				break;
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
		debug!("channel worker stopped");
		Ok(())
	}

	/// Records lost to a full ring, for the observability surface.
	pub fn dropped(&self) -> u64 {
		self.rx.dropped()
	}
}

fn parse_probe_event(data: &[u8; EVENT_SIZE]) -> Result<ProbeEvent> {
	let evt = NetEvent::read_from_bytes(data).map_err(|_| Error::InvalidEventSize)?;
	let kind = evt.kind().ok_or(Error::UnknownEventKind(evt.kind))?;

	Ok(ProbeEvent {
		name: kind.name(),
		pid: evt.pid,
		timestamp_ns: evt.timestamp_ns,
		bytes: evt.bytes,
		ifname: evt.ifname_str(),
	})
}

// region:    --- Tests


// endregion: --- Tests
