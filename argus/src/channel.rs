use std::{
	cell::UnsafeCell,
	ops::{Deref, DerefMut},
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
};

use argus_common::{NetEvent, EVENT_SIZE};
use zerocopy::IntoBytes;

/// Creates the bounded producer/consumer pair over a ring of fixed-width
/// record slots, allocated once. The slot count is the largest power of two
/// that fits in `byte_size`, with a minimum of two; capacity never changes
/// afterwards.
///
/// Two slots is a hard floor: with a single slot the committed marker of
/// one lap equals the free marker of the next, so a producer could reclaim
/// a committed-but-unconsumed record.
pub fn ring_channel(byte_size: usize) -> (RingTx, RingRx) {
	let count = slot_count(byte_size);
	let slots: Box<[Slot]> = (0..count)
		.map(|i| Slot {
			seq: AtomicUsize::new(i),
			data: UnsafeCell::new([0u8; EVENT_SIZE]),
		})
		.collect();

	let shared = Arc::new(Shared {
		slots,
		mask: count - 1,
		head: AtomicUsize::new(0),
		tail: AtomicUsize::new(0),
		dropped: AtomicU64::new(0),
	});

	(RingTx { shared: Arc::clone(&shared) }, RingRx { shared })
}

fn slot_count(byte_size: usize) -> usize {
	let n = byte_size / EVENT_SIZE;
	if n <= 2 {
		2
	} else if n.is_power_of_two() {
		n
	} else {
		n.next_power_of_two() >> 1
	}
}

/// Reservation failed, no free slot. Expected under load; the event is lost
/// and counted, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFull;

struct Slot {
	// Per-slot turn counter (Vyukov scheme). `seq == pos`: free for the
	// producer claiming `pos`; `seq == pos + 1`: committed, readable;
	// anything else: owned by another lap.
	seq: AtomicUsize,
	data: UnsafeCell<[u8; EVENT_SIZE]>,
}

struct Shared {
	slots: Box<[Slot]>,
	mask: usize,
	head: AtomicUsize,
	tail: AtomicUsize,
	dropped: AtomicU64,
}

// Producers only write the slot they claimed via `head`; the consumer only
// reads slots whose seq says committed. No two contexts ever touch the same
// byte concurrently, the seq acquire/release is the handoff.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// Producer handle. Cheap to clone; every probe handler holds one.
#[derive(Clone)]
pub struct RingTx {
	shared: Arc<Shared>,
}

impl RingTx {
	/// Claims one record slot without blocking. Returns `None` immediately
	/// when the ring is full (the loss is counted); the CAS loop only
	/// retries while other producers are making progress, so the call is
	/// lock-free.
	pub fn reserve(&self) -> Option<SlotGuard<'_>> {
		let shared = &*self.shared;
		let mut pos = shared.head.load(Ordering::Relaxed);
		loop {
			let slot = &shared.slots[pos & shared.mask];
			let seq = slot.seq.load(Ordering::Acquire);
			let diff = (seq as isize).wrapping_sub(pos as isize);

			if diff == 0 {
				match shared
					.head
					.compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
				{
					Ok(_) => return Some(SlotGuard { shared, pos }),
					Err(cur) => pos = cur,
				}
			} else if diff < 0 {
				// One full lap behind and still unconsumed: full.
				shared.dropped.fetch_add(1, Ordering::Relaxed);
				return None;
			} else {
				pos = shared.head.load(Ordering::Relaxed);
			}
		}
	}

	/// Reserve + copy + commit in one step.
	pub fn publish(&self, event: &NetEvent) -> Result<(), ChannelFull> {
		let mut slot = self.reserve().ok_or(ChannelFull)?;
		slot.copy_from_slice(event.as_bytes());
		slot.commit();
		Ok(())
	}

	pub fn dropped(&self) -> u64 {
		self.shared.dropped.load(Ordering::Relaxed)
	}
}

/// An uncommitted reservation. Derefs to the slot bytes; invisible to the
/// consumer until committed. There is no cancellation: dropping the guard
/// publishes the slot as written.
pub struct SlotGuard<'a> {
	shared: &'a Shared,
	pos: usize,
}

impl SlotGuard<'_> {
	/// Makes the record visible to the consumer in a single release store.
	pub fn commit(self) {}
}

impl Drop for SlotGuard<'_> {
	fn drop(&mut self) {
		let slot = &self.shared.slots[self.pos & self.shared.mask];
		slot.seq.store(self.pos.wrapping_add(1), Ordering::Release);
	}
}

impl Deref for SlotGuard<'_> {
	type Target = [u8; EVENT_SIZE];

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.shared.slots[self.pos & self.shared.mask].data.get() }
	}
}

impl DerefMut for SlotGuard<'_> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.shared.slots[self.pos & self.shared.mask].data.get() }
	}
}

/// Consumer handle; exactly one exists per channel.
pub struct RingRx {
	shared: Arc<Shared>,
}

impl RingRx {
	/// Copies out the next fully-committed record, or `None` when the ring
	/// is empty or the next slot in sequence is reserved but not yet
	/// committed. Never yields a partially written record.
	pub fn consume_next(&mut self) -> Option<[u8; EVENT_SIZE]> {
		let shared = &*self.shared;
		let pos = shared.tail.load(Ordering::Relaxed);
		let slot = &shared.slots[pos & shared.mask];

		if slot.seq.load(Ordering::Acquire) != pos.wrapping_add(1) {
			return None;
		}

		let data = unsafe { *slot.data.get() };
		// Hand the slot to the producer lap after next.
		slot.seq.store(pos.wrapping_add(shared.mask).wrapping_add(1), Ordering::Release);
		shared.tail.store(pos.wrapping_add(1), Ordering::Relaxed);
		Some(data)
	}

	/// Records lost to a full ring since creation.
	pub fn dropped(&self) -> u64 {
		self.shared.dropped.load(Ordering::Relaxed)
	}
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use std::sync::atomic::{AtomicUsize, Ordering};

	use argus_common::EventKind;
	use zerocopy::FromBytes;

	use super::*;

	fn mk_event(pid: u32, bytes: u64) -> NetEvent {
		NetEvent::new(EventKind::Drop, pid, 1_000, bytes, b"eth0")
	}

	#[test]
	fn empty_channel_yields_nothing() -> Result<()> {
		let (_tx, mut rx) = ring_channel(4 * EVENT_SIZE);

		assert!(rx.consume_next().is_none());
		Ok(())
	}

	#[test]
	fn publish_then_consume() -> Result<()> {
		// -- Setup & Fixtures
		let (tx, mut rx) = ring_channel(4 * EVENT_SIZE);
		let evt = mk_event(7, 1500);

		// -- Exec
		tx.publish(&evt).map_err(|_| "full")?;
		let raw = rx.consume_next().ok_or("empty")?;

		// -- Check
		let got = NetEvent::read_from_bytes(&raw).map_err(|_| "decode")?;
		assert_eq!(got.pid, 7);
		assert_eq!(got.bytes, 1500);
		assert_eq!(got.kind().ok_or("kind")?, EventKind::Drop);
		assert!(rx.consume_next().is_none());
		Ok(())
	}

	#[test]
	fn uncommitted_slot_is_invisible() -> Result<()> {
		// -- Setup & Fixtures
		let (tx, mut rx) = ring_channel(4 * EVENT_SIZE);
		let evt = mk_event(1, 0);

		// -- Exec
		let mut guard = tx.reserve().ok_or("full")?;
		guard.copy_from_slice(evt.as_bytes());

		// -- Check: written but not committed.
		assert!(rx.consume_next().is_none());

		guard.commit();
		assert!(rx.consume_next().is_some());
		Ok(())
	}

	#[test]
	fn commit_order_does_not_reorder_consumption() -> Result<()> {
		// -- Setup & Fixtures
		let (tx, mut rx) = ring_channel(4 * EVENT_SIZE);

		let mut first = tx.reserve().ok_or("full")?;
		first.copy_from_slice(mk_event(1, 0).as_bytes());
		let mut second = tx.reserve().ok_or("full")?;
		second.copy_from_slice(mk_event(2, 0).as_bytes());

		// -- Exec: commit out of reservation order.
		second.commit();

		// The earlier reservation is still open, so nothing is readable yet.
		assert!(rx.consume_next().is_none());
		first.commit();

		// -- Check: reservation order, both fully committed.
		let a = rx.consume_next().ok_or("empty")?;
		let b = rx.consume_next().ok_or("empty")?;
		assert_eq!(NetEvent::read_from_bytes(&a).map_err(|_| "decode")?.pid, 1);
		assert_eq!(NetEvent::read_from_bytes(&b).map_err(|_| "decode")?.pid, 2);
		Ok(())
	}

	#[test]
	fn full_channel_rejects_reserve() -> Result<()> {
		// -- Setup & Fixtures: exactly two record slots.
		let (tx, mut rx) = ring_channel(2 * EVENT_SIZE);

		// -- Exec
		let g1 = tx.reserve().ok_or("full")?;
		let g2 = tx.reserve().ok_or("full")?;
		let g3 = tx.reserve();

		// -- Check
		assert!(g3.is_none());
		assert_eq!(tx.dropped(), 1);

		g1.commit();
		g2.commit();
		assert!(rx.consume_next().is_some());
		assert!(rx.consume_next().is_some());

		// Consumed slots are reusable.
		assert!(tx.reserve().is_some());
		Ok(())
	}

	#[test]
	fn undersized_ring_gets_two_slot_floor() -> Result<()> {
		// -- Setup & Fixtures: one record's worth of bytes still allocates
		// the two slots the sequence handoff needs.
		let (tx, mut rx) = ring_channel(EVENT_SIZE);

		// -- Exec
		tx.publish(&mk_event(1, 0)).map_err(|_| "full")?;
		tx.publish(&mk_event(2, 0)).map_err(|_| "full")?;
		let third = tx.publish(&mk_event(3, 0));

		// -- Check: the full ring rejects, never reclaims a committed slot.
		assert_eq!(third, Err(ChannelFull));
		assert_eq!(tx.dropped(), 1);
		let raw = rx.consume_next().ok_or("empty")?;
		assert_eq!(NetEvent::read_from_bytes(&raw).map_err(|_| "decode")?.pid, 1);

		// The ring keeps cycling after the rejection.
		tx.publish(&mk_event(4, 0)).map_err(|_| "full")?;
		let raw = rx.consume_next().ok_or("empty")?;
		assert_eq!(NetEvent::read_from_bytes(&raw).map_err(|_| "decode")?.pid, 2);
		let raw = rx.consume_next().ok_or("empty")?;
		assert_eq!(NetEvent::read_from_bytes(&raw).map_err(|_| "decode")?.pid, 4);
		assert!(rx.consume_next().is_none());
		Ok(())
	}

	#[test]
	fn byte_capacity_rounds_down() -> Result<()> {
		// 3 records' worth of bytes still yields a 2-slot ring.
		let (tx, _rx) = ring_channel(3 * EVENT_SIZE);

		let _g1 = tx.reserve().ok_or("full")?;
		let _g2 = tx.reserve().ok_or("full")?;
		assert!(tx.reserve().is_none());
		Ok(())
	}

	#[test]
	fn single_producer_fifo() -> Result<()> {
		let (tx, mut rx) = ring_channel(8 * EVENT_SIZE);

		for pid in 0..5 {
			tx.publish(&mk_event(pid, 0)).map_err(|_| "full")?;
		}
		for pid in 0..5 {
			let raw = rx.consume_next().ok_or("empty")?;
			assert_eq!(NetEvent::read_from_bytes(&raw).map_err(|_| "decode")?.pid, pid);
		}
		Ok(())
	}

	#[test]
	fn concurrent_producers_lose_nothing_silently() -> Result<()> {
		// -- Setup & Fixtures
		const PRODUCERS: u32 = 4;
		const PER_PRODUCER: u64 = 1_000;

		let (tx, mut rx) = ring_channel(64 * EVENT_SIZE);
		let done = AtomicUsize::new(0);
		let published = AtomicUsize::new(0);

		// -- Exec: produce from four threads, drain concurrently.
		let mut seen: Vec<Vec<u64>> = vec![Vec::new(); PRODUCERS as usize];
		std::thread::scope(|s| {
			for pid in 0..PRODUCERS {
				let tx = tx.clone();
				let done = &done;
				let published = &published;
				s.spawn(move || {
					for i in 0..PER_PRODUCER {
						if tx.publish(&mk_event(pid, i)).is_ok() {
							published.fetch_add(1, Ordering::Relaxed);
						}
					}
					done.fetch_add(1, Ordering::Relaxed);
				});
			}

			loop {
				match rx.consume_next() {
					Some(raw) => {
						let evt = NetEvent::read_from_bytes(&raw).expect("well-formed record");
						assert!(evt.kind().is_some());
						seen[evt.pid as usize].push(evt.bytes);
					}
					None => {
						if done.load(Ordering::Relaxed) == PRODUCERS as usize {
							break;
						}
						std::hint::spin_loop();
					}
				}
			}
			while let Some(raw) = rx.consume_next() {
				let evt = NetEvent::read_from_bytes(&raw).expect("well-formed record");
				seen[evt.pid as usize].push(evt.bytes);
			}
		});

		// -- Check: every published record arrived intact, in per-producer
		// order; the rest were counted as dropped.
		let consumed: usize = seen.iter().map(Vec::len).sum();
		assert_eq!(consumed, published.load(Ordering::Relaxed));
		assert_eq!(consumed as u64 + rx.dropped(), PRODUCERS as u64 * PER_PRODUCER);
		for per_producer in &seen {
			assert!(per_producer.windows(2).all(|w| w[0] < w[1]));
		}
		Ok(())
	}
}

// endregion: --- Tests
