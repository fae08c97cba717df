use core::mem::size_of;

use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IFNAME_LEN: usize = 16;

/// Serialized width of one record; the channel allocates slots of exactly
/// this many bytes.
pub const EVENT_SIZE: usize = size_of::<NetEvent>();

/// One observed network occurrence. Immutable once constructed; serialized
/// once with `as_bytes()` and never touched again after publication.
///
/// 40 bytes, no internal padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NetEvent {
	pub pid: u32,
	pub kind: u32, // 0 => retransmit, 1 => stall, 2 => drop
	pub timestamp_ns: u64,
	/// Magnitude for the kind: bytes dropped for `Drop`, elapsed
	/// nanoseconds for `Stall`, zero otherwise.
	pub bytes: u64,
	pub ifname: [u8; IFNAME_LEN],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
	Retransmit = 0,
	Stall = 1,
	Drop = 2,
}

impl EventKind {
	pub fn from_wire(kind: u32) -> Option<Self> {
		match kind {
			0 => Some(EventKind::Retransmit),
			1 => Some(EventKind::Stall),
			2 => Some(EventKind::Drop),
			_ => None,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			EventKind::Retransmit => "RETRANSMIT",
			EventKind::Stall => "STALL",
			EventKind::Drop => "DROP",
		}
	}
}

impl NetEvent {
	pub fn new(kind: EventKind, pid: u32, timestamp_ns: u64, bytes: u64, ifname: &[u8]) -> Self {
		NetEvent {
			pid,
			kind: kind as u32,
			timestamp_ns,
			bytes,
			ifname: pack_ifname(ifname),
		}
	}

	pub fn kind(&self) -> Option<EventKind> {
		EventKind::from_wire(self.kind)
	}

	pub fn ifname_str(&self) -> String {
		String::from_utf8_lossy(&self.ifname).trim_end_matches('\0').to_string()
	}
}

/// Truncates/zero-pads into the fixed width. The last byte is always left
/// zero, so the name stays NUL-terminated even when truncated.
fn pack_ifname(name: &[u8]) -> [u8; IFNAME_LEN] {
	let mut out = [0u8; IFNAME_LEN];
	let len = name.len().min(IFNAME_LEN - 1);
	out[..len].copy_from_slice(&name[..len]);
	out
}

// region:    --- Tests


// endregion: --- Tests
