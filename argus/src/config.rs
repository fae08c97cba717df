use std::time::Duration;

/// Pipeline configuration, read once at attach time. Nothing here is
/// adjustable afterwards; the channel in particular is sized for its whole
/// lifetime.
#[derive(Debug, Clone)]
pub struct Config {
	/// Total channel capacity in bytes.
	pub channel_bytes: usize,
	/// Bound on pending correlator entries.
	pub max_entries: usize,
	/// Minimum elapsed send time before a stall record is emitted.
	pub stall_threshold: Duration,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			channel_bytes: 256 * 1024,
			max_entries: 1024,
			stall_threshold: Duration::from_millis(100),
		}
	}
}
