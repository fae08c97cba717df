use std::{thread, time::Duration};

use argus::{
	config::Config,
	probe::{ProbeContext, ProbeSet},
	worker::{event_channel, ChannelWorker},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub type Result<T> = core::result::Result<T, Error>;
pub type Error = Box<dyn std::error::Error>; // For early dev.

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_target(false)
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let config = Config {
		stall_threshold: Duration::from_millis(5),
		..Config::default()
	};
	let (probes, ring_rx) = ProbeSet::attach(&config);

	let (tx, rx) = event_channel();
	tokio::spawn(ChannelWorker::new(ring_rx, tx).run());

	// Simulated triggers, standing in for the kernel attachment layer.
	let trigger = {
		let probes = probes.clone();
		thread::spawn(move || {
			for i in 0..10u32 {
				let ctx = ProbeContext {
					pid: 1000 + i,
					sock: i as u64,
					seq: 1,
					bytes: 1500,
					ifname: b"eth0",
				};
				probes.on_tcp_send(&ctx);
				probes.on_tcp_retransmit(&ctx);
				thread::sleep(Duration::from_millis(10));
				probes.on_tcp_send_complete(&ctx);
				probes.on_skb_drop(&ctx);
			}
		})
	};

	// Retransmit + stall + drop per iteration.
	for _ in 0..30 {
		let evt = rx.recv().await?;
		info!(name = evt.name, pid = evt.pid, bytes = evt.bytes, ifname = %evt.ifname, "event");
	}

	trigger.join().map_err(|_| "trigger thread panicked")?;
	probes.detach();
	Ok(())
}
