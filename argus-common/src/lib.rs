//! Wire format shared between the probe (producer) side and the consumer
//! side of the argus pipeline. Producer and consumer may be compiled
//! independently, so the layout here is versioned by hand: any change to
//! field order, widths or padding is a wire break.

mod event;

pub use event::{EventKind, NetEvent, EVENT_SIZE, IFNAME_LEN};
