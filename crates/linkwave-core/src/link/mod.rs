//! Link layer: frame format, fragmentation, reliable endpoints and static routing

pub mod endpoint;
pub mod fragment;
pub mod frame;
pub mod router;

pub use endpoint::{EndpointStats, PendingSend, Reception, ReliableEndpoint, SeenSet, Transmission};
pub use fragment::{fragment, Reassembler};
pub use frame::{additive_checksum, Frame, FrameKind, MAX_PAYLOAD_LEN, MIN_FRAME_BITS};
pub use router::{Router, RouterOutcome, RoutingTable};
