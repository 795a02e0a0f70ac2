//! QUIC transport for the two consumed RPCs (cluster-state authority, data nodes).

mod quic;

pub use quic::{make_client_endpoint, resolve_addr, QuicBiStream};
