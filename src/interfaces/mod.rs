//! Transport edge: JSON-lines RPC replay and startup seed loading.

pub mod rpc;
pub mod seed;
