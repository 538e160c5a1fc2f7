//! # shardherd-core
//!
//! Networking shared by the shardherd daemon and CLI: TCP helpers,
//! length-prefixed bincode framing, and the peer transport used to reach
//! other nodes.

pub mod frame;
pub mod net;
pub mod sockfd_cache;
pub mod tcp_transport;
pub mod transport;
