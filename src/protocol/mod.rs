//! SOCKS5 Protocol Module
//!
//! The subset of RFC 1928 / RFC 1929 the local broker speaks: version 5,
//! username/password method negotiation, CONNECT requests with IPv4 or
//! domain targets. IPv6, BIND and UDP ASSOCIATE are out of scope.

pub mod constants;
pub mod handler;

pub use handler::Socks5Handler;
