//! meshcached building blocks — multicast discovery and the proxy server.
//! The binary in main.rs wires these together; integration tests drive
//! them in-process over loopback.

pub mod discovery;
pub mod proxy;
