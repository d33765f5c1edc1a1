//! Application layer: connection bookkeeping with no network I/O.

pub mod connection_set;
