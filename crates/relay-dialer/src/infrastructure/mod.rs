//! Infrastructure layer for the dialer: everything that touches a socket.

pub mod network;
