//! Domain types shared by the relay and the client.

pub mod event;
