//! Admin HTTP surface and process wiring for the indexq consumer.

pub mod app;
pub mod forwarder;
