//! Core control library for the motors and sensors of a remotely attached brick.
//!
//! Every device port is driven by its own serialized command actor, so the
//! single-threaded device driver behind a port is only ever touched by one
//! worker thread, in the order the caller issued commands.

pub mod utils;
