//! Tripwire: artifact hashing and the per-run provenance log.

pub mod eventlog;
pub mod hasher;
