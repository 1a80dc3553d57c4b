//! Handoff Core - block decoding into a fixed-rate sample output
//!
//! A decode loop produces variable-length blocks of PCM; a periodic output
//! takes one stereo frame per tick. This crate holds everything between the
//! two: the session [`arena`], the lock-free block [`handoff`], the
//! [`decode`] driver with its decoder seam and sources, and the shared
//! [`config`].

pub mod arena;
pub mod config;
pub mod decode;
pub mod handoff;
pub mod types;

pub use types::*;
