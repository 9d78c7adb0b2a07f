//! `iqrange-core`: the software-defined-radio exercise range.
//!
//! A pre-recorded complex-baseband IQ file is streamed as if it came from a
//! live RTL-style receiver ([`sample_source`]), a configurable RF jammer is
//! synthesized and mixed into the stream in real time ([`jammer`],
//! [`mixer`]), the mixed stream is exposed over a dongle-emulation TCP
//! protocol ([`dongle_server`]) driven by an in-process control bus
//! ([`bus`], [`control_plane`]), and a family of decoders consume the same
//! live stream ([`clock_recovery`], [`ais`], [`sstv`], [`metrics`]) via a
//! client of that same protocol ([`stream_client`], [`decoders`]).

pub mod ais;
pub mod bus;
pub mod clock_recovery;
pub mod config;
pub mod control_plane;
pub mod decoders;
pub mod dongle_server;
pub mod errors;
pub mod jammer;
pub mod logging;
pub mod metrics;
pub mod mixer;
pub mod pipeline;
pub mod sample_source;
pub mod sstv;
pub mod stream_client;
