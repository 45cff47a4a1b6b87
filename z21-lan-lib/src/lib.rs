//! Client library for the Z21 LAN protocol spoken by Roco/Fleischmann
//! command stations over UDP.
//!
//! The wire protocol has two framings: outer DataSets
//! (`<size><id><payload>`, little-endian header) and, inside the `0x40`
//! DataSet, the LAN_X sub-protocol with its own opcode tree and XOR
//! checksum. [`Z21Client`] owns the UDP session: requests go out as single
//! datagrams, and a background receiver decodes everything the station
//! sends — responses and broadcasts alike — into [`DataSet`] events and an
//! observable [`Z21Status`] snapshot.

#![forbid(unsafe_code)]

pub mod client;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod lanx;
pub mod status;

pub use client::Z21Client;
pub use config::{StationAddr, DEFAULT_PORT};
pub use dataset::{
    parse_datagram, BroadcastFlags, DataSet, DecoderMode, FeatureSet, HwInfo, SystemState,
};
pub use error::{DecodeError, Result, Z21Error};
pub use lanx::{FunctionGroup, FunctionSwitch, LanX, LocoInfo, SpeedSteps, TurnoutState};
pub use status::Z21Status;
