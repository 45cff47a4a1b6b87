//! The outer DataSet framing of the Z21 LAN protocol.
//!
//! Every UDP datagram carries one or more DataSets, each framed as
//! `<size u16 LE><id u16 LE><payload>` with `size` counting the 4-byte
//! header. [`parse_datagram`] walks the coalesced frames by their declared
//! size; a malformed payload costs exactly one frame, and unknown ids are
//! surfaced as data rather than errors.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::codec::decode_bcd_version;
use crate::error::DecodeError;
use crate::lanx::LanX;

/// Bytes of the `<size><id>` frame header.
pub const HEADER_LEN: usize = 4;

bitflags! {
    /// Broadcast subscription mask for LAN_SET_BROADCASTFLAGS.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BroadcastFlags: u32 {
        const DRIVING_AND_SWITCHING = 0x0000_0001;
        const RBUS_FEEDBACK_CHANGES = 0x0000_0002;
        const RAILCOM_LOCO_CHANGES  = 0x0000_0004;
        const Z21_STATUS_CHANGES    = 0x0000_0100;
    }
}

/// Feature scope reported by LAN_GET_CODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSet {
    #[default]
    Unknown,
    NoLock,
    StartLocked,
    StartUnlocked,
}

impl FeatureSet {
    fn from_wire(code: u8) -> Self {
        match code {
            0x00 => FeatureSet::NoLock,
            0x01 => FeatureSet::StartLocked,
            0x02 => FeatureSet::StartUnlocked,
            _ => FeatureSet::Unknown,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            FeatureSet::NoLock => 0x00,
            FeatureSet::StartLocked => 0x01,
            FeatureSet::StartUnlocked => 0x02,
            FeatureSet::Unknown => 0xff,
        }
    }
}

/// Decoder protocol selection used by the LAN_*_MODE DataSets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderMode {
    Dcc,
    Mm,
    #[default]
    Unknown,
}

impl DecoderMode {
    fn from_wire(mode: u8) -> Self {
        match mode {
            0 => DecoderMode::Dcc,
            1 => DecoderMode::Mm,
            _ => DecoderMode::Unknown,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            DecoderMode::Dcc => 0,
            DecoderMode::Mm => 1,
            DecoderMode::Unknown => 0xff,
        }
    }
}

/// Payload of LAN_GET_HWINFO responses.
///
/// The firmware version is kept in its raw BCD form; [`HwInfo::fw_version`]
/// renders the dotted string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwInfo {
    pub hw_type: u32,
    pub fw_bcd: [u8; 4],
}

impl HwInfo {
    /// Firmware version string, decoded from the reversed BCD bytes.
    pub fn fw_version(&self) -> String {
        decode_bcd_version(&self.fw_bcd, true)
    }
}

/// Payload of LAN_SYSTEMSTATE_DATACHANGED. Currents are mA, voltages mV,
/// temperature °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemState {
    pub main_current: i16,
    pub prog_current: i16,
    pub filtered_main_current: i16,
    pub temperature: i16,
    pub supply_voltage: u16,
    pub vcc_voltage: u16,
    pub central_state: u8,
    pub central_state_ex: u8,
    pub capabilities: u8,
}

/// One DataSet, request or response.
///
/// Ids shared between a request and a response (serial number, code, hardware
/// info, broadcast flags, the mode queries) get one variant per form,
/// disambiguated on the wire by payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSet {
    GetSerialNumber,
    SerialNumber { serial_number: u32 },
    GetCode,
    Code(FeatureSet),
    GetHwInfo,
    HwInfo(HwInfo),
    Logoff,
    X(LanX),
    SetBroadcastFlags(BroadcastFlags),
    GetBroadcastFlags,
    BroadcastFlags(BroadcastFlags),
    GetLocoMode { address: u16 },
    LocoMode { address: u16, mode: DecoderMode },
    SetLocoMode { address: u16, mode: DecoderMode },
    GetTurnoutMode { address: u16 },
    TurnoutMode { address: u16, mode: DecoderMode },
    SetTurnoutMode { address: u16, mode: DecoderMode },
    SystemStateChanged(SystemState),
    GetSystemState,
    Unknown { id: u16, payload: Vec<u8> },
}

impl DataSet {
    /// Wire id of this DataSet kind.
    pub fn id(&self) -> u16 {
        match self {
            DataSet::GetSerialNumber | DataSet::SerialNumber { .. } => 0x10,
            DataSet::GetCode | DataSet::Code(_) => 0x18,
            DataSet::GetHwInfo | DataSet::HwInfo(_) => 0x1a,
            DataSet::Logoff => 0x30,
            DataSet::X(_) => 0x40,
            DataSet::SetBroadcastFlags(_) => 0x50,
            DataSet::GetBroadcastFlags | DataSet::BroadcastFlags(_) => 0x51,
            DataSet::GetLocoMode { .. } | DataSet::LocoMode { .. } => 0x60,
            DataSet::SetLocoMode { .. } => 0x61,
            DataSet::GetTurnoutMode { .. } | DataSet::TurnoutMode { .. } => 0x70,
            DataSet::SetTurnoutMode { .. } => 0x71,
            DataSet::SystemStateChanged(_) => 0x84,
            DataSet::GetSystemState => 0x85,
            DataSet::Unknown { id, .. } => *id,
        }
    }

    /// Serialise into a framed wire DataSet.
    pub fn pack(&self) -> Vec<u8> {
        let payload = self.pack_payload();
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.put_u16_le((HEADER_LEN + payload.len()) as u16);
        out.put_u16_le(self.id());
        out.put_slice(&payload);
        out
    }

    fn pack_payload(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        match self {
            DataSet::GetSerialNumber
            | DataSet::GetCode
            | DataSet::GetHwInfo
            | DataSet::Logoff
            | DataSet::GetBroadcastFlags
            | DataSet::GetSystemState => {}
            DataSet::SerialNumber { serial_number } => out.put_u32_le(*serial_number),
            DataSet::Code(feature_set) => out.put_u8(feature_set.to_wire()),
            DataSet::HwInfo(info) => {
                out.put_u32_le(info.hw_type);
                out.put_slice(&info.fw_bcd);
            }
            DataSet::X(command) => out = command.pack(),
            DataSet::SetBroadcastFlags(flags) | DataSet::BroadcastFlags(flags) => {
                out.put_u32_le(flags.bits());
            }
            // The four mode DataSets are the protocol's only big-endian
            // address fields.
            DataSet::GetLocoMode { address } | DataSet::GetTurnoutMode { address } => {
                out.put_u16(*address);
            }
            DataSet::LocoMode { address, mode }
            | DataSet::SetLocoMode { address, mode }
            | DataSet::TurnoutMode { address, mode }
            | DataSet::SetTurnoutMode { address, mode } => {
                out.put_u16(*address);
                out.put_u8(mode.to_wire());
            }
            DataSet::SystemStateChanged(state) => {
                out.put_i16_le(state.main_current);
                out.put_i16_le(state.prog_current);
                out.put_i16_le(state.filtered_main_current);
                out.put_i16_le(state.temperature);
                out.put_u16_le(state.supply_voltage);
                out.put_u16_le(state.vcc_voltage);
                out.put_u8(state.central_state);
                out.put_u8(state.central_state_ex);
                out.put_u8(0x00); // reserved
                out.put_u8(state.capabilities);
            }
            DataSet::Unknown { payload, .. } => out.extend_from_slice(payload),
        }
        out
    }

    /// Decode the payload of one frame, already split out of the datagram.
    pub fn parse(id: u16, payload: &[u8]) -> Result<DataSet, DecodeError> {
        let mut buf = payload;
        let dataset = match (id, payload.len()) {
            (0x10, 0) => DataSet::GetSerialNumber,
            (0x10, 4) => DataSet::SerialNumber {
                serial_number: buf.get_u32_le(),
            },
            (0x18, 0) => DataSet::GetCode,
            (0x18, 1) => DataSet::Code(FeatureSet::from_wire(payload[0])),
            (0x1a, 0) => DataSet::GetHwInfo,
            (0x1a, 8) => DataSet::HwInfo(HwInfo {
                hw_type: buf.get_u32_le(),
                fw_bcd: [payload[4], payload[5], payload[6], payload[7]],
            }),
            (0x30, 0) => DataSet::Logoff,
            (0x40, _) => DataSet::X(LanX::parse(payload)?),
            (0x50, 4) => DataSet::SetBroadcastFlags(BroadcastFlags::from_bits_retain(
                buf.get_u32_le(),
            )),
            (0x51, 0) => DataSet::GetBroadcastFlags,
            (0x51, 4) => {
                DataSet::BroadcastFlags(BroadcastFlags::from_bits_retain(buf.get_u32_le()))
            }
            (0x60, 2) => DataSet::GetLocoMode {
                address: buf.get_u16(),
            },
            (0x60, 3) => DataSet::LocoMode {
                address: buf.get_u16(),
                mode: DecoderMode::from_wire(payload[2]),
            },
            (0x61, 3) => DataSet::SetLocoMode {
                address: buf.get_u16(),
                mode: DecoderMode::from_wire(payload[2]),
            },
            (0x70, 2) => DataSet::GetTurnoutMode {
                address: buf.get_u16(),
            },
            (0x70, 3) => DataSet::TurnoutMode {
                address: buf.get_u16(),
                mode: DecoderMode::from_wire(payload[2]),
            },
            (0x71, 3) => DataSet::SetTurnoutMode {
                address: buf.get_u16(),
                mode: DecoderMode::from_wire(payload[2]),
            },
            (0x84, 16) => {
                let state = SystemState {
                    main_current: buf.get_i16_le(),
                    prog_current: buf.get_i16_le(),
                    filtered_main_current: buf.get_i16_le(),
                    temperature: buf.get_i16_le(),
                    supply_voltage: buf.get_u16_le(),
                    vcc_voltage: buf.get_u16_le(),
                    central_state: buf.get_u8(),
                    central_state_ex: buf.get_u8(),
                    capabilities: {
                        buf.advance(1); // reserved
                        buf.get_u8()
                    },
                };
                DataSet::SystemStateChanged(state)
            }
            (0x85, 0) => DataSet::GetSystemState,
            (
                0x10 | 0x18 | 0x1a | 0x30 | 0x50 | 0x51 | 0x60 | 0x61 | 0x70 | 0x71 | 0x84 | 0x85,
                len,
            ) => {
                return Err(DecodeError::UnexpectedLength {
                    what: dataset_name(id),
                    len,
                })
            }
            (id, _) => DataSet::Unknown {
                id,
                payload: payload.to_vec(),
            },
        };
        Ok(dataset)
    }
}

fn dataset_name(id: u16) -> &'static str {
    match id {
        0x10 => "LAN_GET_SERIAL_NUMBER",
        0x18 => "LAN_GET_CODE",
        0x1a => "LAN_GET_HWINFO",
        0x30 => "LAN_LOGOFF",
        0x40 => "LAN_X",
        0x50 => "LAN_SET_BROADCASTFLAGS",
        0x51 => "LAN_GET_BROADCASTFLAGS",
        0x60 => "LAN_GET_LOCOMODE",
        0x61 => "LAN_SET_LOCOMODE",
        0x70 => "LAN_GET_TURNOUTMODE",
        0x71 => "LAN_SET_TURNOUTMODE",
        0x84 => "LAN_SYSTEMSTATE_DATACHANGED",
        0x85 => "LAN_SYSTEMSTATE_GETDATA",
        _ => "DataSet",
    }
}

/// Iterate over the DataSets coalesced in one UDP datagram.
///
/// Each frame is consumed by its declared size, so one bad payload never
/// desynchronises the rest of the datagram; iteration stops when fewer than
/// a header's worth of bytes remain.
pub fn parse_datagram(datagram: &[u8]) -> DatagramFrames<'_> {
    DatagramFrames { rest: datagram }
}

pub struct DatagramFrames<'a> {
    rest: &'a [u8],
}

impl Iterator for DatagramFrames<'_> {
    type Item = Result<DataSet, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < HEADER_LEN {
            return None;
        }
        let mut header = self.rest;
        let size = header.get_u16_le();
        let id = header.get_u16_le();

        if (size as usize) < HEADER_LEN {
            // A size inside the header cannot be advanced over.
            self.rest = &[];
            return Some(Err(DecodeError::BadLength(size)));
        }
        let size = size as usize;
        if size > self.rest.len() {
            let available = self.rest.len();
            self.rest = &[];
            return Some(Err(DecodeError::TruncatedDataSet {
                declared: size,
                available,
            }));
        }

        let payload = &self.rest[HEADER_LEN..size];
        self.rest = &self.rest[size..];
        Some(DataSet::parse(id, payload))
    }
}
