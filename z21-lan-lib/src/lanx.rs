//! The LAN_X sub-protocol carried inside a DataSet with id `0x40`.
//!
//! A LAN_X envelope is `<x_header><data…><xor>` where the trailing byte is
//! the XOR of everything before it. Decoding verifies the checksum first and
//! then dispatches on `x_header` plus, for overloaded headers, the first
//! data byte. Combinations outside the dispatch tree decode to
//! [`LanX::Unknown`] so that one exotic message never poisons a datagram.

use bytes::BufMut;

use crate::codec::{cv_bytes, cv_from_bytes, loco_addr_bytes, loco_addr_from_bytes, xor_checksum};
use crate::error::DecodeError;

/// Option-byte base for a programming-on-main byte write.
const POM_WRITE_BYTE: u8 = 0xec;
/// Option-byte base for a programming-on-main bit write.
const POM_WRITE_BIT: u8 = 0xe8;
/// Option-byte base for a programming-on-main byte read.
const POM_READ_BYTE: u8 = 0xe4;

/// Decoder speed-step setting reported in LOCO_INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedSteps {
    Dcc14,
    Dcc28,
    Dcc128,
    #[default]
    Unknown,
}

impl SpeedSteps {
    fn from_wire(bits: u8) -> Self {
        match bits {
            0 => SpeedSteps::Dcc14,
            2 => SpeedSteps::Dcc28,
            4 => SpeedSteps::Dcc128,
            _ => SpeedSteps::Unknown,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            SpeedSteps::Dcc14 => 0,
            SpeedSteps::Dcc28 => 2,
            SpeedSteps::Dcc128 => 4,
            SpeedSteps::Unknown => 7,
        }
    }
}

/// Reported turnout position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnoutState {
    NotSwitched,
    SwitchedP0,
    SwitchedP1,
    #[default]
    Unknown,
}

impl TurnoutState {
    fn from_wire(value: u8) -> Self {
        match value & 0x03 {
            0 => TurnoutState::NotSwitched,
            1 => TurnoutState::SwitchedP0,
            2 => TurnoutState::SwitchedP1,
            _ => TurnoutState::Unknown,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            TurnoutState::NotSwitched => 0,
            TurnoutState::SwitchedP0 => 1,
            TurnoutState::SwitchedP1 => 2,
            TurnoutState::Unknown => 3,
        }
    }
}

/// How SET_LOCO_FUNCTION changes the addressed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionSwitch {
    Off,
    On,
    Toggle,
}

impl FunctionSwitch {
    fn from_wire(bits: u8) -> Self {
        match bits & 0x03 {
            0 => FunctionSwitch::Off,
            1 => FunctionSwitch::On,
            _ => FunctionSwitch::Toggle,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            FunctionSwitch::Off => 0,
            FunctionSwitch::On => 1,
            FunctionSwitch::Toggle => 2,
        }
    }
}

/// Function-group selector for SET_LOCO_FUNCTION_GROUP.
///
/// Each group carries eight function bits (five for the first group, which
/// covers F0..F4 in the LOCO_INFO bit order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionGroup {
    Group1,
    Group2,
    Group3,
    Group4,
    Group5,
    Group6,
    Group7,
    Group8,
    Group9,
    Group10,
}

impl FunctionGroup {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x20 => Some(FunctionGroup::Group1),
            0x21 => Some(FunctionGroup::Group2),
            0x22 => Some(FunctionGroup::Group3),
            0x23 => Some(FunctionGroup::Group4),
            0x28 => Some(FunctionGroup::Group5),
            0x29 => Some(FunctionGroup::Group6),
            0x2a => Some(FunctionGroup::Group7),
            0x2b => Some(FunctionGroup::Group8),
            0x50 => Some(FunctionGroup::Group9),
            0x51 => Some(FunctionGroup::Group10),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            FunctionGroup::Group1 => 0x20,
            FunctionGroup::Group2 => 0x21,
            FunctionGroup::Group3 => 0x22,
            FunctionGroup::Group4 => 0x23,
            FunctionGroup::Group5 => 0x28,
            FunctionGroup::Group6 => 0x29,
            FunctionGroup::Group7 => 0x2a,
            FunctionGroup::Group8 => 0x2b,
            FunctionGroup::Group9 => 0x50,
            FunctionGroup::Group10 => 0x51,
        }
    }
}

/// Decoded LAN_X_LOCO_INFO payload.
///
/// `functions[n]` is the state of Fn. The first function byte stores F0..F4
/// in a non-linear order (F0 at bit 4, F4..F1 at bits 3..0); that mapping is
/// preserved exactly on both decode and encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocoInfo {
    pub address: u16,
    pub busy: bool,
    pub speed_steps: SpeedSteps,
    pub direction_forward: bool,
    pub speed: u8,
    pub double_traction: bool,
    pub smart_search: bool,
    pub functions: [bool; 32],
}

/// One LAN_X message, client-to-station or station-to-client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanX {
    // Client to station
    GetVersion,
    GetStatus,
    SetTrackPowerOff,
    SetTrackPowerOn,
    DccReadRegister { register: u8 },
    CvRead { cv: u16 },
    DccWriteRegister { register: u8, value: u8 },
    CvWrite { cv: u16, value: u8 },
    MmWriteByte { register: u8, value: u8 },
    GetTurnoutInfo { address: u16 },
    GetExtAccessoryInfo { address: u16 },
    SetTurnout { address: u16, queue: bool, activate: bool, output: u8 },
    SetExtAccessory { address: u16, state: u8 },
    SetStop,
    GetLocoInfo { address: u16 },
    SetLocoDrive { address: u16, speed: u8, forward: bool },
    SetLocoFunction { address: u16, switch: FunctionSwitch, function: u8 },
    SetLocoFunctionGroup { address: u16, group: FunctionGroup, functions: u8 },
    SetLocoBinaryState { address: u16, low: u8, high: u8 },
    CvPomWriteByte { address: u16, cv: u16, value: u8 },
    CvPomWriteBit { address: u16, cv: u16, value: u8 },
    CvPomReadByte { address: u16, cv: u16 },
    CvPomAccessoryWriteByte { address: u16, cv: u16, value: u8 },
    CvPomAccessoryWriteBit { address: u16, cv: u16, value: u8 },
    CvPomAccessoryReadByte { address: u16, cv: u16 },
    GetFirmwareVersion,

    // Station to client
    TurnoutInfo { address: u16, state: TurnoutState },
    ExtAccessoryInfo { address: u16, state: u8, status: u8 },
    BcTrackPowerOff,
    BcTrackPowerOn,
    BcProgrammingMode,
    BcTrackShortCircuit,
    CvNackShortCircuit,
    CvNack,
    UnknownCommand,
    StatusChanged { central_state: u8 },
    VersionResponse { xbus_version: u8, station_id: u8 },
    CvResult { cv: u16, value: u8 },
    BcStopped,
    LocoInfo(LocoInfo),
    FirmwareVersionResponse { major: u8, minor: u8 },

    /// Checksum-valid envelope with an x_header or sub-opcode outside the
    /// dispatch tree; carries the raw envelope bytes.
    Unknown(Vec<u8>),
}

impl LanX {
    /// Serialise into a full envelope: x_header, data bytes, XOR trailer.
    pub fn pack(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(16);
        match self {
            LanX::GetVersion => out.put_slice(&[0x21, 0x21]),
            LanX::GetStatus => out.put_slice(&[0x21, 0x24]),
            LanX::SetTrackPowerOff => out.put_slice(&[0x21, 0x80]),
            LanX::SetTrackPowerOn => out.put_slice(&[0x21, 0x81]),
            LanX::DccReadRegister { register } => out.put_slice(&[0x22, 0x11, *register]),
            LanX::CvRead { cv } => {
                let [high, low] = cv_bytes(*cv);
                out.put_slice(&[0x23, 0x11, high, low]);
            }
            LanX::DccWriteRegister { register, value } => {
                out.put_slice(&[0x23, 0x12, *register, *value]);
            }
            LanX::CvWrite { cv, value } => {
                let [high, low] = cv_bytes(*cv);
                out.put_slice(&[0x24, 0x12, high, low, *value]);
            }
            LanX::MmWriteByte { register, value } => {
                out.put_slice(&[0x24, 0xff, 0x00, *register, *value]);
            }
            LanX::GetTurnoutInfo { address } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0x43, high, low]);
            }
            LanX::GetExtAccessoryInfo { address } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0x44, high, low, 0x00]);
            }
            LanX::SetTurnout {
                address,
                queue,
                activate,
                output,
            } => {
                let [high, low] = loco_addr_bytes(*address);
                let mut command = 0x80 | (output & 0x01);
                if *queue {
                    command |= 0x20;
                }
                if *activate {
                    command |= 0x08;
                }
                out.put_slice(&[0x53, high, low, command]);
            }
            LanX::SetExtAccessory { address, state } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0x54, high, low, *state, 0x00]);
            }
            LanX::SetStop => out.put_u8(0x80),
            LanX::GetLocoInfo { address } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0xe3, 0xf0, high, low]);
            }
            LanX::SetLocoDrive {
                address,
                speed,
                forward,
            } => {
                let [high, low] = loco_addr_bytes(*address);
                let mut drive = speed & 0x7f;
                if *forward {
                    drive |= 0x80;
                }
                out.put_slice(&[0xe4, 0x12, high, low, drive]);
            }
            LanX::SetLocoFunction {
                address,
                switch,
                function,
            } => {
                let [high, low] = loco_addr_bytes(*address);
                let f = (switch.to_wire() << 6) | (function & 0x3f);
                out.put_slice(&[0xe4, 0xf8, high, low, f]);
            }
            LanX::SetLocoFunctionGroup {
                address,
                group,
                functions,
            } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0xe4, group.to_wire(), high, low, *functions]);
            }
            LanX::SetLocoBinaryState { address, low, high } => {
                let [addr_high, addr_low] = loco_addr_bytes(*address);
                out.put_slice(&[0xe5, 0x5f, addr_high, addr_low, *low, *high]);
            }
            LanX::CvPomWriteByte { address, cv, value } => {
                put_pom(&mut out, 0x30, *address, POM_WRITE_BYTE, *cv, *value);
            }
            LanX::CvPomWriteBit { address, cv, value } => {
                put_pom(&mut out, 0x30, *address, POM_WRITE_BIT, *cv, *value);
            }
            LanX::CvPomReadByte { address, cv } => {
                put_pom(&mut out, 0x30, *address, POM_READ_BYTE, *cv, 0x00);
            }
            LanX::CvPomAccessoryWriteByte { address, cv, value } => {
                put_pom(&mut out, 0x31, *address, POM_WRITE_BYTE, *cv, *value);
            }
            LanX::CvPomAccessoryWriteBit { address, cv, value } => {
                put_pom(&mut out, 0x31, *address, POM_WRITE_BIT, *cv, *value);
            }
            LanX::CvPomAccessoryReadByte { address, cv } => {
                put_pom(&mut out, 0x31, *address, POM_READ_BYTE, *cv, 0x00);
            }
            LanX::GetFirmwareVersion => out.put_slice(&[0xf1, 0x0a]),

            LanX::TurnoutInfo { address, state } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0x43, high, low, state.to_wire()]);
            }
            LanX::ExtAccessoryInfo {
                address,
                state,
                status,
            } => {
                let [high, low] = loco_addr_bytes(*address);
                out.put_slice(&[0x44, high, low, *state, *status]);
            }
            LanX::BcTrackPowerOff => out.put_slice(&[0x61, 0x00]),
            LanX::BcTrackPowerOn => out.put_slice(&[0x61, 0x01]),
            LanX::BcProgrammingMode => out.put_slice(&[0x61, 0x02]),
            LanX::BcTrackShortCircuit => out.put_slice(&[0x61, 0x08]),
            LanX::CvNackShortCircuit => out.put_slice(&[0x61, 0x12]),
            LanX::CvNack => out.put_slice(&[0x61, 0x13]),
            LanX::UnknownCommand => out.put_slice(&[0x61, 0x82]),
            LanX::StatusChanged { central_state } => out.put_slice(&[0x62, 0x22, *central_state]),
            LanX::VersionResponse {
                xbus_version,
                station_id,
            } => out.put_slice(&[0x63, 0x21, *xbus_version, *station_id]),
            LanX::CvResult { cv, value } => {
                let [high, low] = cv_bytes(*cv);
                out.put_slice(&[0x64, 0x14, high, low, *value]);
            }
            LanX::BcStopped => out.put_slice(&[0x81, 0x00]),
            LanX::LocoInfo(info) => put_loco_info(&mut out, info),
            LanX::FirmwareVersionResponse { major, minor } => {
                out.put_slice(&[0xf3, 0x0a, *major, *minor]);
            }

            // Unknown carries the raw envelope verbatim, checksum included.
            LanX::Unknown(raw) => return raw.clone(),
        }
        let checksum = xor_checksum(&out);
        out.put_u8(checksum);
        out
    }

    /// Parse a full envelope (checksum byte included).
    pub fn parse(data: &[u8]) -> Result<LanX, DecodeError> {
        if data.len() < 2 {
            return Err(DecodeError::Truncated {
                what: "LAN_X envelope",
                need: 2,
                got: data.len(),
            });
        }
        let (body, trailer) = data.split_at(data.len() - 1);
        let computed = xor_checksum(body);
        if computed != trailer[0] {
            return Err(DecodeError::BadChecksum {
                computed,
                found: trailer[0],
            });
        }

        let x_header = body[0];
        let db = &body[1..];
        let message = match (x_header, db.len()) {
            (0x21, 1) => match db[0] {
                0x21 => LanX::GetVersion,
                0x24 => LanX::GetStatus,
                0x80 => LanX::SetTrackPowerOff,
                0x81 => LanX::SetTrackPowerOn,
                _ => unknown(data),
            },
            (0x22, 2) if db[0] == 0x11 => LanX::DccReadRegister { register: db[1] },
            (0x23, 3) => match db[0] {
                0x11 => LanX::CvRead {
                    cv: cv_from_bytes(db[1], db[2]),
                },
                0x12 => LanX::DccWriteRegister {
                    register: db[1],
                    value: db[2],
                },
                _ => unknown(data),
            },
            (0x24, 4) => match db[0] {
                0x12 => LanX::CvWrite {
                    cv: cv_from_bytes(db[1], db[2]),
                    value: db[3],
                },
                0xff => LanX::MmWriteByte {
                    register: db[2],
                    value: db[3],
                },
                _ => unknown(data),
            },
            // Request and info forms of 0x43/0x44 share an x_header and are
            // told apart by payload length.
            (0x43, 2) => LanX::GetTurnoutInfo {
                address: loco_addr_from_bytes(db[0], db[1]),
            },
            (0x43, 3) => LanX::TurnoutInfo {
                address: loco_addr_from_bytes(db[0], db[1]),
                state: TurnoutState::from_wire(db[2]),
            },
            (0x44, 3) => LanX::GetExtAccessoryInfo {
                address: loco_addr_from_bytes(db[0], db[1]),
            },
            (0x44, 4) => LanX::ExtAccessoryInfo {
                address: loco_addr_from_bytes(db[0], db[1]),
                state: db[2],
                status: db[3],
            },
            (0x53, 3) => LanX::SetTurnout {
                address: loco_addr_from_bytes(db[0], db[1]),
                queue: db[2] & 0x20 != 0,
                activate: db[2] & 0x08 != 0,
                output: db[2] & 0x01,
            },
            (0x54, 4) => LanX::SetExtAccessory {
                address: loco_addr_from_bytes(db[0], db[1]),
                state: db[2],
            },
            (0x61, 1) => match db[0] {
                0x00 => LanX::BcTrackPowerOff,
                0x01 => LanX::BcTrackPowerOn,
                0x02 => LanX::BcProgrammingMode,
                0x08 => LanX::BcTrackShortCircuit,
                0x12 => LanX::CvNackShortCircuit,
                0x13 => LanX::CvNack,
                0x82 => LanX::UnknownCommand,
                _ => unknown(data),
            },
            (0x62, 2) if db[0] == 0x22 => LanX::StatusChanged {
                central_state: db[1],
            },
            (0x63, 3) if db[0] == 0x21 => LanX::VersionResponse {
                xbus_version: db[1],
                station_id: db[2],
            },
            (0x64, 4) if db[0] == 0x14 => LanX::CvResult {
                cv: cv_from_bytes(db[1], db[2]),
                value: db[3],
            },
            (0x80, 0) => LanX::SetStop,
            (0x81, 1) if db[0] == 0x00 => LanX::BcStopped,
            (0xe3, 3) if db[0] == 0xf0 => LanX::GetLocoInfo {
                address: loco_addr_from_bytes(db[1], db[2]),
            },
            (0xe4, 4) => match db[0] {
                0x12 => LanX::SetLocoDrive {
                    address: loco_addr_from_bytes(db[1], db[2]),
                    speed: db[3] & 0x7f,
                    forward: db[3] & 0x80 != 0,
                },
                0xf8 => LanX::SetLocoFunction {
                    address: loco_addr_from_bytes(db[1], db[2]),
                    switch: FunctionSwitch::from_wire(db[3] >> 6),
                    function: db[3] & 0x3f,
                },
                group => match FunctionGroup::from_wire(group) {
                    Some(group) => LanX::SetLocoFunctionGroup {
                        address: loco_addr_from_bytes(db[1], db[2]),
                        group,
                        functions: db[3],
                    },
                    None => unknown(data),
                },
            },
            (0xe5, 5) if db[0] == 0x5f => LanX::SetLocoBinaryState {
                address: loco_addr_from_bytes(db[1], db[2]),
                low: db[3],
                high: db[4],
            },
            (0xe6, 6) if db[0] == 0x30 || db[0] == 0x31 => parse_pom(data, db),
            (0xef, 7..=9) => LanX::LocoInfo(parse_loco_info(db)),
            (0xf1, 1) if db[0] == 0x0a => LanX::GetFirmwareVersion,
            (0xf3, 3) if db[0] == 0x0a => LanX::FirmwareVersionResponse {
                major: db[1],
                minor: db[2],
            },
            _ => unknown(data),
        };
        Ok(message)
    }
}

fn unknown(envelope: &[u8]) -> LanX {
    LanX::Unknown(envelope.to_vec())
}

/// Append a programming-on-main body: sub-opcode, address, option byte with
/// the two high CV-address bits OR-ed in, low CV byte, value.
fn put_pom(out: &mut Vec<u8>, db0: u8, address: u16, option_base: u8, cv: u16, value: u8) {
    let [addr_high, addr_low] = loco_addr_bytes(address);
    let [cv_high, cv_low] = cv_bytes(cv);
    let option = option_base | (cv_high & 0x03);
    out.put_slice(&[0xe6, db0, addr_high, addr_low, option, cv_low, value]);
}

fn parse_pom(envelope: &[u8], db: &[u8]) -> LanX {
    let accessory = db[0] == 0x31;
    let address = loco_addr_from_bytes(db[1], db[2]);
    let cv = cv_from_bytes(db[3] & 0x03, db[4]);
    let value = db[5];
    match (db[3] & 0xfc, accessory) {
        (POM_WRITE_BYTE, false) => LanX::CvPomWriteByte { address, cv, value },
        (POM_WRITE_BIT, false) => LanX::CvPomWriteBit { address, cv, value },
        (POM_READ_BYTE, false) => LanX::CvPomReadByte { address, cv },
        (POM_WRITE_BYTE, true) => LanX::CvPomAccessoryWriteByte { address, cv, value },
        (POM_WRITE_BIT, true) => LanX::CvPomAccessoryWriteBit { address, cv, value },
        (POM_READ_BYTE, true) => LanX::CvPomAccessoryReadByte { address, cv },
        _ => unknown(envelope),
    }
}

fn parse_loco_info(db: &[u8]) -> LocoInfo {
    let mut functions = [false; 32];
    // The first function byte is irregular: F0 at bit 4, F4..F1 at bits 3..0.
    functions[0] = db[4] & 0x10 != 0;
    functions[1] = db[4] & 0x01 != 0;
    functions[2] = db[4] & 0x02 != 0;
    functions[3] = db[4] & 0x04 != 0;
    functions[4] = db[4] & 0x08 != 0;
    for bit in 0..8 {
        functions[5 + bit] = db[5] & (1 << bit) != 0;
        functions[13 + bit] = db[6] & (1 << bit) != 0;
    }
    if let Some(&byte) = db.get(7) {
        for bit in 0..8 {
            functions[21 + bit] = byte & (1 << bit) != 0;
        }
    }
    if let Some(&byte) = db.get(8) {
        for bit in 0..3 {
            functions[29 + bit] = byte & (1 << bit) != 0;
        }
    }

    LocoInfo {
        address: loco_addr_from_bytes(db[0], db[1]),
        busy: db[2] & 0x08 != 0,
        speed_steps: SpeedSteps::from_wire(db[2] & 0x07),
        direction_forward: db[3] & 0x80 != 0,
        speed: db[3] & 0x7f,
        double_traction: db[4] & 0x40 != 0,
        smart_search: db[4] & 0x20 != 0,
        functions,
    }
}

fn put_loco_info(out: &mut Vec<u8>, info: &LocoInfo) {
    let [addr_high, addr_low] = loco_addr_bytes(info.address);
    let mut steps = info.speed_steps.to_wire();
    if info.busy {
        steps |= 0x08;
    }
    let mut drive = info.speed & 0x7f;
    if info.direction_forward {
        drive |= 0x80;
    }

    let f = &info.functions;
    let mut db4 = 0u8;
    if info.double_traction {
        db4 |= 0x40;
    }
    if info.smart_search {
        db4 |= 0x20;
    }
    if f[0] {
        db4 |= 0x10;
    }
    if f[1] {
        db4 |= 0x01;
    }
    if f[2] {
        db4 |= 0x02;
    }
    if f[3] {
        db4 |= 0x04;
    }
    if f[4] {
        db4 |= 0x08;
    }
    let mut db5 = 0u8;
    let mut db6 = 0u8;
    let mut db7 = 0u8;
    let mut db8 = 0u8;
    for bit in 0..8 {
        if f[5 + bit] {
            db5 |= 1 << bit;
        }
        if f[13 + bit] {
            db6 |= 1 << bit;
        }
        if f[21 + bit] {
            db7 |= 1 << bit;
        }
    }
    for bit in 0..3 {
        if f[29 + bit] {
            db8 |= 1 << bit;
        }
    }

    out.put_slice(&[0xef, addr_high, addr_low, steps, drive, db4, db5, db6, db7, db8]);
}
