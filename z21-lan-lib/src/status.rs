//! Aggregated station state, folded from the receive stream.

use crate::codec::decode_bcd_version;
use crate::dataset::{DataSet, FeatureSet};
use crate::lanx::LanX;

/// Snapshot of everything the station has told us so far.
///
/// Mutated only by the receive loop; hosts read consistent copies through
/// [`Z21Client::status`](crate::client::Z21Client::status).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Z21Status {
    // Identity
    pub serial_number: u32,
    pub hw_type: u32,
    pub fw_version: String,
    pub feature_set: FeatureSet,

    // Track electrical values (mA / mV)
    pub main_current: i16,
    pub prog_current: i16,
    pub filtered_main_current: i16,
    pub supply_voltage: u16,
    pub vcc_voltage: u16,

    /// Station temperature in °C.
    pub temperature: i16,

    // Raw state bytes as reported by LAN_SYSTEMSTATE_DATACHANGED
    pub central_state: u8,
    pub central_state_ex: u8,
    pub capabilities: u8,

    // Mode flags derived from central_state and LAN_X broadcasts
    pub emergency_stop: bool,
    pub track_voltage_off: bool,
    pub short_circuit: bool,
    pub programming_mode: bool,
    /// Set when the station answered a request with UNKNOWN_COMMAND.
    pub invalid_request: bool,
}

impl Z21Status {
    /// Fold one decoded DataSet into the snapshot.
    pub fn apply(&mut self, dataset: &DataSet) {
        match dataset {
            DataSet::SerialNumber { serial_number } => self.serial_number = *serial_number,
            DataSet::Code(feature_set) => self.feature_set = *feature_set,
            DataSet::HwInfo(info) => {
                self.hw_type = info.hw_type;
                self.fw_version = info.fw_version();
            }
            DataSet::SystemStateChanged(state) => {
                self.main_current = state.main_current;
                self.prog_current = state.prog_current;
                self.filtered_main_current = state.filtered_main_current;
                self.temperature = state.temperature;
                self.supply_voltage = state.supply_voltage;
                self.vcc_voltage = state.vcc_voltage;
                self.central_state_ex = state.central_state_ex;
                self.capabilities = state.capabilities;
                self.set_central_state(state.central_state);
            }
            DataSet::X(command) => self.apply_x(command),
            _ => {}
        }
    }

    fn apply_x(&mut self, command: &LanX) {
        match command {
            LanX::BcTrackPowerOff => self.track_voltage_off = true,
            LanX::BcTrackPowerOn => self.track_voltage_off = false,
            LanX::BcProgrammingMode => self.programming_mode = true,
            LanX::BcTrackShortCircuit => self.short_circuit = true,
            LanX::BcStopped => self.emergency_stop = true,
            LanX::UnknownCommand => self.invalid_request = true,
            LanX::FirmwareVersionResponse { major, minor } => {
                self.fw_version = decode_bcd_version(&[*major, *minor], false);
            }
            _ => {}
        }
    }

    fn set_central_state(&mut self, state: u8) {
        self.central_state = state;
        self.emergency_stop = state & 0x01 != 0;
        self.track_voltage_off = state & 0x02 != 0;
        self.short_circuit = state & 0x04 != 0;
        self.programming_mode = state & 0x20 != 0;
    }
}
