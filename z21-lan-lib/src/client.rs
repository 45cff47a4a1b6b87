//! The Z21 client: UDP session, background receiver, request API.
//!
//! One receive task owns the socket's read side and the status snapshot;
//! send methods can be called from any task and each cost one `send_to`.
//! Responses never block a request: they arrive on the receive task, update
//! the snapshot, and fan out over the event channel.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StationAddr;
use crate::dataset::{parse_datagram, BroadcastFlags, DataSet, DecoderMode};
use crate::error::{Result, Z21Error};
use crate::lanx::{FunctionGroup, FunctionSwitch, LanX};
use crate::status::Z21Status;

/// Receive buffer per datagram. The station coalesces small DataSets, but
/// never beyond a couple hundred bytes.
const RECV_BUFFER_LEN: usize = 512;

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct Connection {
    socket: UdpSocket,
    station: SocketAddr,
}

/// A client session with one Z21 station.
///
/// Lifecycle: [`new`](Self::new) → [`connect`](Self::connect) →
/// [`listen`](Self::listen); dropping the client stops the receiver and
/// releases the socket.
pub struct Z21Client {
    station: StationAddr,
    conn: ArcSwapOption<Connection>,
    status: Arc<ArcSwap<Z21Status>>,
    events: broadcast::Sender<DataSet>,
    shutdown: CancellationToken,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Z21Client {
    pub fn new(station: StationAddr) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            station,
            conn: ArcSwapOption::empty(),
            status: Arc::new(ArcSwap::from_pointee(Z21Status::default())),
            events,
            shutdown: CancellationToken::new(),
            receiver: Mutex::new(None),
        }
    }

    pub fn station(&self) -> &StationAddr {
        &self.station
    }

    /// Resolve the station endpoint and open the UDP socket.
    pub async fn connect(&self) -> Result<()> {
        let station = self.station.resolve().await?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(Z21Error::SocketOpen)?;
        info!(%station, "connected to Z21 station");
        self.conn.store(Some(Arc::new(Connection { socket, station })));
        Ok(())
    }

    /// Start the background receiver. Requires [`connect`](Self::connect);
    /// calling it again while the receiver runs is a no-op.
    pub fn listen(&self) -> Result<()> {
        let conn = self.conn.load_full().ok_or(Z21Error::NotConnected)?;

        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if receiver.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("receiver already running");
            return Ok(());
        }

        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        *receiver = Some(tokio::spawn(receive_loop(conn, status, events, shutdown)));
        Ok(())
    }

    /// Current station status snapshot.
    pub fn status(&self) -> Z21Status {
        Z21Status::clone(&self.status.load())
    }

    /// Subscribe to every DataSet decoded by the receiver.
    ///
    /// Slow subscribers lag rather than stall the receive loop.
    pub fn events(&self) -> broadcast::Receiver<DataSet> {
        self.events.subscribe()
    }

    /// Serialise and send one DataSet to the station.
    pub async fn send(&self, dataset: DataSet) -> Result<()> {
        let conn = self.conn.load_full().ok_or(Z21Error::NotConnected)?;
        let bytes = dataset.pack();
        debug!(id = dataset.id(), len = bytes.len(), "sending DataSet");
        conn.socket
            .send_to(&bytes, conn.station)
            .await
            .map_err(Z21Error::SendFailed)?;
        Ok(())
    }

    async fn send_x(&self, command: LanX) -> Result<()> {
        self.send(DataSet::X(command)).await
    }

    // Plain DataSet requests

    pub async fn lan_get_serial_number(&self) -> Result<()> {
        self.send(DataSet::GetSerialNumber).await
    }

    pub async fn lan_get_code(&self) -> Result<()> {
        self.send(DataSet::GetCode).await
    }

    pub async fn lan_get_hwinfo(&self) -> Result<()> {
        self.send(DataSet::GetHwInfo).await
    }

    pub async fn lan_logoff(&self) -> Result<()> {
        self.send(DataSet::Logoff).await
    }

    pub async fn lan_set_broadcast_flags(&self, flags: BroadcastFlags) -> Result<()> {
        self.send(DataSet::SetBroadcastFlags(flags)).await
    }

    pub async fn lan_get_broadcast_flags(&self) -> Result<()> {
        self.send(DataSet::GetBroadcastFlags).await
    }

    pub async fn lan_get_locomode(&self, address: u16) -> Result<()> {
        self.send(DataSet::GetLocoMode { address }).await
    }

    pub async fn lan_set_locomode(&self, address: u16, mode: DecoderMode) -> Result<()> {
        self.send(DataSet::SetLocoMode { address, mode }).await
    }

    pub async fn lan_get_turnoutmode(&self, address: u16) -> Result<()> {
        self.send(DataSet::GetTurnoutMode { address }).await
    }

    pub async fn lan_set_turnoutmode(&self, address: u16, mode: DecoderMode) -> Result<()> {
        self.send(DataSet::SetTurnoutMode { address, mode }).await
    }

    pub async fn lan_systemstate_getdata(&self) -> Result<()> {
        self.send(DataSet::GetSystemState).await
    }

    // LAN_X requests

    pub async fn xbus_get_version(&self) -> Result<()> {
        self.send_x(LanX::GetVersion).await
    }

    pub async fn xbus_get_status(&self) -> Result<()> {
        self.send_x(LanX::GetStatus).await
    }

    pub async fn xbus_set_track_power_off(&self) -> Result<()> {
        self.send_x(LanX::SetTrackPowerOff).await
    }

    pub async fn xbus_set_track_power_on(&self) -> Result<()> {
        self.send_x(LanX::SetTrackPowerOn).await
    }

    pub async fn xbus_dcc_read_register(&self, register: u8) -> Result<()> {
        self.send_x(LanX::DccReadRegister { register }).await
    }

    pub async fn xbus_cv_read(&self, cv: u16) -> Result<()> {
        self.send_x(LanX::CvRead { cv }).await
    }

    pub async fn xbus_dcc_write_register(&self, register: u8, value: u8) -> Result<()> {
        self.send_x(LanX::DccWriteRegister { register, value }).await
    }

    pub async fn xbus_cv_write(&self, cv: u16, value: u8) -> Result<()> {
        self.send_x(LanX::CvWrite { cv, value }).await
    }

    pub async fn xbus_mm_write_byte(&self, register: u8, value: u8) -> Result<()> {
        self.send_x(LanX::MmWriteByte { register, value }).await
    }

    pub async fn xbus_get_turnout_info(&self, address: u16) -> Result<()> {
        self.send_x(LanX::GetTurnoutInfo { address }).await
    }

    pub async fn xbus_get_ext_accessory_info(&self, address: u16) -> Result<()> {
        self.send_x(LanX::GetExtAccessoryInfo { address }).await
    }

    /// Switch a turnout output. `output` selects the coil (0 or 1),
    /// `activate` energises or releases it.
    pub async fn xbus_set_turnout(&self, address: u16, output: u8, activate: bool) -> Result<()> {
        self.send_x(LanX::SetTurnout {
            address,
            queue: false,
            activate,
            output: output & 0x01,
        })
        .await
    }

    pub async fn xbus_set_ext_accessory(&self, address: u16, state: u8) -> Result<()> {
        self.send_x(LanX::SetExtAccessory { address, state }).await
    }

    /// Emergency-stop all locomotives; track power stays on.
    pub async fn xbus_set_stop(&self) -> Result<()> {
        self.send_x(LanX::SetStop).await
    }

    pub async fn xbus_get_loco_info(&self, address: u16) -> Result<()> {
        self.send_x(LanX::GetLocoInfo { address }).await
    }

    /// Drive a locomotive. `speed` is a 7-bit value in the decoder's
    /// configured speed-step scale.
    pub async fn xbus_set_loco_drive(&self, address: u16, speed: u8, forward: bool) -> Result<()> {
        self.send_x(LanX::SetLocoDrive {
            address,
            speed: speed & 0x7f,
            forward,
        })
        .await
    }

    pub async fn xbus_set_loco_function(
        &self,
        address: u16,
        function: u8,
        switch: FunctionSwitch,
    ) -> Result<()> {
        self.send_x(LanX::SetLocoFunction {
            address,
            switch,
            function: function & 0x3f,
        })
        .await
    }

    pub async fn xbus_set_loco_function_group(
        &self,
        address: u16,
        group: FunctionGroup,
        functions: u8,
    ) -> Result<()> {
        self.send_x(LanX::SetLocoFunctionGroup {
            address,
            group,
            functions,
        })
        .await
    }

    pub async fn xbus_set_loco_binary_state(
        &self,
        address: u16,
        low: u8,
        high: u8,
    ) -> Result<()> {
        self.send_x(LanX::SetLocoBinaryState { address, low, high })
            .await
    }

    pub async fn xbus_cv_pom_write_byte(&self, address: u16, cv: u16, value: u8) -> Result<()> {
        self.send_x(LanX::CvPomWriteByte { address, cv, value }).await
    }

    pub async fn xbus_cv_pom_write_bit(&self, address: u16, cv: u16, value: u8) -> Result<()> {
        self.send_x(LanX::CvPomWriteBit { address, cv, value }).await
    }

    pub async fn xbus_cv_pom_read_byte(&self, address: u16, cv: u16) -> Result<()> {
        self.send_x(LanX::CvPomReadByte { address, cv }).await
    }

    pub async fn xbus_cv_pom_accessory_write_byte(
        &self,
        address: u16,
        cv: u16,
        value: u8,
    ) -> Result<()> {
        self.send_x(LanX::CvPomAccessoryWriteByte { address, cv, value })
            .await
    }

    pub async fn xbus_cv_pom_accessory_write_bit(
        &self,
        address: u16,
        cv: u16,
        value: u8,
    ) -> Result<()> {
        self.send_x(LanX::CvPomAccessoryWriteBit { address, cv, value })
            .await
    }

    pub async fn xbus_cv_pom_accessory_read_byte(&self, address: u16, cv: u16) -> Result<()> {
        self.send_x(LanX::CvPomAccessoryReadByte { address, cv })
            .await
    }

    pub async fn xbus_get_firmware_version(&self) -> Result<()> {
        self.send_x(LanX::GetFirmwareVersion).await
    }
}

impl Drop for Z21Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = receiver.take() {
            task.abort();
        }
    }
}

async fn receive_loop(
    conn: Arc<Connection>,
    status: Arc<ArcSwap<Z21Status>>,
    events: broadcast::Sender<DataSet>,
    shutdown: CancellationToken,
) {
    info!("Z21 receiver running");
    let mut buf = [0u8; RECV_BUFFER_LEN];
    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Z21 receiver stopping");
                return;
            }
            received = conn.socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "receive error");
                    continue;
                }
            },
        };

        if from != conn.station {
            debug!(%from, "ignoring datagram from unexpected peer");
            continue;
        }

        for frame in parse_datagram(&buf[..len]) {
            match frame {
                Ok(dataset) => {
                    debug!(?dataset, "received DataSet");
                    let mut next = Z21Status::clone(&status.load());
                    next.apply(&dataset);
                    status.store(Arc::new(next));
                    // No subscribers is fine; events are best-effort.
                    let _ = events.send(dataset);
                }
                Err(e) => warn!(error = %e, "dropping malformed DataSet"),
            }
        }
    }
}
