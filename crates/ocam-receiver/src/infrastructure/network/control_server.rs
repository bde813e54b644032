//! Control server: settings replay out, capability reports in.
//!
//! ```text
//! Listening ──accept──► ClientConnected ──replay──► ReceivingHeader ◄─┐
//!     ▲                                                  │            │
//!     │                                          DispatchingPayload ──┘
//!     └──────────── read error / EOF / bad payload ──────┘
//! ```
//!
//! One client at a time.  On connect the settings cache is replayed and
//! closed with `SettingsSyncComplete`; afterwards the loop reads 5-byte
//! headers.  Capability reports replace the stored record in one step, any
//! other packet type is drained so the stream stays framed.  When the
//! connection ends the capability record is marked stale.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use ocam_core::protocol::{
    decode_capabilities, decode_control_header, ControlPacketType, CONTROL_HEADER_SIZE,
    MAX_CAPABILITIES_PAYLOAD,
};
use tracing::{debug, info, warn};

use super::transport::{
    accept_with_timeout, bind_listener, drain, read_exact, read_payload, RunSignal,
    TransportError, TransportOptions,
};
use crate::application::device_state::{Channel, DeviceState};
use crate::application::sync_settings::{sync_settings, RESOLUTION_SETTLE_DELAY};

/// Server for the control connection.
pub struct ControlServer {
    listener: TcpListener,
    state: Arc<DeviceState>,
    opts: TransportOptions,
    running: RunSignal,
    resolution_settle: Duration,
}

impl ControlServer {
    /// Binds the control listener.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] when every bind attempt fails.
    pub fn bind(
        addr: SocketAddr,
        state: Arc<DeviceState>,
        opts: TransportOptions,
        running: RunSignal,
    ) -> Result<Self, TransportError> {
        let listener = bind_listener(addr, &opts, &running)?;
        Ok(Self {
            listener,
            state,
            opts,
            running,
            resolution_settle: RESOLUTION_SETTLE_DELAY,
        })
    }

    /// Overrides the pause that follows a replayed resolution command.
    pub fn with_resolution_settle(mut self, delay: Duration) -> Self {
        self.resolution_settle = delay;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves clients until the run signal is cleared.
    pub fn run(self) {
        while self.running.is_running() {
            match accept_with_timeout(&self.listener, &self.opts, &self.running) {
                Ok(Some((stream, peer))) => self.serve_client(stream, peer),
                Ok(None) => {}
                Err(TransportError::Cancelled) => break,
                Err(e) => {
                    warn!("control accept failed: {e}");
                    std::thread::sleep(self.opts.poll_interval);
                }
            }
        }
        info!("control server stopped");
    }

    fn serve_client(&self, mut stream: TcpStream, peer: SocketAddr) {
        if !self.running.is_running() {
            return;
        }
        match stream.try_clone() {
            Ok(link) => self.state.attach_client(Channel::Control, Box::new(link)),
            Err(e) => {
                warn!("control client {peer} rejected, socket clone failed: {e}");
                return;
            }
        }
        info!("control client connected from {peer}");

        sync_settings(&self.state, self.resolution_settle);

        match self.receive_loop(&mut stream) {
            Err(TransportError::Closed) => info!("control client {peer} disconnected"),
            Err(TransportError::Cancelled) => debug!("control session cancelled"),
            Err(e) => warn!("control session with {peer} ended: {e}"),
            Ok(()) => {}
        }

        self.state.control_disconnected();
    }

    fn receive_loop(&self, stream: &mut TcpStream) -> Result<(), TransportError> {
        loop {
            let mut header = [0u8; CONTROL_HEADER_SIZE];
            read_exact(stream, &mut header, &self.running)?;
            let header = decode_control_header(&header)?;

            match header.packet_type {
                ControlPacketType::Capabilities => {
                    let payload =
                        read_payload(stream, header.length, MAX_CAPABILITIES_PAYLOAD, &self.running)?;
                    let caps = decode_capabilities(&payload)?;
                    info!(
                        resolutions = caps.resolutions.len(),
                        iso = ?caps.iso_range,
                        exposure_us = ?caps.exposure_range_us,
                        flash = caps.flash_available,
                        "capabilities updated"
                    );
                    self.state.update_capabilities(caps);
                }
                ControlPacketType::Unknown(kind) => {
                    debug!(kind, length = header.length, "ignoring control packet");
                    drain(stream, u64::from(header.length), &self.running)?;
                }
            }
        }
    }
}
