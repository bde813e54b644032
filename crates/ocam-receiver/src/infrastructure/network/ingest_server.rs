//! Video and audio ingest servers.
//!
//! Both streams run the same state machine, parameterised by
//! [`StreamKind`]:
//!
//! ```text
//! Listening ──accept──► Handshaking ──► StreamingLoop ──disconnect──► Listening
//! ```
//!
//! The handshake (76 bytes for video, 4 for audio) is logged and otherwise
//! ignored.  Each connection gets a fresh [`StreamSession`]; the packet loop
//! reads a 12-byte header and its payload and hands both to the session.
//! Any read, size or decoder failure drops the connection.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

use ocam_core::protocol::{
    decode_audio_handshake, decode_media_header, decode_video_handshake, AUDIO_MAGIC_AAC,
    MEDIA_HEADER_SIZE,
};
use ocam_core::StreamKind;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::transport::{
    accept_with_timeout, bind_listener, read_exact, read_payload, RunSignal, TransportError,
    TransportOptions,
};
use crate::application::device_state::{Channel, DeviceState};
use crate::application::ingest_session::{IngestError, StreamSession};
use crate::application::media::MediaPorts;

/// Why a streaming loop ended.
#[derive(Debug, Error)]
enum StreamEnd {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Server for one media stream.
pub struct IngestServer {
    kind: StreamKind,
    listener: TcpListener,
    state: Arc<DeviceState>,
    media: MediaPorts,
    opts: TransportOptions,
    running: RunSignal,
}

impl IngestServer {
    /// Binds the listener for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] when every bind attempt fails.
    pub fn bind(
        kind: StreamKind,
        addr: SocketAddr,
        state: Arc<DeviceState>,
        media: MediaPorts,
        opts: TransportOptions,
        running: RunSignal,
    ) -> Result<Self, TransportError> {
        let listener = bind_listener(addr, &opts, &running)?;
        Ok(Self {
            kind,
            listener,
            state,
            media,
            opts,
            running,
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves clients until the run signal is cleared.
    pub fn run(self) {
        let mut session = StreamSession::new(self.kind);
        while self.running.is_running() {
            match accept_with_timeout(&self.listener, &self.opts, &self.running) {
                Ok(Some((stream, peer))) => self.serve_client(stream, peer, &mut session),
                Ok(None) => {}
                Err(TransportError::Cancelled) => break,
                Err(e) => {
                    warn!(stream = %self.kind, "accept failed: {e}");
                    std::thread::sleep(self.opts.poll_interval);
                }
            }
        }
        info!(stream = %self.kind, "ingest server stopped");
    }

    fn serve_client(&self, mut stream: TcpStream, peer: SocketAddr, session: &mut StreamSession) {
        if !self.running.is_running() {
            return;
        }
        let channel = Channel::from(self.kind);
        match stream.try_clone() {
            Ok(link) => self.state.attach_client(channel, Box::new(link)),
            Err(e) => {
                warn!(stream = %self.kind, "client {peer} rejected, socket clone failed: {e}");
                return;
            }
        }

        if let Err(e) = self.handshake(&mut stream) {
            debug!(stream = %self.kind, "handshake with {peer} failed: {e}");
            self.state.detach_client(channel);
            return;
        }

        session.reset();
        info!(
            stream = %self.kind,
            session = %session.id(),
            "connection from {peer} established, waiting for stream"
        );

        match self.stream_loop(&mut stream, session) {
            Err(StreamEnd::Transport(TransportError::Closed)) => {
                info!(stream = %self.kind, session = %session.id(), "client disconnected")
            }
            Err(StreamEnd::Transport(TransportError::Cancelled)) => {
                debug!(stream = %self.kind, "streaming cancelled")
            }
            Err(e) => warn!(stream = %self.kind, session = %session.id(), "stream ended: {e}"),
            Ok(()) => {}
        }

        debug!(
            stream = %self.kind,
            session = %session.id(),
            packets = session.packets(),
            "tearing down session"
        );
        self.state.detach_client(channel);
        session.reset();
    }

    fn handshake(&self, stream: &mut TcpStream) -> Result<(), TransportError> {
        let mut buf = vec![0u8; self.kind.handshake_size()];
        read_exact(stream, &mut buf, &self.running)?;
        match self.kind {
            StreamKind::Video => {
                let hs = decode_video_handshake(&buf)?;
                info!(
                    device = %hs.device_name,
                    codec = %hs.codec_name(),
                    width = hs.width,
                    height = hs.height,
                    "video handshake"
                );
            }
            StreamKind::Audio => {
                let magic = decode_audio_handshake(&buf)?;
                if magic != AUDIO_MAGIC_AAC {
                    debug!("unexpected audio magic 0x{magic:08X}");
                }
            }
        }
        Ok(())
    }

    fn stream_loop(&self, stream: &mut TcpStream, session: &mut StreamSession) -> Result<(), StreamEnd> {
        loop {
            let mut header = [0u8; MEDIA_HEADER_SIZE];
            read_exact(stream, &mut header, &self.running)?;
            let header = decode_media_header(&header).map_err(TransportError::from)?;
            let payload =
                read_payload(stream, header.size, self.opts.max_packet_bytes, &self.running)?;
            trace!(stream = %self.kind, ts = header.timestamp, bytes = payload.len(), "packet");

            let outcome = session.handle_packet(
                header.timestamp,
                &payload,
                self.media.decoders.as_ref(),
                self.media.clock.as_ref(),
                self.media.sink.as_ref(),
            )?;

            if let Some(size) = outcome.video_size {
                if self.state.set_video_size(size) {
                    info!("video size is now {size}");
                }
            }
        }
    }
}
