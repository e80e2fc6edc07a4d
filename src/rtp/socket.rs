//! Multicast RTP receive socket.
//!
//! Opens a joined multicast `UdpSocket` with a bounded read timeout so the
//! receive loop is a plain blocking call that still notices a shutdown
//! flag — no busy spin, no async runtime.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{CoreError, CoreResult};
use crate::rtp::header::RtpHeader;
use crate::rtp::payload;
use crate::types::{RtpPacket, SampleFormat};

const RECV_BUF_LEN: usize = 2048;

pub struct McastReceiver {
    socket: UdpSocket,
    ssrc_filter: u32,
    sample_format: SampleFormat,
}

impl McastReceiver {
    pub fn new(
        multicast_addr: Ipv4Addr,
        port: u16,
        ssrc_filter: u32,
        sample_format: SampleFormat,
    ) -> CoreResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| CoreError::Resource(format!("socket create: {}", e)))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| CoreError::Resource(format!("set_reuse_address: {}", e)))?;

        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|e| CoreError::Resource(format!("set_reuse_port: {}", e)))?;

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        socket
            .bind(&addr.into())
            .map_err(|e| CoreError::Resource(format!("bind {}: {}", addr, e)))?;

        socket
            .join_multicast_v4(&multicast_addr, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                CoreError::Resource(format!("join_multicast_v4 {}: {}", multicast_addr, e))
            })?;

        let socket: UdpSocket = socket.into();
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(CoreError::Io)?;

        Ok(Self {
            socket,
            ssrc_filter,
            sample_format,
        })
    }

    /// Spawn the receive loop on a background thread. Returns the join
    /// handle; the loop exits once `running` is cleared.
    pub fn start(
        self,
        tx: Sender<RtpPacket>,
        running: Arc<AtomicBool>,
    ) -> CoreResult<std::thread::JoinHandle<()>> {
        let socket = self
            .socket
            .try_clone()
            .map_err(|e| CoreError::Resource(format!("socket clone: {}", e)))?;
        let ssrc_filter = self.ssrc_filter;
        let sample_format = self.sample_format;

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; RECV_BUF_LEN];

            while running.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((len, _src)) => {
                        if len < 12 {
                            continue;
                        }
                        let Some(header) = RtpHeader::from_bytes(&buf[..len]) else {
                            continue;
                        };
                        if header.ssrc != ssrc_filter {
                            continue;
                        }

                        let samples = payload::decode(&buf[12..len], sample_format);
                        let packet = RtpPacket {
                            sequence: header.sequence,
                            rtp_ts: header.timestamp,
                            ssrc: header.ssrc,
                            samples,
                        };

                        if tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("RTP receive error: {}", e);
                    }
                }
            }

            tracing::info!("RTP receiver stopped");
        });

        Ok(handle)
    }
}
