//! Fire-and-forget commands to the SDR daemon, instantiating a channel
//! at a given SSRC, frequency, preset and sample rate. Success is never
//! acknowledged directly — it is confirmed by observing the new SSRC
//! arrive on the multicast stream; the caller is responsible for that
//! timeout.

use std::net::{SocketAddrV4, UdpSocket};

use byteorder::{BigEndian, WriteBytesExt};

use crate::config::ChannelConfig;
use crate::error::{CoreError, CoreResult};

const COMMAND_MAGIC: u32 = 0x4857_4331; // "HWC1"
const CREATE_CHANNEL: u8 = 0x01;

pub fn build_create_channel_packet(channel: &ChannelConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + channel.preset.len());
    let _ = buf.write_u32::<BigEndian>(COMMAND_MAGIC);
    buf.push(CREATE_CHANNEL);
    let _ = buf.write_u32::<BigEndian>(channel.ssrc);
    let _ = buf.write_u32::<BigEndian>(channel.frequency_hz);
    let _ = buf.write_u32::<BigEndian>(channel.sample_rate);
    let _ = buf.write_u16::<BigEndian>(channel.preset.len() as u16);
    buf.extend_from_slice(channel.preset.as_bytes());
    buf
}

pub fn send_create_channel(destination: SocketAddrV4, channel: &ChannelConfig) -> CoreResult<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(CoreError::Io)?;
    let packet = build_create_channel_packet(channel);
    socket
        .send_to(&packet, destination)
        .map_err(CoreError::Io)?;
    tracing::info!(
        ssrc = channel.ssrc,
        frequency_hz = channel.frequency_hz,
        "sent channel-create command to {}",
        destination
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_starts_with_magic_and_command() {
        let channel = ChannelConfig {
            ssrc: 42,
            frequency_hz: 10_000_000,
            preset: "wwv10".to_string(),
            sample_rate: 20_000,
            description: "WWV 10 MHz".to_string(),
            enabled: true,
            multicast: "239.1.1.10:5004".parse().unwrap(),
            sample_format: crate::types::SampleFormat::Int16,
        };
        let packet = build_create_channel_packet(&channel);
        assert_eq!(&packet[0..4], &COMMAND_MAGIC.to_be_bytes());
        assert_eq!(packet[4], CREATE_CHANNEL);
    }
}
