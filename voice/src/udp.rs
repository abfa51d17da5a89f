//! The UDP voice-media socket: external-address discovery, keepalives, and
//! RTP packet construction/encryption for the send path.
//!
//! Uses the RTP-header-nonce "normal" cipher mode: the MAC tag sits as a
//! 16-byte prefix immediately after the RTP header, matching libsodium's
//! `crypto_secretbox_easy` layout, rather than a trailing randomly-generated
//! nonce (the `_suffix` mode).

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Instant;

use discortp::discord::{IpDiscoveryPacket, IpDiscoveryType, MutableIpDiscoveryPacket, MutableKeepalivePacket};
use discortp::rtp::{MutableRtpPacket, RtpType};
use discortp::wrap::{Wrap16, Wrap32};
use discortp::MutablePacket;
use rand::random;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::debug;
use xsalsa20poly1305::aead::generic_array::GenericArray;
use xsalsa20poly1305::{AeadInPlace, Key, KeyInit, XSalsa20Poly1305, TAG_SIZE};

use crate::constants::{IP_DISCOVERY_PACKET_SIZE, IP_DISCOVERY_RETRIES, IP_DISCOVERY_RETRY_INTERVAL, TIMESTAMP_STEP};

#[derive(Debug, Error)]
pub enum RtpError {
  #[error("udp i/o error: {0}")]
  Io(#[from] std::io::Error),
  #[error("ip discovery failed after all retries")]
  IpDiscoveryFailed,
  #[error("ip discovery response was malformed")]
  MalformedDiscoveryResponse,
  #[error("no secret key installed yet")]
  NoSecretKey,
  #[error("frame encryption failed")]
  EncryptFailed
}

pub struct ExternalAddress {
  pub address: IpAddr,
  pub port: u16
}

/// One guild's UDP voice-media socket: sequence/timestamp counters, the
/// secret key installed after `session_description`, and the scratch RTP
/// buffer reused for every outgoing packet.
pub struct RtpSession {
  socket: UdpSocket,
  ssrc: u32,
  sequence: u16,
  timestamp: u32,
  cipher: Option<XSalsa20Poly1305>,
  heartbeat_time: Instant,
  rtp_buffer: Vec<u8>
}

impl RtpSession {
  pub async fn connect(host: &str, port: u16, ssrc: u32) -> Result<Self, RtpError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect((host, port)).await?;

    Ok(Self {
      socket,
      ssrc,
      sequence: random::<u16>(),
      timestamp: random::<u32>(),
      cipher: None,
      heartbeat_time: Instant::now(),
      rtp_buffer: vec![0; 1460]
    })
  }

  pub fn sequence(&self) -> u16 {
    self.sequence
  }

  pub fn timestamp(&self) -> u32 {
    self.timestamp
  }

  pub fn install_secret_key(&mut self, secret_key: &[u8]) {
    let key = Key::from_slice(secret_key);
    self.cipher = Some(XSalsa20Poly1305::new(key));
  }

  /// Sends the SSRC-prefixed discovery datagram, retrying up to
  /// [`IP_DISCOVERY_RETRIES`] times with [`IP_DISCOVERY_RETRY_INTERVAL`]
  /// between attempts, and parses the echoed external address/port.
  pub async fn discover_external_address(&self) -> Result<ExternalAddress, RtpError> {
    let mut request = [0u8; IpDiscoveryPacket::const_packet_size()];
    let mut view = MutableIpDiscoveryPacket::new(&mut request).expect("buffer sized to packet");
    view.set_pkt_type(IpDiscoveryType::Request);
    view.set_length(IP_DISCOVERY_PACKET_SIZE as u16 - 4);
    view.set_ssrc(self.ssrc);

    for attempt in 0..IP_DISCOVERY_RETRIES {
      self.socket.send(&request).await?;

      let mut response = [0u8; IP_DISCOVERY_PACKET_SIZE];
      let wait = tokio::time::timeout(IP_DISCOVERY_RETRY_INTERVAL, self.socket.recv(&mut response)).await;

      let length = match wait {
        Ok(Ok(length)) => length,
        Ok(Err(error)) => return Err(error.into()),
        Err(_) => {
          debug!(attempt, "ip discovery attempt timed out, retrying");
          continue;
        }
      };

      let view = IpDiscoveryPacket::new(&response[..length]).ok_or(RtpError::MalformedDiscoveryResponse)?;
      if view.get_pkt_type() != IpDiscoveryType::Response {
        continue;
      }

      let raw_address = view.get_address_raw();
      let null_index = raw_address
        .iter()
        .position(|&byte| byte == 0)
        .ok_or(RtpError::MalformedDiscoveryResponse)?;
      let address = std::str::from_utf8(&raw_address[..null_index])
        .ok()
        .and_then(|text| IpAddr::from_str(text).ok())
        .ok_or(RtpError::MalformedDiscoveryResponse)?;

      return Ok(ExternalAddress { address, port: view.get_port() });
    }

    Err(RtpError::IpDiscoveryFailed)
  }

  pub async fn send_keepalive(&mut self) -> Result<(), RtpError> {
    let mut buffer = [0u8; MutableKeepalivePacket::minimum_packet_size()];
    let mut view = MutableKeepalivePacket::new(&mut buffer).expect("buffer sized to packet");
    view.set_ssrc(self.ssrc);

    self.heartbeat_time = Instant::now();
    self.socket.send(&buffer).await?;
    debug!("sent udp keepalive");
    Ok(())
  }

  pub fn heartbeat_time(&self) -> Instant {
    self.heartbeat_time
  }

  /// Builds, encrypts and sends one RTP packet carrying `opus_payload`,
  /// advancing sequence by one and timestamp by `sample_count` regardless
  /// of outcome (a dropped/undersized frame must not desynchronize timing).
  pub async fn send_frame(&mut self, opus_payload: &[u8], sample_count: usize) -> Result<(), RtpError> {
    let cipher = self.cipher.as_ref().ok_or(RtpError::NoSecretKey)?;

    let mut view = MutableRtpPacket::new(&mut self.rtp_buffer[..]).expect("buffer sized to packet");
    view.set_version(2);
    view.set_payload_type(RtpType::Unassigned(0x78));
    view.set_sequence(Wrap16::from(self.sequence));
    view.set_timestamp(Wrap32::from(self.timestamp));
    view.set_ssrc(self.ssrc);

    self.sequence = self.sequence.wrapping_add(1);
    self.timestamp = self.timestamp.wrapping_add(sample_count as u32);

    // The RTP-header nonce mode: the 24-byte secretbox nonce is the 12-byte
    // RTP header followed by 12 zero bytes.
    let mut nonce_bytes = [0u8; 24];
    nonce_bytes[..12].copy_from_slice(&self.rtp_buffer[..12]);
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let payload = view.payload_mut();
    payload[TAG_SIZE..TAG_SIZE + opus_payload.len()].copy_from_slice(opus_payload);

    let tag = cipher
      .encrypt_in_place_detached(nonce, b"", &mut payload[TAG_SIZE..TAG_SIZE + opus_payload.len()])
      .map_err(|_| RtpError::EncryptFailed)?;
    payload[..TAG_SIZE].copy_from_slice(tag.as_slice());

    let packet_len = 12 + TAG_SIZE + opus_payload.len();
    self.socket.send(&self.rtp_buffer[..packet_len]).await?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn sequence_and_timestamp_advance_monotonically_per_frame() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    echo.connect(addr).await.unwrap();

    let mut session = RtpSession {
      socket,
      ssrc: 42,
      sequence: 0,
      timestamp: 0,
      cipher: None,
      heartbeat_time: Instant::now(),
      rtp_buffer: vec![0; 1460]
    };
    session.socket.connect(echo.local_addr().unwrap()).await.unwrap();
    session.install_secret_key(&[7u8; 32]);

    session.send_frame(&[1, 2, 3], TIMESTAMP_STEP).await.unwrap();
    let first_sequence = session.sequence;
    let first_timestamp = session.timestamp;

    session.send_frame(&[4, 5, 6], TIMESTAMP_STEP).await.unwrap();

    assert_eq!(first_sequence + 1, session.sequence);
    assert_eq!(first_timestamp + TIMESTAMP_STEP as u32, session.timestamp);
  }

  #[tokio::test]
  async fn timestamp_advances_by_the_frames_own_sample_count() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    echo.connect(addr).await.unwrap();

    let mut session = RtpSession {
      socket,
      ssrc: 42,
      sequence: 0,
      timestamp: 0,
      cipher: None,
      heartbeat_time: Instant::now(),
      rtp_buffer: vec![0; 1460]
    };
    session.socket.connect(echo.local_addr().unwrap()).await.unwrap();
    session.install_secret_key(&[7u8; 32]);

    // A zero-padded tail frame carries fewer real samples than a full 20ms
    // frame; the timestamp must advance by that real count, not the constant.
    session.send_frame(&[1, 2, 3], 400).await.unwrap();
    assert_eq!(session.timestamp, 400);

    session.send_frame(&[4, 5, 6], TIMESTAMP_STEP).await.unwrap();
    assert_eq!(session.timestamp, 400 + TIMESTAMP_STEP as u32);
  }

  #[tokio::test]
  async fn rtp_header_matches_the_fixed_byte_layout() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect("127.0.0.1:1").await.unwrap();
    let mut session = RtpSession {
      socket,
      ssrc: 0xCAFEBABE,
      sequence: 0x1234,
      timestamp: 0xDEADBEEF,
      cipher: None,
      heartbeat_time: Instant::now(),
      rtp_buffer: vec![0; 1460]
    };
    session.install_secret_key(&[7u8; 32]);

    // send_frame mutates the shared rtp_buffer's header before encrypting;
    // exercise just the header composition the same way send_frame does.
    let mut view = MutableRtpPacket::new(&mut session.rtp_buffer[..]).unwrap();
    view.set_version(2);
    view.set_payload_type(RtpType::Unassigned(0x78));
    view.set_sequence(Wrap16::from(session.sequence));
    view.set_timestamp(Wrap32::from(session.timestamp));
    view.set_ssrc(session.ssrc);

    assert_eq!(
      &session.rtp_buffer[..12],
      &[0x80, 0x78, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE]
    );
  }

  #[tokio::test]
  async fn send_frame_without_secret_key_is_rejected() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect("127.0.0.1:1").await.unwrap();
    let mut session = RtpSession {
      socket,
      ssrc: 1,
      sequence: 0,
      timestamp: 0,
      cipher: None,
      heartbeat_time: Instant::now(),
      rtp_buffer: vec![0; 1460]
    };

    assert!(matches!(session.send_frame(&[0, 1], TIMESTAMP_STEP).await, Err(RtpError::NoSecretKey)));
  }
}
