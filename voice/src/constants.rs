use std::time::Duration;

pub const CHANNEL_COUNT: usize = 2;
pub const SAMPLE_RATE: usize = 48000;
pub const CHUNK_DURATION: Duration = Duration::from_millis(20);
pub const TIMESTAMP_STEP: usize = SAMPLE_RATE / (1000 / CHUNK_DURATION.as_millis() as usize);

/// Voice protocol version pinned by the control plane's `VOICE_SERVER_UPDATE`.
pub const VOICE_GATEWAY_VERSION: u8 = 3;

pub const ENCRYPTION_MODE: &str = "xsalsa20_poly1305";

pub const IP_DISCOVERY_RETRIES: u8 = 5;
pub const IP_DISCOVERY_RETRY_INTERVAL: Duration = Duration::from_millis(200);
pub const IP_DISCOVERY_PACKET_SIZE: usize = 70;

/// `hello.heartbeat_interval` workaround: the voice gateway over-reports its
/// interval, so the client heartbeats at 3/4 of the advertised period.
pub const HEARTBEAT_INTERVAL_FACTOR: f64 = 0.75;

/// Minimum gap between UDP keepalive datagrams, used to keep the NAT/router
/// mapping for the media socket open while no audio is flowing.
pub const UDP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
