//! Minimal SNTP (RFC 4330) client: one request, one reply, no retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;

use super::time::TimeError;

/// Seconds between the NTP era origin (1900-01-01) and the Unix epoch.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;
const PACKET_LEN: usize = 48;

/// LI = 0, VN = 3, Mode = 3 (client).
pub fn request_packet() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = 0b00_011_011;
    packet
}

/// Reads the transmit timestamp of a server reply.
pub fn parse_reply(buf: &[u8]) -> Result<DateTime<Utc>, TimeError> {
    if buf.len() < PACKET_LEN {
        return Err(TimeError::Malformed(format!(
            "ntp reply too short: {} bytes",
            buf.len()
        )));
    }
    let mode = buf[0] & 0b111;
    if mode != 4 && mode != 5 {
        return Err(TimeError::Malformed(format!("unexpected ntp mode {mode}")));
    }
    // stratum 0 is a kiss-o'-death reply
    if buf[1] == 0 {
        return Err(TimeError::Malformed("ntp kiss-o'-death".to_owned()));
    }
    let secs = u32::from_be_bytes([buf[40], buf[41], buf[42], buf[43]]) as i64;
    let frac = u32::from_be_bytes([buf[44], buf[45], buf[46], buf[47]]) as u64;
    if secs == 0 {
        return Err(TimeError::Malformed("ntp transmit timestamp is zero".to_owned()));
    }
    let nanos = ((frac * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(secs - NTP_UNIX_OFFSET, nanos)
        .ok_or_else(|| TimeError::Malformed("ntp timestamp out of range".to_owned()))
}

/// Queries `server` (`host:port`) once within `timeout`.
pub async fn query(server: &str, timeout: Duration) -> Result<DateTime<Utc>, TimeError> {
    let exchange = async {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server).await?;
        socket.send(&request_packet()).await?;
        let mut buf = [0u8; 512];
        let len = socket.recv(&mut buf).await?;
        Ok::<_, std::io::Error>(buf[..len].to_vec())
    };
    let reply = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| TimeError::Timeout)??;
    parse_reply(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(secs: u32, frac: u32) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_LEN];
        buf[0] = 0b00_011_100;
        buf[1] = 2;
        buf[40..44].copy_from_slice(&secs.to_be_bytes());
        buf[44..48].copy_from_slice(&frac.to_be_bytes());
        buf
    }

    #[test]
    fn request_is_version_three_client_mode() {
        let packet = request_packet();
        assert_eq!(packet[0] >> 3 & 0b111, 3);
        assert_eq!(packet[0] & 0b111, 3);
        assert!(packet[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn transmit_timestamp_converts_to_unix_time() {
        // 2024-01-01T00:00:00Z plus half a second
        let unix = 1_704_067_200i64;
        let secs = (unix + NTP_UNIX_OFFSET) as u32;
        let time = parse_reply(&reply_with(secs, 1 << 31)).unwrap();
        assert_eq!(time.timestamp(), unix);
        assert_eq!(time.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn short_and_kiss_of_death_replies_are_rejected() {
        assert!(parse_reply(&[0u8; 12]).is_err());
        let mut kod = reply_with(3_913_056_000, 0);
        kod[1] = 0;
        assert!(parse_reply(&kod).is_err());
    }

    #[test]
    fn client_mode_echo_is_rejected() {
        let mut echo = reply_with(3_913_056_000, 0);
        echo[0] = request_packet()[0];
        assert!(parse_reply(&echo).is_err());
    }
}
