//! Wake-on-LAN and MAC lookup

use std::net::{Ipv4Addr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::ClientError;
use crate::payload::normalize_mac;

pub const WOL_PORT: u16 = 9;

/// Kernel neighbour table
pub const ARP_TABLE: &str = "/proc/net/arp";

pub fn parse_mac(mac: &str) -> Result<[u8; 6], ClientError> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(ClientError::InvalidMac(mac.to_string()));
    }

    let mut bytes = [0u8; 6];
    for (byte, part) in bytes.iter_mut().zip(parts) {
        if part.len() != 2 {
            return Err(ClientError::InvalidMac(mac.to_string()));
        }
        *byte =
            u8::from_str_radix(part, 16).map_err(|_| ClientError::InvalidMac(mac.to_string()))?;
    }
    Ok(bytes)
}

/// 6 bytes of 0xFF followed by the MAC repeated 16 times
pub fn magic_packet(mac: &str) -> Result<Vec<u8>, ClientError> {
    let bytes = parse_mac(mac)?;
    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&bytes);
    }
    Ok(packet)
}

/// Directed broadcast address of the /24 that `host` lives in
pub fn broadcast_address(host: &str) -> Option<Ipv4Addr> {
    let addr: Ipv4Addr = host.parse().ok()?;
    let [a, b, c, _] = addr.octets();
    Some(Ipv4Addr::new(a, b, c, 255))
}

/// Send the magic packet to the limited broadcast address and, when given,
/// to the subnet's directed broadcast address
pub async fn wake(mac: &str, subnet_broadcast: Option<Ipv4Addr>) -> Result<(), ClientError> {
    let packet = magic_packet(mac)?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    let mut targets = vec![Ipv4Addr::BROADCAST];
    targets.extend(subnet_broadcast);

    for target in targets {
        let addr = SocketAddrV4::new(target, WOL_PORT);
        if let Err(e) = socket.send_to(&packet, addr).await {
            debug!("WoL send to {} failed: {}", addr, e);
        } else {
            debug!("WoL packet for {} sent to {}", mac, addr);
        }
    }
    Ok(())
}

/// MAC address the neighbour table holds for `ip`
///
/// Only hosts talked to recently are listed, so `None` is common.
pub async fn mac_from_ip(ip: &str) -> Option<String> {
    match tokio::fs::read_to_string(ARP_TABLE).await {
        Ok(table) => mac_in_arp_table(&table, ip),
        Err(e) => {
            debug!("Cannot read {}: {}", ARP_TABLE, e);
            None
        }
    }
}

/// Look `ip` up in `/proc/net/arp` text; incomplete entries are skipped
pub fn mac_in_arp_table(table: &str, ip: &str) -> Option<String> {
    table
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|cols| cols.len() >= 4 && cols[0] == ip)
        .filter_map(|cols| normalize_mac(cols[3]))
        .find(|mac| mac != "00:00:00:00:00:00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_packet_layout() {
        let packet = magic_packet("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        assert_eq!(&packet[6..12], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(&packet[96..], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_invalid_mac() {
        assert!(parse_mac("AA:BB:CC").is_err());
        assert!(parse_mac("GG:BB:CC:DD:EE:FF").is_err());
        assert!(parse_mac("AAA:BB:CC:DD:EE:F").is_err());
        assert_eq!(
            parse_mac("aa-bb-cc-dd-ee-01").unwrap(),
            [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]
        );
    }

    #[test]
    fn test_broadcast_address() {
        assert_eq!(
            broadcast_address("192.168.1.50"),
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
        assert_eq!(broadcast_address("tv.local"), None);
    }

    #[test]
    fn test_mac_in_arp_table() {
        let table = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         10:20:30:40:50:60     *        wlan0
192.168.1.50     0x1         0x2         aa:bb:cc:dd:ee:ff     *        wlan0
192.168.1.51     0x1         0x0         00:00:00:00:00:00     *        wlan0
";
        assert_eq!(
            mac_in_arp_table(table, "192.168.1.50").as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
        assert_eq!(mac_in_arp_table(table, "192.168.1.51"), None);
        assert_eq!(mac_in_arp_table(table, "192.168.1.5"), None);
        assert_eq!(mac_in_arp_table("", "192.168.1.50"), None);
    }
}
