use std::net::SocketAddr;
use std::time::Duration;

/// Chunk size shared by the USB interface and the emulator.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Default emulator endpoint.
pub const DEFAULT_UDP_ENDPOINT: &str = "127.0.0.1:21324";

/// Default hot-plug polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for the UDP emulator backend.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Emulator endpoints probed on every enumeration.
    pub endpoints: Vec<SocketAddr>,
    /// How long to wait for the emulator to answer a liveness ping.
    pub ping_timeout: Duration,
    /// Hot-plug polling interval.
    pub poll_interval: Duration,
    /// Datagram size for reads and writes.
    pub chunk_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![SocketAddr::from(([127, 0, 0, 1], 21324))],
            ping_timeout: Duration::from_millis(500),
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Configuration for the USB backend.
#[derive(Debug, Clone)]
pub struct UsbConfig {
    /// Vendor id to match.
    pub vendor_id: u16,
    /// Product id of devices running firmware.
    pub firmware_product_id: u16,
    /// Product id of devices in bootloader mode.
    pub bootloader_product_id: u16,
    /// Interface claimed on open.
    pub interface: u8,
    /// Interrupt OUT endpoint.
    pub endpoint_out: u8,
    /// Interrupt IN endpoint.
    pub endpoint_in: u8,
    /// Hot-plug polling interval.
    pub poll_interval: Duration,
    /// Transfer size for reads and writes.
    pub chunk_size: usize,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x1209,
            firmware_product_id: 0x53c1,
            bootloader_product_id: 0x53c0,
            interface: 0,
            endpoint_out: 0x01,
            endpoint_in: 0x81,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_default_endpoint_matches_constant() {
        let cfg = UdpConfig::default();
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.endpoints[0].to_string(), DEFAULT_UDP_ENDPOINT);
    }
}
