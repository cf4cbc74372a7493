//! TCP client for the OpenRGB SDK server

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::protocol::{self, packet, Header, HEADER_SIZE};
use crate::types::{DeviceInfo, Rgb};
use crate::LedController;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name announced to the server with SET_CLIENT_NAME
pub const DEFAULT_CLIENT_NAME: &str = "palette-fade";

/// Client for a single OpenRGB server
///
/// The socket is opened on `connect()` and reused for every request. When a
/// request fails the socket is dropped; the next request opens a fresh one.
pub struct OpenRgbClient {
    address: String,
    client_name: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl OpenRgbClient {
    /// Connect to `address` (`host:port`) and announce the client name
    pub async fn connect(address: &str) -> Result<Self, TransportError> {
        Self::connect_with(address, DEFAULT_CLIENT_NAME, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with(
        address: &str,
        client_name: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Self {
            address: address.to_string(),
            client_name: client_name.to_string(),
            timeout,
            stream: Mutex::new(None),
        };
        let stream = client.open().await?;
        *client.stream.lock().await = Some(stream);
        info!("Connected to OpenRGB server at {}", client.address);
        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(&self) -> Result<TcpStream, TransportError> {
        let connect = TcpStream::connect(&self.address);
        let mut stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|source| TransportError::Connect {
                address: self.address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let name = protocol::client_name_payload(&self.client_name);
        let packet = protocol::build_packet(0, packet::SET_CLIENT_NAME, &name);
        tokio::time::timeout(self.timeout, stream.write_all(&packet))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_millis() as u64))??;
        Ok(stream)
    }

    /// Send a packet and, if `expect_reply`, wait for the matching response
    async fn exchange(
        &self,
        device: u32,
        packet_id: u32,
        payload: &[u8],
        expect_reply: bool,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            debug!("Reconnecting to {}", self.address);
            *guard = Some(self.open().await?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Protocol("no connection".into()));
        };

        let packet = protocol::build_packet(device, packet_id, payload);
        let result = tokio::time::timeout(
            self.timeout,
            transact(stream, &packet, device, packet_id, expect_reply),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(self.timeout.as_millis() as u64)));

        if let Err(e) = &result {
            // Unknown stream position after a failure; start over next time
            debug!("Dropping connection after error: {e}");
            *guard = None;
        }
        result
    }

    async fn request(
        &self,
        device: u32,
        packet_id: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        self.exchange(device, packet_id, payload, true)
            .await?
            .ok_or_else(|| TransportError::Protocol("missing response".into()))
    }

    async fn send(&self, device: u32, packet_id: u32, payload: &[u8]) -> Result<(), TransportError> {
        self.exchange(device, packet_id, payload, false).await.map(|_| ())
    }

    pub async fn controller_count(&self) -> Result<u32, TransportError> {
        let payload = self.request(0, packet::REQUEST_CONTROLLER_COUNT, &[]).await?;
        protocol::parse_controller_count(&payload)
    }

    pub async fn controller(&self, index: u32) -> Result<DeviceInfo, TransportError> {
        let payload = self.request(index, packet::REQUEST_CONTROLLER_DATA, &[]).await?;
        protocol::parse_controller_data(index, &payload)
    }
}

async fn transact(
    stream: &mut TcpStream,
    packet: &[u8],
    device: u32,
    packet_id: u32,
    expect_reply: bool,
) -> Result<Option<Vec<u8>>, TransportError> {
    stream.write_all(packet).await?;
    if !expect_reply {
        return Ok(None);
    }

    loop {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await?;
        let header = Header::decode(&header)?;

        let mut payload = vec![0u8; header.size as usize];
        stream.read_exact(&mut payload).await?;

        if header.packet_id == packet_id && header.device == device {
            return Ok(Some(payload));
        }
        debug!(
            "Skipping unsolicited packet id={} device={}",
            header.packet_id, header.device
        );
    }
}

#[async_trait]
impl LedController for OpenRgbClient {
    async fn devices(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        let count = self.controller_count().await?;
        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            devices.push(self.controller(index).await?);
        }
        Ok(devices)
    }

    async fn set_custom_mode(&self, device: u32) -> Result<(), TransportError> {
        self.send(device, packet::SET_CUSTOM_MODE, &[]).await
    }

    async fn resize_zone(&self, device: u32, zone: u32, size: u32) -> Result<(), TransportError> {
        let payload = protocol::resize_zone_payload(zone, size);
        self.send(device, packet::RESIZE_ZONE, &payload).await
    }

    async fn update_leds(&self, device: u32, colors: &[Rgb]) -> Result<(), TransportError> {
        let payload = protocol::update_leds_payload(colors);
        self.send(device, packet::UPDATE_LEDS, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing;
    use crate::types::ZoneInfo;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// A packet as seen by the fake server
    #[derive(Debug)]
    struct Seen {
        device: u32,
        packet_id: u32,
        payload: Vec<u8>,
    }

    fn strip_zone() -> ZoneInfo {
        ZoneInfo {
            name: "Strip".into(),
            leds_min: 0,
            leds_max: 30,
            leds_count: 3,
        }
    }

    /// Fake OpenRGB server with one device. `drop_after` closes each
    /// connection after that many requests have been answered.
    async fn fake_server(
        unsolicited: bool,
        drop_after: Option<usize>,
    ) -> (String, mpsc::UnboundedReceiver<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                let mut answered = 0usize;
                loop {
                    let mut header = [0u8; HEADER_SIZE];
                    if socket.read_exact(&mut header).await.is_err() {
                        break;
                    }
                    let header = Header::decode(&header).unwrap();
                    let mut payload = vec![0u8; header.size as usize];
                    socket.read_exact(&mut payload).await.unwrap();
                    let _ = tx.send(Seen {
                        device: header.device,
                        packet_id: header.packet_id,
                        payload,
                    });

                    let reply = match header.packet_id {
                        packet::REQUEST_CONTROLLER_COUNT => Some(1u32.to_le_bytes().to_vec()),
                        packet::REQUEST_CONTROLLER_DATA => {
                            Some(testing::controller_data("Strip Controller", &[strip_zone()], 3))
                        }
                        _ => None,
                    };
                    if let Some(reply) = reply {
                        if drop_after == Some(answered) {
                            break;
                        }
                        if unsolicited {
                            let notice =
                                protocol::build_packet(0, packet::DEVICE_LIST_UPDATED, &[]);
                            socket.write_all(&notice).await.unwrap();
                        }
                        let out = protocol::build_packet(header.device, header.packet_id, &reply);
                        socket.write_all(&out).await.unwrap();
                        answered += 1;
                    }
                }
            }
        });

        (address, rx)
    }

    async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("server saw nothing")
            .expect("server channel closed")
    }

    #[tokio::test]
    async fn test_connect_announces_client_name() {
        let (address, mut rx) = fake_server(false, None).await;
        let _client = OpenRgbClient::connect(&address).await.unwrap();

        let seen = next_seen(&mut rx).await;
        assert_eq!(seen.packet_id, packet::SET_CLIENT_NAME);
        assert_eq!(seen.payload, b"palette-fade\0".to_vec());
    }

    #[tokio::test]
    async fn test_devices_enumerates_controllers() {
        let (address, _rx) = fake_server(false, None).await;
        let client = OpenRgbClient::connect(&address).await.unwrap();

        let devices = client.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Strip Controller");
        assert_eq!(devices[0].led_count, 3);
        assert_eq!(devices[0].zones, vec![strip_zone()]);
    }

    #[tokio::test]
    async fn test_unsolicited_packets_are_skipped() {
        let (address, _rx) = fake_server(true, None).await;
        let client = OpenRgbClient::connect(&address).await.unwrap();

        assert_eq!(client.controller_count().await.unwrap(), 1);
        assert_eq!(client.controller(0).await.unwrap().led_count, 3);
    }

    #[tokio::test]
    async fn test_update_leds_reaches_server() {
        let (address, mut rx) = fake_server(false, None).await;
        let client = OpenRgbClient::connect(&address).await.unwrap();
        let _ = next_seen(&mut rx).await; // client name

        client.set_custom_mode(0).await.unwrap();
        client.update_leds(0, &[Rgb::new(9, 8, 7); 2]).await.unwrap();

        let mode = next_seen(&mut rx).await;
        assert_eq!(mode.packet_id, packet::SET_CUSTOM_MODE);
        assert!(mode.payload.is_empty());

        let update = next_seen(&mut rx).await;
        assert_eq!(update.device, 0);
        assert_eq!(update.packet_id, packet::UPDATE_LEDS);
        assert_eq!(update.payload, protocol::update_leds_payload(&[Rgb::new(9, 8, 7); 2]));
    }

    #[tokio::test]
    async fn test_reconnects_after_dropped_connection() {
        let (address, _rx) = fake_server(false, Some(1)).await;
        let client = OpenRgbClient::connect(&address).await.unwrap();

        assert_eq!(client.controller_count().await.unwrap(), 1);
        // Server hangs up instead of answering the second request
        assert!(client.controller_count().await.is_err());
        // Fresh socket, fresh budget
        assert_eq!(client.controller_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_client_name_write_is_bounded_by_timeout() {
        // Accepts the connection but never reads from it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        // Larger than the socket buffers on both ends
        let name = "x".repeat(32 * 1024 * 1024);
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            OpenRgbClient::connect_with(&address, &name, Duration::from_millis(200)),
        )
        .await
        .expect("connect was not bounded");

        assert!(matches!(result, Err(TransportError::Timeout(200))));
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = OpenRgbClient::connect(&address).await.err().unwrap();
        assert!(err.is_disconnect());
    }
}
