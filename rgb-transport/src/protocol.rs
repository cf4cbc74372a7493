//! OpenRGB SDK wire format
//!
//! Every packet starts with a 16-byte header: the `ORGB` magic, the device
//! index, the packet id and the payload size (all u32, little endian).
//! Controller descriptions are decoded in the protocol version 0 layout,
//! which is what the server sends when the request carries no version.

use crate::error::TransportError;
use crate::types::{DeviceInfo, Rgb, ZoneInfo};

/// Default OpenRGB SDK server port
pub const DEFAULT_PORT: u16 = 6742;

pub const MAGIC: [u8; 4] = *b"ORGB";
pub const HEADER_SIZE: usize = 16;

/// Packet ids (NET_PACKET_ID_*)
pub mod packet {
    pub const REQUEST_CONTROLLER_COUNT: u32 = 0;
    pub const REQUEST_CONTROLLER_DATA: u32 = 1;
    pub const SET_CLIENT_NAME: u32 = 50;
    pub const DEVICE_LIST_UPDATED: u32 = 100;
    pub const RESIZE_ZONE: u32 = 1000;
    pub const UPDATE_LEDS: u32 = 1050;
    pub const SET_CUSTOM_MODE: u32 = 1100;
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub device: u32,
    pub packet_id: u32,
    pub size: u32,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.device.to_le_bytes());
        buf[8..12].copy_from_slice(&self.packet_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, TransportError> {
        if buf[0..4] != MAGIC {
            return Err(TransportError::Protocol(format!(
                "bad magic {:02X?}",
                &buf[0..4]
            )));
        }
        Ok(Self {
            device: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            packet_id: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            size: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// Build a complete packet (header + payload)
pub fn build_packet(device: u32, packet_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        device,
        packet_id,
        size: payload.len() as u32,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Payload for SET_CLIENT_NAME (NUL-terminated string)
pub fn client_name_payload(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(name.len() + 1);
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf
}

/// Payload for RESIZE_ZONE
pub fn resize_zone_payload(zone: u32, size: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&(zone as i32).to_le_bytes());
    buf[4..8].copy_from_slice(&(size as i32).to_le_bytes());
    buf
}

/// Payload for UPDATE_LEDS: total size, color count, then 4 bytes per LED
pub fn update_leds_payload(colors: &[Rgb]) -> Vec<u8> {
    let size = 4 + 2 + colors.len() * 4;
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf.extend_from_slice(&(colors.len() as u16).to_le_bytes());
    for c in colors {
        buf.extend_from_slice(&[c.r, c.g, c.b, 0]);
    }
    buf
}

/// Decode a REQUEST_CONTROLLER_COUNT response
pub fn parse_controller_count(payload: &[u8]) -> Result<u32, TransportError> {
    Reader::new(payload).u32()
}

/// Decode a REQUEST_CONTROLLER_DATA response (protocol version 0)
pub fn parse_controller_data(index: u32, payload: &[u8]) -> Result<DeviceInfo, TransportError> {
    let mut r = Reader::new(payload);

    let _data_size = r.u32()?;
    let _device_type = r.i32()?;
    let name = r.string()?;
    let _description = r.string()?;
    let _version = r.string()?;
    let _serial = r.string()?;
    let _location = r.string()?;

    let num_modes = r.u16()?;
    let _active_mode = r.i32()?;
    for _ in 0..num_modes {
        r.string()?; // name
        // value, flags, speed_min, speed_max, colors_min, colors_max,
        // speed, direction, color_mode
        r.skip(9 * 4)?;
        let num_colors = r.u16()? as usize;
        r.skip(num_colors * 4)?;
    }

    let num_zones = r.u16()?;
    let mut zones = Vec::with_capacity(num_zones as usize);
    for _ in 0..num_zones {
        let zone_name = r.string()?;
        let _zone_type = r.i32()?;
        let leds_min = r.u32()?;
        let leds_max = r.u32()?;
        let leds_count = r.u32()?;
        let matrix_len = r.u16()? as usize;
        r.skip(matrix_len)?;
        zones.push(ZoneInfo {
            name: zone_name,
            leds_min,
            leds_max,
            leds_count,
        });
    }

    let num_leds = r.u16()? as usize;
    for _ in 0..num_leds {
        r.string()?;
        r.u32()?;
    }

    Ok(DeviceInfo {
        index,
        name,
        zones,
        led_count: num_leds,
    })
}

/// Little-endian cursor over a payload
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TransportError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(TransportError::Protocol(format!(
                "truncated payload: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            ))),
        }
    }

    fn skip(&mut self, n: usize) -> Result<(), TransportError> {
        self.take(n).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, TransportError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, TransportError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, TransportError> {
        self.u32().map(|v| v as i32)
    }

    /// Length-prefixed string; the length includes the trailing NUL
    fn string(&mut self) -> Result<String, TransportError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
