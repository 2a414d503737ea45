//! An illustrative C37.118-style synchrophasor frame codec (§4.6).
//!
//! Covers the wire shape needed to demonstrate a real binary protocol
//! node type: a 2-byte sync word (version nibble + frame type), a 2-byte
//! frame size, a station/stream id, a SOC/FRACSEC timestamp pair, a
//! payload of phasor values, and a trailing CRC-CCITT-false. Config-3
//! frames are intentionally not decoded (§9 Open Question (c)); full
//! Config-1/Config-2 negotiation, multi-PMU aggregation, and leap-second
//! handling are out of scope (SPEC_FULL.md Non-goals).

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

const SYNC_LEADER: u8 = 0xAA;
const CRC_ALGO: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short: need at least {need} bytes, got {got}")]
    MissingBytes { need: usize, got: usize },

    #[error("declared frame size {declared} exceeds buffer length {available}")]
    InvalidSlice { declared: usize, available: usize },

    #[error("sync leader byte is 0x{0:02x}, expected 0x{SYNC_LEADER:02x}")]
    InvalidValue(u8),

    #[error("frame type {0:?} requires a config frame, none supplied")]
    MissingConfig(FrameType),

    #[error("CRC mismatch: computed 0x{computed:04x}, frame claims 0x{claimed:04x}")]
    InvalidChecksum { computed: u16, claimed: u16 },

    #[error("config-3 frames are not supported")]
    UnsupportedConfig3,

    #[error("decode() only parses Data frames; got {0:?}")]
    UnsupportedFrameType(FrameType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    ConfigFrame1,
    ConfigFrame2,
    ConfigFrame3,
    Command,
    Header,
}

impl FrameType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(FrameType::Data),
            1 => Some(FrameType::Header),
            2 => Some(FrameType::ConfigFrame1),
            3 => Some(FrameType::ConfigFrame2),
            4 => Some(FrameType::Command),
            5 => Some(FrameType::ConfigFrame3),
            _ => None,
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            FrameType::Data => 0,
            FrameType::Header => 1,
            FrameType::ConfigFrame1 => 2,
            FrameType::ConfigFrame2 => 3,
            FrameType::Command => 4,
            FrameType::ConfigFrame3 => 5,
        }
    }
}

/// Per-PMU channel layout negotiated by a Config-1/Config-2 frame,
/// required to interpret a Data frame's payload (§4.6).
#[derive(Debug, Clone)]
pub struct Config {
    pub station_id: u16,
    pub phasor_count: usize,
    /// `true` if phasors are transmitted as polar (magnitude, angle)
    /// rather than rectangular (real, imaginary) pairs.
    pub polar: bool,
}

/// One decoded Data frame: a SOC/FRACSEC timestamp and a vector of
/// complex phasor values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub station_id: u16,
    pub soc: u32,
    pub fracsec: u32,
    pub phasors: Vec<(f32, f32)>,
}

impl DataFrame {
    /// Serialize using the placeholder-patch technique: the frame-size
    /// field is written as zero, the body is built, then the real length
    /// is backpatched in before the trailing CRC is appended.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.phasors.len() * 8);
        buf.push(SYNC_LEADER);
        buf.push((0x1 << 4) | FrameType::Data.to_nibble());
        buf.extend_from_slice(&[0u8; 2]); // frame size placeholder
        let mut id_buf = [0u8; 2];
        BigEndian::write_u16(&mut id_buf, self.station_id);
        buf.extend_from_slice(&id_buf);
        let mut soc_buf = [0u8; 4];
        BigEndian::write_u32(&mut soc_buf, self.soc);
        buf.extend_from_slice(&soc_buf);
        let mut frac_buf = [0u8; 4];
        BigEndian::write_u32(&mut frac_buf, self.fracsec);
        buf.extend_from_slice(&frac_buf);
        for (re, im) in &self.phasors {
            let mut re_buf = [0u8; 4];
            BigEndian::write_f32(&mut re_buf, *re);
            buf.extend_from_slice(&re_buf);
            let mut im_buf = [0u8; 4];
            BigEndian::write_f32(&mut im_buf, *im);
            buf.extend_from_slice(&im_buf);
        }
        let total_len = (buf.len() + 2) as u16; // + trailing CRC
        BigEndian::write_u16(&mut buf[2..4], total_len);
        let crc = CRC_ALGO.checksum(&buf);
        let mut crc_buf = [0u8; 2];
        BigEndian::write_u16(&mut crc_buf, crc);
        buf.extend_from_slice(&crc_buf);
        buf
    }

    /// Decode a Data frame. `config` is the Config-1/Config-2 layout
    /// negotiated out of band for this station; it is required only when
    /// the frame being decoded actually is a Data frame — other frame
    /// types never reach the point where a config would be consulted.
    pub fn decode(buf: &[u8], config: Option<&Config>) -> Result<Self, FrameError> {
        const HEADER_LEN: usize = 14;
        if buf.len() < HEADER_LEN + 2 {
            return Err(FrameError::MissingBytes {
                need: HEADER_LEN + 2,
                got: buf.len(),
            });
        }
        if buf[0] != SYNC_LEADER {
            return Err(FrameError::InvalidValue(buf[0]));
        }
        let frame_type = FrameType::from_nibble(buf[1] & 0x0F)
            .ok_or(FrameError::InvalidValue(buf[1]))?;
        if frame_type == FrameType::ConfigFrame3 {
            return Err(FrameError::UnsupportedConfig3);
        }
        if frame_type != FrameType::Data {
            return Err(FrameError::UnsupportedFrameType(frame_type));
        }
        let config = config.ok_or(FrameError::MissingConfig(frame_type))?;
        let declared = BigEndian::read_u16(&buf[2..4]) as usize;
        if declared > buf.len() {
            return Err(FrameError::InvalidSlice {
                declared,
                available: buf.len(),
            });
        }
        let frame = &buf[..declared];
        let (body, crc_bytes) = frame.split_at(declared - 2);
        let claimed = BigEndian::read_u16(crc_bytes);
        let computed = CRC_ALGO.checksum(body);
        if computed != claimed {
            return Err(FrameError::InvalidChecksum { computed, claimed });
        }

        let station_id = BigEndian::read_u16(&frame[4..6]);
        let soc = BigEndian::read_u32(&frame[6..10]);
        let fracsec = BigEndian::read_u32(&frame[10..14]);
        let payload = &frame[14..frame.len() - 2];
        let expected_bytes = config.phasor_count * 8;
        if payload.len() < expected_bytes {
            return Err(FrameError::MissingBytes {
                need: expected_bytes,
                got: payload.len(),
            });
        }
        let mut phasors = Vec::with_capacity(config.phasor_count);
        for i in 0..config.phasor_count {
            let base = i * 8;
            let a = BigEndian::read_f32(&payload[base..base + 4]);
            let b = BigEndian::read_f32(&payload[base + 4..base + 8]);
            phasors.push(if config.polar {
                (a * b.cos(), a * b.sin())
            } else {
                (a, b)
            });
        }
        Ok(DataFrame {
            station_id,
            soc,
            fracsec,
            phasors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangular_config(n: usize) -> Config {
        Config {
            station_id: 7,
            phasor_count: n,
            polar: false,
        }
    }

    #[test]
    fn encode_decode_round_trip_preserves_fields() {
        let frame = DataFrame {
            station_id: 7,
            soc: 1_700_000_000,
            fracsec: 123_456,
            phasors: vec![(1.0, -1.0), (2.5, 3.5)],
        };
        let bytes = frame.encode();
        let decoded = DataFrame::decode(&bytes, Some(&rectangular_config(2))).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let frame = DataFrame {
            station_id: 1,
            soc: 0,
            fracsec: 0,
            phasors: vec![(1.0, 1.0)],
        };
        let mut bytes = frame.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = DataFrame::decode(&bytes, Some(&rectangular_config(1))).unwrap_err();
        assert!(matches!(err, FrameError::InvalidChecksum { .. }));
    }

    #[test]
    fn truncated_buffer_reports_missing_bytes() {
        let err =
            DataFrame::decode(&[SYNC_LEADER, 0x10], Some(&rectangular_config(1))).unwrap_err();
        assert!(matches!(err, FrameError::MissingBytes { .. }));
    }

    #[test]
    fn config_frame_3_is_explicitly_unsupported() {
        let mut bytes = vec![SYNC_LEADER, (0x1 << 4) | FrameType::ConfigFrame3.to_nibble()];
        bytes.extend_from_slice(&[0, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = DataFrame::decode(&bytes, None).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedConfig3));
    }

    #[test]
    fn declared_size_beyond_buffer_is_rejected() {
        let mut bytes = vec![SYNC_LEADER, (0x1 << 4) | FrameType::Data.to_nibble()];
        bytes.extend_from_slice(&[0xFF, 0xFF]); // declared size far beyond buffer
        bytes.extend_from_slice(&[0u8; 12]);
        let err = DataFrame::decode(&bytes, Some(&rectangular_config(0))).unwrap_err();
        assert!(matches!(err, FrameError::InvalidSlice { .. }));
    }

    /// The testable requirement this finding restores: deserialization
    /// must refuse a Data frame with no bound config.
    #[test]
    fn data_frame_without_config_is_rejected() {
        let frame = DataFrame {
            station_id: 1,
            soc: 0,
            fracsec: 0,
            phasors: vec![(1.0, 1.0)],
        };
        let bytes = frame.encode();
        let err = DataFrame::decode(&bytes, None).unwrap_err();
        assert!(matches!(err, FrameError::MissingConfig(FrameType::Data)));
    }

    #[test]
    fn non_data_frame_type_is_rejected_before_any_config_check() {
        let mut bytes = vec![SYNC_LEADER, (0x1 << 4) | FrameType::Header.to_nibble()];
        bytes.extend_from_slice(&[0, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = DataFrame::decode(&bytes, None).unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnsupportedFrameType(FrameType::Header)
        ));
    }
}
