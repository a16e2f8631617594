use crate::FRAME_HEADER_SIZE;
use crate::protocol::{Command, FRAME_MAGIC, PROTOCOL_VERSION};
use bytes::Bytes;
use gpr_core::{ProbeError, Result, crc32};

/// Fixed 32-byte frame header.
///
/// Layout (little-endian):
/// magic(4) + version(1) + command(1) + flags(1) + reserved(1) +
/// request_id(8) + payload_length(4) + payload_crc(4) + header_crc(4) + reserved(4).
/// `header_crc` covers bytes 0..24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub command: Command,
    pub flags: u8,
    pub request_id: u64,
    pub payload_length: u32,
    pub payload_crc: u32,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;
    const CRC_SPAN: usize = 24;

    pub fn new(command: Command, request_id: u64, payload: &[u8]) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
            flags: 0,
            request_id,
            payload_length: payload.len() as u32,
            payload_crc: crc32(payload),
        }
    }

    /// Parse and validate a header. `max_payload` bounds the announced
    /// payload length so a corrupt length can never trigger a huge read.
    pub fn parse(buf: &[u8], max_payload: usize) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ProbeError::Protocol(format!(
                "Buffer too small for frame header: {} bytes",
                buf.len()
            )));
        }

        if buf[0..4] != FRAME_MAGIC {
            return Err(ProbeError::InvalidMagic);
        }

        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(ProbeError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }

        let stored_crc = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
        let computed_crc = crc32(&buf[0..Self::CRC_SPAN]);
        if stored_crc != computed_crc {
            return Err(ProbeError::CrcMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let command = Command::from_u8(buf[5])
            .ok_or_else(|| ProbeError::Protocol(format!("Unknown command byte: {:#x}", buf[5])))?;

        let payload_length = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
        if payload_length as usize > max_payload {
            return Err(ProbeError::FrameTooLarge {
                size: payload_length as usize,
                max: max_payload,
            });
        }

        Ok(Self {
            version,
            command,
            flags: buf[6],
            request_id: u64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            payload_length,
            payload_crc: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&FRAME_MAGIC);
        buf[4] = self.version;
        buf[5] = self.command as u8;
        buf[6] = self.flags;
        buf[8..16].copy_from_slice(&self.request_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[20..24].copy_from_slice(&self.payload_crc.to_le_bytes());
        let header_crc = crc32(&buf[0..Self::CRC_SPAN]);
        buf[24..28].copy_from_slice(&header_crc.to_le_bytes());
        buf
    }

    pub fn validate_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.payload_length as usize {
            return Err(ProbeError::Protocol(format!(
                "Payload length mismatch: expected {}, got {}",
                self.payload_length,
                payload.len()
            )));
        }

        let actual_crc = crc32(payload);
        if actual_crc != self.payload_crc {
            return Err(ProbeError::CrcMismatch {
                expected: self.payload_crc,
                actual: actual_crc,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: Command, request_id: u64, payload: Bytes) -> Self {
        Self {
            header: FrameHeader::new(command, request_id, &payload),
            payload,
        }
    }

    #[inline]
    #[must_use]
    pub fn command(&self) -> Command {
        self.header.command
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }
}

/// Parse one frame from the front of `buf`.
///
/// Returns `Ok(None)` while the buffer holds only part of a frame, and the
/// frame plus the number of bytes consumed once it is complete.
pub fn parse_frame(buf: &[u8], max_payload: usize) -> Result<Option<(Frame, usize)>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let header = FrameHeader::parse(buf, max_payload)?;
    let total_len = FRAME_HEADER_SIZE + header.payload_length as usize;

    if buf.len() < total_len {
        return Ok(None);
    }

    let payload_bytes = &buf[FRAME_HEADER_SIZE..total_len];
    header.validate_payload(payload_bytes)?;

    let frame = Frame {
        header,
        payload: Bytes::copy_from_slice(payload_bytes),
    };

    Ok(Some((frame, total_len)))
}

pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
    buf.extend_from_slice(&frame.header.encode());
    buf.extend_from_slice(&frame.payload);
    buf
}
