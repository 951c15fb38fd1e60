use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::CodecError;

pub const HEADER_LEN: usize = 24;
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Keep-alive ping
pub const CMD_PING: u32 = 0x1;
pub const CMD_QUERY: u32 = 0x8888_8888;
pub const MAGIC: u32 = 0x8756_457F;

/// Fixed 24-byte frame header, six big-endian u32 words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub command: u32,
    pub magic: u32,
    /// Correlation id tying a reply to its request
    pub context_id: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub body_len: u32,
}

impl Header {
    pub fn new(command: u32, context_id: u32) -> Self {
        Self {
            command,
            magic: MAGIC,
            context_id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> u32 {
        self.context_id
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let words = [
            self.command,
            self.magic,
            self.context_id,
            self.reserved1,
            self.reserved2,
            self.body_len,
        ];
        for (chunk, word) in buf.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        let word = |i: usize| u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Self {
            command: word(0),
            magic: word(4),
            context_id: word(8),
            reserved1: word(12),
            reserved2: word(16),
            body_len: word(20),
        }
    }
}

/// A header plus an optional body. Pings carry no body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<B> {
    pub header: Header,
    pub body: Option<B>,
}

impl<B> Packet<B> {
    pub fn ping() -> Self {
        Self {
            header: Header::new(CMD_PING, 0),
            body: None,
        }
    }

    pub fn query(id: u32, body: B) -> Self {
        Self {
            header: Header::new(CMD_QUERY, id),
            body: Some(body),
        }
    }

    pub fn is_ping(&self) -> bool {
        self.header.command == CMD_PING
    }
}

/// Write half of a session's codec. Owns the encode and write buffers
/// and reuses them across packets.
#[derive(Debug, Default)]
pub struct PacketEncoder {
    encode_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl PacketEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the body first so the header can carry its length.
    pub fn encode<B: Serialize>(&mut self, packet: &Packet<B>) -> Result<&[u8], CodecError> {
        let mut header = packet.header;
        self.encode_buf.clear();
        self.write_buf.clear();

        match &packet.body {
            Some(body) => {
                rmp_serde::encode::write_named(&mut self.encode_buf, body)?;
                if self.encode_buf.len() > MAX_BODY_SIZE {
                    return Err(CodecError::TooLarge(self.encode_buf.len()));
                }
                header.body_len = self.encode_buf.len() as u32;
            }
            None => header.body_len = 0,
        }

        self.write_buf.extend_from_slice(&header.to_bytes());
        self.write_buf.extend_from_slice(&self.encode_buf);
        Ok(&self.write_buf)
    }

    pub async fn write<W, B>(&mut self, writer: &mut W, packet: &Packet<B>) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
        B: Serialize,
    {
        let frame = self.encode(packet)?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Read half of a session's codec.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    read_buf: Vec<u8>,
    strict_magic: bool,
}

impl PacketDecoder {
    /// With `strict_magic` set, frames carrying a foreign magic word are
    /// rejected instead of accepted as-is.
    pub fn new(strict_magic: bool) -> Self {
        Self {
            read_buf: Vec::new(),
            strict_magic,
        }
    }

    pub async fn decode<R, B>(&mut self, reader: &mut R) -> Result<Packet<B>, CodecError>
    where
        R: AsyncRead + Unpin,
        B: DeserializeOwned,
    {
        let mut header_buf = [0u8; HEADER_LEN];
        reader.read_exact(&mut header_buf).await?;
        let header = Header::from_bytes(&header_buf);

        if self.strict_magic && header.magic != MAGIC {
            return Err(CodecError::BadMagic(header.magic));
        }

        if header.body_len == 0 {
            return Ok(Packet { header, body: None });
        }

        let len = header.body_len as usize;
        if len > MAX_BODY_SIZE {
            return Err(CodecError::TooLarge(len));
        }

        self.read_buf.resize(len, 0);
        reader.read_exact(&mut self.read_buf).await?;

        let body = rmp_serde::from_slice(&self.read_buf)?;
        Ok(Packet {
            header,
            body: Some(body),
        })
    }
}
