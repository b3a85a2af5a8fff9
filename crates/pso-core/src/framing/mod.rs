//! The framed, encrypted duplex channel every connection speaks over.
//!
//! A [`Channel`] wraps an async byte stream and turns it into a sequence of
//! `(opcode, flag, payload)` frames. Framing and encryption are
//! interleaved: the header is decrypted first (to learn the declared
//! size), then the remainder of the frame is decrypted once its length is
//! known.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cipher::PsoCipher;
use crate::error::{CoreError, Result};
use crate::family::{ClientFamily, HeaderKind};

const MAX_FRAME_SIZE: usize = 65535;

fn round_up(value: usize, block: usize) -> usize {
    let rem = value % block;
    if rem == 0 {
        value
    } else {
        value + (block - rem)
    }
}

pub(crate) fn encode_header(kind: HeaderKind, opcode: u16, flag: u32, size: u16) -> Vec<u8> {
    match kind {
        HeaderKind::Pc => {
            let mut buf = Vec::with_capacity(4);
            buf.extend_from_slice(&size.to_le_bytes());
            buf.push(opcode as u8);
            buf.push(flag as u8);
            buf
        }
        HeaderKind::DcGcXb => {
            let mut buf = Vec::with_capacity(4);
            buf.push(opcode as u8);
            buf.push(flag as u8);
            buf.extend_from_slice(&size.to_le_bytes());
            buf
        }
        HeaderKind::Bb => {
            let mut buf = Vec::with_capacity(8);
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&opcode.to_le_bytes());
            buf.extend_from_slice(&flag.to_le_bytes());
            buf
        }
    }
}

pub(crate) fn decode_header(kind: HeaderKind, bytes: &[u8]) -> (u16, u32, u16) {
    match kind {
        HeaderKind::Pc => {
            let size = u16::from_le_bytes([bytes[0], bytes[1]]);
            (bytes[2] as u16, bytes[3] as u32, size)
        }
        HeaderKind::DcGcXb => {
            let size = u16::from_le_bytes([bytes[2], bytes[3]]);
            (bytes[0] as u16, bytes[1] as u32, size)
        }
        HeaderKind::Bb => {
            let size = u16::from_le_bytes([bytes[0], bytes[1]]);
            let opcode = u16::from_le_bytes([bytes[2], bytes[3]]);
            let flag = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            (opcode, flag, size)
        }
    }
}

/// The per-connection framed, encrypted duplex transport.
///
/// The same type serves the client and server sides of a connection; only
/// which cipher slot is "inbound" vs "outbound" differs.
pub struct Channel<S> {
    stream: S,
    family: ClientFamily,
    recv_cipher: Option<Box<dyn PsoCipher + Send>>,
    send_cipher: Option<Box<dyn PsoCipher + Send>>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, family: ClientFamily) -> Self {
        Self {
            stream,
            family,
            recv_cipher: None,
            send_cipher: None,
        }
    }

    pub fn family(&self) -> ClientFamily {
        self.family
    }

    pub fn is_encrypted(&self) -> bool {
        self.recv_cipher.is_some() || self.send_cipher.is_some()
    }

    /// Installs both cipher slots, ending the "clear" phase. Called by the
    /// dispatcher once it recognises a server-init command.
    pub fn install_ciphers(
        &mut self,
        recv: Box<dyn PsoCipher + Send>,
        send: Box<dyn PsoCipher + Send>,
    ) {
        self.recv_cipher = Some(recv);
        self.send_cipher = Some(send);
    }

    /// Reads one complete frame, decrypting header and body as needed.
    pub async fn recv(&mut self) -> Result<(u16, u32, Vec<u8>)> {
        let kind = self.family.header_kind();
        let header_size = kind.header_size();
        let block_size = kind.block_size();

        let mut header = vec![0u8; header_size];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| CoreError::transient(format!("connection closed reading header: {e}")))?;

        if let Some(cipher) = self.recv_cipher.as_mut() {
            cipher.decrypt(&mut header)?;
        }

        let (opcode, flag, size) = decode_header(kind, &header);
        let size = size as usize;

        if size < header_size {
            return Err(CoreError::framed("size-too-small"));
        }
        if size > MAX_FRAME_SIZE {
            return Err(CoreError::framed("size-too-large"));
        }

        let body_len = size - header_size;
        let padded_total = round_up(size, block_size);
        let padded_body_len = padded_total - header_size;

        let mut body = vec![0u8; padded_body_len];
        self.stream
            .read_exact(&mut body)
            .await
            .map_err(|e| CoreError::transient(format!("connection closed reading body: {e}")))?;

        if let Some(cipher) = self.recv_cipher.as_mut() {
            cipher.decrypt(&mut body)?;
        }

        body.truncate(body_len);
        Ok((opcode, flag, body))
    }

    /// Writes one complete frame, padding the body to the cipher's block
    /// size with zero bytes and encrypting header+body+padding together.
    pub async fn send(&mut self, opcode: u16, flag: u32, payload: &[u8]) -> Result<()> {
        let kind = self.family.header_kind();
        let header_size = kind.header_size();
        let block_size = kind.block_size();

        let size = header_size + payload.len();
        if size > MAX_FRAME_SIZE {
            return Err(CoreError::framed("size-too-large"));
        }
        let padded_total = round_up(size, block_size);

        let mut frame = encode_header(kind, opcode, flag, size as u16);
        frame.extend_from_slice(payload);
        frame.resize(padded_total, 0);

        if let Some(cipher) = self.send_cipher.as_mut() {
            cipher.encrypt(&mut frame)?;
        }

        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| CoreError::transient(format!("write failed: {e}")))?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| CoreError::transient(format!("shutdown failed: {e}")))
    }
}

/// A passive listener variant of [`Channel`]: it only ever receives, never
/// enqueues replies of its own. Useful for packet capture/analysis
/// tooling built on top of this core.
pub struct CatSession<S> {
    channel: Channel<S>,
}

impl<S> CatSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(channel: Channel<S>) -> Self {
        Self { channel }
    }

    pub async fn recv(&mut self) -> Result<(u16, u32, Vec<u8>)> {
        self.channel.recv().await
    }

    pub fn channel_mut(&mut self) -> &mut Channel<S> {
        &mut self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::V2Cipher;

    #[tokio::test]
    async fn scenario_c_pc_family_empty_payload() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client_ch = Channel::new(client, ClientFamily::PcV2);
        let mut server_ch = Channel::new(server, ClientFamily::PcV2);

        client_ch.send(0x03, 0, &[]).await.unwrap();
        let (opcode, flag, payload) = server_ch.recv().await.unwrap();
        assert_eq!(opcode, 0x03);
        assert_eq!(flag, 0);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn roundtrips_with_ciphers_installed() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client_ch = Channel::new(client, ClientFamily::DcV2);
        let mut server_ch = Channel::new(server, ClientFamily::DcV2);

        client_ch.install_ciphers(
            Box::new(V2Cipher::new(0x1234)),
            Box::new(V2Cipher::new(0x5678)),
        );
        server_ch.install_ciphers(
            Box::new(V2Cipher::new(0x5678)),
            Box::new(V2Cipher::new(0x1234)),
        );

        client_ch.send(0x60, 0, b"hello world").await.unwrap();
        let (opcode, _flag, payload) = server_ch.recv().await.unwrap();
        assert_eq!(opcode, 0x60);
        assert_eq!(payload, b"hello world");
    }

    #[tokio::test]
    async fn rejects_size_too_small() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client_ch = Channel::new(client, ClientFamily::PcV2);
        let mut server_ch = Channel::new(server, ClientFamily::PcV2);

        // size field (0x0001) is below the 4-byte header size.
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut c = client_ch;
            c.stream.write_all(&[1, 0, 0x03, 0]).await.unwrap();
        });

        let result = server_ch.recv().await;
        assert!(result.is_err());
    }
}
