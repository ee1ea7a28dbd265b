//! Protocolo de stream do rádio pela serial.
//!
//! Cada mensagem protobuf (`ToRadio` / `FromRadio`) vai num frame:
//!
//! ```text
//! ┌─────────┬─────────┬────────────┬─────────────────┐
//! │ 0x94(1) │ 0xC3(1) │ Len BE (2) │ Protobuf (Len)  │
//! └─────────┴─────────┴────────────┴─────────────────┘
//! ```
//!
//! Bytes fora de frame são texto de debug do firmware e são descartados.
//! As mensagens vêm de `meshtastic::protobufs`; aqui fica só o framing.

use meshtastic::protobufs::ToRadio;
use meshtastic::Message;
use tracing::{debug, trace};

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
const HEADER_SIZE: usize = 4;

/// Maior payload de frame aceito pelo firmware.
pub const MAX_FRAME_PAYLOAD: usize = 512;

// ──────────────────────────────────────────────
// Framing
// ──────────────────────────────────────────────

/// Erros de framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Payload muito grande ({0} bytes, máximo {MAX_FRAME_PAYLOAD})")]
    TooLarge(usize),
}

/// Codifica uma mensagem `ToRadio` em um frame pronto para a serial.
pub fn encode_frame(msg: &ToRadio) -> Result<Vec<u8>, FrameError> {
    let body = msg.encode_to_vec();
    if body.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.push(START1);
    frame.push(START2);
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Remonta frames a partir de pedaços arbitrários do stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Próximo payload completo, se houver.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            // Descarta tudo antes de um possível início de frame
            match self.buf.iter().position(|&b| b == START1) {
                Some(0) => {}
                Some(pos) => {
                    trace!("Descartando {pos} bytes fora de frame");
                    self.buf.drain(..pos);
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }

            if self.buf.len() < 2 {
                return None;
            }
            if self.buf[1] != START2 {
                self.buf.drain(..1);
                continue;
            }
            if self.buf.len() < HEADER_SIZE {
                return None;
            }

            let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if len > MAX_FRAME_PAYLOAD {
                debug!("Tamanho de frame inválido ({len}), ressincronizando");
                self.buf.drain(..1);
                continue;
            }
            if self.buf.len() < HEADER_SIZE + len {
                return None;
            }

            let frame: Vec<u8> = self.buf[HEADER_SIZE..HEADER_SIZE + len].to_vec();
            self.buf.drain(..HEADER_SIZE + len);
            return Some(frame);
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

/// Frame `FromRadio`, como o firmware enviaria.
#[cfg(test)]
pub(crate) fn from_radio_frame(msg: &meshtastic::protobufs::FromRadio) -> Vec<u8> {
    let body = msg.encode_to_vec();
    let mut frame = vec![START1, START2];
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}
