//! Transporte por comandos AT crus pela serial.
//!
//! Formato: `AT+SENDTEXT=<destino>,<texto>\r\n`. A resposta do rádio é
//! lida por um curto intervalo; qualquer `ERROR` nela recusa o envio.

use super::link::{PortOpener, SerialLink};
use super::{MeshTransport, ProbeInfo, TransportError};
use async_trait::async_trait;
use mesh_core::{Target, MAX_TEXT_PAYLOAD};
use std::time::Duration;
use tracing::debug;

/// Espera pela resposta do comando.
const RESPONSE_WAIT: Duration = Duration::from_millis(500);

pub struct AtCommandTransport {
    link: SerialLink,
    response_wait: Duration,
}

impl AtCommandTransport {
    pub fn new(opener: Box<dyn PortOpener>) -> Self {
        Self {
            link: SerialLink::new(opener),
            response_wait: RESPONSE_WAIT,
        }
    }
}

/// Monta a linha de comando. Quebras de linha no texto encerrariam o
/// comando antes da hora e viram espaço.
pub fn build_command(target: Target, text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("AT+SENDTEXT={target},{text}\r\n")
}

#[async_trait(?Send)]
impl MeshTransport for AtCommandTransport {
    fn name(&self) -> &'static str {
        "at_command"
    }

    async fn send(&mut self, target: Target, text: &str) -> Result<(), TransportError> {
        if text.len() > MAX_TEXT_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: text.len(),
                max: MAX_TEXT_PAYLOAD,
            });
        }

        self.link.connect()?;
        // Descarta eco/lixo de comandos anteriores
        self.link.read_available()?;

        let cmd = build_command(target, text);
        self.link.write_all(cmd.as_bytes())?;

        if !self.response_wait.is_zero() {
            tokio::time::sleep(self.response_wait).await;
        }
        let reply = String::from_utf8_lossy(&self.link.read_available()?).into_owned();
        let reply = reply.trim();
        debug!("Resposta AT: {reply:?}");

        if reply.contains("ERROR") {
            return Err(TransportError::Rejected(reply.to_string()));
        }
        Ok(())
    }

    async fn probe(&mut self, _timeout: Duration) -> Result<ProbeInfo, TransportError> {
        self.link.connect()?;
        Ok(ProbeInfo {
            device: self.link.device().map(String::from),
            ..Default::default()
        })
    }

    fn close(&mut self) {
        self.link.close();
    }
}
