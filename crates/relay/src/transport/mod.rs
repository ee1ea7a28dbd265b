//! Transportes para a mesh – uma interface, três implementações.
//!
//! - [`serial_api`] – protocolo protobuf de stream pela serial
//! - [`at_command`] – `AT+SENDTEXT` cru pela serial
//! - [`cli`] – ferramenta externa (`meshtastic --sendtext`)
//!
//! A variante é escolhida uma única vez a partir da config. Nenhum
//! transporte reenvia dentro do mesmo ciclo: o próximo ciclo é o retry.

pub mod at_command;
pub mod cli;
pub mod link;
pub mod proto;
pub mod serial_api;

use async_trait::async_trait;
use link::SystemPortOpener;
use mesh_core::config::{RelayConfig, TransportKind};
use mesh_core::Target;
use serial_api::{RadioLink, SharedRadio};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Erros de transporte. Recuperáveis: o ciclo é pulado e o próximo tenta de novo.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("nenhum dispositivo serial encontrado")]
    DeviceNotFound,

    #[error("falha ao abrir {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: serialport::Error,
    },

    #[error("rádio não conectado")]
    NotConnected,

    #[error("erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("tempo limite esgotado")]
    Timeout,

    #[error("mensagem muito grande ({len} bytes, máximo {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("rádio recusou o comando: {0}")]
    Rejected(String),

    #[error("falha ao executar {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("comando terminou com {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("erro de framing: {0}")]
    Frame(#[from] proto::FrameError),
}

/// Informações obtidas ao testar a conexão.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub device: Option<String>,
    pub node_num: Option<u32>,
    pub battery: Option<u8>,
}

/// Capacidade "enviar um texto curto a um destino".
///
/// Tudo roda na mesma thread (o rádio é `Rc<RefCell<_>>`), então os
/// futuros não são `Send`.
#[async_trait(?Send)]
pub trait MeshTransport {
    fn name(&self) -> &'static str;

    /// Transmite `text` para `target` ou falha com [`TransportError`].
    async fn send(&mut self, target: Target, text: &str) -> Result<(), TransportError>;

    /// Conecta e coleta o que o rádio reportar em até `timeout`.
    async fn probe(&mut self, timeout: Duration) -> Result<ProbeInfo, TransportError>;

    /// Libera o dispositivo (shutdown).
    fn close(&mut self) {}
}

/// Transporte construído a partir da config.
pub struct TransportSetup {
    pub transport: Box<dyn MeshTransport>,
    /// Link do rádio compartilhado com o leitor de bateria (apenas `serial_api`)
    pub radio: Option<SharedRadio>,
}

/// Tempo para placas ESP32 inicializarem após abrir a serial.
const SERIAL_API_SETTLE: Duration = Duration::from_millis(150);
const AT_SETTLE: Duration = Duration::from_secs(2);

/// Constrói a variante configurada. Nada é aberto aqui.
pub fn build(config: &RelayConfig) -> TransportSetup {
    let timeout = config.io_timeout();

    match config.transport {
        TransportKind::SerialApi => {
            let opener = SystemPortOpener::new(
                config.serial_port.clone(),
                config.baud_rate,
                timeout,
                SERIAL_API_SETTLE,
            );
            let radio: SharedRadio = Rc::new(RefCell::new(RadioLink::new(
                Box::new(opener),
                config.channel_index,
            )));
            TransportSetup {
                transport: Box::new(serial_api::SerialApiTransport::new(radio.clone())),
                radio: Some(radio),
            }
        }
        TransportKind::AtCommand => {
            let opener = SystemPortOpener::new(
                config.serial_port.clone(),
                config.baud_rate,
                timeout,
                AT_SETTLE,
            );
            TransportSetup {
                transport: Box::new(at_command::AtCommandTransport::new(Box::new(opener))),
                radio: None,
            }
        }
        TransportKind::Cli => TransportSetup {
            transport: Box::new(cli::CliTransport::new(
                config.cli_program.clone(),
                config.serial_port.clone(),
                timeout,
            )),
            radio: None,
        },
    }
}
