//! # Mesh Core
//!
//! Crate compartilhada que define a configuração JSON, o endereçamento de
//! nós da mesh, as leituras de sensores e a formatação da mensagem de
//! status enviada pelo rádio.
//!
//! ## Módulos
//! - [`types`] – Leituras de bateria e ambiente (valores opcionais)
//! - [`target`] – Destino da mensagem (nó específico ou broadcast)
//! - [`message`] – Montagem/parse do texto e limites de payload
//! - [`config`] – Configuração unificada via JSON

pub mod types;
pub mod target;
pub mod message;
pub mod config;

// Re-exports convenientes
pub use config::{ConfigError, RelayConfig, TransportKind};
pub use message::{MessageFormat, MAX_TEXT_PAYLOAD};
pub use target::Target;
pub use types::{BatteryReading, EnvironmentReading, Reading, TemperatureUnit};
