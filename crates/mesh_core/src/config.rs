//! Configuração unificada via JSON.
//!
//! Um único `config.json` descreve destino, intervalo, sensores e o
//! transporte usado para falar com o rádio. Campos ausentes assumem o
//! padrão; campos desconhecidos são ignorados.

use crate::message::{MessageFormat, MAX_TEXT_PAYLOAD, MIN_MESSAGE_BYTES};
use crate::target::{Target, TargetError};
use crate::types::TemperatureUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros de carga da configuração. Todos são fatais na inicialização.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("arquivo de configuração não encontrado: {0}")]
    NotFound(PathBuf),

    #[error("erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON inválido: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuração inválida: {0}")]
    Invalid(String),
}

/// Variante de transporte usada para enviar o texto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Protocolo protobuf de stream do rádio pela serial
    #[default]
    SerialApi,
    /// Comandos `AT+SENDTEXT` crus pela serial
    AtCommand,
    /// Ferramenta de linha de comando externa
    Cli,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportKind::SerialApi => "serial_api",
            TransportKind::AtCommand => "at_command",
            TransportKind::Cli => "cli",
        })
    }
}

/// Configuração do relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Destino numérico (4294967295 = broadcast)
    pub target_node_num: Option<u32>,
    /// Destino como `!xxxxxxxx` (`!ffffffff` = broadcast)
    pub target_node_id: Option<String>,
    /// Intervalo entre envios (segundos)
    pub send_interval_seconds: u64,
    /// Lê a bateria do próprio rádio (apenas `serial_api`)
    pub battery_enabled: bool,
    /// Lê temperatura/umidade do DHT22
    pub dht22_enabled: bool,
    /// GPIO onde o DHT22 está ligado
    pub dht22_gpio_pin: u8,
    /// Diretório IIO do sensor (vazio = descoberta automática)
    pub dht22_iio_device: Option<PathBuf>,
    pub temperature_unit: TemperatureUnit,
    pub transport: TransportKind,
    /// Caminho do dispositivo serial (vazio = descoberta automática)
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    /// Canal da mesh usado pelo `serial_api`
    pub channel_index: u32,
    /// Programa usado pelo transporte `cli`
    pub cli_program: String,
    /// Limite de tempo de cada chamada de sensor/transporte (segundos)
    pub io_timeout_seconds: u64,
    /// Tamanho máximo do texto (bytes UTF-8)
    pub max_message_bytes: usize,
    pub message_separator: String,
    /// Texto enviado quando nenhum sensor está habilitado
    pub idle_message: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_node_num: None,
            target_node_id: None,
            send_interval_seconds: 60,
            battery_enabled: true,
            dht22_enabled: false,
            dht22_gpio_pin: 4,
            dht22_iio_device: None,
            temperature_unit: TemperatureUnit::Celsius,
            transport: TransportKind::SerialApi,
            serial_port: None,
            baud_rate: 115_200,
            channel_index: 0,
            cli_program: "meshtastic".into(),
            io_timeout_seconds: 5,
            max_message_bytes: 200,
            message_separator: " | ".into(),
            idle_message: "Station Online".into(),
        }
    }
}

impl RelayConfig {
    /// Carrega e valida a configuração de um arquivo JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let config = Self::from_json_str(&content)?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// Faz o parse de um documento JSON e valida o resultado.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = serde_json::from_str(content)?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors.join("; ")));
        }

        if config.target_node_num.is_some() && config.target_node_id.is_some() {
            warn!("target_node_num e target_node_id definidos; usando target_node_num");
        }

        Ok(config)
    }

    /// Retorna o caminho padrão do config.json (ao lado do executável).
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.json")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.send_interval_seconds == 0 {
            errors.push("send_interval_seconds deve ser positivo".into());
        }
        if self.io_timeout_seconds == 0 {
            errors.push("io_timeout_seconds deve ser positivo".into());
        }
        if !(MIN_MESSAGE_BYTES..=MAX_TEXT_PAYLOAD).contains(&self.max_message_bytes) {
            errors.push(format!(
                "max_message_bytes inválido: {} ({MIN_MESSAGE_BYTES}–{MAX_TEXT_PAYLOAD})",
                self.max_message_bytes
            ));
        }
        if self.baud_rate == 0 {
            errors.push("baud_rate não pode ser 0".into());
        }
        if self.transport == TransportKind::Cli && self.cli_program.trim().is_empty() {
            errors.push("cli_program vazio com transport = cli".into());
        }
        if let Err(e) = self.target() {
            errors.push(format!("destino inválido: {e}"));
        }

        errors
    }

    /// Resolve o destino. `target_node_num` tem precedência; sem nenhum
    /// dos dois campos o destino é broadcast.
    pub fn target(&self) -> Result<Target, TargetError> {
        match (self.target_node_num, self.target_node_id.as_deref()) {
            (Some(num), _) => Target::from_num(num),
            (None, Some(id)) => id.parse(),
            (None, None) => Ok(Target::Broadcast),
        }
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_seconds)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_seconds)
    }

    /// Parâmetros de formatação da mensagem.
    pub fn message_format(&self) -> MessageFormat {
        MessageFormat {
            separator: self.message_separator.clone(),
            temperature_unit: self.temperature_unit,
            max_bytes: self.max_message_bytes,
            idle_text: self.idle_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
        assert_eq!(config.target().unwrap(), Target::Broadcast);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = RelayConfig::from_json_str("{}").unwrap();
        assert_eq!(config.send_interval_seconds, 60);
        assert_eq!(config.dht22_gpio_pin, 4);
        assert_eq!(config.transport, TransportKind::SerialApi);
        assert!(config.battery_enabled);
        assert!(!config.dht22_enabled);
    }

    #[test]
    fn accepts_numeric_target() {
        let config =
            RelayConfig::from_json_str(r#"{"target_node_num": 2658499212}"#).unwrap();
        assert_eq!(config.target().unwrap(), Target::Node(2_658_499_212));
    }

    #[test]
    fn accepts_string_target() {
        let config = RelayConfig::from_json_str(
            r#"{"target_node_id": "!a1b2c3d4", "send_interval_seconds": 30, "dht22_enabled": true}"#,
        )
        .unwrap();
        assert_eq!(config.target().unwrap(), Target::Node(0xa1b2_c3d4));
        assert_eq!(config.send_interval(), Duration::from_secs(30));
        assert!(config.dht22_enabled);
    }

    #[test]
    fn numeric_target_wins_over_string() {
        let config = RelayConfig::from_json_str(
            r#"{"target_node_num": 42, "target_node_id": "!ffffffff"}"#,
        )
        .unwrap();
        assert_eq!(config.target().unwrap(), Target::Node(42));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = RelayConfig::from_json_str(
            r#"{"auto_start_timeout_seconds": 10, "future_option": {"x": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.send_interval_seconds, 60);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = RelayConfig::from_json_str(r#"{"target_node_num": "abc"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = RelayConfig::from_json_str(r#"{"send_interval_seconds": -5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = RelayConfig::from_json_str(r#"{"dht22_enabled": "yes"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let err = RelayConfig::from_json_str(r#"{"send_interval_seconds": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_target_id_is_invalid() {
        let err = RelayConfig::from_json_str(r#"{"target_node_id": "node-7"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_message_limit_is_invalid() {
        let err = RelayConfig::from_json_str(r#"{"max_message_bytes": 4096}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn message_limit_must_fit_one_field() {
        let err = RelayConfig::from_json_str(r#"{"max_message_bytes": 8}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let config = RelayConfig::from_json_str(r#"{"max_message_bytes": 16}"#).unwrap();
        assert_eq!(config.message_format().max_bytes, 16);
    }

    #[test]
    fn transport_kind_names() {
        let config = RelayConfig::from_json_str(r#"{"transport": "at_command"}"#).unwrap();
        assert_eq!(config.transport, TransportKind::AtCommand);
        assert_eq!(config.transport.to_string(), "at_command");
        assert!(RelayConfig::from_json_str(r#"{"transport": "carrier_pigeon"}"#).is_err());
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"target_node_id": "!ffffffff", "send_interval_seconds": 15, "temperature_unit": "fahrenheit"}}"#
        )
        .unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.target().unwrap(), Target::Broadcast);
        assert_eq!(config.send_interval_seconds, 15);
        assert_eq!(config.message_format().temperature_unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn load_unparsable_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            RelayConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
