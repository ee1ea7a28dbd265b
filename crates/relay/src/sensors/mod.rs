//! Leitores de sensores.
//!
//! Cada leitor produz uma [`Reading`] por ciclo e nunca falha: erros de
//! leitura viram campos ausentes (renderizados como `N/A`) e são apenas
//! logados. O loop continua vivo mesmo com o sensor instável.

pub mod battery;
pub mod dht22;

use crate::transport::serial_api::SharedRadio;
use mesh_core::{RelayConfig, Reading};
use std::path::PathBuf;
use tracing::{info, warn};

/// Erros de sensor. Nunca saem do leitor: viram leitura ausente.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("nenhum dispositivo IIO do DHT22 encontrado em {0}")]
    NoDevice(PathBuf),

    #[error("erro ao ler {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("valor inválido em {path}: {value:?}")]
    Parse { path: PathBuf, value: String },

    #[error("{what} fora da faixa física: {value}")]
    OutOfRange { what: &'static str, value: f32 },
}

/// Capacidade "produzir uma leitura".
pub trait SensorReader {
    fn name(&self) -> &'static str;

    fn read(&mut self) -> Reading;
}

/// Constrói os leitores habilitados, na ordem em que aparecem na mensagem.
pub fn build(config: &RelayConfig, radio: Option<SharedRadio>) -> Vec<Box<dyn SensorReader>> {
    let mut readers: Vec<Box<dyn SensorReader>> = Vec::new();

    if config.battery_enabled {
        match radio {
            Some(radio) => {
                readers.push(Box::new(battery::BatteryReader::new(radio)));
                info!("✓ Bateria: lida do próprio rádio");
            }
            None => warn!(
                "Leitura de bateria requer transport serial_api (atual: {}); desabilitada",
                config.transport
            ),
        }
    }

    if config.dht22_enabled {
        let reader = match &config.dht22_iio_device {
            Some(dir) => dht22::Dht22Reader::with_device(dir.clone()),
            None => dht22::Dht22Reader::discover(config.dht22_gpio_pin),
        };
        info!("✓ DHT22 em {}", dht22_source(config));
        readers.push(Box::new(reader));
    }

    readers
}

/// De onde o DHT22 é lido: device IIO explícito ou descoberta pelo pino.
fn dht22_source(config: &RelayConfig) -> String {
    match &config.dht22_iio_device {
        Some(dir) => dir.display().to_string(),
        None => format!("GPIO{}", config.dht22_gpio_pin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::TransportKind;

    #[test]
    fn battery_needs_radio_link() {
        let config = RelayConfig {
            transport: TransportKind::Cli,
            battery_enabled: true,
            ..Default::default()
        };
        assert!(build(&config, None).is_empty());
    }

    #[test]
    fn explicit_device_overrides_pin_in_log() {
        let mut config = RelayConfig {
            dht22_gpio_pin: 17,
            ..Default::default()
        };
        assert_eq!(dht22_source(&config), "GPIO17");

        config.dht22_iio_device = Some(PathBuf::from("/sys/bus/iio/devices/iio:device1"));
        assert_eq!(dht22_source(&config), "/sys/bus/iio/devices/iio:device1");
    }

    #[test]
    fn readers_in_message_order() {
        let config = RelayConfig {
            battery_enabled: true,
            dht22_enabled: true,
            dht22_iio_device: Some(PathBuf::from("/nonexistent/iio:device0")),
            ..Default::default()
        };
        let setup = crate::transport::build(&config);
        let readers = build(&config, setup.radio);
        let names: Vec<_> = readers.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["battery", "dht22"]);
    }
}
