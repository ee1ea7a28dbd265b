//! DHT22 via driver IIO `dht11` do kernel Linux.
//!
//! O overlay `dtoverlay=dht11,gpiopin=N` expõe o sensor (DHT11 e DHT22)
//! em `/sys/bus/iio/devices/iio:deviceX/`:
//! - `in_temp_input` – temperatura em m°C
//! - `in_humidityrelative_input` – umidade em m%RH
//!
//! O barramento de um fio falha com frequência (EIO/ETIMEDOUT): isso é
//! normal e vira leitura ausente. O próprio driver limita o tempo da
//! transação, então a leitura não trava o loop.

use super::{SensorError, SensorReader};
use mesh_core::{EnvironmentReading, Reading};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const IIO_ROOT: &str = "/sys/bus/iio/devices";
const TEMP_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

/// Faixa física do DHT22.
const TEMP_RANGE: (f32, f32) = (-40.0, 80.0);
const HUMIDITY_RANGE: (f32, f32) = (0.0, 100.0);

pub struct Dht22Reader {
    iio_root: PathBuf,
    /// GPIO para redescoberta; `None` quando o dispositivo foi configurado
    pin: Option<u8>,
    device: Option<PathBuf>,
}

impl Dht22Reader {
    /// Usa um diretório IIO explícito.
    pub fn with_device(device: PathBuf) -> Self {
        Self {
            iio_root: PathBuf::from(IIO_ROOT),
            pin: None,
            device: Some(device),
        }
    }

    /// Procura o sensor ligado em `pin`.
    pub fn discover(pin: u8) -> Self {
        Self::discover_in(PathBuf::from(IIO_ROOT), pin)
    }

    fn discover_in(iio_root: PathBuf, pin: u8) -> Self {
        let mut reader = Self {
            iio_root,
            pin: Some(pin),
            device: None,
        };
        if let Err(e) = reader.device() {
            warn!("{e}; nova tentativa a cada ciclo");
        }
        reader
    }

    /// Diretório do dispositivo, descobrindo-o se ainda não conhecido.
    fn device(&mut self) -> Result<PathBuf, SensorError> {
        if let Some(dir) = &self.device {
            return Ok(dir.clone());
        }
        let pin = self
            .pin
            .ok_or_else(|| SensorError::NoDevice(self.iio_root.clone()))?;
        let dir = find_device(&self.iio_root, pin)?;
        info!("✓ DHT22 encontrado em {}", dir.display());
        self.device = Some(dir.clone());
        Ok(dir)
    }

    /// Uma transação com o sensor.
    pub fn try_read(&mut self) -> Result<EnvironmentReading, SensorError> {
        let dir = self.device()?;

        let temperature = read_milli(&dir.join(TEMP_FILE))?;
        check_range("temperatura", temperature, TEMP_RANGE)?;

        let humidity = read_milli(&dir.join(HUMIDITY_FILE))?;
        check_range("umidade", humidity, HUMIDITY_RANGE)?;

        Ok(EnvironmentReading {
            temperature: Some(temperature),
            humidity: Some(humidity),
        })
    }
}

impl SensorReader for Dht22Reader {
    fn name(&self) -> &'static str {
        "dht22"
    }

    fn read(&mut self) -> Reading {
        let reading = self.try_read().unwrap_or_else(|e| {
            warn!("DHT22: {e}");
            EnvironmentReading::unavailable()
        });
        Reading::Environment(reading)
    }
}

/// Procura um dispositivo IIO `dht11*`/`dht22*`, preferindo o do `pin`.
pub fn find_device(root: &Path, pin: u8) -> Result<PathBuf, SensorError> {
    let entries = fs::read_dir(root).map_err(|source| SensorError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<(PathBuf, String)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let dir = entry.path();
            let name = fs::read_to_string(dir.join("name")).ok()?;
            let name = name.trim().to_lowercase();
            (name.contains("dht11") || name.contains("dht22")).then_some((dir, name))
        })
        .collect();
    candidates.sort();

    let at_pin = format!("@{pin}");
    let pin_prefix = format!("{pin:x}.");
    let preferred = candidates
        .iter()
        .find(|(_, name)| name.ends_with(&at_pin) || name.starts_with(&pin_prefix));

    match preferred.or_else(|| candidates.first()) {
        Some((dir, name)) => {
            debug!("DHT22 candidato: {} ({name})", dir.display());
            Ok(dir.clone())
        }
        None => Err(SensorError::NoDevice(root.to_path_buf())),
    }
}

fn read_milli(path: &Path) -> Result<f32, SensorError> {
    let raw = fs::read_to_string(path).map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    raw.trim()
        .parse::<i32>()
        .map(|v| v as f32 / 1000.0)
        .map_err(|_| SensorError::Parse {
            path: path.to_path_buf(),
            value: raw.trim().to_string(),
        })
}

fn check_range(what: &'static str, value: f32, (min, max): (f32, f32)) -> Result<(), SensorError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SensorError::OutOfRange { what, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn iio_device(root: &Path, idx: u32, name: &str) -> PathBuf {
        let dir = root.join(format!("iio:device{idx}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{name}\n")).unwrap();
        dir
    }

    fn set_values(dir: &Path, temp: &str, hum: &str) {
        fs::write(dir.join(TEMP_FILE), temp).unwrap();
        fs::write(dir.join(HUMIDITY_FILE), hum).unwrap();
    }

    #[test]
    fn reads_temperature_and_humidity() {
        let root = TempDir::new().unwrap();
        let dev = iio_device(root.path(), 0, "dht11@4");
        set_values(&dev, "22500\n", "41300\n");

        let mut reader = Dht22Reader::discover_in(root.path().to_path_buf(), 4);
        let reading = reader.try_read().unwrap();
        assert_eq!(reading.temperature, Some(22.5));
        assert_eq!(reading.humidity, Some(41.3));
    }

    #[test]
    fn prefers_device_on_configured_pin() {
        let root = TempDir::new().unwrap();
        iio_device(root.path(), 0, "ads1015");
        iio_device(root.path(), 1, "dht11@17");
        let wanted = iio_device(root.path(), 2, "dht11@4");

        assert_eq!(find_device(root.path(), 4).unwrap(), wanted);
    }

    #[test]
    fn falls_back_to_any_dht_device() {
        let root = TempDir::new().unwrap();
        let only = iio_device(root.path(), 3, "dht11@0");
        assert_eq!(find_device(root.path(), 4).unwrap(), only);
    }

    #[test]
    fn no_device_is_absent_reading() {
        let root = TempDir::new().unwrap();
        iio_device(root.path(), 0, "ads1015");

        let mut reader = Dht22Reader::discover_in(root.path().to_path_buf(), 4);
        assert!(matches!(reader.try_read(), Err(SensorError::NoDevice(_))));
        assert_eq!(
            reader.read(),
            Reading::Environment(EnvironmentReading::unavailable())
        );
    }

    #[test]
    fn late_device_is_found_on_next_read() {
        let root = TempDir::new().unwrap();
        let mut reader = Dht22Reader::discover_in(root.path().to_path_buf(), 4);
        assert!(reader.try_read().is_err());

        let dev = iio_device(root.path(), 0, "dht11@4");
        set_values(&dev, "-5000", "90000");
        let reading = reader.try_read().unwrap();
        assert_eq!(reading.temperature, Some(-5.0));
        assert_eq!(reading.humidity, Some(90.0));
    }

    #[test]
    fn transient_failure_yields_both_fields_absent() {
        let root = TempDir::new().unwrap();
        let dev = iio_device(root.path(), 0, "dht11@4");
        // Umidade faltando simula EIO no meio da transação
        fs::write(dev.join(TEMP_FILE), "21000").unwrap();

        let mut reader = Dht22Reader::with_device(dev);
        assert_eq!(
            reader.read(),
            Reading::Environment(EnvironmentReading {
                temperature: None,
                humidity: None
            })
        );
    }

    #[test]
    fn garbage_and_impossible_values_rejected() {
        let root = TempDir::new().unwrap();
        let dev = iio_device(root.path(), 0, "dht11@4");
        let mut reader = Dht22Reader::with_device(dev.clone());

        set_values(&dev, "abc", "40000");
        assert!(matches!(reader.try_read(), Err(SensorError::Parse { .. })));

        set_values(&dev, "150000", "40000");
        assert!(matches!(
            reader.try_read(),
            Err(SensorError::OutOfRange { what: "temperatura", .. })
        ));

        set_values(&dev, "20000", "140000");
        assert!(matches!(
            reader.try_read(),
            Err(SensorError::OutOfRange { what: "umidade", .. })
        ));
    }
}
