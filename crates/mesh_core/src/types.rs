//! Leituras produzidas pelos sensores a cada ciclo.
//!
//! Todo campo é `Option`: ausência significa "sensor indisponível neste
//! ciclo" e é renderizada como `N/A`, nunca como um valor numérico padrão.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Bateria
// ──────────────────────────────────────────────

/// Estado de carga reportado pelo próprio rádio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryReading {
    /// Carga (0–100%)
    pub percent: Option<u8>,
}

impl BatteryReading {
    /// Normaliza o valor bruto do firmware (101 = alimentação externa).
    pub fn from_raw(level: u32) -> Self {
        Self {
            percent: Some(level.min(100) as u8),
        }
    }
}

// ──────────────────────────────────────────────
// Ambiente (DHT22)
// ──────────────────────────────────────────────

/// Temperatura e umidade do sensor cabeado.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentReading {
    /// Temperatura (°C)
    pub temperature: Option<f32>,
    /// Umidade relativa (%)
    pub humidity: Option<f32>,
}

impl EnvironmentReading {
    /// Leitura com ambos os campos ausentes (falha transitória).
    pub fn unavailable() -> Self {
        Self::default()
    }
}

// ──────────────────────────────────────────────
// Leitura genérica
// ──────────────────────────────────────────────

/// Uma leitura de qualquer tipo de sensor, na ordem dos readers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Battery(BatteryReading),
    Environment(EnvironmentReading),
}

/// Unidade usada para exibir a temperatura.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Converte um valor em °C para esta unidade.
    pub fn convert(self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}
