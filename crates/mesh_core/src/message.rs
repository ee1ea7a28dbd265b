//! Montagem do texto de status enviado pela mesh.
//!
//! Formato (ordem dos campos = ordem dos readers):
//!
//! ```text
//! Bat: 87% | Temp: 22.5°C | Hum: 41.0%
//! ```
//!
//! - Valor ausente vira o marcador literal `N/A`
//! - Nenhuma leitura configurada → `idle_text`
//! - Campos que não cabem em `max_bytes` são descartados inteiros, do
//!   fim para o começo; um valor nunca é cortado no meio

use crate::types::{BatteryReading, EnvironmentReading, Reading, TemperatureUnit};
use tracing::warn;

/// Marcador para valor indisponível.
pub const NOT_AVAILABLE: &str = "N/A";

/// Maior texto que o firmware aceita num pacote TEXT_MESSAGE_APP.
pub const MAX_TEXT_PAYLOAD: usize = 228;

/// Menor limite que comporta qualquer campo (`Temp: 176.0°F` = 14 bytes).
pub const MIN_MESSAGE_BYTES: usize = 16;

/// Parâmetros de formatação (derivados da config).
#[derive(Debug, Clone)]
pub struct MessageFormat {
    pub separator: String,
    pub temperature_unit: TemperatureUnit,
    pub max_bytes: usize,
    pub idle_text: String,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            separator: " | ".into(),
            temperature_unit: TemperatureUnit::Celsius,
            max_bytes: 200,
            idle_text: "Station Online".into(),
        }
    }
}

impl MessageFormat {
    /// Monta o texto final a partir das leituras do ciclo.
    pub fn render(&self, readings: &[Reading]) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(readings.len() * 2);

        for reading in readings {
            match reading {
                Reading::Battery(b) => parts.push(self.battery_field(b)),
                Reading::Environment(e) => {
                    let (temp, hum) = self.environment_fields(e);
                    parts.push(temp);
                    parts.push(hum);
                }
            }
        }

        let limit = self.max_bytes.min(MAX_TEXT_PAYLOAD);
        if parts.is_empty() {
            return truncate_to_bytes(&self.idle_text, limit).to_string();
        }

        let mut text = String::new();
        for (kept, part) in parts.iter().enumerate() {
            let extra = if text.is_empty() {
                part.len()
            } else {
                self.separator.len() + part.len()
            };
            if text.len() + extra > limit {
                warn!(
                    "Mensagem excede {limit} bytes; {} campo(s) descartado(s)",
                    parts.len() - kept
                );
                break;
            }
            if !text.is_empty() {
                text.push_str(&self.separator);
            }
            text.push_str(part);
        }
        text
    }

    fn battery_field(&self, b: &BatteryReading) -> String {
        match b.percent {
            Some(p) => format!("Bat: {p}%"),
            None => format!("Bat: {NOT_AVAILABLE}"),
        }
    }

    fn environment_fields(&self, e: &EnvironmentReading) -> (String, String) {
        let unit = self.temperature_unit;
        let temp = match e.temperature.filter(|t| t.is_finite()) {
            Some(t) => format!("Temp: {:.1}{}", unit.convert(t), unit.symbol()),
            None => format!("Temp: {NOT_AVAILABLE}"),
        };
        let hum = match e.humidity.filter(|h| h.is_finite()) {
            Some(h) => format!("Hum: {h:.1}%"),
            None => format!("Hum: {NOT_AVAILABLE}"),
        };
        (temp, hum)
    }

    /// Recupera os valores de um texto gerado por [`MessageFormat::render`].
    ///
    /// A temperatura volta na unidade em que foi exibida.
    pub fn parse_status(&self, text: &str) -> ParsedStatus {
        let mut status = ParsedStatus::default();

        for part in text.split(self.separator.as_str()) {
            let Some((label, value)) = part.split_once(": ") else {
                continue;
            };
            let value = value.trim();
            if value == NOT_AVAILABLE {
                continue;
            }
            match label.trim() {
                "Bat" => status.battery = value.strip_suffix('%').and_then(|v| v.parse().ok()),
                "Temp" => {
                    status.temperature = value
                        .strip_suffix("°C")
                        .or_else(|| value.strip_suffix("°F"))
                        .and_then(|v| v.parse().ok())
                }
                "Hum" => status.humidity = value.strip_suffix('%').and_then(|v| v.parse().ok()),
                _ => {}
            }
        }

        status
    }
}

/// Valores extraídos de uma mensagem de status.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParsedStatus {
    pub battery: Option<u8>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

/// Corta `s` em no máximo `max` bytes sem quebrar um caractere UTF-8.
pub fn truncate_to_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(p: Option<u8>) -> Reading {
        Reading::Battery(BatteryReading { percent: p })
    }

    fn env(t: Option<f32>, h: Option<f32>) -> Reading {
        Reading::Environment(EnvironmentReading {
            temperature: t,
            humidity: h,
        })
    }

    #[test]
    fn battery_only() {
        let fmt = MessageFormat::default();
        assert_eq!(fmt.render(&[battery(Some(95))]), "Bat: 95%");
    }

    #[test]
    fn environment_unavailable() {
        let fmt = MessageFormat::default();
        assert_eq!(fmt.render(&[env(None, None)]), "Temp: N/A | Hum: N/A");
    }

    #[test]
    fn battery_unknown_and_partial_environment() {
        let fmt = MessageFormat::default();
        assert_eq!(
            fmt.render(&[battery(None), env(Some(22.5), None)]),
            "Bat: N/A | Temp: 22.5°C | Hum: N/A"
        );
    }

    #[test]
    fn non_finite_temperature_is_not_reported() {
        let fmt = MessageFormat::default();
        assert_eq!(
            fmt.render(&[env(Some(f32::NAN), Some(40.0))]),
            "Temp: N/A | Hum: 40.0%"
        );
    }

    #[test]
    fn fahrenheit_and_custom_separator() {
        let fmt = MessageFormat {
            separator: ", ".into(),
            temperature_unit: TemperatureUnit::Fahrenheit,
            ..Default::default()
        };
        assert_eq!(
            fmt.render(&[env(Some(25.0), Some(55.0))]),
            "Temp: 77.0°F, Hum: 55.0%"
        );
    }

    #[test]
    fn idle_text_without_readers() {
        let fmt = MessageFormat::default();
        assert_eq!(fmt.render(&[]), "Station Online");
    }

    #[test]
    fn parse_recovers_values() {
        let fmt = MessageFormat::default();
        let text = fmt.render(&[battery(Some(87)), env(Some(22.5), Some(41.04))]);
        let parsed = fmt.parse_status(&text);
        assert_eq!(parsed.battery, Some(87));
        let temp = parsed.temperature.unwrap();
        assert!((temp - 22.5).abs() <= 0.05, "temp = {temp}");
        let hum = parsed.humidity.unwrap();
        assert!((hum - 41.0).abs() <= 0.05, "hum = {hum}");
    }

    #[test]
    fn parse_treats_na_as_absent() {
        let fmt = MessageFormat::default();
        let parsed = fmt.parse_status("Bat: N/A | Temp: N/A | Hum: N/A");
        assert_eq!(parsed, ParsedStatus::default());
    }

    #[test]
    fn over_limit_drops_whole_fields() {
        let fmt = MessageFormat {
            max_bytes: 19,
            ..Default::default()
        };
        let readings = [battery(Some(87)), env(Some(22.5), Some(41.3))];
        assert_eq!(fmt.render(&readings), "Bat: 87%");

        // "Bat: 87% | Temp: 22.5°C" = 24 bytes (° ocupa 2)
        let fmt = MessageFormat {
            max_bytes: 24,
            ..Default::default()
        };
        assert_eq!(fmt.render(&readings), "Bat: 87% | Temp: 22.5°C");
    }

    #[test]
    fn no_field_fits_yields_empty_text() {
        let fmt = MessageFormat {
            max_bytes: 11,
            ..Default::default()
        };
        assert_eq!(fmt.render(&[env(Some(22.5), Some(50.0))]), "");
    }

    #[test]
    fn widest_field_fits_minimum_limit() {
        let fmt = MessageFormat {
            max_bytes: MIN_MESSAGE_BYTES,
            temperature_unit: TemperatureUnit::Fahrenheit,
            ..Default::default()
        };
        assert_eq!(fmt.render(&[env(Some(80.0), None)]), "Temp: 176.0°F");
    }

    #[test]
    fn limit_never_exceeds_radio_payload() {
        let fmt = MessageFormat {
            max_bytes: 10_000,
            idle_text: "x".repeat(500),
            ..Default::default()
        };
        assert_eq!(fmt.render(&[]).len(), MAX_TEXT_PAYLOAD);
    }

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate_to_bytes("abc", 10), "abc");
        assert_eq!(truncate_to_bytes("a°b", 2), "a");
        assert_eq!(truncate_to_bytes("a°b", 3), "a°");
    }
}
