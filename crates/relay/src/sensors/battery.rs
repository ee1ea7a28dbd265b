//! Bateria do rádio conectado.

use super::SensorReader;
use crate::transport::serial_api::SharedRadio;
use mesh_core::{BatteryReading, Reading};

/// Lê o estado de carga que o próprio rádio reporta.
pub struct BatteryReader {
    radio: SharedRadio,
}

impl BatteryReader {
    pub fn new(radio: SharedRadio) -> Self {
        Self { radio }
    }
}

impl SensorReader for BatteryReader {
    fn name(&self) -> &'static str {
        "battery"
    }

    /// Não bloqueia nem reconecta: sem valor reportado ainda, `percent = None`.
    fn read(&mut self) -> Reading {
        Reading::Battery(BatteryReading {
            percent: self.radio.borrow_mut().battery_level(),
        })
    }
}
