//! Loop de amostragem e envio.
//!
//! A cada intervalo: lê cada sensor em sequência, monta o texto, envia
//! pelo transporte e registra o resultado. Nenhuma falha de sensor ou
//! de envio encerra o loop; só o sinal de término o faz, e ele é
//! atendido durante a espera entre ciclos.

use crate::sensors::SensorReader;
use crate::transport::{MeshTransport, TransportError};
use mesh_core::{MessageFormat, Reading, Target};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Resultado de um ciclo.
#[derive(Debug)]
pub struct CycleOutcome {
    pub message: String,
    pub result: Result<(), TransportError>,
}

pub struct RelayLoop {
    readers: Vec<Box<dyn SensorReader>>,
    transport: Box<dyn MeshTransport>,
    target: Target,
    format: MessageFormat,
    interval: Duration,
    cycle: u64,
}

impl RelayLoop {
    pub fn new(
        readers: Vec<Box<dyn SensorReader>>,
        transport: Box<dyn MeshTransport>,
        target: Target,
        format: MessageFormat,
        interval: Duration,
    ) -> Self {
        Self {
            readers,
            transport,
            target,
            format,
            interval,
            cycle: 0,
        }
    }

    /// Um ciclo completo: ler → formatar → enviar → logar.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycle += 1;

        let readings: Vec<Reading> = self.readers.iter_mut().map(|r| r.read()).collect();
        let message = self.format.render(&readings);

        let result = self.transport.send(self.target, &message).await;
        let outcome = CycleOutcome { message, result };
        self.log_outcome(&outcome);
        outcome
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        match &outcome.result {
            Ok(()) => info!("[#{}] → {} | {}", self.cycle, self.target, outcome.message),
            Err(e) => error!(
                "[#{}] ✗ Falha ao enviar \"{}\" para {}: {e} (nova tentativa em {}s)",
                self.cycle,
                outcome.message,
                self.target,
                self.interval.as_secs()
            ),
        }
    }

    /// Roda até `shutdown` completar. Retorna o número de ciclos executados.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> u64 {
        tokio::pin!(shutdown);

        loop {
            let cycle_start = Instant::now();
            self.run_cycle().await;

            // Dormir pelo tempo restante do intervalo
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Encerrando após {} ciclo(s)", self.cycle);
                    return self.cycle;
                }
                _ = tokio::time::sleep_until(cycle_start + self.interval) => {}
            }
        }
    }

    /// Libera o transporte (e a porta serial).
    pub fn close(&mut self) {
        self.transport.close();
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
