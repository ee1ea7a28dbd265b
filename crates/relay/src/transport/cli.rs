//! Transporte via ferramenta de linha de comando externa.
//!
//! ```bash
//! meshtastic [--port /dev/ttyUSB0] --sendtext "Bat: 95%" [--dest !a1b2c3d4]
//! ```
//!
//! Broadcast omite `--dest`. Sucesso = código de saída zero.

use super::{MeshTransport, ProbeInfo, TransportError};
use async_trait::async_trait;
use mesh_core::{Target, MAX_TEXT_PAYLOAD};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct CliTransport {
    program: String,
    port: Option<String>,
    timeout: Duration,
}

impl CliTransport {
    pub fn new(program: String, port: Option<String>, timeout: Duration) -> Self {
        Self {
            program,
            port,
            timeout,
        }
    }

    /// Argumentos para enviar `text` a `target`.
    pub fn send_args(&self, target: Target, text: &str) -> Vec<String> {
        let mut args = self.port_args();
        args.push("--sendtext".into());
        args.push(text.into());
        if !target.is_broadcast() {
            args.push("--dest".into());
            args.push(target.to_string());
        }
        args
    }

    fn port_args(&self) -> Vec<String> {
        match &self.port {
            Some(port) => vec!["--port".into(), port.clone()],
            None => Vec::new(),
        }
    }

    /// Executa o programa e espera no máximo `timeout`. Ao estourar, o
    /// processo é morto junto com o futuro.
    async fn run(&self, args: &[String], timeout: Duration) -> Result<(), TransportError> {
        debug!("Executando {} {:?}", self.program, args);
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "{} excedeu {:.1}s; processo encerrado",
                    self.program,
                    timeout.as_secs_f64()
                );
                return Err(TransportError::Timeout);
            }
        };

        if output.status.success() {
            return Ok(());
        }
        Err(TransportError::CommandFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait(?Send)]
impl MeshTransport for CliTransport {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn send(&mut self, target: Target, text: &str) -> Result<(), TransportError> {
        if text.len() > MAX_TEXT_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: text.len(),
                max: MAX_TEXT_PAYLOAD,
            });
        }
        self.run(&self.send_args(target, text), self.timeout).await
    }

    async fn probe(&mut self, timeout: Duration) -> Result<ProbeInfo, TransportError> {
        let mut args = self.port_args();
        args.push("--info".into());
        self.run(&args, timeout).await?;
        Ok(ProbeInfo {
            device: self.port.clone(),
            ..Default::default()
        })
    }
}
