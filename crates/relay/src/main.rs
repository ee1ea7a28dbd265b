//! # Mesh Relay
//!
//! Lê a bateria do rádio e/ou temperatura e umidade de um DHT22 e envia
//! um texto curto de status pela mesh, via rádio USB, a cada intervalo.
//!
//! ## Uso
//! ```bash
//! mesh_relay                           # config.json ao lado do executável
//! mesh_relay --config /etc/relay.json
//! mesh_relay --test-connection         # mostra info do rádio e sai
//! ```
//!
//! Encerra com código 0 em SIGINT/SIGTERM e com código 1 se a
//! configuração não puder ser carregada.

mod relay;
mod sensors;
mod transport;

use clap::Parser;
use mesh_core::config::RelayConfig;
use relay::RelayLoop;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "mesh_relay", version, about = "Envia status de bateria/DHT22 pela mesh")]
struct Args {
    /// Caminho do config.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Conecta ao rádio, mostra as informações do nó e sai
    #[arg(long)]
    test_connection: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // ── Carregar config ──
    let config_path = args.config.unwrap_or_else(RelayConfig::default_path);
    let config = match RelayConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Falha ao carregar {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };
    let target = match config.target() {
        Ok(target) => target,
        Err(e) => {
            error!("Destino inválido: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Transporte + sensores ──
    let setup = transport::build(&config);
    let mut transport = setup.transport;
    let readers = sensors::build(&config, setup.radio);

    if args.test_connection {
        return test_connection(transport.as_mut(), &config, target).await;
    }

    // Sinais valem desde já: a conexão inicial pode levar io_timeout
    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("Falha ao registrar handlers de sinal: {e}");
            return ExitCode::FAILURE;
        }
    };
    tokio::pin!(shutdown);

    // Conexão inicial: falha aqui não é fatal, o primeiro envio tenta de novo
    let probed = tokio::select! {
        biased;
        _ = &mut shutdown => None,
        result = transport.probe(config.io_timeout()) => Some(result),
    };
    match probed {
        None => {
            transport.close();
            info!("Encerrado durante a inicialização");
            return ExitCode::SUCCESS;
        }
        Some(Ok(info)) => {
            if let Some(num) = info.node_num {
                info!("✓ Nó local: !{num:08x}");
            }
        }
        Some(Err(e)) => warn!("Rádio indisponível na inicialização: {e}"),
    }

    // ── Banner ──
    let sensor_names: Vec<&str> = readers.iter().map(|r| r.name()).collect();
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 MESH RELAY – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Destino:     {target}");
    println!("  Intervalo:   {}s", config.send_interval_seconds);
    println!("  Transporte:  {}", transport.name());
    println!(
        "  Sensores:    {}",
        if sensor_names.is_empty() {
            "nenhum".to_string()
        } else {
            sensor_names.join(", ")
        }
    );
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut relay = RelayLoop::new(
        readers,
        transport,
        target,
        config.message_format(),
        config.send_interval(),
    );
    relay.run(shutdown).await;
    relay.close();

    info!("Encerrado");
    ExitCode::SUCCESS
}

/// Mostra o que o rádio reporta e sai.
async fn test_connection(
    transport: &mut dyn transport::MeshTransport,
    config: &RelayConfig,
    target: mesh_core::Target,
) -> ExitCode {
    let result = transport.probe(config.io_timeout()).await;
    transport.close();

    match result {
        Ok(info) => {
            println!();
            println!("Informações do nó:");
            println!("  Transporte:      {}", transport.name());
            println!(
                "  Dispositivo:     {}",
                info.device.as_deref().unwrap_or("(automático)")
            );
            match info.node_num {
                Some(num) => println!("  Número do nó:    {num} (!{num:08x})"),
                None => println!("  Número do nó:    não disponível"),
            }
            match info.battery {
                Some(level) => println!("  Bateria:         {level}%"),
                None => println!("  Bateria:         não disponível"),
            }
            println!("  Destino:         {target}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("✗ Falha ao conectar: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Futuro que completa no primeiro SIGINT ou SIGTERM.
///
/// Os handlers são registrados já aqui, antes do primeiro ciclo.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT recebido"),
            _ = terminate.recv() => info!("SIGTERM recebido"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C recebido"),
            Err(e) => {
                error!("Falha ao escutar Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_is_caught_once_handlers_exist() {
        let shutdown = shutdown_signal().unwrap();

        // Sinal chega antes do primeiro poll do futuro
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .unwrap();
    }
}
