//! Conexão serial com o rádio e sua máquina de estados.
//!
//! ```text
//! Disconnected ──send──▶ Connecting ──ok──▶ Connected
//!      ▲                     │                  │
//!      └──────── erro ───────┴──── erro de I/O ─┘
//! ```
//!
//! Não existe reconexão em background: só uma nova tentativa de uso
//! (envio) volta a `Connecting`.

use super::TransportError;
use serialport::{SerialPortInfo, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Padrões de chips USB-serial comuns em placas de rádio.
const PORT_PATTERNS: &[&str] = &["cp210", "ch340", "usb serial", "ttyusb", "ttyacm"];

/// Estado da conexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Porta serial vista pelo transporte (permite portas falsas em teste).
pub trait SerialIo: Read + Write {
    /// Bytes já recebidos e ainda não lidos.
    fn bytes_to_read(&self) -> io::Result<usize>;
}

impl SerialIo for Box<dyn serialport::SerialPort> {
    fn bytes_to_read(&self) -> io::Result<usize> {
        serialport::SerialPort::bytes_to_read(&**self)
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}

/// Abre a porta: retorna o caminho do dispositivo e a porta aberta.
pub trait PortOpener {
    fn open(&mut self) -> Result<(String, Box<dyn SerialIo>), TransportError>;
}

/// Abre uma porta serial real, descobrindo o dispositivo quando
/// nenhum caminho foi configurado.
pub struct SystemPortOpener {
    configured: Option<String>,
    discovered: Option<String>,
    baud_rate: u32,
    timeout: Duration,
    /// Tempo para o dispositivo inicializar após a abertura
    settle: Duration,
}

impl SystemPortOpener {
    pub fn new(configured: Option<String>, baud_rate: u32, timeout: Duration, settle: Duration) -> Self {
        Self {
            configured,
            discovered: None,
            baud_rate,
            timeout,
            settle,
        }
    }

    fn resolve_device(&mut self) -> Result<String, TransportError> {
        if let Some(path) = &self.configured {
            return Ok(path.clone());
        }
        if let Some(path) = &self.discovered {
            return Ok(path.clone());
        }

        let ports = serialport::available_ports().unwrap_or_else(|e| {
            warn!("Falha ao listar portas seriais: {e}");
            Vec::new()
        });
        let path = pick_port(&ports).ok_or(TransportError::DeviceNotFound)?;
        info!("✓ Rádio detectado em {path}");
        self.discovered = Some(path.clone());
        Ok(path)
    }
}

impl PortOpener for SystemPortOpener {
    fn open(&mut self) -> Result<(String, Box<dyn SerialIo>), TransportError> {
        let device = self.resolve_device()?;

        let builder = serialport::new(&device, self.baud_rate)
            .timeout(self.timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);

        let mut port = match builder.open() {
            Ok(port) => port,
            Err(source) => {
                // Dispositivo pode ter sido re-enumerado (ttyACM0 → ttyACM1)
                self.discovered = None;
                return Err(TransportError::Open { device, source });
            }
        };

        // Placas ESP32 precisam de DTR/RTS para sair do reset
        setup_step(&device, "DTR", port.write_data_terminal_ready(true));
        setup_step(&device, "RTS", port.write_request_to_send(true));
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        setup_step(&device, "limpar entrada", port.clear(serialport::ClearBuffer::Input));

        let port: Box<dyn SerialIo> = Box::new(port);
        Ok((device, port))
    }
}

/// Passo opcional da abertura; falha só é registrada.
fn setup_step(device: &str, step: &str, result: serialport::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("{device}: {step} falhou: {e}");
            false
        }
    }
}

/// Escolhe a porta do rádio: primeiro um chip USB-serial conhecido,
/// senão a primeira porta disponível.
pub fn pick_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|p| {
            let descriptor = port_descriptor(p);
            PORT_PATTERNS.iter().any(|pat| descriptor.contains(pat))
        })
        .or_else(|| ports.first())
        .map(|p| p.port_name.clone())
}

fn port_descriptor(port: &SerialPortInfo) -> String {
    let mut descriptor = port.port_name.to_lowercase();
    if let SerialPortType::UsbPort(usb) = &port.port_type {
        for field in [&usb.manufacturer, &usb.product].into_iter().flatten() {
            descriptor.push(' ');
            descriptor.push_str(&field.to_lowercase());
        }
    }
    descriptor
}

/// Conexão serial exclusiva do transporte.
pub struct SerialLink {
    opener: Box<dyn PortOpener>,
    port: Option<Box<dyn SerialIo>>,
    device: Option<String>,
    state: LinkState,
}

impl SerialLink {
    pub fn new(opener: Box<dyn PortOpener>) -> Self {
        Self {
            opener,
            port: None,
            device: None,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Caminho do dispositivo conectado.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Conecta se necessário. Retorna `true` quando a porta acabou de ser aberta.
    pub fn connect(&mut self) -> Result<bool, TransportError> {
        if self.state == LinkState::Connected && self.port.is_some() {
            return Ok(false);
        }

        self.state = LinkState::Connecting;
        match self.opener.open() {
            Ok((device, port)) => {
                info!("✓ Conectado ao rádio em {device}");
                self.device = Some(device);
                self.port = Some(port);
                self.state = LinkState::Connected;
                Ok(true)
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    /// Executa uma operação de I/O na porta conectada. Erro de I/O derruba
    /// a conexão; o próximo uso tenta reconectar.
    pub fn io<T>(
        &mut self,
        op: impl FnOnce(&mut dyn SerialIo) -> io::Result<T>,
    ) -> Result<T, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        match op(port.as_mut()) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(
                    "Erro de I/O em {}: {e}. Conexão marcada como desconectada",
                    self.device.as_deref().unwrap_or("?")
                );
                self.drop_port();
                if e.kind() == io::ErrorKind::TimedOut {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Io(e))
                }
            }
        }
    }

    /// Lê tudo que já chegou sem bloquear.
    pub fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.state != LinkState::Connected {
            return Ok(Vec::new());
        }
        self.io(|port| {
            let mut out = Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let pending = port.bytes_to_read()?;
                if pending == 0 {
                    break;
                }
                let want = pending.min(buf.len());
                let n = port.read(&mut buf[..want])?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            Ok(out)
        })
    }

    /// Escreve todo o buffer e faz flush.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.io(|port| {
            port.write_all(data)?;
            port.flush()
        })
    }

    /// Fecha a porta (shutdown).
    pub fn close(&mut self) {
        if self.port.is_some() {
            info!("✓ Desconectado de {}", self.device.as_deref().unwrap_or("?"));
        }
        self.drop_port();
    }

    fn drop_port(&mut self) {
        self.port = None;
        self.state = LinkState::Disconnected;
        debug!("Porta serial liberada");
    }
}

// ──────────────────────────────────────────────
// Porta falsa para testes
// ──────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Lado "rádio" da porta falsa, inspecionável pelo teste.
    #[derive(Default)]
    pub struct FakeWire {
        pub written: Vec<u8>,
        pub incoming: VecDeque<u8>,
        pub fail_writes: bool,
        /// Resposta colocada em `incoming` a cada escrita
        pub auto_reply: Vec<u8>,
        pub opens: usize,
        pub refuse_open: bool,
    }

    pub type Wire = Rc<RefCell<FakeWire>>;

    pub struct FakePort(pub Wire);

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.0.borrow_mut();
            let n = buf.len().min(wire.incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = wire.incoming.pop_front().unwrap_or(0);
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut wire = self.0.borrow_mut();
            if wire.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cabo removido"));
            }
            wire.written.extend_from_slice(buf);
            let reply = wire.auto_reply.clone();
            wire.incoming.extend(reply);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialIo for FakePort {
        fn bytes_to_read(&self) -> io::Result<usize> {
            Ok(self.0.borrow().incoming.len())
        }
    }

    pub struct FakeOpener(pub Wire);

    impl PortOpener for FakeOpener {
        fn open(&mut self) -> Result<(String, Box<dyn SerialIo>), TransportError> {
            let mut wire = self.0.borrow_mut();
            if wire.refuse_open {
                return Err(TransportError::DeviceNotFound);
            }
            wire.opens += 1;
            let port: Box<dyn SerialIo> = Box::new(FakePort(self.0.clone()));
            Ok(("/dev/fake0".into(), port))
        }
    }

    pub fn wire() -> Wire {
        Rc::new(RefCell::new(FakeWire::default()))
    }

    pub fn link() -> (SerialLink, Wire) {
        let wire = wire();
        (SerialLink::new(Box::new(FakeOpener(wire.clone()))), wire)
    }
}
