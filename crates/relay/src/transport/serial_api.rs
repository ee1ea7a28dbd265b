//! Transporte pela API protobuf do rádio.
//!
//! O [`RadioLink`] é dono da porta serial e também acompanha o que o rádio
//! reporta sobre si mesmo (número do nó, bateria). Ele é compartilhado
//! com o leitor de bateria via [`SharedRadio`]; tudo roda numa única
//! thread, então `Rc<RefCell<_>>` basta.

use super::link::{LinkState, PortOpener, SerialLink};
use super::proto::{encode_frame, FrameDecoder};
use super::{MeshTransport, ProbeInfo, TransportError};
use async_trait::async_trait;
use mesh_core::{BatteryReading, Target, MAX_TEXT_PAYLOAD};
use meshtastic::protobufs::{
    from_radio, mesh_packet, telemetry, to_radio, Data, FromRadio, MeshPacket, PortNum,
    Telemetry, ToRadio,
};
use meshtastic::Message;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

pub type SharedRadio = Rc<RefCell<RadioLink>>;

/// Saltos padrão de um pacote na mesh.
const HOP_LIMIT: u32 = 3;
/// Pausa entre leituras enquanto espera a config do rádio.
const POLL_PAUSE: Duration = Duration::from_millis(50);

/// O que o rádio reportou sobre si mesmo nesta conexão.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioState {
    pub my_node_num: Option<u32>,
    /// Última bateria conhecida (0–100%)
    pub battery: Option<u8>,
    pub config_complete: bool,
}

/// Conexão com o rádio + estado reportado.
pub struct RadioLink {
    link: SerialLink,
    decoder: FrameDecoder,
    radio: RadioState,
    channel: u32,
    want_config_id: u32,
    config_requested: bool,
    next_packet_id: u32,
}

impl RadioLink {
    pub fn new(opener: Box<dyn PortOpener>, channel: u32) -> Self {
        let seed = time_seed();
        Self {
            link: SerialLink::new(opener),
            decoder: FrameDecoder::new(),
            radio: RadioState::default(),
            channel,
            want_config_id: 0,
            config_requested: false,
            next_packet_id: seed,
        }
    }

    /// Bateria reportada pelo rádio, sem bloquear nem conectar.
    ///
    /// Logo após a conexão o rádio ainda pode não ter reportado nada:
    /// nesse caso retorna `None`. Sem conexão o estado da sessão anterior
    /// é descartado.
    pub fn battery_level(&mut self) -> Option<u8> {
        if self.link.state() == LinkState::Connected {
            if let Err(e) = self.poll() {
                warn!("Falha ao ler estado do rádio: {e}");
            }
        }
        if self.link.state() != LinkState::Connected {
            self.radio = RadioState::default();
        }
        self.radio.battery
    }

    /// Envia um texto na porta TEXT_MESSAGE_APP.
    pub fn send_text(&mut self, target: Target, text: &str) -> Result<(), TransportError> {
        if text.len() > MAX_TEXT_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: text.len(),
                max: MAX_TEXT_PAYLOAD,
            });
        }

        self.ensure_connected()?;
        self.poll()?;

        let unicast = !target.is_broadcast();
        let packet = MeshPacket {
            to: target.node_num(),
            channel: self.channel,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec(),
                ..Default::default()
            })),
            // Firmware atribui id a broadcasts; unicast com ack precisa do nosso
            id: if unicast { self.next_id() } else { 0 },
            hop_limit: HOP_LIMIT,
            want_ack: unicast,
            ..Default::default()
        };
        let frame = encode_frame(&ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::Packet(packet)),
        })?;

        self.link.write_all(&frame)?;
        debug!("TextPacket → {target} ({} bytes de frame)", frame.len());
        Ok(())
    }

    /// Conecta se preciso e processa o que chegou. Retorna `true` quando
    /// o rádio já terminou de enviar sua config.
    pub fn poll_config(&mut self) -> Result<bool, TransportError> {
        self.ensure_connected()?;
        self.poll()?;
        Ok(self.radio.config_complete)
    }

    pub fn probe_info(&self) -> ProbeInfo {
        ProbeInfo {
            device: self.link.device().map(String::from),
            node_num: self.radio.my_node_num,
            battery: self.radio.battery,
        }
    }

    /// Avisa o rádio e libera a porta.
    pub fn close(&mut self) {
        if self.link.state() == LinkState::Connected {
            let bye = ToRadio {
                payload_variant: Some(to_radio::PayloadVariant::Disconnect(true)),
            };
            if let Ok(frame) = encode_frame(&bye) {
                let _ = self.link.write_all(&frame);
            }
        }
        self.link.close();
    }

    fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.link.connect()? {
            self.decoder.clear();
            self.radio = RadioState::default();
            self.request_config()?;
        }
        Ok(())
    }

    fn request_config(&mut self) -> Result<(), TransportError> {
        self.want_config_id = time_seed();
        let frame = encode_frame(&ToRadio {
            payload_variant: Some(to_radio::PayloadVariant::WantConfigId(self.want_config_id)),
        })?;
        self.link.write_all(&frame)?;
        self.config_requested = true;
        debug!("want_config_id=0x{:08x} enviado", self.want_config_id);
        Ok(())
    }

    /// Drena o que já chegou e atualiza o estado. Retorna frames processados.
    fn poll(&mut self) -> Result<usize, TransportError> {
        let bytes = self.link.read_available()?;
        self.decoder.push(&bytes);

        let mut frames = 0;
        while let Some(payload) = self.decoder.next_frame() {
            match FromRadio::decode(payload.as_slice()) {
                Ok(msg) => {
                    self.handle(msg);
                    frames += 1;
                }
                Err(e) => debug!("FromRadio inválido ({} bytes): {e}", payload.len()),
            }
        }

        if !self.config_requested && self.link.state() == LinkState::Connected {
            self.request_config()?;
        }
        Ok(frames)
    }

    fn handle(&mut self, msg: FromRadio) {
        use from_radio::PayloadVariant as FR;

        match msg.payload_variant {
            Some(FR::MyInfo(info)) => {
                debug!("Nó local: !{:08x}", info.my_node_num);
                self.radio.my_node_num = Some(info.my_node_num);
            }
            Some(FR::NodeInfo(node)) => {
                if Some(node.num) == self.radio.my_node_num {
                    if let Some(metrics) = node.device_metrics {
                        self.set_battery(metrics.battery_level.into());
                    }
                }
            }
            Some(FR::Packet(pkt)) => {
                if Some(pkt.from) == self.radio.my_node_num {
                    self.handle_own_packet(pkt);
                }
            }
            Some(FR::ConfigCompleteId(id)) => {
                if id == self.want_config_id {
                    self.radio.config_complete = true;
                } else {
                    trace!("config_complete_id 0x{id:08x} de outra sessão");
                }
            }
            Some(FR::Rebooted(_)) => {
                info!("Rádio reiniciou; pedindo config novamente");
                self.radio = RadioState::default();
                self.config_requested = false;
            }
            _ => {}
        }
    }

    fn handle_own_packet(&mut self, pkt: MeshPacket) {
        let Some(mesh_packet::PayloadVariant::Decoded(data)) = pkt.payload_variant else {
            return;
        };
        if data.portnum != PortNum::TelemetryApp as i32 {
            return;
        }
        match Telemetry::decode(data.payload.as_slice()) {
            Ok(Telemetry {
                variant: Some(telemetry::Variant::DeviceMetrics(metrics)),
                ..
            }) => self.set_battery(metrics.battery_level.into()),
            Ok(_) => {}
            Err(e) => debug!("Telemetry inválida: {e}"),
        }
    }

    fn set_battery(&mut self, level: Option<u32>) {
        let Some(level) = level else {
            return;
        };
        let reading = BatteryReading::from_raw(level);
        if level > 100 {
            debug!("Rádio em alimentação externa (battery_level={level})");
        }
        self.radio.battery = reading.percent;
    }

    fn next_id(&mut self) -> u32 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if self.next_packet_id == 0 {
            self.next_packet_id = 1;
        }
        self.next_packet_id
    }
}

/// Valor não-nulo derivado do relógio, usado como id.
fn time_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() as u32) ^ d.subsec_nanos())
        .unwrap_or(0)
        | 1
}

/// [`MeshTransport`] sobre o [`RadioLink`] compartilhado.
pub struct SerialApiTransport {
    radio: SharedRadio,
}

impl SerialApiTransport {
    pub fn new(radio: SharedRadio) -> Self {
        Self { radio }
    }
}

#[async_trait(?Send)]
impl MeshTransport for SerialApiTransport {
    fn name(&self) -> &'static str {
        "serial_api"
    }

    async fn send(&mut self, target: Target, text: &str) -> Result<(), TransportError> {
        self.radio.borrow_mut().send_text(target, text)
    }

    /// Espera o rádio terminar de enviar sua config (ou `timeout`).
    async fn probe(&mut self, timeout: Duration) -> Result<ProbeInfo, TransportError> {
        let deadline = Instant::now() + timeout;
        let complete = loop {
            let complete = self.radio.borrow_mut().poll_config()?;
            if complete || Instant::now() >= deadline {
                break complete;
            }
            tokio::time::sleep(POLL_PAUSE).await;
        };

        if complete {
            info!("✓ Config do rádio recebida");
        } else {
            warn!("Rádio não completou a config em {:.1}s", timeout.as_secs_f64());
        }
        Ok(self.radio.borrow().probe_info())
    }

    fn close(&mut self) {
        self.radio.borrow_mut().close();
    }
}
