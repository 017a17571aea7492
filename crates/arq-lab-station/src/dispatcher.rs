//! Real-time host for one station.
//!
//! The dispatcher owns the socket and a [`HostState`] that plays network
//! layer, timer service and physical layer. Every wake-up of the main
//! `select!` becomes exactly one [`LinkEvent`]; frames queued by the handler
//! go out on the socket before the next wake-up.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use arq_lab_abstract::{DataLinkProtocol, LinkContext, LinkEvent, Packet};
use arq_lab_core::FrameKind;
use arq_lab_core::protocol::METRIC_NBUFFERED;
use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::StationConfig;
use crate::noise;

const RECV_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKind {
    Data(u8),
    Ack,
}

/// What a station did over its run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StationReport {
    pub data_frames: u32,
    pub ack_frames: u32,
    pub nak_frames: u32,
    /// Outgoing frames that had at least one bit flipped.
    pub frames_corrupted: u32,
    /// Packets delivered to the network layer in order.
    pub delivered: u32,
    /// Deliveries that were duplicated, skipped ahead or damaged.
    pub misordered: u32,
    pub elapsed_ms: u64,
}

/// Network layer, timer service and line state of one station.
struct HostState {
    started: Instant,
    outbound: VecDeque<Packet>,
    network_enabled: bool,
    timers: HashMap<TimerKind, Instant>,
    tx_queue: Vec<Bytes>,
    line_free_at: Instant,
    line_busy: bool,
    next_delivery_id: u16,
    nbuffered: usize,
    report: StationReport,
}

impl HostState {
    fn new(packets: u32, packet_len: usize) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            outbound: (0..packets)
                .map(|id| Packet::with_id(id as u16, packet_len))
                .collect(),
            network_enabled: false,
            timers: HashMap::new(),
            tx_queue: Vec::new(),
            line_free_at: now,
            line_busy: false,
            next_delivery_id: 0,
            nbuffered: 0,
            report: StationReport::default(),
        }
    }

    fn next_timer(&self) -> Option<(TimerKind, Instant)> {
        self.timers
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(kind, at)| (*kind, *at))
    }

    /// Everything sent is acknowledged and `expect` packets came in.
    fn finished(&self, expect: u32) -> bool {
        self.outbound.is_empty() && self.nbuffered == 0 && self.report.delivered >= expect
    }

    fn deliver(&mut self, packet: Packet) {
        let id = packet.id().unwrap_or_default();
        if packet.is_intact() && id == self.next_delivery_id {
            self.next_delivery_id = self.next_delivery_id.wrapping_add(1);
            self.report.delivered += 1;
            info!("delivered packet {}", id);
        } else {
            self.report.misordered += 1;
            warn!(
                "delivered packet {} while expecting {} (intact: {})",
                id,
                self.next_delivery_id,
                packet.is_intact()
            );
        }
    }
}

struct HostContext<'a> {
    host: &'a mut HostState,
}

impl LinkContext for HostContext<'_> {
    fn send_frame(&mut self, frame: Bytes) {
        self.host.tx_queue.push(frame);
    }

    fn start_timer(&mut self, slot: u8, delay_ms: u64) {
        let at = Instant::now() + Duration::from_millis(delay_ms);
        self.host.timers.insert(TimerKind::Data(slot), at);
    }

    fn stop_timer(&mut self, slot: u8) {
        self.host.timers.remove(&TimerKind::Data(slot));
    }

    fn start_ack_timer(&mut self, delay_ms: u64) {
        let at = Instant::now() + Duration::from_millis(delay_ms);
        self.host.timers.insert(TimerKind::Ack, at);
    }

    fn stop_ack_timer(&mut self) {
        self.host.timers.remove(&TimerKind::Ack);
    }

    fn fetch_packet(&mut self) -> Option<Packet> {
        self.host.outbound.pop_front()
    }

    fn deliver_packet(&mut self, packet: Packet) {
        self.host.deliver(packet);
    }

    fn enable_network_layer(&mut self) {
        self.host.network_enabled = true;
    }

    fn disable_network_layer(&mut self) {
        self.host.network_enabled = false;
    }

    fn log(&mut self, message: &str) {
        debug!("{}", message);
    }

    fn now(&self) -> u64 {
        self.host.started.elapsed().as_millis() as u64
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        if name == METRIC_NBUFFERED {
            self.host.nbuffered = value as usize;
        }
    }
}

enum Wake {
    Interrupted,
    Deadline,
    Datagram(io::Result<(usize, SocketAddr)>),
    LineIdle,
    Timer(TimerKind),
    NetworkReady,
}

pub struct Dispatcher {
    config: StationConfig,
    socket: UdpSocket,
    peer: SocketAddr,
    protocol: Box<dyn DataLinkProtocol>,
    host: HostState,
    rng: StdRng,
}

impl Dispatcher {
    pub fn new(
        config: StationConfig,
        socket: UdpSocket,
        peer: SocketAddr,
    ) -> anyhow::Result<Self> {
        let protocol =
            arq_lab_core::station(config.link.clone()).context("Invalid link configuration")?;
        let host = HostState::new(config.packets, config.link.packet_len);
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            socket,
            peer,
            protocol,
            host,
            rng,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("Socket has no local address")
    }

    /// Drive the protocol until the work is done (plus the linger time), the
    /// run limit passes or Ctrl-C arrives.
    pub async fn run(mut self) -> anyhow::Result<StationReport> {
        info!(
            "station on {} talking to {}: {} packets out, expecting {}",
            self.local_addr()?,
            self.peer,
            self.config.packets,
            self.config.expect
        );
        {
            let mut ctx = HostContext {
                host: &mut self.host,
            };
            self.protocol.init(&mut ctx);
        }
        self.flush().await;
        // the line starts idle
        self.dispatch(LinkEvent::PhysicalLayerReady).await;

        let mut deadline = Instant::now() + self.config.run_for;
        let mut lingering = false;
        let mut buf = vec![0u8; RECV_BUFFER];
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            if !lingering && self.host.finished(self.config.expect) {
                info!("all work done, lingering for {:?}", self.config.linger);
                lingering = true;
                deadline = deadline.min(Instant::now() + self.config.linger);
            }

            let next_timer = self.host.next_timer();
            let (timer_kind, timer_at) = next_timer.unwrap_or((TimerKind::Ack, deadline));
            let network_ready = self.host.network_enabled && !self.host.outbound.is_empty();

            let wake = tokio::select! {
                biased;
                _ = &mut ctrl_c => Wake::Interrupted,
                _ = sleep_until(deadline) => Wake::Deadline,
                res = self.socket.recv_from(&mut buf) => Wake::Datagram(res),
                _ = sleep_until(self.host.line_free_at), if self.host.line_busy => Wake::LineIdle,
                _ = sleep_until(timer_at), if next_timer.is_some() => Wake::Timer(timer_kind),
                _ = std::future::ready(()), if network_ready => Wake::NetworkReady,
            };

            let event = match wake {
                Wake::Interrupted => {
                    info!("interrupted");
                    break;
                }
                Wake::Deadline => {
                    if !lingering {
                        warn!("run limit reached before all work was done");
                    }
                    break;
                }
                Wake::Datagram(Ok((len, from))) => {
                    if from != self.peer {
                        warn!("ignoring {} bytes from stranger {}", len, from);
                        continue;
                    }
                    LinkEvent::FrameReceived(Bytes::copy_from_slice(&buf[..len]))
                }
                Wake::Datagram(Err(err)) => {
                    warn!("recv error: {}", err);
                    continue;
                }
                Wake::LineIdle => {
                    self.host.line_busy = false;
                    LinkEvent::PhysicalLayerReady
                }
                Wake::Timer(kind) => {
                    self.host.timers.remove(&kind);
                    match kind {
                        TimerKind::Data(slot) => LinkEvent::DataTimeout(slot),
                        TimerKind::Ack => LinkEvent::AckTimeout,
                    }
                }
                Wake::NetworkReady => LinkEvent::NetworkLayerReady,
            };
            self.dispatch(event).await;
        }

        let mut report = self.host.report;
        report.elapsed_ms = self.host.started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn dispatch(&mut self, event: LinkEvent) {
        {
            let mut ctx = HostContext {
                host: &mut self.host,
            };
            self.protocol.handle_event(&mut ctx, event);
        }
        self.flush().await;
    }

    /// Put queued frames on the wire, injecting bit errors and pacing the line.
    async fn flush(&mut self) {
        for frame in mem::take(&mut self.host.tx_queue) {
            let report = &mut self.host.report;
            match FrameKind::try_from(frame.first().copied().unwrap_or_default()) {
                Ok(FrameKind::Data) => report.data_frames += 1,
                Ok(FrameKind::Ack) => report.ack_frames += 1,
                Ok(FrameKind::Nak) => report.nak_frames += 1,
                Err(err) => warn!("protocol produced a bad frame: {}", err),
            }

            let mut bytes = frame.to_vec();
            let flipped = noise::flip_bits(&mut self.rng, &mut bytes, self.config.bit_error_rate);
            if flipped > 0 {
                report.frames_corrupted += 1;
                debug!("flipped {} bits in outgoing frame", flipped);
            }

            let now = Instant::now();
            let start = self.host.line_free_at.max(now);
            self.host.line_free_at = start + self.config.serialization_delay(bytes.len());
            self.host.line_busy = true;

            // a failed send is a lost frame; the protocol recovers
            if let Err(err) = self.socket.send_to(&bytes, self.peer).await {
                warn!("send to {} failed: {}", self.peer, err);
            }
        }
    }
}
