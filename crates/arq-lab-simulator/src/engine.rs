use crate::trace::SimulationReport;
use arq_lab_abstract::{
    DataLinkProtocol, LinkConfig, LinkContext, LinkEvent, Packet, SimConfig, StationId,
};
use arq_lab_core::{Frame, FrameKind};
use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Timers a station may run: one per window slot plus the delayed ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Data(u8),
    Ack,
}

#[derive(Debug)]
pub enum EventType {
    /// New packets appear in the outbound queue of a station's network layer.
    Supply { station: StationId, count: u32 },
    NetworkLayerReady { station: StationId },
    PhysicalLayerReady { station: StationId },
    FrameArrival { to: StationId, frame: Bytes },
    TimerExpiry {
        station: StationId,
        timer: TimerKind,
        generation: u64,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // tie-break for events at the same time
}

// Min-heap: the earliest event is the greatest
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// One-shot channel faults, matched against frames leaving a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    DropData { seq: u8 },
    CorruptData { seq: u8 },
    DropAck { ack: u8 },
    DropNak { ack: u8 },
}

impl Fault {
    fn matches(&self, frame: &Frame) -> bool {
        match (*self, frame.kind) {
            (Fault::DropData { seq } | Fault::CorruptData { seq }, FrameKind::Data) => {
                frame.seq == seq
            }
            (Fault::DropAck { ack }, FrameKind::Ack) => frame.ack == ack,
            (Fault::DropNak { ack }, FrameKind::Nak) => frame.ack == ack,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEventKind {
    Send,
    Drop,
    Corrupt,
    Deliver,
}

/// A compact record of one link-level happening, for the timeline view.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub kind: LinkEventKind,
    /// The sending station, or the delivering one for `Deliver`.
    pub station: StationId,
    /// Time on the wire for `Send`, serialization included.
    pub latency_ms: Option<u64>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StationStats {
    pub data_frames: u32,
    pub ack_frames: u32,
    pub nak_frames: u32,
    pub packets_supplied: u32,
    /// Ids of delivered packets, in delivery order.
    pub delivered: Vec<u16>,
    /// Deliveries that were duplicated, skipped ahead or damaged.
    pub misordered: u32,
    pub frames_dropped: u32,
    pub frames_corrupted: u32,
}

impl StationStats {
    pub fn frames_sent(&self) -> u32 {
        self.data_frames + self.ack_frames + self.nak_frames
    }

    /// True iff the first `count` deliveries are packets `0..count` in order.
    pub fn delivered_in_order(&self, count: u32) -> bool {
        self.delivered.len() >= count as usize
            && self
                .delivered
                .iter()
                .take(count as usize)
                .zip(0u16..)
                .all(|(got, want)| *got == want)
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start(TimerKind, u64),
    Stop(TimerKind),
}

/// Side effects collected while a protocol handler runs.
#[derive(Default)]
struct ActionBuffer {
    outgoing_frames: Vec<Bytes>,
    timer_ops: Vec<TimerOp>,
    network_layer: Option<bool>,
    logs: Vec<String>,
    delivered: Vec<Packet>,
    metrics: Vec<(String, f64)>,
}

struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    outbound: &'a mut VecDeque<Packet>,
    now: u64,
}

impl LinkContext for ScopedContext<'_> {
    fn send_frame(&mut self, frame: Bytes) {
        self.buffer.outgoing_frames.push(frame);
    }

    fn start_timer(&mut self, slot: u8, delay_ms: u64) {
        self.buffer
            .timer_ops
            .push(TimerOp::Start(TimerKind::Data(slot), delay_ms));
    }

    fn stop_timer(&mut self, slot: u8) {
        self.buffer.timer_ops.push(TimerOp::Stop(TimerKind::Data(slot)));
    }

    fn start_ack_timer(&mut self, delay_ms: u64) {
        self.buffer
            .timer_ops
            .push(TimerOp::Start(TimerKind::Ack, delay_ms));
    }

    fn stop_ack_timer(&mut self) {
        self.buffer.timer_ops.push(TimerOp::Stop(TimerKind::Ack));
    }

    fn fetch_packet(&mut self) -> Option<Packet> {
        self.outbound.pop_front()
    }

    fn deliver_packet(&mut self, packet: Packet) {
        self.buffer.delivered.push(packet);
    }

    fn enable_network_layer(&mut self) {
        self.buffer.network_layer = Some(true);
    }

    fn disable_network_layer(&mut self) {
        self.buffer.network_layer = Some(false);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// A protocol instance plus its simulated network and physical layers.
struct Station {
    protocol: Box<dyn DataLinkProtocol>,
    outbound: VecDeque<Packet>,
    next_packet_id: u16,
    /// Next id expected from the peer's network layer.
    next_delivery_id: u16,
    network_enabled: bool,
    network_event_pending: bool,
    /// The transmitter is busy until this time.
    line_busy_until: u64,
    /// Latest arrival scheduled at the peer; the line is first-in first-out.
    last_arrival: u64,
    timer_generations: HashMap<TimerKind, u64>,
    faults: Vec<Fault>,
    stats: StationStats,
}

impl Station {
    fn new(protocol: Box<dyn DataLinkProtocol>) -> Self {
        Self {
            protocol,
            outbound: VecDeque::new(),
            next_packet_id: 0,
            next_delivery_id: 0,
            network_enabled: false,
            network_event_pending: false,
            line_busy_until: 0,
            last_arrival: 0,
            timer_generations: HashMap::new(),
            faults: Vec::new(),
            stats: StationStats::default(),
        }
    }
}

pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    link: LinkConfig,
    rng: rand::rngs::StdRng,

    stations: [Station; 2],

    /// Time series recorded via `LinkContext::record_metric`, keyed
    /// `"<station>.<name>"`, e.g. `"A.nbuffered"`.
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    /// Timeline of sends, drops, corruptions and deliveries.
    pub link_events: Vec<LinkEventSummary>,

    initialized: bool,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        link: LinkConfig,
        a: Box<dyn DataLinkProtocol>,
        b: Box<dyn DataLinkProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            link,
            rng,
            stations: [Station::new(a), Station::new(b)],
            metrics: HashMap::new(),
            link_events: Vec::new(),
            initialized: false,
        }
    }

    /// Two selective-repeat stations sharing `link`.
    pub fn selective_repeat(config: SimConfig, link: LinkConfig) -> anyhow::Result<Self> {
        let a = arq_lab_core::station(link.clone())?;
        let b = arq_lab_core::station(link.clone())?;
        Ok(Self::new(config, link, a, b))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn link_config(&self) -> &LinkConfig {
        &self.link
    }

    pub fn stats(&self, station: StationId) -> &StationStats {
        &self.stations[station.index()].stats
    }

    /// Packets still waiting in a station's network layer.
    pub fn backlog(&self, station: StationId) -> usize {
        self.stations[station.index()].outbound.len()
    }

    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Register a one-shot fault on frames sent by `station`.
    pub fn add_fault(&mut self, station: StationId, fault: Fault) {
        self.stations[station.index()].faults.push(fault);
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_supply(&mut self, time: u64, station: StationId, count: u32) {
        self.push_event(time, EventType::Supply { station, count });
    }

    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        for station in [StationId::A, StationId::B] {
            self.dispatch(station, None);
            // the line starts idle
            self.push_event(self.time, EventType::PhysicalLayerReady { station });
        }
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns false once the queue is empty.
    pub fn step(&mut self) -> bool {
        self.init();
        let Some(event) = self.event_queue.pop() else {
            return false;
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::Supply { station, count } => {
                let packet_len = self.link.packet_len;
                let st = &mut self.stations[station.index()];
                for _ in 0..count {
                    st.outbound
                        .push_back(Packet::with_id(st.next_packet_id, packet_len));
                    st.next_packet_id = st.next_packet_id.wrapping_add(1);
                }
                st.stats.packets_supplied += count;
                self.poll_network_layer(station);
            }
            EventType::NetworkLayerReady { station } => {
                let st = &mut self.stations[station.index()];
                st.network_event_pending = false;
                if st.network_enabled && !st.outbound.is_empty() {
                    self.dispatch(station, Some(LinkEvent::NetworkLayerReady));
                }
            }
            EventType::PhysicalLayerReady { station } => {
                // a later frame may have extended the busy period
                if self.time >= self.stations[station.index()].line_busy_until {
                    self.dispatch(station, Some(LinkEvent::PhysicalLayerReady));
                }
            }
            EventType::FrameArrival { to, frame } => {
                self.dispatch(to, Some(LinkEvent::FrameReceived(frame)));
            }
            EventType::TimerExpiry {
                station,
                timer,
                generation,
            } => {
                let current = self.stations[station.index()]
                    .timer_generations
                    .get(&timer)
                    .copied();
                if current != Some(generation) {
                    debug!("Skipping stale {:?} timer of {}", timer, station);
                    return true;
                }
                let event = match timer {
                    TimerKind::Data(slot) => LinkEvent::DataTimeout(slot),
                    TimerKind::Ack => LinkEvent::AckTimeout,
                };
                self.dispatch(station, Some(event));
            }
        }
        true
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    /// Run until the queue drains or simulated time passes `deadline_ms`.
    /// Returns true if the queue drained.
    pub fn run_until(&mut self, deadline_ms: u64) -> bool {
        self.init();
        while let Some(next) = self.peek_next_event_time() {
            if next > deadline_ms {
                return false;
            }
            self.step();
        }
        true
    }

    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            link: self.link.clone(),
            duration_ms: self.time,
            stations: [
                self.stations[0].stats.clone(),
                self.stations[1].stats.clone(),
            ],
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    /// Run `init` (when `event` is `None`) or one event on `station`, then
    /// apply whatever the handler asked for.
    fn dispatch(&mut self, station: StationId, event: Option<LinkEvent>) {
        let mut buffer = ActionBuffer::default();
        {
            let st = &mut self.stations[station.index()];
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                outbound: &mut st.outbound,
                now: self.time,
            };
            match event {
                Some(event) => st.protocol.handle_event(&mut ctx, event),
                None => st.protocol.init(&mut ctx),
            }
        }
        self.process_actions(station, buffer);
    }

    /// Schedule a `NetworkLayerReady` if the station admits packets and has one.
    fn poll_network_layer(&mut self, station: StationId) {
        let st = &mut self.stations[station.index()];
        if st.network_enabled && !st.outbound.is_empty() && !st.network_event_pending {
            st.network_event_pending = true;
            self.push_event(self.time, EventType::NetworkLayerReady { station });
        }
    }

    fn record_link_event(
        &mut self,
        kind: LinkEventKind,
        station: StationId,
        latency_ms: Option<u64>,
        description: String,
    ) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            kind,
            station,
            latency_ms,
            description,
        });
    }

    fn process_actions(&mut self, source: StationId, buffer: ActionBuffer) {
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(format!("{source}.{name}"))
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            debug!("[{}] {}", source, log);
        }

        for packet in buffer.delivered {
            self.deliver(source, packet);
        }

        // applied in call order: a start after a stop must win
        for op in buffer.timer_ops {
            let st = &mut self.stations[source.index()];
            match op {
                TimerOp::Stop(timer) => {
                    if let Some(generation) = st.timer_generations.get_mut(&timer) {
                        *generation += 1;
                    }
                }
                TimerOp::Start(timer, delay) => {
                    let generation = st.timer_generations.entry(timer).or_insert(0);
                    *generation += 1;
                    let generation = *generation;
                    self.push_event(
                        self.time + delay,
                        EventType::TimerExpiry {
                            station: source,
                            timer,
                            generation,
                        },
                    );
                }
            }
        }

        for frame in buffer.outgoing_frames {
            self.transmit(source, frame);
        }

        if let Some(enabled) = buffer.network_layer {
            self.stations[source.index()].network_enabled = enabled;
        }
        self.poll_network_layer(source);
    }

    fn deliver(&mut self, station: StationId, packet: Packet) {
        let st = &mut self.stations[station.index()];
        let id = packet.id().unwrap_or_default();
        let in_order = packet.is_intact() && id == st.next_delivery_id;
        if in_order {
            st.next_delivery_id = st.next_delivery_id.wrapping_add(1);
            info!("[{}] delivered packet {}", station, id);
        } else {
            st.stats.misordered += 1;
            warn!(
                "[{}] delivered packet {} while expecting {} (intact: {})",
                station,
                id,
                st.next_delivery_id,
                packet.is_intact()
            );
        }
        st.stats.delivered.push(id);
        let description = if in_order {
            format!("[{station}] DELIVERED id={id}")
        } else {
            format!("[{station}] DELIVERED id={id} OUT OF ORDER")
        };
        self.record_link_event(LinkEventKind::Deliver, station, None, description);
    }

    /// Put one frame on the line: serialization, faults, then propagation.
    fn transmit(&mut self, source: StationId, bytes: Bytes) {
        let target = source.peer();
        let packet_len = self.link.packet_len;
        let serialization = self.config.serialization_delay(bytes.len());

        let st = &mut self.stations[source.index()];
        let start = st.line_busy_until.max(self.time);
        let done = start + serialization;
        st.line_busy_until = done;

        let frame = match Frame::decode(&bytes, packet_len) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("[{}] sent an undecodable frame: {}", source, err);
                self.push_event(done, EventType::PhysicalLayerReady { station: source });
                return;
            }
        };
        match frame.kind {
            FrameKind::Data => st.stats.data_frames += 1,
            FrameKind::Ack => st.stats.ack_frames += 1,
            FrameKind::Nak => st.stats.nak_frames += 1,
        }
        let fault = st
            .faults
            .iter()
            .position(|f| f.matches(&frame))
            .map(|pos| st.faults.remove(pos));
        self.push_event(done, EventType::PhysicalLayerReady { station: source });

        let route = format!("[{source}->{target}]");
        let mut bytes = bytes.to_vec();
        match fault {
            Some(Fault::CorruptData { .. }) => {
                self.stations[source.index()].stats.frames_corrupted += 1;
                // a payload bit, past the header
                let idx = bytes.len() / 2;
                bytes[idx] ^= 0x01;
                debug!("Deterministically corrupting {}", frame);
                self.record_link_event(
                    LinkEventKind::Corrupt,
                    source,
                    None,
                    format!("{route} CORRUPT (deterministic) {frame}"),
                );
            }
            Some(_) => {
                self.stations[source.index()].stats.frames_dropped += 1;
                debug!("Deterministically dropping {}", frame);
                self.record_link_event(
                    LinkEventKind::Drop,
                    source,
                    None,
                    format!("{route} DROP (deterministic) {frame}"),
                );
                return;
            }
            None => {
                if self.rng.random::<f64>() < self.config.loss_rate {
                    self.stations[source.index()].stats.frames_dropped += 1;
                    debug!("Frame lost in channel");
                    self.record_link_event(
                        LinkEventKind::Drop,
                        source,
                        None,
                        format!("{route} DROP (random loss) {frame}"),
                    );
                    return;
                }
                if self.rng.random::<f64>() < self.config.corrupt_rate {
                    self.stations[source.index()].stats.frames_corrupted += 1;
                    let idx = self.rng.random_range(0..bytes.len());
                    let bit = self.rng.random_range(0..8u32);
                    bytes[idx] ^= 1 << bit;
                    debug!("Frame corrupted in channel at byte {}", idx);
                    self.record_link_event(
                        LinkEventKind::Corrupt,
                        source,
                        None,
                        format!("{route} CORRUPT byte={idx} {frame}"),
                    );
                }
            }
        }

        let max_latency = self.config.max_latency.max(self.config.min_latency);
        let latency = self.rng.random_range(self.config.min_latency..=max_latency);
        // jitter never lets a frame overtake one sent before it
        let st = &mut self.stations[source.index()];
        let arrival = (done + latency).max(st.last_arrival);
        st.last_arrival = arrival;
        let on_wire = arrival - self.time;
        self.record_link_event(
            LinkEventKind::Send,
            source,
            Some(on_wire),
            format!("{route} SEND {frame} (latency={on_wire}ms)"),
        );
        self.push_event(
            arrival,
            EventType::FrameArrival {
                to: target,
                frame: Bytes::from(bytes),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_link() -> LinkConfig {
        LinkConfig {
            seq_bits: 3,
            packet_len: 16,
            data_timeout_ms: 500,
            ack_timeout_ms: 50,
        }
    }

    fn simulator(config: SimConfig) -> Simulator {
        Simulator::selective_repeat(config, small_link()).unwrap()
    }

    struct TimerProbe;

    impl DataLinkProtocol for TimerProbe {
        fn init(&mut self, ctx: &mut dyn LinkContext) {
            ctx.start_timer(0, 10);
            ctx.start_timer(1, 5);
            ctx.start_ack_timer(20);
            // restarting pushes the expiry back
            ctx.start_ack_timer(30);
        }

        fn handle_event(&mut self, ctx: &mut dyn LinkContext, event: LinkEvent) {
            if event == LinkEvent::DataTimeout(1) {
                ctx.stop_timer(0);
            }
            assert_ne!(event, LinkEvent::DataTimeout(0), "stopped timer fired");
        }
    }

    #[test]
    fn stopped_and_restarted_timers() {
        let probe = || Box::new(TimerProbe);
        let mut sim = Simulator::new(
            SimConfig::default(),
            LinkConfig::default(),
            probe(),
            probe(),
        );
        sim.run_until_complete();
        assert_eq!(sim.current_time(), 30);
    }

    #[test]
    fn clean_channel_delivers_everything_in_order() {
        let mut sim = simulator(SimConfig::default());
        sim.schedule_supply(0, StationId::A, 20);
        sim.run_until_complete();

        let b = sim.stats(StationId::B);
        assert!(b.delivered_in_order(20));
        assert_eq!(b.misordered, 0);
        assert_eq!(sim.stats(StationId::A).data_frames, 20);
        assert_eq!(sim.stats(StationId::B).nak_frames, 0);
        assert!(sim.metric_series("A.nbuffered").is_some());
    }

    #[test]
    fn window_never_overflows() {
        let mut sim = simulator(SimConfig::default());
        sim.schedule_supply(0, StationId::A, 50);
        sim.run_until_complete();

        let series = sim.metric_series("A.nbuffered").unwrap();
        assert!(series.iter().all(|(_, v)| *v <= 4.0));
        assert!(series.iter().any(|(_, v)| *v == 4.0));
    }

    #[test]
    fn dropped_data_frame_is_recovered() {
        let mut sim = simulator(SimConfig::default());
        sim.add_fault(StationId::A, Fault::DropData { seq: 2 });
        sim.schedule_supply(0, StationId::A, 6);
        sim.run_until_complete();

        let a = sim.stats(StationId::A);
        assert_eq!(a.frames_dropped, 1);
        assert!(a.data_frames > 6);
        assert!(sim.stats(StationId::B).delivered_in_order(6));
        assert!(
            sim.link_events
                .iter()
                .any(|e| e.kind == LinkEventKind::Drop && e.description.contains("seq=2"))
        );
    }

    #[test]
    fn corrupted_data_frame_draws_a_nak() {
        let mut sim = simulator(SimConfig::default());
        sim.add_fault(StationId::A, Fault::CorruptData { seq: 1 });
        sim.schedule_supply(0, StationId::A, 4);
        sim.run_until_complete();

        let b = sim.stats(StationId::B);
        assert!(b.nak_frames >= 1);
        assert!(b.delivered_in_order(4));
        assert_eq!(b.misordered, 0);
    }

    #[test]
    fn lossy_two_way_traffic_stays_in_order() {
        let config = SimConfig {
            loss_rate: 0.1,
            corrupt_rate: 0.1,
            seed: 42,
            ..Default::default()
        };
        let mut sim = simulator(config);
        sim.schedule_supply(0, StationId::A, 40);
        sim.schedule_supply(100, StationId::B, 40);
        sim.run_until_complete();

        for station in [StationId::A, StationId::B] {
            let stats = sim.stats(station);
            assert!(stats.delivered_in_order(40), "{station}: {stats:?}");
            assert_eq!(stats.misordered, 0);
        }
        assert_eq!(sim.backlog(StationId::A), 0);
    }

    #[test]
    fn jittery_line_never_reorders_frames() {
        for seed in 0..60 {
            let config = SimConfig {
                loss_rate: 0.1,
                corrupt_rate: 0.05,
                seed,
                ..Default::default()
            };
            let mut sim = simulator(config);
            sim.schedule_supply(0, StationId::A, 30);
            sim.schedule_supply(0, StationId::B, 30);
            assert!(sim.run_until(600_000), "seed {seed} did not finish");

            for station in [StationId::A, StationId::B] {
                let stats = sim.stats(station);
                assert_eq!(stats.misordered, 0, "seed {seed}, {station}: {stats:?}");
                assert!(stats.delivered_in_order(30), "seed {seed}, {station}");
            }
        }
    }

    #[test]
    fn arrivals_keep_send_order() {
        let mut sim = simulator(SimConfig {
            min_latency: 0,
            max_latency: 200,
            seed: 3,
            ..Default::default()
        });
        sim.schedule_supply(0, StationId::A, 12);
        sim.run_until_complete();

        // arrival time of each frame A put on the line
        let arrivals: Vec<u64> = sim
            .link_events
            .iter()
            .filter(|e| e.kind == LinkEventKind::Send && e.station == StationId::A)
            .filter_map(|e| e.latency_ms.map(|l| e.time + l))
            .collect();
        assert!(arrivals.len() >= 12);
        assert!(arrivals.windows(2).all(|w| w[0] <= w[1]), "{arrivals:?}");
    }

    #[test]
    fn same_seed_same_run() {
        let run = || {
            let config = SimConfig {
                loss_rate: 0.2,
                seed: 7,
                ..Default::default()
            };
            let mut sim = simulator(config);
            sim.schedule_supply(0, StationId::A, 10);
            sim.run_until_complete();
            (sim.current_time(), sim.stats(StationId::A).data_frames)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn run_until_stops_at_deadline() {
        let config = SimConfig {
            loss_rate: 1.0,
            ..Default::default()
        };
        let mut sim = simulator(config);
        sim.schedule_supply(0, StationId::A, 1);
        assert!(!sim.run_until(5_000));
        assert!(sim.current_time() <= 5_000);
        assert!(sim.stats(StationId::A).data_frames >= 2);
    }
}
