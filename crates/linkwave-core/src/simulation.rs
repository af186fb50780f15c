//! Discrete-event link simulation
//!
//! Drives a set of [`Router`] nodes over directional links with a logical
//! clock. Every transmission is degraded by its link's channel immediately
//! and scheduled for arrival `propagation_delay` seconds later; arrivals are
//! processed in time order, and in send order for equal times, so each
//! directional link is FIFO.
//!
//! ## Example
//!
//! ```
//! use linkwave_core::config::{ChannelConfig, LinkConfig};
//! use linkwave_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(LinkConfig::default()).unwrap();
//! sim.add_node(1).unwrap();
//! sim.add_node(2).unwrap();
//! sim.connect(1, 2, &ChannelConfig::ideal()).unwrap();
//!
//! sim.send(1, 2, b"Hello", true).unwrap();
//! sim.run_until(10.0);
//!
//! assert_eq!(sim.deliveries()[0].payload, b"Hello");
//! assert!(sim.node(1).unwrap().endpoint().is_idle());
//! ```

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::debug;

use crate::channel::{build_channel, Degradation};
use crate::config::{ArqConfig, ChannelConfig, LinkConfig, ModemConfig, SimConfig};
use crate::error::{LinkError, Result};
use crate::event::{Action, EventKind, EventSink, SimEvent, Status};
use crate::link::{fragment, Router, RouterOutcome, Transmission, MAX_PAYLOAD_LEN};
use crate::modem::PREAMBLE;
use crate::types::{Address, Sample, SimTime};

/// Interval during which every transmission is lost
///
/// Half-open: a send at `start` is lost, a send at `end` goes through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossWindow {
    pub start: SimTime,
    pub end: SimTime,
}

impl LossWindow {
    pub fn contains(&self, time: SimTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// A message handed to the application at its destination
///
/// `seq` is the sequence number of the message's final fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub time: SimTime,
    pub host: Address,
    pub src: Address,
    pub seq: u8,
    pub payload: Vec<u8>,
}

/// Simulation-wide counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimStats {
    /// Transmission attempts, including losses
    pub transmissions: u64,
    /// Transmissions dropped by a loss window
    pub lost: u64,
    /// Arrivals that did not decode to a valid frame
    pub undecodable: u64,
    /// Frames relayed by intermediate nodes
    pub forwarded: u64,
    /// Frames dropped for lack of a route or link
    pub no_route: u64,
    /// Messages delivered to an application
    pub delivered: u64,
    /// Duplicate DATA frames re-acknowledged
    pub duplicates: u64,
    /// Timeout-driven retransmissions
    pub retransmissions: u64,
    /// Sends given up after the retransmission limit
    pub abandoned: u64,
    /// Seconds of waveform put on links, at the modem sample rate
    pub airtime: f64,
}

impl SimStats {
    /// Fraction of transmission attempts dropped by loss windows
    pub fn loss_rate(&self) -> f64 {
        if self.transmissions == 0 {
            0.0
        } else {
            self.lost as f64 / self.transmissions as f64
        }
    }
}

/// One direction of a connection
#[derive(Debug)]
struct Link {
    channel: Box<dyn Degradation>,
}

/// A degraded waveform in flight
#[derive(Debug)]
struct Arrival {
    time: SimTime,
    order: u64,
    from: Address,
    to: Address,
    waveform: Vec<Sample>,
}

// Min-heap on (time, order)
impl PartialEq for Arrival {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Arrival {}

impl PartialOrd for Arrival {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Arrival {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Link simulator
///
/// Events go to the sink `S`; the default keeps them in a `Vec`.
pub struct Simulation<S = Vec<SimEvent>> {
    modem: ModemConfig,
    arq: ArqConfig,
    config: SimConfig,
    nodes: BTreeMap<Address, Router>,
    links: HashMap<(Address, Address), Link>,
    loss_windows: Vec<LossWindow>,
    queue: BinaryHeap<Arrival>,
    next_order: u64,
    next_stream: u64,
    clock: SimTime,
    next_tick: Option<SimTime>,
    deliveries: Vec<Delivery>,
    stats: SimStats,
    sink: S,
}

impl Simulation<Vec<SimEvent>> {
    /// Create a simulation that collects its events
    pub fn new(config: LinkConfig) -> Result<Self> {
        Self::with_sink(config, Vec::new())
    }

    /// Events recorded so far
    pub fn events(&self) -> &[SimEvent] {
        &self.sink
    }
}

impl<S: EventSink> Simulation<S> {
    /// Create a simulation reporting to `sink`
    ///
    /// Nodes are built from `config.modem` and `config.arq`. `config.channel`
    /// is not applied automatically; pass it to [`connect`](Self::connect).
    pub fn with_sink(config: LinkConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            next_tick: config.simulation.timeout_check_interval,
            modem: config.modem,
            arq: config.arq,
            config: config.simulation,
            nodes: BTreeMap::new(),
            links: HashMap::new(),
            loss_windows: Vec::new(),
            queue: BinaryHeap::new(),
            next_order: 0,
            next_stream: 0,
            clock: 0.0,
            deliveries: Vec::new(),
            stats: SimStats::default(),
            sink,
        })
    }

    /// Current logical time
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Payloads delivered so far, in delivery order
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn node(&self, address: Address) -> Option<&Router> {
        self.nodes.get(&address)
    }

    pub fn node_mut(&mut self, address: Address) -> Option<&mut Router> {
        self.nodes.get_mut(&address)
    }

    /// Node addresses in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.nodes.keys().copied()
    }

    /// Waveforms still in flight
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Add a node with the simulation's modem and ARQ settings
    pub fn add_node(&mut self, address: Address) -> Result<()> {
        if self.nodes.contains_key(&address) {
            return Err(LinkError::Config(format!("node {} already exists", address)));
        }
        let router = Router::new(address, self.modem.clone(), self.arq.clone())?;
        self.nodes.insert(address, router);
        debug!(address, "node added");
        Ok(())
    }

    fn require_node(&self, address: Address) -> Result<()> {
        if self.nodes.contains_key(&address) {
            Ok(())
        } else {
            Err(LinkError::UnknownNode(address))
        }
    }

    /// Connect `a` and `b` in both directions
    ///
    /// Each direction gets its own channel instance and RNG stream.
    pub fn connect(&mut self, a: Address, b: Address, channel: &ChannelConfig) -> Result<()> {
        self.connect_directed(a, b, channel)?;
        self.connect_directed(b, a, channel)
    }

    /// Add a one-way link from `from` to `to`
    pub fn connect_directed(&mut self, from: Address, to: Address, channel: &ChannelConfig) -> Result<()> {
        self.require_node(from)?;
        self.require_node(to)?;
        let link = Link {
            channel: build_channel(channel, self.next_stream)?,
        };
        self.next_stream += 1;
        self.links.insert((from, to), link);
        debug!(from, to, wireless = channel.is_wireless(), "link connected");
        Ok(())
    }

    /// Whether a link from `from` to `to` exists
    pub fn is_connected(&self, from: Address, to: Address) -> bool {
        self.links.contains_key(&(from, to))
    }

    /// Add a static route on `node`
    pub fn add_route(&mut self, node: Address, dst: Address, next_hop: Address) -> Result<()> {
        let router = self
            .nodes
            .get_mut(&node)
            .ok_or(LinkError::UnknownNode(node))?;
        router.add_route(dst, next_hop);
        Ok(())
    }

    /// Drop every transmission sent during `[start, end)`
    pub fn add_loss_window(&mut self, start: SimTime, end: SimTime) -> Result<()> {
        if !(start.is_finite() && end.is_finite() && start <= end) {
            return Err(LinkError::Config(format!(
                "invalid loss window [{}, {})",
                start, end
            )));
        }
        self.loss_windows.push(LossWindow { start, end });
        Ok(())
    }

    pub fn loss_windows(&self) -> &[LossWindow] {
        &self.loss_windows
    }

    fn in_loss_window(&self, time: SimTime) -> bool {
        self.loss_windows.iter().any(|w| w.contains(time))
    }

    /// Send a DATA frame from `from` to `dst` at the current time
    ///
    /// Returns the frame's sequence number. A payload of
    /// [`MAX_PAYLOAD_LEN`] bytes or more would be taken for a message
    /// fragment and is rejected; use [`send_message`](Self::send_message).
    pub fn send(&mut self, from: Address, dst: Address, payload: &[u8], reliable: bool) -> Result<u8> {
        if payload.len() >= MAX_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLong(payload.len()));
        }
        let now = self.clock;
        let router = self
            .nodes
            .get_mut(&from)
            .ok_or(LinkError::UnknownNode(from))?;
        let transmission = router.send(dst, payload, now, reliable);
        let seq = transmission.frame.seq();
        self.forward(from, transmission);
        Ok(seq)
    }

    /// Queue a message of any length from `from` to `dst`
    ///
    /// The message goes out as fragments, each sent when the previous one
    /// is acknowledged. Returns the number of fragments.
    pub fn send_message(&mut self, from: Address, dst: Address, message: &[u8]) -> Result<usize> {
        let now = self.clock;
        let router = self
            .nodes
            .get_mut(&from)
            .ok_or(LinkError::UnknownNode(from))?;
        let fragments = fragment(message).len();
        if let Some(transmission) = router.send_message(dst, message, now) {
            self.forward(from, transmission);
        }
        Ok(fragments)
    }

    /// Next hop from `node` toward `dst`: routing table, then direct link
    pub fn next_hop(&self, node: Address, dst: Address) -> Option<Address> {
        self.nodes
            .get(&node)
            .and_then(|router| router.routes().next_hop(dst))
            .or_else(|| self.is_connected(node, dst).then_some(dst))
    }

    fn forward(&mut self, from: Address, transmission: Transmission) {
        match self.next_hop(from, transmission.frame.dst()) {
            Some(next_hop) => self.transmit(from, next_hop, transmission),
            None => {
                debug!(from, frame = %transmission.frame, "no route or link, dropping");
                self.stats.transmissions += 1;
                self.stats.no_route += 1;
                self.record_send(from, &transmission, Status::Lost);
            }
        }
    }

    fn transmit(&mut self, from: Address, to: Address, transmission: Transmission) {
        let now = self.clock;
        self.stats.transmissions += 1;
        self.stats.airtime += self.airtime(&transmission);

        if self.in_loss_window(now) {
            debug!(from, to, frame = %transmission.frame, time = now, "lost in loss window");
            self.stats.lost += 1;
            self.record_send(from, &transmission, Status::Lost);
            return;
        }

        let Some(link) = self.links.get_mut(&(from, to)) else {
            debug!(from, to, frame = %transmission.frame, "no link to next hop, dropping");
            self.stats.no_route += 1;
            self.record_send(from, &transmission, Status::Lost);
            return;
        };

        let waveform = link.channel.transmit(&transmission.waveform);
        self.queue.push(Arrival {
            time: now + self.config.propagation_delay,
            order: self.next_order,
            from,
            to,
            waveform,
        });
        self.next_order += 1;
        self.record_send(from, &transmission, Status::Success);
    }

    fn airtime(&self, transmission: &Transmission) -> f64 {
        (PREAMBLE.len() + transmission.frame.bit_len()) as f64 * self.modem.bit_duration()
    }

    fn record_send(&mut self, host: Address, transmission: &Transmission, status: Status) {
        let frame = &transmission.frame;
        self.sink.record(SimEvent::new(
            self.clock,
            host,
            Action::Send,
            frame.seq(),
            frame.kind(),
            status,
        ));
    }

    fn deliver(&mut self, arrival: Arrival) {
        let host = arrival.to;
        let outcome = match self.nodes.get_mut(&host) {
            Some(router) => router.receive(&arrival.waveform, self.clock),
            None => return,
        };

        match outcome {
            RouterOutcome::Undecodable => {
                debug!(from = arrival.from, to = host, time = self.clock, "arrival did not decode");
                self.stats.undecodable += 1;
            }
            RouterOutcome::Local(reception) => {
                let Some(frame) = reception.frame else {
                    return;
                };
                self.sink.record(SimEvent::new(
                    self.clock,
                    host,
                    Action::Receive,
                    frame.seq(),
                    frame.kind(),
                    Status::Success,
                ));
                if reception.duplicate {
                    self.stats.duplicates += 1;
                }
                if let Some(payload) = reception.message {
                    self.stats.delivered += 1;
                    self.deliveries.push(Delivery {
                        time: self.clock,
                        host,
                        src: frame.src(),
                        seq: frame.seq(),
                        payload,
                    });
                }
                if let Some(response) = reception.response {
                    self.forward(host, response);
                }
            }
            RouterOutcome::Forward {
                next_hop,
                transmission,
            } => {
                self.stats.forwarded += 1;
                self.transmit(host, next_hop, transmission);
            }
            RouterOutcome::NoRoute(frame) => {
                // Fall back to a direct link to the destination
                let Some(router) = self.nodes.get(&host) else {
                    return;
                };
                let transmission = router.endpoint().transmission(frame);
                if self.is_connected(host, transmission.frame.dst()) {
                    self.stats.forwarded += 1;
                }
                self.forward(host, transmission);
            }
        }
    }

    /// Run the ARQ timeout check on every node at the current time
    ///
    /// Returns the number of retransmissions sent.
    pub fn check_timeouts(&mut self) -> usize {
        let now = self.clock;
        let addresses: Vec<Address> = self.nodes.keys().copied().collect();
        let mut count = 0;

        for address in addresses {
            let Some(router) = self.nodes.get_mut(&address) else {
                continue;
            };
            let resend = router.check_timeouts(now);
            let abandoned = router.endpoint_mut().drain_abandoned();

            for frame in abandoned {
                self.stats.abandoned += 1;
                self.sink.record(SimEvent::new(
                    now,
                    address,
                    Action::Timeout,
                    frame.seq(),
                    EventKind::Event,
                    Status::Lost,
                ));
            }

            for transmission in resend {
                count += 1;
                self.stats.retransmissions += 1;
                self.sink.record(SimEvent::new(
                    now,
                    address,
                    Action::Timeout,
                    transmission.frame.seq(),
                    EventKind::Event,
                    Status::Success,
                ));
                self.forward(address, transmission);
            }

            // A given-up fragment frees the outbox for the next message
            let released = self
                .nodes
                .get_mut(&address)
                .and_then(|router| router.endpoint_mut().poll_outbox(now));
            if let Some(transmission) = released {
                self.forward(address, transmission);
            }
        }
        count
    }

    /// No node has a send awaiting an ACK or a fragment queued
    pub fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.nodes.values().all(|router| router.endpoint().is_idle())
    }

    /// Process the next arrival, moving the clock to its time
    ///
    /// Periodic timeout checks are not run. Returns false when nothing is
    /// in flight.
    pub fn step(&mut self) -> bool {
        match self.queue.pop() {
            Some(arrival) => {
                self.clock = self.clock.max(arrival.time);
                self.deliver(arrival);
                true
            }
            None => false,
        }
    }

    /// Process every arrival and periodic timeout check due at or before `until`
    ///
    /// The clock ends at the time of the last processed event. Once the
    /// simulation is quiescent the remaining ticks are skipped, so
    /// `run_until(f64::INFINITY)` returns as soon as all traffic settles.
    pub fn run_until(&mut self, until: SimTime) {
        loop {
            let arrival_at = self.queue.peek().map(|a| a.time);
            let tick_at = self.next_tick;

            // Arrivals win ties so an ACK lands before the timeout check
            let tick_first = match (tick_at, arrival_at) {
                (Some(tick), Some(arrival)) => tick < arrival,
                (Some(_), None) => true,
                _ => false,
            };

            if tick_first {
                let Some(tick) = tick_at else { break };
                if tick > until {
                    break;
                }
                if self.is_quiescent() {
                    self.skip_idle_ticks(tick, until);
                    break;
                }
                self.clock = self.clock.max(tick);
                self.check_timeouts();
                self.next_tick = self
                    .config
                    .timeout_check_interval
                    .map(|interval| tick + interval);
            } else {
                match arrival_at {
                    Some(time) if time <= until => {
                        self.step();
                    }
                    _ => break,
                }
            }
        }
    }

    /// Move the clock to the last tick at or before `until` without running it
    fn skip_idle_ticks(&mut self, tick: SimTime, until: SimTime) {
        let Some(interval) = self.config.timeout_check_interval else {
            return;
        };
        if !until.is_finite() {
            return;
        }
        let last = tick + ((until - tick) / interval).floor() * interval;
        self.clock = self.clock.max(last);
        self.next_tick = Some(last + interval);
    }

    /// Run until `time` and move the clock there
    pub fn advance_to(&mut self, time: SimTime) {
        self.run_until(time);
        self.clock = self.clock.max(time);
    }
}
