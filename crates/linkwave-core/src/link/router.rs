//! Static next-hop forwarding
//!
//! A [`Router`] is an endpoint that also relays frames addressed to other
//! nodes. Relaying is regenerative: the frame is fully decoded, checked and
//! re-modulated unchanged for the next hop, so every hop runs the same
//! framing and checksum logic as a direct link. ARQ stays end to end; a
//! router never acknowledges frames it only relays.

use std::collections::HashMap;
use tracing::debug;

use super::endpoint::{Reception, ReliableEndpoint, Transmission};
use super::frame::Frame;
use crate::config::{ArqConfig, ModemConfig};
use crate::error::Result;
use crate::types::{Address, Sample, SimTime};

/// Destination address to next-hop address
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<Address, Address>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the route to `dst`
    pub fn add_route(&mut self, dst: Address, next_hop: Address) -> Option<Address> {
        self.routes.insert(dst, next_hop)
    }

    /// Remove the route to `dst`
    pub fn remove(&mut self, dst: Address) -> Option<Address> {
        self.routes.remove(&dst)
    }

    /// Next hop toward `dst`
    pub fn next_hop(&self, dst: Address) -> Option<Address> {
        self.routes.get(&dst).copied()
    }

    /// All routes as `(dst, next_hop)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.routes.iter().map(|(dst, hop)| (*dst, *hop))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// What a router did with one received waveform
#[derive(Debug, Clone, PartialEq)]
pub enum RouterOutcome {
    /// No valid frame in the waveform
    Undecodable,
    /// Frame addressed to this node, handled by its endpoint
    Local(Reception),
    /// Frame relayed toward `next_hop`
    Forward {
        next_hop: Address,
        transmission: Transmission,
    },
    /// Frame for another node with no routing table entry
    NoRoute(Frame),
}

/// An endpoint plus a static routing table
#[derive(Debug, Clone)]
pub struct Router {
    endpoint: ReliableEndpoint,
    routes: RoutingTable,
    forwarded: u64,
    unrouted: u64,
}

impl Router {
    /// Create a router with an empty routing table
    pub fn new(address: Address, modem: ModemConfig, arq: ArqConfig) -> Result<Self> {
        Ok(Self::from_endpoint(ReliableEndpoint::new(address, modem, arq)?))
    }

    pub fn from_endpoint(endpoint: ReliableEndpoint) -> Self {
        Self {
            endpoint,
            routes: RoutingTable::new(),
            forwarded: 0,
            unrouted: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.endpoint.address()
    }

    pub fn endpoint(&self) -> &ReliableEndpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut ReliableEndpoint {
        &mut self.endpoint
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Route frames for `dst` via `next_hop`
    pub fn add_route(&mut self, dst: Address, next_hop: Address) {
        debug!(address = self.address(), dst, next_hop, "route added");
        self.routes.add_route(dst, next_hop);
    }

    /// Frames relayed so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Frames for other nodes that had no routing table entry
    pub fn unrouted(&self) -> u64 {
        self.unrouted
    }

    /// Originate a DATA frame (see [`ReliableEndpoint::send`])
    pub fn send(&mut self, dst: Address, payload: &[u8], now: SimTime, reliable: bool) -> Transmission {
        self.endpoint.send(dst, payload, now, reliable)
    }

    /// Queue a message of any length (see [`ReliableEndpoint::send_message`])
    pub fn send_message(&mut self, dst: Address, message: &[u8], now: SimTime) -> Option<Transmission> {
        self.endpoint.send_message(dst, message, now)
    }

    /// Run the endpoint's timeout check
    pub fn check_timeouts(&mut self, now: SimTime) -> Vec<Transmission> {
        self.endpoint.check_timeouts(now)
    }

    /// Receive a waveform: handle it locally or relay it
    pub fn receive(&mut self, waveform: &[Sample], now: SimTime) -> RouterOutcome {
        match self.endpoint.decode(waveform) {
            Some(frame) => self.route(frame, now),
            None => RouterOutcome::Undecodable,
        }
    }

    /// Dispatch an already decoded frame
    pub fn route(&mut self, frame: Frame, now: SimTime) -> RouterOutcome {
        if frame.dst() == self.address() {
            return RouterOutcome::Local(self.endpoint.handle_frame(frame, now));
        }

        match self.routes.next_hop(frame.dst()) {
            Some(next_hop) => {
                debug!(address = self.address(), %frame, next_hop, "forwarding");
                self.forwarded += 1;
                RouterOutcome::Forward {
                    next_hop,
                    transmission: self.endpoint.transmission(frame),
                }
            }
            None => {
                debug!(address = self.address(), %frame, "no route");
                self.unrouted += 1;
                RouterOutcome::NoRoute(frame)
            }
        }
    }
}
