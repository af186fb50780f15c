//! End-to-end link scenarios
//!
//! These tests drive the public API the way an application would: endpoints
//! over channels, and complete exchanges through the simulation driver.

use linkwave_core::bits::{bit_error_rate, str_to_bits};
use linkwave_core::config::{ArqConfig, ChannelConfig, FadingConfig, LinkConfig, ModemConfig, SimConfig};
use linkwave_core::event::{self, Action, EventKind, SimEvent, Status, TracingSink};
use linkwave_core::link::{Frame, ReliableEndpoint};
use linkwave_core::modem::{Modem, Scheme};
use linkwave_core::{build_channel, Cable, Degradation, HammingCode, Simulation};
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn endpoint(address: u8, scheme: Scheme) -> ReliableEndpoint {
    ReliableEndpoint::new(
        address,
        ModemConfig::default().with_scheme(scheme),
        ArqConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_hello_delivered_and_acknowledged() {
    init_tracing();
    let mut host1 = endpoint(1, Scheme::Ask);
    let mut host2 = endpoint(2, Scheme::Ask);
    let mut forward = Cable::new(ChannelConfig::ideal()).unwrap();
    let mut back = Cable::new(ChannelConfig::ideal()).unwrap();

    let tx = host1.send(2, b"Hello", 0.0, true);
    let rx = host2.receive(&forward.transmit(&tx.waveform), 0.0);

    assert_eq!(rx.delivered.as_deref(), Some(&b"Hello"[..]));
    assert_eq!(rx.frame.as_ref().unwrap().seq(), 0);
    let ack = rx.response.unwrap();
    assert!(ack.frame.is_ack());
    assert_eq!(ack.frame.seq(), 0);

    host1.receive(&back.transmit(&ack.waveform), 0.0);
    assert!(host1.pending().is_empty());
}

#[test]
fn test_ask_bits_through_clean_channel() {
    let modem = Modem::new(ModemConfig::default()).unwrap();
    let mut channel = build_channel(&ChannelConfig::ideal(), 0).unwrap();

    let received = channel.transmit(&modem.modulate(&[1, 0, 1, 1], Scheme::Ask));
    assert_eq!(modem.demodulate(&received, Scheme::Ask), vec![1, 0, 1, 1]);
}

#[test]
fn test_send_in_loss_window_is_retransmitted() {
    let mut host1 = endpoint(1, Scheme::Ask);

    // The first attempt at t=5.0 is dropped by the channel
    let original = host1.send(2, b"Hello", 5.0, true);

    let resent = host1.check_timeouts(9.0);
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].frame.seq(), 0);
    assert_eq!(resent[0].frame.payload(), b"Hello");
    assert_eq!(resent[0].frame, original.frame);
}

#[test]
fn test_loss_window_scenario_through_simulation() {
    init_tracing();
    let mut sim = Simulation::new(LinkConfig::default()).unwrap();
    sim.add_node(1).unwrap();
    sim.add_node(2).unwrap();
    sim.connect(1, 2, &ChannelConfig::ideal()).unwrap();
    sim.add_loss_window(4.0, 6.0).unwrap();

    sim.advance_to(5.0);
    sim.send(1, 2, b"Hello", true).unwrap();
    sim.advance_to(9.0);
    assert_eq!(sim.check_timeouts(), 1);
    sim.run_until(15.0);

    let expected = [
        SimEvent::new(5.0, 1, Action::Send, 0, EventKind::Data, Status::Lost),
        SimEvent::new(9.0, 1, Action::Timeout, 0, EventKind::Event, Status::Success),
        SimEvent::new(9.0, 1, Action::Send, 0, EventKind::Data, Status::Success),
        SimEvent::new(9.5, 2, Action::Receive, 0, EventKind::Data, Status::Success),
        SimEvent::new(9.5, 2, Action::Send, 0, EventKind::Ack, Status::Success),
        SimEvent::new(10.0, 1, Action::Receive, 0, EventKind::Ack, Status::Success),
    ];
    assert_eq!(sim.events(), &expected);
    assert!(sim.node(1).unwrap().endpoint().is_idle());

    let json = event::to_json_lines(sim.events()).unwrap();
    assert_eq!(json.lines().count(), expected.len());
    assert!(json.starts_with(r#"{"time":5.0,"host":1,"action":"Send","seq":0,"type":"DATA","status":"Lost"}"#));
}

#[test]
fn test_every_scheme_over_noisy_link() {
    for scheme in Scheme::ALL {
        let config = LinkConfig {
            modem: ModemConfig::default().with_scheme(scheme),
            simulation: SimConfig::default().with_timeout_check_interval(1.0),
            ..Default::default()
        };
        let channel = ChannelConfig::default()
            .with_attenuation(0.2)
            .with_noise(0.15)
            .with_seed(99);

        let mut sim = Simulation::with_sink(config, TracingSink).unwrap();
        sim.add_node(1).unwrap();
        sim.add_node(2).unwrap();
        sim.connect(1, 2, &channel).unwrap();

        for message in ["first", "second", "third"] {
            sim.send(1, 2, message.as_bytes(), true).unwrap();
        }
        sim.run_until(60.0);

        let payloads: Vec<&[u8]> = sim.deliveries().iter().map(|d| d.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"first"[..], &b"second"[..], &b"third"[..]], "{}", scheme);
        assert!(sim.node(1).unwrap().endpoint().is_idle(), "{}", scheme);
    }
}

#[test]
fn test_three_hop_chain_with_fading() {
    let config = LinkConfig {
        simulation: SimConfig::default().with_timeout_check_interval(0.5),
        ..Default::default()
    };
    let wireless = ChannelConfig::default()
        .with_noise(0.05)
        .with_fading(FadingConfig::default())
        .with_seed(5);

    let mut sim = Simulation::new(config).unwrap();
    for address in 1..=4 {
        sim.add_node(address).unwrap();
    }
    sim.connect(1, 2, &wireless).unwrap();
    sim.connect(2, 3, &wireless).unwrap();
    sim.connect(3, 4, &wireless).unwrap();
    sim.add_route(1, 4, 2).unwrap();
    sim.add_route(2, 4, 3).unwrap();
    sim.add_route(4, 1, 3).unwrap();
    sim.add_route(3, 1, 2).unwrap();

    sim.send(1, 4, b"end to end", true).unwrap();
    sim.run_until(60.0);

    assert_eq!(sim.deliveries().len(), 1);
    assert_eq!(sim.deliveries()[0].host, 4);
    assert_eq!(sim.deliveries()[0].src, 1);
    assert!(sim.node(1).unwrap().endpoint().is_idle());
    assert!(sim.stats().forwarded >= 4);
}

#[test]
fn test_long_message_over_noisy_link() {
    init_tracing();
    let config = LinkConfig {
        simulation: SimConfig::default().with_timeout_check_interval(1.0),
        ..Default::default()
    };
    let channel = ChannelConfig::default()
        .with_attenuation(0.1)
        .with_noise(0.2)
        .with_seed(42);
    let message: Vec<u8> = "The quick brown fox jumps over the lazy dog. "
        .bytes()
        .cycle()
        .take(700)
        .collect();

    let mut sim = Simulation::new(config).unwrap();
    sim.add_node(1).unwrap();
    sim.add_node(2).unwrap();
    sim.connect(1, 2, &channel).unwrap();
    sim.add_loss_window(1.0, 1.5).unwrap();

    assert_eq!(sim.send_message(1, 2, &message).unwrap(), 3);
    sim.run_until(f64::INFINITY);

    assert_eq!(sim.deliveries().len(), 1);
    assert_eq!(sim.deliveries()[0].payload, message);
    assert!(sim.stats().retransmissions >= 1);
    assert!(sim.is_quiescent());
}

#[test]
fn test_hamming_protected_frame() {
    let modem = Modem::new(ModemConfig::default()).unwrap();
    let frame = Frame::data(1, 2, 3, b"protected");
    let (code, padding) = HammingCode::encode(&frame.to_bits());

    let mut channel = Cable::new(ChannelConfig::default().with_noise(0.3).with_seed(8)).unwrap();
    let mut received = modem.demodulate(&channel.transmit(&modem.modulate(&code, Scheme::Ask)), Scheme::Ask);
    assert_eq!(received.len(), code.len());

    // One flipped bit per codeword is still recovered
    for block in received.chunks_mut(HammingCode::CODE_BITS) {
        block[2] ^= 1;
    }
    assert_eq!(Frame::from_bits(&HammingCode::decode(&received, padding)), Some(frame));
}

#[test]
fn test_bit_error_rate_clean_and_lost() {
    let modem = Modem::new(ModemConfig::default()).unwrap();
    // Leading zero byte keeps the first data bit clear of the preamble pattern
    let mut bits = vec![0; 8];
    bits.extend(str_to_bits("The quick brown fox jumps over the lazy dog"));

    let clean = {
        let mut channel = Cable::new(ChannelConfig::default().with_noise(0.1).with_seed(1)).unwrap();
        modem.demodulate(&channel.transmit(&modem.modulate(&bits, Scheme::Bpsk)), Scheme::Bpsk)
    };
    assert_eq!(bit_error_rate(&bits, &clean), 0.0);

    let lost = modem.demodulate(&vec![0.0; 1000], Scheme::Bpsk);
    assert_eq!(bit_error_rate(&bits, &lost), 1.0);
}

#[test]
fn test_config_file_drives_simulation() {
    let path = std::env::temp_dir().join(format!("linkwave-config-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "modem": { "scheme": "FSK" },
            "arq": { "timeout_interval": 2.0 },
            "simulation": { "propagation_delay": 0.25 }
        }"#,
    )
    .unwrap();
    let loaded = LinkConfig::load(&path);
    std::fs::remove_file(&path).ok();
    let config = loaded.unwrap();
    assert_eq!(config.modem.scheme, Scheme::Fsk);

    let mut sim = Simulation::new(config).unwrap();
    sim.add_node(1).unwrap();
    sim.add_node(2).unwrap();
    sim.connect(1, 2, &ChannelConfig::ideal()).unwrap();
    sim.send(1, 2, b"configured", true).unwrap();
    sim.run_until(5.0);

    assert_eq!(sim.deliveries()[0].time, 0.25);
    assert_eq!(sim.clock(), 0.5);
}

#[test]
fn test_invalid_configuration_is_rejected() {
    assert!(Modem::new(ModemConfig::default().with_samples_per_bit(0)).is_err());
    assert!(Cable::new(ChannelConfig::default().with_noise(-0.5)).is_err());
    assert!(ReliableEndpoint::new(1, ModemConfig::default(), ArqConfig::default().with_timeout(-1.0)).is_err());
    assert!(Simulation::new(LinkConfig {
        simulation: SimConfig::default().with_propagation_delay(-1.0),
        ..Default::default()
    })
    .is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_frames_survive_clean_link(
        src in any::<u8>(),
        dst in any::<u8>(),
        scheme in prop_oneof![Just(Scheme::Ask), Just(Scheme::Fsk), Just(Scheme::Bpsk)],
        payload in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut sender = endpoint(src, scheme);
        let mut receiver = endpoint(dst, scheme);
        let mut channel = Cable::new(ChannelConfig::ideal()).unwrap();

        let tx = sender.send(dst, &payload, 0.0, true);
        let rx = receiver.receive(&channel.transmit(&tx.waveform), 0.0);
        prop_assert_eq!(rx.frame, Some(tx.frame));
        prop_assert_eq!(rx.delivered, Some(payload));
    }

    #[test]
    fn prop_duplicates_delivered_once(
        copies in 2usize..5,
        payload in proptest::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut sender = endpoint(1, Scheme::Ask);
        let mut receiver = endpoint(2, Scheme::Ask);
        let tx = sender.send(2, &payload, 0.0, true);

        let mut deliveries = 0;
        let mut acks = 0;
        for i in 0..copies {
            let rx = receiver.receive(&tx.waveform, i as f64);
            deliveries += rx.delivered.is_some() as usize;
            acks += rx.response.is_some() as usize;
        }
        prop_assert_eq!(deliveries, 1);
        prop_assert_eq!(acks, copies);
    }
}
