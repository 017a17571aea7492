use std::time::Duration;

use arq_lab_abstract::LinkConfig;
use arq_lab_station::{Dispatcher, StationConfig, StationReport};
use tokio::net::UdpSocket;

fn config(packets: u32, bit_error_rate: f64, seed: u64) -> StationConfig {
    StationConfig {
        link: LinkConfig {
            seq_bits: 3,
            packet_len: 32,
            data_timeout_ms: 200,
            ack_timeout_ms: 20,
        },
        packets,
        expect: packets,
        bit_rate: 1_000_000,
        bit_error_rate,
        seed,
        run_for: Duration::from_secs(30),
        linger: Duration::from_millis(600),
    }
}

async fn run_pair(a: StationConfig, b: StationConfig) -> (StationReport, StationReport) {
    let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr_a = sock_a.local_addr().unwrap();
    let addr_b = sock_b.local_addr().unwrap();

    let station_a = Dispatcher::new(a, sock_a, addr_b).unwrap();
    let station_b = Dispatcher::new(b, sock_b, addr_a).unwrap();
    let (ra, rb) = tokio::join!(station_a.run(), station_b.run());
    (ra.unwrap(), rb.unwrap())
}

#[tokio::test]
async fn clean_link_delivers_both_ways() {
    let (a, b) = run_pair(config(20, 0.0, 1), config(20, 0.0, 2)).await;

    for report in [&a, &b] {
        assert_eq!(report.delivered, 20, "{report:?}");
        assert_eq!(report.misordered, 0);
        assert_eq!(report.frames_corrupted, 0);
    }
    assert!(a.data_frames >= 20);
}

#[tokio::test]
async fn noisy_link_recovers() {
    let (a, b) = run_pair(config(30, 2e-4, 7), config(30, 2e-4, 8)).await;

    assert_eq!(a.delivered, 30, "{a:?}");
    assert_eq!(b.delivered, 30, "{b:?}");
    assert_eq!(a.misordered + b.misordered, 0);
}

#[tokio::test]
async fn one_way_transfer_finishes_early() {
    let mut sender = config(10, 0.0, 3);
    sender.expect = 0;
    let mut receiver = config(0, 0.0, 4);
    receiver.expect = 10;

    let (a, b) = run_pair(sender, receiver).await;
    assert_eq!(b.delivered, 10);
    assert_eq!(b.data_frames, 0);
    assert!(a.elapsed_ms < 10_000, "{a:?}");
}
