use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

mod support;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use rxafs::error::codes;
use rxafs::protocol::rx::ServiceHandle;
use rxafs::xdr::rx::{
    packet_type, rx_header, rx_packet, split_into_packets, RX_CLIENT_INITIATED, RX_LAST_PACKET,
};
use rxafs::{new_connection, new_service_host, Rx};

use support::{fast_config, loopback_rx, serving_rx, Echo};

const ECHO_SERVICE: u16 = 9;

async fn echo_server(rx: &Arc<Rx>) -> (Arc<Echo>, ServiceHandle) {
    let echo = Arc::new(Echo::default());
    let handle = new_service_host(rx, 0u32, 0, ECHO_SERVICE, "echo", echo.clone()).unwrap();
    (echo, handle)
}

/// A hand-driven client: raw datagrams in and out.
struct RawClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl RawClient {
    async fn new(server: &Rx) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket, server: SocketAddr::V4(server.local_addr()) }
    }

    fn header(call_number: u32) -> rx_header {
        rx_header {
            epoch: 0x1234_5678,
            cid: 0x40,
            call_number,
            flags: RX_CLIENT_INITIATED,
            service_id: ECHO_SERVICE,
            ..Default::default()
        }
    }

    async fn send(&self, packet: &rx_packet) {
        self.socket.send_to(&packet.to_bytes().unwrap(), self.server).await.unwrap();
    }

    async fn recv(&self) -> rx_packet {
        let mut buf = vec![0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), self.socket.recv_from(&mut buf))
            .await
            .expect("no reply from server")
            .unwrap();
        rx_packet::parse(&buf[..len]).unwrap()
    }

    async fn assert_silent(&self) {
        let mut buf = vec![0u8; 2048];
        let received = timeout(Duration::from_millis(200), self.socket.recv_from(&mut buf)).await;
        assert!(received.is_err(), "unexpected packet from server");
    }
}

fn data(header: rx_header, seq: u32, last: bool, payload: &[u8]) -> rx_packet {
    let flags = header.flags | if last { RX_LAST_PACKET } else { 0 };
    rx_packet {
        header: rx_header { ptype: packet_type::RX_PACKET_TYPE_DATA, seq, flags, ..header },
        payload: payload.to_vec(),
    }
}

#[tokio::test]
async fn single_packet_request_is_echoed() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;

    client.send(&data(RawClient::header(1), 1, true, b"ping")).await;
    let reply = client.recv().await;

    assert_eq!(reply.header.ptype, packet_type::RX_PACKET_TYPE_DATA);
    assert!(!reply.header.is_client_initiated());
    assert!(reply.header.is_last());
    assert_eq!(reply.header.call_number, 1);
    assert_eq!(reply.header.epoch, 0x1234_5678);
    assert_eq!(reply.payload, b"ping");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_request_replays_cached_reply() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;
    let request = data(RawClient::header(1), 1, true, b"once");

    client.send(&request).await;
    let first = client.recv().await;
    client.send(&request).await;
    let second = client.recv().await;

    assert_eq!(first.payload, b"once");
    assert_eq!(second, first);
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn acknowledged_call_is_forgotten() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;
    let request = data(RawClient::header(1), 1, true, b"again");

    client.send(&request).await;
    client.recv().await;
    let ackall = rx_packet {
        header: rx_header { ptype: packet_type::RX_PACKET_TYPE_ACKALL, ..RawClient::header(1) },
        payload: vec![],
    };
    client.send(&ackall).await;
    // Give the receive loop a moment to drop the cached reply.
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.send(&request).await;
    assert_eq!(client.recv().await.payload, b"again");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn out_of_order_request_is_reassembled() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;
    let header = RawClient::header(7);

    client.send(&data(header, 3, true, b"ef")).await;
    client.send(&data(header, 1, false, b"ab")).await;
    client.send(&data(header, 2, false, b"cd")).await;

    assert_eq!(client.recv().await.payload, b"abcdef");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_sequence_number_is_aborted() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;

    client.send(&data(RawClient::header(1), 0, true, b"bad")).await;
    let reply = client.recv().await;

    assert_eq!(reply.header.ptype, packet_type::RX_PACKET_TYPE_ABORT);
    assert_eq!(reply.abort_code().unwrap(), codes::RX_PROTOCOL_ERROR);
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_security_index_is_aborted() {
    let server = serving_rx(fast_config()).await;
    let (_echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;

    let mut request = data(RawClient::header(1), 1, true, b"");
    request.header.security_index = 2;
    client.send(&request).await;

    let reply = client.recv().await;
    assert_eq!(reply.abort_code().unwrap(), codes::RX_INVALID_OPERATION);
}

#[tokio::test]
async fn requests_are_dropped_until_serving() {
    let server = loopback_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;
    let request = data(RawClient::header(1), 1, true, b"early");

    client.send(&request).await;
    client.assert_silent().await;
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);

    server.start_serving(false).await;
    client.send(&request).await;
    assert_eq!(client.recv().await.payload, b"early");
}

#[tokio::test]
async fn replies_from_unregistered_calls_are_ignored() {
    let server = serving_rx(fast_config()).await;
    let client = RawClient::new(&server).await;

    // A server-side packet nobody asked for goes nowhere and is not answered.
    let stray = rx_packet {
        header: rx_header { epoch: server.epoch(), flags: RX_LAST_PACKET, seq: 1, ..RawClient::header(3) },
        payload: b"stray".to_vec(),
    };
    client.send(&stray).await;
    client.assert_silent().await;
}

#[tokio::test]
async fn multi_packet_calls_through_connection() {
    let config = fast_config().with_max_packet_data(8);
    let server = serving_rx(config.clone()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = loopback_rx(config).await;
    let addr = server.local_addr();
    let mut conn = new_connection(&client, *addr.ip(), addr.port(), ECHO_SERVICE).unwrap();

    let body: Vec<u8> = (0..100u8).collect();
    assert_eq!(split_into_packets(&RawClient::header(1), &body, 8).len(), 13);
    assert_eq!(conn.call(&body).await.unwrap(), body);
    assert_eq!(conn.call(&[]).await.unwrap(), Vec::<u8>::new());
    assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
}

/// Polls until the runtime holds `expected` partial calls.
async fn wait_for_partial_calls(rx: &Rx, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while rx.partial_calls() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "holding {} partial calls, expected {}",
            rx.partial_calls(),
            expected
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn idle_partial_calls_are_discarded() {
    let server = serving_rx(fast_config().with_retention(Duration::from_millis(100))).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;

    for call_number in 1..=20 {
        client.send(&data(RawClient::header(call_number), 2, false, b"tail")).await;
    }
    wait_for_partial_calls(&server, 20).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    client.send(&data(RawClient::header(100), 2, false, b"tail")).await;
    wait_for_partial_calls(&server, 1).await;
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn partial_calls_are_capped() {
    let server = serving_rx(fast_config().with_max_partial_calls(4)).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;

    for call_number in 1..=10 {
        client.send(&data(RawClient::header(call_number), 2, false, b"tail")).await;
    }
    wait_for_partial_calls(&server, 4).await;
    client.assert_silent().await;
    assert_eq!(server.partial_calls(), 4);

    // A call already being assembled may still complete.
    client.send(&data(RawClient::header(1), 1, false, b"head-")).await;
    client.send(&data(RawClient::header(1), 3, true, b"!")).await;
    assert_eq!(client.recv().await.payload, b"head-tail!");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn last_flag_below_held_packets_is_aborted() {
    let server = serving_rx(fast_config()).await;
    let (echo, _service) = echo_server(&server).await;
    let client = RawClient::new(&server).await;
    let header = RawClient::header(5);

    client.send(&data(header, 1, false, b"a")).await;
    client.send(&data(header, 4, false, b"d")).await;
    client.send(&data(header, 3, true, b"c")).await;

    let reply = client.recv().await;
    assert_eq!(reply.header.ptype, packet_type::RX_PACKET_TYPE_ABORT);
    assert_eq!(reply.abort_code().unwrap(), codes::RX_PROTOCOL_ERROR);
    wait_for_partial_calls(&server, 0).await;
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
}
