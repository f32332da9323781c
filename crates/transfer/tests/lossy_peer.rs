//! Client resilience against dropped datagrams.
//!
//! A scripted peer stands in for the daemon and deliberately swallows the
//! first transmission of the write request and of the first data block. The
//! client must retransmit both after its receive timeout and still complete
//! the upload with byte-identical content.

use std::fs;
use std::net::{Ipv4Addr, UdpSocket};
use std::thread;

use bft_checksums::digest;
use bft_crypto::Keying;
use bft_protocol::{DATAGRAM_LEN, Packet};
use bft_transfer::client;

fn recv_from_peer(socket: &UdpSocket) -> (Packet, std::net::SocketAddr) {
    let mut buffer = [0u8; DATAGRAM_LEN];
    let (len, peer) = socket.recv_from(&mut buffer).expect("recv");
    (Packet::parse(&buffer[..len]).expect("parse"), peer)
}

fn send_to_peer(socket: &UdpSocket, peer: std::net::SocketAddr, packet: &Packet) {
    let bytes = packet.to_bytes().expect("encode");
    socket.send_to(&bytes, peer).expect("send");
}

#[test]
fn upload_survives_dropped_request_and_data_datagrams() {
    let content = b"retried block payload".to_vec();

    let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let server_addr = server.local_addr().expect("addr");

    let expected = content.clone();
    let peer_script = thread::spawn(move || {
        let keying = Keying::new();

        // Drop the first WRQ on the floor; the client must retransmit it.
        let (first, _) = recv_from_peer(&server);
        assert!(matches!(first, Packet::WriteRequest { .. }));

        let (second, peer) = recv_from_peer(&server);
        match second {
            Packet::WriteRequest { filename } => assert_eq!(filename, "retry.bin"),
            other => panic!("expected retransmitted WRQ, got {other:?}"),
        }
        send_to_peer(&server, peer, &Packet::Ack { block: 0 });

        // Drop the first DATA(1) as well.
        let (dropped, _) = recv_from_peer(&server);
        assert!(matches!(dropped, Packet::Data { block: 1, .. }));

        let (retried, peer) = recv_from_peer(&server);
        let plaintext = match retried {
            Packet::Data { block: 1, payload } => {
                keying.decrypt_block(&payload).expect("decrypt")
            }
            other => panic!("expected retransmitted DATA(1), got {other:?}"),
        };
        assert_eq!(plaintext, expected);
        send_to_peer(&server, peer, &Packet::Ack { block: 1 });

        let (verify, peer) = recv_from_peer(&server);
        match verify {
            Packet::Verify { digest: announced } => {
                assert_eq!(announced, digest(&expected));
            }
            other => panic!("expected VERIFY, got {other:?}"),
        }
        send_to_peer(&server, peer, &Packet::Ack { block: 0 });
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("retry.bin");
    fs::write(&source, &content).expect("write source");

    client::upload(server_addr, &source).expect("upload despite two drops");
    peer_script.join().expect("peer script");
}
