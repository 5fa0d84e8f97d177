//! Relay TCP transport against a real socket.

mod common;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use weeclient::protocol::{Decoder, DecoderConfig};
use weeclient::transport::relay::RelayTransport;
use weeclient::{Transport, TransportError, WireValue};

const MAX_FRAME: usize = 1024 * 1024;

#[tokio::test]
async fn test_frame_split_across_writes_is_reassembled() {
    let (listener, address) = common::listener().await;
    let frame = common::listbuffers_frame();
    let expected = frame.clone();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Length prefix split mid-way, then the rest in small pieces
        for chunk in frame.chunks(3) {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    let mut transport = RelayTransport::new(address, MAX_FRAME);
    transport.connect().await.unwrap();
    let received = transport.read_frame().await.unwrap();
    assert_eq!(received.as_ref(), expected.as_slice());

    let message = Decoder::new(DecoderConfig::default())
        .decode(&received)
        .unwrap();
    assert_eq!(message.identifier, "listbuffers");
    match message.object {
        WireValue::Hdata(hdata) => assert_eq!(hdata.rows.len(), 2),
        other => panic!("expected hdata, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn test_back_to_back_frames_stay_separate() {
    let (listener, address) = common::listener().await;
    let first = common::listbuffers_frame();
    let second = common::listlines_frame();
    let mut both = first.clone();
    both.extend_from_slice(&second);

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&both).await.unwrap();
    });

    let mut transport = RelayTransport::new(address, MAX_FRAME);
    transport.connect().await.unwrap();
    assert_eq!(transport.read_frame().await.unwrap().as_ref(), first.as_slice());
    assert_eq!(transport.read_frame().await.unwrap().as_ref(), second.as_slice());
    assert!(matches!(
        transport.read_frame().await,
        Err(TransportError::Closed)
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn test_peer_closing_mid_frame_is_short_read() {
    let (listener, address) = common::listener().await;
    let frame = common::listbuffers_frame();
    let declared = frame.len();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&frame[..10]).await.unwrap();
    });

    let mut transport = RelayTransport::new(address, MAX_FRAME);
    transport.connect().await.unwrap();
    server.await.unwrap();

    match transport.read_frame().await {
        Err(TransportError::ShortRead { expected, received }) => {
            assert_eq!(expected, declared);
            assert_eq!(received, 10);
        }
        other => panic!("expected ShortRead, got {other:?}"),
    }
}

#[tokio::test]
async fn test_commands_reach_the_relay() {
    let (listener, address) = common::listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, _write) = socket.into_split();
        let mut reader = tokio::io::BufReader::new(read);
        common::read_commands(&mut reader, 2).await
    });

    let mut transport = RelayTransport::new(address, MAX_FRAME);
    transport.connect().await.unwrap();
    transport.write(b"sync\n").await.unwrap();
    transport.write(b"quit\n").await.unwrap();

    assert_eq!(server.await.unwrap(), vec!["sync", "quit"]);
    transport.close().await;
}
