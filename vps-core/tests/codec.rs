//! Integration tests: framed reassembly over real sockets.

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;

use vps_core::command;
use vps_core::frame::{Frame, MirrorFrame, Region};
use vps_core::{DeviceFrame, FrameCodec, MirrorCodec};

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (client, server)
}

#[tokio::test]
async fn frames_survive_arbitrary_write_fragmentation() {
    let (mut client, server) = socket_pair().await;

    let frames = vec![
        Frame::new(command::CONNECTION_HOST, 1, b"viewer-a".to_vec()),
        Frame::new(command::SCREEN_CAPTURE, 1, Vec::new()),
        Frame::new(command::IMAGE_QUALITY, 1, vec![85]),
        Frame::new(command::LOGCAT_DATA, 9, vec![0x5A; 4096]),
    ];

    let mut wire = Vec::new();
    for f in &frames {
        wire.extend_from_slice(&f.encode());
    }

    // Dribble the stream out in uneven chunks, crossing every frame
    // boundary, with explicit flushes so reads really fragment.
    let writer = tokio::spawn(async move {
        for chunk in wire.chunks(13) {
            client.write_all(chunk).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
        drop(client);
    });

    let mut reader = FramedRead::new(server, FrameCodec::default());
    for expected in &frames {
        let got = reader.next().await.unwrap().unwrap();
        assert_eq!(&got, expected);
    }
    assert!(reader.next().await.is_none());
    writer.await.unwrap();
}

#[tokio::test]
async fn coalesced_single_write_yields_every_frame() {
    let (mut client, server) = socket_pair().await;

    let frames: Vec<Frame> = (1..=5)
        .map(|n| Frame::new(command::ACK, n, vec![n; n as usize * 10]))
        .collect();

    let mut wire = Vec::new();
    for f in &frames {
        wire.extend_from_slice(&f.encode());
    }
    client.write_all(&wire).await.unwrap();
    drop(client);

    let mut reader = FramedRead::new(server, FrameCodec::default());
    let mut decoded = Vec::new();
    while let Some(result) = reader.next().await {
        decoded.push(result.unwrap());
    }
    assert_eq!(decoded, frames);
}

#[tokio::test]
async fn mirror_stream_interleaves_images_and_notifications() {
    let (mut client, server) = socket_pair().await;

    let image = MirrorFrame {
        command: command::DEVICE_PORTRAIT_IMAGE_PORTRAIT,
        device: 3,
        checksum: 1,
        region: Region::new(0, 0, 1080, 1920),
        keyframe: true,
        image: vec![0xFF; 2000],
    };
    let failed = Frame::new(
        command::NXPTC_CAPTURE_FAILED,
        3,
        command::CAPTURE_FAILED_REASON_BROKEN.to_be_bytes().to_vec(),
    );

    let mut wire = Vec::new();
    wire.extend_from_slice(&image.encode());
    wire.extend_from_slice(&failed.encode());
    for chunk in wire.chunks(97) {
        client.write_all(chunk).await.unwrap();
        client.flush().await.unwrap();
        tokio::task::yield_now().await;
    }
    drop(client);

    let mut reader = FramedRead::new(server, MirrorCodec::default());
    match reader.next().await.unwrap().unwrap() {
        DeviceFrame::Mirror(f) => {
            assert_eq!(f, image);
            assert!(f.keyframe);
        }
        other => panic!("expected image, got {other:?}"),
    }
    match reader.next().await.unwrap().unwrap() {
        DeviceFrame::Control(f) => assert_eq!(f, failed),
        other => panic!("expected notification, got {other:?}"),
    }
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn mock_io_reassembles_a_mid_header_split() {
    let frame = Frame::new(command::CONNECTION_HOST, 1, b"viewer".to_vec());
    let wire = frame.encode();
    let (head, tail) = wire.split_at(6);

    let mock = tokio_test::io::Builder::new().read(head).read(tail).build();
    let mut reader = FramedRead::new(mock, FrameCodec::default());
    assert_eq!(reader.next().await.unwrap().unwrap(), frame);
}

#[tokio::test]
async fn out_of_range_device_number_kills_the_stream() {
    let (mut client, server) = socket_pair().await;

    let good = Frame::new(command::ACK, 1, Vec::new());
    let mut bad = good.encode().to_vec();
    bad[7] = 42;

    client.write_all(&good.encode()).await.unwrap();
    client.write_all(&bad).await.unwrap();

    let mut reader = FramedRead::new(server, FrameCodec::default());
    assert_eq!(reader.next().await.unwrap().unwrap(), good);
    assert!(reader.next().await.unwrap().is_err());
}
