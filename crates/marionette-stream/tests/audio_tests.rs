//! Audio stream protocol tests
//!
//! - Handshake and packet sizing against a recording sink
//! - Format rejection and stalled clients
//! - Streamer to server over loopback TCP

use marionette_core::{AudioHeader, ACK_BYTE};
use marionette_stream::{
    AudioServer, AudioServerConfig, AudioSession, AudioStreamer, ChannelMode, MemorySink, PcmClip,
    StreamError,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

fn header(total_samples: u32, packet_size: u32) -> AudioHeader {
    AudioHeader {
        sample_rate: 16_000,
        channels: 1,
        bits_per_sample: 16,
        total_samples,
        packet_size,
    }
}

async fn count_acks<R: AsyncRead + Unpin>(reader: &mut R) -> usize {
    let mut acks = Vec::new();
    reader.read_to_end(&mut acks).await.unwrap();
    assert!(acks.iter().all(|b| *b == ACK_BYTE));
    acks.len()
}

fn spawn_session(
    sink: MemorySink,
    timeout: Option<Duration>,
) -> (DuplexStream, tokio::task::JoinHandle<marionette_stream::Result<marionette_stream::SessionStats>>) {
    let (master, node) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(async move {
        let mut sink = sink;
        AudioSession::new(&mut sink, timeout).run(node).await
    });
    (master, handle)
}

#[tokio::test]
async fn test_three_full_packets() {
    let sink = MemorySink::new();
    let (mut master, session) = spawn_session(sink.clone(), None);

    master.write_all(&header(1500, 500).encode()).await.unwrap();
    for _ in 0..3 {
        master.write_all(&[0x11; 1000]).await.unwrap();
    }

    let stats = session.await.unwrap().unwrap();
    assert_eq!(stats.packets, 3);
    assert_eq!(stats.samples, 1500);
    assert_eq!(count_acks(&mut master).await, 4);

    let recording = sink.last().unwrap();
    assert_eq!(recording.format.mode, ChannelMode::Mono);
    assert_eq!(recording.samples(), 1500);
    assert!(recording.closed);
}

#[tokio::test]
async fn test_last_packet_is_truncated() {
    let sink = MemorySink::new();
    let (mut master, session) = spawn_session(sink.clone(), None);

    master.write_all(&header(1300, 500).encode()).await.unwrap();
    master.write_all(&vec![0u8; 2600]).await.unwrap();

    let stats = session.await.unwrap().unwrap();
    assert_eq!(stats.bytes, 2600);
    assert_eq!(count_acks(&mut master).await, 4);

    let sizes: Vec<usize> = sink.last().unwrap().packets.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1000, 1000, 600]);
}

#[tokio::test]
async fn test_stereo_packet_size() {
    let sink = MemorySink::new();
    let (mut master, session) = spawn_session(sink.clone(), None);

    let stereo = AudioHeader {
        channels: 2,
        ..header(300, 200)
    };
    master.write_all(&stereo.encode()).await.unwrap();
    master.write_all(&vec![0u8; 1200]).await.unwrap();

    session.await.unwrap().unwrap();
    let recording = sink.last().unwrap();
    assert_eq!(recording.format.mode, ChannelMode::Stereo);
    let sizes: Vec<usize> = recording.packets.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![800, 400]);
}

#[tokio::test]
async fn test_unsupported_bit_depth_gets_no_ack() {
    for bits in [12, 24] {
        let sink = MemorySink::new();
        let (mut master, session) = spawn_session(sink.clone(), None);

        let odd = AudioHeader {
            bits_per_sample: bits,
            ..header(100, 50)
        };
        master.write_all(&odd.encode()).await.unwrap();

        let result = session.await.unwrap();
        assert!(matches!(result, Err(StreamError::UnsupportedFormat(_))));
        assert_eq!(count_acks(&mut master).await, 0);
        assert!(sink.recordings().is_empty());
    }
}

#[tokio::test]
async fn test_short_stream_closes_sink() {
    let sink = MemorySink::new();
    let (mut master, session) = spawn_session(sink.clone(), None);

    master.write_all(&header(1000, 500).encode()).await.unwrap();
    master.write_all(&[0u8; 1000]).await.unwrap();
    master.write_all(&[0u8; 10]).await.unwrap();
    master.shutdown().await.unwrap();

    let result = session.await.unwrap();
    assert!(matches!(result, Err(StreamError::ConnectionClosed)));
    let recording = sink.last().unwrap();
    assert_eq!(recording.packets.len(), 1);
    assert!(recording.closed);
}

#[tokio::test]
async fn test_stalled_client_times_out() {
    let sink = MemorySink::new();
    let (mut master, session) = spawn_session(sink, Some(Duration::from_millis(50)));

    master.write_all(&header(1000, 500).encode()).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(StreamError::Timeout)));
}

#[tokio::test]
async fn test_streamer_to_server() {
    let sink = MemorySink::new();
    let config = AudioServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        read_timeout_ms: Some(2_000),
    };
    let server = AudioServer::bind(&config, sink.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.serve(cancel.clone()));

    // 1300 frames at 16 kHz plays in about 81 ms
    let samples: Vec<i16> = (0..1300).map(|i| (i % 200) as i16 - 100).collect();
    let clip = PcmClip::from_i16(samples.clone(), 16_000, 1).unwrap();
    let packets = AudioStreamer::new(500).play(addr, &clip).await.unwrap();
    assert_eq!(packets, 3);

    // Second stream on the same listener
    let packets = AudioStreamer::new(1024).play(addr, &clip).await.unwrap();
    assert_eq!(packets, 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();

    let recordings = sink.recordings();
    assert_eq!(recordings.len(), 2);
    let received: Vec<i16> = recordings[0]
        .packets
        .concat()
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(received, samples);
    assert!(recordings[0].closed);
}

#[tokio::test]
async fn test_hostile_header_only_aborts_session() {
    let sink = MemorySink::new();
    let config = AudioServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        read_timeout_ms: Some(2_000),
    };
    let server = AudioServer::bind(&config, sink.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.serve(cancel.clone()));

    let hostile = [
        AudioHeader {
            sample_rate: 16_000,
            channels: u32::MAX,
            bits_per_sample: 0xFFFF_FFF8,
            total_samples: u32::MAX,
            packet_size: u32::MAX,
        },
        AudioHeader {
            channels: 2,
            bits_per_sample: 32,
            ..header(u32::MAX, u32::MAX)
        },
    ];
    for bad in hostile {
        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(&bad.encode()).await.unwrap();
        // Session is dropped without an ack
        assert_eq!(count_acks(&mut conn).await, 0);
    }
    assert!(!handle.is_finished());

    let clip = PcmClip::from_i16(vec![7; 600], 16_000, 1).unwrap();
    let packets = AudioStreamer::new(300).play(addr, &clip).await.unwrap();
    assert_eq!(packets, 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();

    let recordings = sink.recordings();
    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].samples(), 600);
}

#[tokio::test]
async fn test_streamer_paces_packets() {
    let (master, node) = tokio::io::duplex(64 * 1024);
    let sink = MemorySink::new();
    let session = {
        let mut sink = sink.clone();
        tokio::spawn(async move { AudioSession::new(&mut sink, None).run(node).await })
    };

    // 800 frames at 8 kHz is 100 ms of audio
    let clip = PcmClip::from_i16(vec![0; 800], 8_000, 1).unwrap();
    let start = std::time::Instant::now();
    AudioStreamer::new(400).stream_to(master, &clip).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));

    session.await.unwrap().unwrap();
}
