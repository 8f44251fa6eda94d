use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use lanchat_core::digest;
use lanchat_core::{Datagram, FileHeader, HeaderReply, VerifyReply};
use lanchat_services::file_transfer::frame::{read_frame, write_frame};
use lanchat_services::{Operation, TransferError, TransferStatus};

use crate::*;

/// A hand-driven peer: a bare UDP socket and TCP listener speaking the
/// wire protocol directly, so a test controls every step.
struct RawPeer {
    udp: UdpSocket,
    listener: TcpListener,
}

impl RawPeer {
    async fn bind() -> Result<Self> {
        Ok(Self {
            udp: UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?,
            listener: TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?,
        })
    }

    fn udp_port(&self) -> u16 {
        self.udp.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    fn tcp_port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    async fn send(&self, datagram: &Datagram, node: &Node) -> Result<()> {
        let dest = SocketAddr::new(LOCALHOST, node.node.udp_port());
        self.udp.send_to(&datagram.encode()?, dest).await?;
        Ok(())
    }

    /// Accept the node's file connection and read its header.
    async fn accept_header(&self) -> Result<(TcpStream, FileHeader)> {
        let (mut stream, _) = tokio::time::timeout(EVENT_TIMEOUT, self.listener.accept())
            .await
            .context("node never connected")??;
        let header: FileHeader = read_frame(&mut stream).await?;
        Ok((stream, header))
    }
}

/// A started node whose partner is `raw`.
async fn node_facing(username: &str, raw: &RawPeer) -> Result<Node> {
    let node = Node::bind(username, 3600, 3600).await?;
    node.node.set_peer_ports(raw.udp_port(), raw.tcp_port());
    node.start();
    Ok(node)
}

/// Connect to `node`'s file port and send a header.
async fn connect_with_header(node: &Node, header: &FileHeader) -> Result<(TcpStream, HeaderReply)> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, node.node.tcp_port())).await?;
    write_frame(&mut stream, header).await?;
    let reply: HeaderReply = read_frame(&mut stream).await?;
    Ok((stream, reply))
}

/// Bind and accept `filename` on `node` for the loopback peer.
async fn arm(node: &Node, filename: &str, dest: &Path) -> Result<()> {
    node.node.set_save_path(filename, dest.to_path_buf());
    node.node
        .respond_to_file_request(filename, LOCALHOST, true)
        .await
}

fn header_for(filename: &str, data: &[u8]) -> FileHeader {
    FileHeader {
        filename: filename.into(),
        size: data.len() as u64,
        digest: digest::to_hex(&md5_of(data)),
    }
}

// ── Rejection ────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_udp_rejection_reaches_sender_once() -> Result<()> {
    let (mut a, mut b) = pair("alice", "bob").await?;
    let src = scratch("reject").join("nope.txt");
    write_pattern(&src, 100);

    a.node.request_file_send(&src, LOCALHOST).await?;
    b.expect("file request", |e| matches!(e, NetEvent::FileRequestIncoming { .. }))
        .await?;
    b.node
        .respond_to_file_request("nope.txt", LOCALHOST, false)
        .await?;

    let event = a
        .expect("rejection", |e| {
            matches!(
                e,
                NetEvent::FileRejected { .. }
                    | NetEvent::FileAccepted { .. }
                    | NetEvent::TransferError { .. }
            )
        })
        .await?;
    assert_eq!(
        event,
        NetEvent::FileRejected {
            filename: "nope.txt".into(),
            sender_name: "bob".into()
        }
    );
    let a = &a;
    eventually("sender forgets the offer", || async move {
        a.node.transfers().is_empty() && a.node.files().outbound_len() == 0
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accept_without_save_path_rejects() -> Result<()> {
    let (mut a, mut b) = pair("alice", "bob").await?;
    let src = scratch("nopath").join("unbound.txt");
    write_pattern(&src, 100);

    a.node.request_file_send(&src, LOCALHOST).await?;
    b.expect("file request", |e| matches!(e, NetEvent::FileRequestIncoming { .. }))
        .await?;

    let err = b
        .node
        .respond_to_file_request("unbound.txt", LOCALHOST, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::NoSavePath(_))
    ));

    a.expect("rejection", |e| matches!(e, NetEvent::FileRejected { .. }))
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_header_stage_rejection_names_the_peer() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let mut a = node_facing("alice", &raw).await?;

    raw.send(&Datagram::presence("carol"), &a).await?;
    a.expect("carol online", |e| matches!(e, NetEvent::PeerOnline { .. }))
        .await?;

    let src = scratch("tcp-reject").join("late.txt");
    write_pattern(&src, 5000);
    a.node.request_file_send(&src, LOCALHOST).await?;
    raw.send(
        &Datagram::FileResponse {
            filename: "late.txt".into(),
            accepted: true,
        },
        &a,
    )
    .await?;

    let (mut stream, header) = raw.accept_header().await?;
    assert_eq!(header.filename, "late.txt");
    assert_eq!(header.size, 5000);
    write_frame(&mut stream, &HeaderReply::Rejected).await?;

    let event = a
        .expect("rejection", |e| {
            matches!(e, NetEvent::FileRejected { .. } | NetEvent::TransferError { .. })
        })
        .await?;
    assert_eq!(
        event,
        NetEvent::FileRejected {
            filename: "late.txt".into(),
            sender_name: "carol".into()
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unarmed_connection_is_refused() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let b = node_facing("bob", &raw).await?;
    let dst = scratch("unarmed").join("sneaky.txt");

    // Bound but never accepted.
    b.node.set_save_path("sneaky.txt", dst.clone());

    let (_stream, reply) = connect_with_header(&b, &header_for("sneaky.txt", b"data")).await?;
    assert_eq!(reply, HeaderReply::Rejected);
    assert!(!dst.exists());
    assert!(b.node.transfers().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_path_traversal_is_refused() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let b = node_facing("bob", &raw).await?;
    let dst = scratch("traversal").join("evil.txt");

    arm(&b, "../evil.txt", &dst).await?;
    let (_stream, reply) = connect_with_header(&b, &header_for("../evil.txt", b"data")).await?;
    assert_eq!(reply, HeaderReply::Rejected);
    assert!(!dst.exists());
    Ok(())
}

// ── Integrity ────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_checksum_mismatch_discards_file() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let mut b = node_facing("bob", &raw).await?;
    let dst = scratch("mismatch").join("corrupt.bin");
    arm(&b, "corrupt.bin", &dst).await?;

    let sent = vec![7u8; 20_000];
    let mut header = header_for("corrupt.bin", &sent);
    header.digest = digest::to_hex(&md5_of(b"something else"));

    let (mut stream, reply) = connect_with_header(&b, &header).await?;
    assert_eq!(reply, HeaderReply::Ready);
    stream.write_all(&sent).await?;
    let verdict: VerifyReply = read_frame(&mut stream).await?;
    assert!(!verdict.md5_match);

    let event = b
        .expect("transfer error", |e| matches!(e, NetEvent::TransferError { .. }))
        .await?;
    assert!(matches!(
        event,
        NetEvent::TransferError { operation: Operation::Receive, ref filename, .. } if filename == "corrupt.bin"
    ));
    eventually("partial file removed", || {
        let dst = dst.clone();
        async move { !dst.exists() }
    })
    .await?;
    assert!(b.node.transfers().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_premature_eof_discards_file() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let mut b = node_facing("bob", &raw).await?;
    let dst = scratch("eof").join("short.bin");
    arm(&b, "short.bin", &dst).await?;

    let full = vec![1u8; 100];
    let (mut stream, reply) = connect_with_header(&b, &header_for("short.bin", &full)).await?;
    assert_eq!(reply, HeaderReply::Ready);
    stream.write_all(&full[..10]).await?;
    drop(stream);

    b.expect("transfer error", |e| matches!(e, NetEvent::TransferError { .. }))
        .await?;
    eventually("partial file removed", || {
        let dst = dst.clone();
        async move { !dst.exists() }
    })
    .await?;
    assert!(b.node.transfers().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_receiver_is_an_error() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let closed_port = {
        let l = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        l.local_addr()?.port()
    };
    let mut a = Node::bind("alice", 3600, 3600).await?;
    a.node.set_peer_ports(raw.udp_port(), closed_port);
    a.start();

    let src = scratch("refused").join("orphan.txt");
    write_pattern(&src, 10);
    a.node.request_file_send(&src, LOCALHOST).await?;
    raw.send(
        &Datagram::FileResponse {
            filename: "orphan.txt".into(),
            accepted: true,
        },
        &a,
    )
    .await?;

    a.expect("transfer error", |e| {
        matches!(e, NetEvent::TransferError { operation: Operation::Send, .. })
    })
    .await?;
    let a = &a;
    eventually("offer cleaned up", || async move {
        a.node.transfers().is_empty() && a.node.files().outbound_len() == 0
    })
    .await
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sender_cancel_stops_stream() -> Result<()> {
    const SIZE: usize = 50_000_000;
    let raw = RawPeer::bind().await?;
    let mut a = node_facing("alice", &raw).await?;
    let src = scratch("cancel-send").join("huge.bin");
    write_pattern(&src, SIZE);

    a.node.request_file_send(&src, LOCALHOST).await?;
    raw.send(
        &Datagram::FileResponse {
            filename: "huge.bin".into(),
            accepted: true,
        },
        &a,
    )
    .await?;
    let (mut stream, _) = raw.accept_header().await?;
    write_frame(&mut stream, &HeaderReply::Ready).await?;

    let mut buf = vec![0u8; 16 * 1024];
    stream.read_exact(&mut buf).await?;
    a.expect("send progress", |e| matches!(e, NetEvent::TransferProgress { .. }))
        .await?;
    assert!(a.node.cancel_transfer("huge.bin"));

    let mut total = buf.len();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => total += n,
        }
    }
    assert!(total < SIZE, "cancel had no effect");

    let event = a
        .expect("outcome", |e| match e {
            NetEvent::TransferStatus { status, .. } => status.is_terminal(),
            NetEvent::TransferComplete { .. } | NetEvent::TransferError { .. } => true,
            _ => false,
        })
        .await?;
    assert_eq!(
        event,
        NetEvent::TransferStatus {
            filename: "huge.bin".into(),
            status: TransferStatus::Cancelled
        }
    );
    let a = &a;
    eventually("no residue", || async move {
        a.node.transfers().is_empty()
            && a.node.files().outbound_len() == 0
            && a.node.files().registry().pending_cancels() == 0
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_receiver_cancel_removes_partial_file() -> Result<()> {
    let raw = RawPeer::bind().await?;
    let mut b = node_facing("bob", &raw).await?;
    let dst = scratch("cancel-recv").join("stream.bin");
    arm(&b, "stream.bin", &dst).await?;

    let header = FileHeader {
        filename: "stream.bin".into(),
        size: 10_000_000,
        digest: digest::to_hex(&[0u8; 16]),
    };
    let (mut stream, reply) = connect_with_header(&b, &header).await?;
    assert_eq!(reply, HeaderReply::Ready);

    let chunk = vec![9u8; 8192];
    for _ in 0..8 {
        stream.write_all(&chunk).await?;
    }
    b.expect("receive progress", |e| matches!(e, NetEvent::TransferProgress { .. }))
        .await?;
    // The sender goes quiet; the reader is parked on the socket.
    assert!(b.node.cancel_transfer("stream.bin"));

    b.expect("cancelled", |e| {
        matches!(e, NetEvent::TransferStatus { status: TransferStatus::Cancelled, .. })
    })
    .await?;
    eventually("partial file removed", || {
        let dst = dst.clone();
        async move { !dst.exists() }
    })
    .await?;
    let b = &b;
    eventually("no residue", || async move {
        b.node.transfers().is_empty() && b.node.files().registry().pending_cancels() == 0
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_before_answer_withdraws_offer() -> Result<()> {
    let (mut a, mut b) = pair("alice", "bob").await?;
    let src = scratch("cancel-wait").join("pending.txt");
    write_pattern(&src, 1000);

    a.node.request_file_send(&src, LOCALHOST).await?;
    b.expect("file request", |e| matches!(e, NetEvent::FileRequestIncoming { .. }))
        .await?;

    assert!(a.node.cancel_transfer("pending.txt"));
    a.expect("cancelled", |e| {
        matches!(e, NetEvent::TransferStatus { status: TransferStatus::Cancelled, .. })
    })
    .await?;
    assert!(a.node.transfers().is_empty());

    // A late acceptance is ignored.
    b.node
        .set_save_path("pending.txt", scratch("cancel-wait-dst").join("pending.txt"));
    b.node
        .respond_to_file_request("pending.txt", LOCALHOST, true)
        .await?;
    let late = tokio::time::timeout(
        Duration::from_millis(500),
        a.expect("acceptance", |e| matches!(e, NetEvent::FileAccepted { .. })),
    )
    .await;
    assert!(late.is_err(), "withdrawn offer was started");

    // Nobody will connect; the armed binding lapses.
    assert!(b.node.files().bindings().is_armed("pending.txt"));
    let b = &b;
    eventually("binding dropped", || async move {
        b.node.files().bindings().is_empty()
    })
    .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_unknown_is_a_no_op() -> Result<()> {
    let (a, _b) = pair("alice", "bob").await?;
    assert!(!a.node.cancel_transfer("never-offered.txt"));
    assert_eq!(a.node.files().registry().pending_cancels(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_offer_is_refused() -> Result<()> {
    let (a, _b) = pair("alice", "bob").await?;
    let src = scratch("dup").join("twice.txt");
    write_pattern(&src, 10);

    a.node.request_file_send(&src, LOCALHOST).await?;
    let err = a
        .node
        .request_file_send(&src, LOCALHOST)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::Duplicate(_))
    ));
    assert_eq!(a.node.transfers().len(), 1);
    Ok(())
}
