use std::net::UdpSocket;

use lanchat_core::Datagram;

use crate::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_reaches_peer() -> Result<()> {
    let (a, mut b) = pair("alice", "bob").await?;

    a.node.send_message("hello bob", LOCALHOST).await?;

    let event = b
        .expect("message", |e| matches!(e, NetEvent::MessageReceived { .. }))
        .await?;
    assert_eq!(
        event,
        NetEvent::MessageReceived {
            sender: LOCALHOST,
            text: "hello bob".into()
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unicode_message_survives() -> Result<()> {
    let (a, mut b) = pair("alice", "bob").await?;

    let text = "héllo 🌍 \"quoted\"\nline two";
    a.node.send_message(text, LOCALHOST).await?;

    let event = b
        .expect("message", |e| matches!(e, NetEvent::MessageReceived { .. }))
        .await?;
    assert!(matches!(event, NetEvent::MessageReceived { text: t, .. } if t == text));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_foreign_and_malformed_datagrams_are_ignored() -> Result<()> {
    let (_a, mut b) = pair("alice", "bob").await?;
    let target = (Ipv4Addr::LOCALHOST, b.node.udp_port());

    let raw = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    raw.send_to(br#"{"app":"someone-else","type":"message","content":"x"}"#, target)?;
    raw.send_to(br#"{"app":"lanchat","type":"teleport"}"#, target)?;
    raw.send_to(b"\x00\x01 not json", target)?;
    raw.send_to(
        &Datagram::Message {
            content: "real".into(),
        }
        .encode()?,
        target,
    )?;

    let event = b
        .expect("message", |e| matches!(e, NetEvent::MessageReceived { .. }))
        .await?;
    assert!(matches!(event, NetEvent::MessageReceived { text, .. } if text == "real"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_message_is_refused() -> Result<()> {
    let (a, _b) = pair("alice", "bob").await?;
    let text = "x".repeat(70_000);
    assert!(a.node.send_message(&text, LOCALHOST).await.is_err());
    Ok(())
}
