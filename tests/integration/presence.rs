use crate::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nodes_discover_each_other() -> Result<()> {
    let (a, b) = pair("alice", "bob").await?;

    let peers = a.node.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].ip, LOCALHOST);
    assert_eq!(peers[0].username, "bob");

    let peers = b.node.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].username, "alice");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_updates_the_existing_peer() -> Result<()> {
    let (a, mut b) = pair("alice", "bob").await?;

    a.node.set_username("alice2").await?;
    assert_eq!(a.node.username(), "alice2");

    let event = b
        .expect("peer update", |e| matches!(e, NetEvent::PeerUpdated { .. }))
        .await?;
    assert_eq!(
        event,
        NetEvent::PeerUpdated {
            ip: LOCALHOST,
            username: "alice2".into()
        }
    );

    let peers = b.node.peers();
    assert_eq!(peers.len(), 1, "rename must not add a second peer");
    assert_eq!(peers[0].username, "alice2");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeated_presence_is_not_a_new_peer() -> Result<()> {
    let (a, mut b) = pair("alice", "bob").await?;

    a.node.broadcast_presence_now().await?;
    a.node.set_username("alice-renamed").await?;

    // The refresh produces no event, so the next peer event is the rename.
    let event = b
        .expect("peer event", |e| {
            matches!(e, NetEvent::PeerOnline { .. } | NetEvent::PeerUpdated { .. })
        })
        .await?;
    assert!(matches!(event, NetEvent::PeerUpdated { .. }), "got {event:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_peer_goes_offline() -> Result<()> {
    let (a, mut b) = pair_with("alice", "bob", 1, 3).await?;

    a.stop();

    let event = b
        .expect("peer offline", |e| matches!(e, NetEvent::PeerOffline { .. }))
        .await?;
    assert_eq!(event, NetEvent::PeerOffline { ip: LOCALHOST });
    assert!(b.node.peers().is_empty());
    Ok(())
}
