//! Integration tests for the token ring
//!
//! These tests pass tokens between several peers, both in memory and over
//! real UDP sockets, and check that every peer ends up with the same world.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use peer::config::spawn_world;
use peer::handoff::HostHandoff;
use peer::network::{RingMessage, RingSettings, TokenRing};
use peer::reconcile::ReconciliationEngine;
use peer::world::{ChangeSource, World};
use shared::{Change, Packet, TerrainType, TileGrid, Token};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

const PLAYERS: [u32; 3] = [1, 2, 3];

struct TestPeer {
    world: Arc<RwLock<World>>,
    handoff: HostHandoff,
}

fn test_grid() -> TileGrid {
    TileGrid::parse(
        "............\n\
         ...##.......\n\
         ...##...~~..\n\
         ........~~..\n\
         ............\n\
         ......#.....\n\
         ............\n\
         ............",
    )
    .unwrap()
}

fn test_peer(player: u32) -> TestPeer {
    let world = spawn_world(test_grid(), player, &PLAYERS, 1).unwrap();
    let world = Arc::new(RwLock::new(world));
    let handoff = HostHandoff::new(Arc::clone(&world), ReconciliationEngine::default(), 0);
    TestPeer { world, handoff }
}

async fn advance_all(peers: &[TestPeer], ticks: u32) {
    for peer in peers {
        let mut world = peer.world.write().await;
        for _ in 0..ticks {
            world.advance();
        }
    }
}

async fn layout(peer: &TestPeer) -> Vec<(u32, (u32, u32), u32, Option<u32>)> {
    let world = peer.world.read().await;
    world
        .creatures()
        .map(|c| (c.id, c.position(), c.health as u32, c.attacking))
        .collect()
}

/// HAND-OFF TESTS
mod handoff_tests {
    use super::*;

    /// Three peers take turns; after two laps every peer has applied every order
    #[tokio::test]
    async fn peers_converge_after_full_cycle() {
        let mut peers: Vec<TestPeer> = PLAYERS.iter().map(|&p| test_peer(p)).collect();
        let mut token = Token::new();

        // Lap 1: each peer issues orders for its own creature, then holds the token
        let orders = [(101, 10, 7), (201, 0, 7), (301, 11, 0)];
        for (index, &(creature, x, y)) in orders.iter().enumerate() {
            advance_all(&peers, 1).await;
            let mut world = peers[index].world.write().await;
            world.order_move(creature, x, y);
            if creature == 301 {
                world.order_health(creature, 55.0);
            }
            drop(world);
            token = peers[index].handoff.on_token_received(&token).await;
        }

        // Lap 2: everyone catches up on what the others did
        for peer in peers.iter_mut() {
            token = peer.handoff.on_token_received(&token).await;
        }

        advance_all(&peers, 40).await;

        let reference = layout(&peers[0]).await;
        assert_eq!(reference.len(), 3);
        for peer in &peers[1..] {
            assert_eq!(layout(peer).await, reference);
        }

        let world = peers[1].world.read().await;
        assert_eq!(world.creature(101).unwrap().position(), (10, 7));
        assert_eq!(world.creature(201).unwrap().position(), (0, 7));
        assert_eq!(world.creature(301).unwrap().position(), (11, 0));
        assert_eq!(world.creature(301).unwrap().health as u32, 55);
        assert_eq!(token.len(), 4);
    }

    /// A local change that collides with the token history is dropped
    #[tokio::test]
    async fn conflicting_change_loses_to_token() {
        let mut first = test_peer(1);
        let mut second = test_peer(2);

        for peer in [&first, &second] {
            peer.world.write().await.advance();
        }
        first.world.write().await.order_move(101, 5, 4);
        second.world.write().await.order_health(101, 1.0);

        let token = first.handoff.on_token_received(&Token::new()).await;
        let token = second.handoff.on_token_received(&token).await;

        assert_eq!(token.changes(), &[Change::move_creature(1, 1, 101, 5, 4)]);
        assert_eq!(second.handoff.engine().last_stats().rolled_back, 1);

        let world = second.world.read().await;
        let creature = world.creature(101).unwrap();
        assert_approx_eq!(creature.health, 100.0);
        assert_eq!(creature.path_target().unwrap().position(), (5, 4));
    }

    /// The token a peer hands back is a fresh value; the received one is untouched
    #[test]
    fn received_token_survives_handoff() {
        tokio_test::block_on(async {
            let mut peer = test_peer(1);
            peer.world.write().await.order_attack(101, Some(201));

            let incoming = Token::from_changes(vec![Change::energy(0, 2, 201, 3.0)]);
            let before = incoming.clone();
            let outgoing = peer.handoff.on_token_received(&incoming).await;

            assert_eq!(incoming, before);
            assert_ne!(outgoing, incoming);
            assert_eq!(peer.world.read().await.creature(101).unwrap().attacking, Some(201));
        });
    }

    /// Draining is exactly-once even when a peer holds the token twice in a row
    #[tokio::test]
    async fn local_changes_are_emitted_once() {
        let mut peer = test_peer(1);
        advance_all(std::slice::from_ref(&peer), 2).await;
        peer.world.write().await.order_energy(101, 9.0);

        let token = peer.handoff.on_token_received(&Token::new()).await;
        let token = peer.handoff.on_token_received(&token).await;

        assert_eq!(token.len(), 1);
        assert_eq!(peer.world.write().await.drain_local_changes().len(), 0);
    }
}

/// NETWORK RING TESTS
mod ring_tests {
    use super::*;

    fn settings(player_id: u32, next: std::net::SocketAddr, initiator: bool) -> RingSettings {
        RingSettings {
            player_id,
            next,
            hold: Duration::from_millis(5),
            token_timeout: Duration::from_secs(5),
            initiator,
        }
    }

    /// Two peers circulate the token over UDP and share an order
    #[tokio::test]
    async fn token_circulates_between_two_peers() {
        let socket_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr_a = socket_a.local_addr().unwrap();
        let addr_b = socket_b.local_addr().unwrap();

        let peer_a = test_peer(1);
        let peer_b = test_peer(2);
        {
            let mut world = peer_a.world.write().await;
            for _ in 0..5 {
                world.advance();
            }
            world.order_move(101, 9, 6);
        }
        let world_b = Arc::clone(&peer_b.world);

        let mut ring_a =
            TokenRing::with_socket(socket_a, settings(1, addr_b, true), peer_a.handoff);
        let mut ring_b =
            TokenRing::with_socket(socket_b, settings(2, addr_a, false), peer_b.handoff);
        let control_a = ring_a.control();
        let control_b = ring_b.control();

        let task_a = tokio::spawn(async move {
            ring_a.run().await.unwrap();
            ring_a.tokens_handled()
        });
        let task_b = tokio::spawn(async move {
            ring_b.run().await.unwrap();
            ring_b.tokens_handled()
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        control_a.send(RingMessage::Shutdown).unwrap();
        control_b.send(RingMessage::Shutdown).unwrap();

        let handled_a = task_a.await.unwrap();
        let handled_b = task_b.await.unwrap();
        assert!(handled_a >= 2, "peer A handled {} tokens", handled_a);
        assert!(handled_b >= 2, "peer B handled {} tokens", handled_b);

        let world = world_b.read().await;
        let target = world.creature(101).unwrap().path_target().unwrap();
        assert_eq!(target.position(), (9, 6));
    }

    /// A raw client can inject a token and read the forwarded one
    #[tokio::test]
    async fn forwarded_packet_is_well_formed() {
        let driver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ring_addr = socket.local_addr().unwrap();

        let peer = test_peer(3);
        let mut ring = TokenRing::with_socket(
            socket,
            settings(3, driver.local_addr().unwrap(), false),
            peer.handoff,
        );
        let control = ring.control();
        let task = tokio::spawn(async move { ring.run().await });

        let token = Token::from_changes(vec![Change::health(4, 1, 101, 20.0)]);
        let bytes = serialize(&Packet::token(41, 2, &token)).unwrap();
        driver.send_to(&bytes, ring_addr).await.unwrap();

        let mut buffer = vec![0u8; shared::MAX_PACKET_SIZE];
        let (len, from) =
            tokio::time::timeout(Duration::from_secs(2), driver.recv_from(&mut buffer))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(from, ring_addr);

        match deserialize::<Packet>(&buffer[..len]).unwrap() {
            Packet::Token { sequence, holder, changes } => {
                assert_eq!(sequence, 42);
                assert_eq!(holder, 3);
                assert_eq!(Token::from_records(&changes), token);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert_eq!(peer.world.read().await.creature(101).unwrap().health as u32, 20);

        control.send(RingMessage::Shutdown).unwrap();
        task.await.unwrap().unwrap();
    }
}

/// PATHFINDING INTEGRATION TESTS
mod pathfinding_tests {
    use super::*;
    use shared::PathFinder;
    use std::collections::HashSet;

    /// Every peer computes the same route for the same move
    #[test]
    fn routes_identical_across_independent_grids() {
        let allowed = HashSet::from([TerrainType::Plain, TerrainType::Forest]);
        let routes: Vec<Vec<(u32, u32)>> = (0..3)
            .map(|_| {
                let grid = test_grid();
                let source = grid.tile(0, 0).unwrap();
                let target = grid.tile(11, 7).unwrap();
                PathFinder::new(&grid)
                    .find_path(source, target, &allowed)
                    .iter()
                    .map(|t| t.position())
                    .collect()
            })
            .collect();

        assert!(!routes[0].is_empty());
        assert_eq!(routes[0], routes[1]);
        assert_eq!(routes[1], routes[2]);
    }

    /// Malformed packets never decode into a token
    #[test]
    fn malformed_packet_handling() {
        let token = Token::from_changes(vec![Change::move_creature(1, 1, 101, 2, 2)]);
        let valid_data = serialize(&Packet::token(1, 1, &token)).unwrap();

        let truncated_data = &valid_data[..valid_data.len() / 2];
        let result: Result<Packet, _> = deserialize(truncated_data);
        assert!(result.is_err(), "Should fail to deserialize truncated packet");

        let empty_data: Vec<u8> = vec![];
        let result: Result<Packet, _> = deserialize(&empty_data);
        assert!(result.is_err(), "Should fail to deserialize empty packet");
    }
}
