//! Integration tests for the bomb party server, client and shared core
//!
//! These tests validate cross-component interactions and real network behavior.

use bincode::{deserialize, serialize};
use client::replica::{ClientWorld, NoopObserver, ReplicaObserver};
use client::trajectory::TrajectoryPredictor;
use glam::Vec3;
use server::game::{Match, MatchEvent};
use server::network::Server;
use shared::config::GameConfig;
use shared::{
    diff, EntityId, FieldChange, LifeStatus, Packet, PlayerCommand, RoundPhase, ThrowType,
    WorldSnapshot, KEYFRAME_INTERVAL, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;
use tokio::time::sleep;

const DT: f32 = 1.0 / 60.0;

fn run(game: &mut Match, seconds: f32) {
    let steps = (seconds / DT).round() as usize;
    for _ in 0..steps {
        game.tick(DT);
    }
}

fn active_match(config: GameConfig, players: u32) -> (Match, Vec<EntityId>) {
    let mut game = Match::new(config, 21);
    let ids: Vec<_> = (0..players)
        .map(|client| game.add_player(client).unwrap())
        .collect();
    run(&mut game, 3.1);
    assert_eq!(game.round().phase(), RoundPhase::Active);
    (game, ids)
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests packet serialization round-trip for network protocol validation
    #[tokio::test]
    async fn packet_serialization_roundtrip() {
        let player = EntityId {
            index: 2,
            generation: 1,
        };
        let test_packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
            },
            Packet::Command {
                sequence: 42,
                timestamp: 123456789,
                command: PlayerCommand::Throw {
                    direction: Vec3::X,
                    throw_type: ThrowType::Lob,
                },
            },
            Packet::Connected {
                client_id: 42,
                player,
                config: GameConfig::default(),
            },
            Packet::Delta {
                base_tick: 9,
                tick: 10,
                changes: vec![
                    FieldChange::RoundPhase(RoundPhase::Active),
                    FieldChange::PlayerLives {
                        id: player,
                        old: 3,
                        new: 2,
                    },
                ],
            },
            Packet::RoundOver {
                winner: Some(player),
            },
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();

            match (&packet, &deserialized) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Command { command: a, .. }, Packet::Command { command: b, .. }) => {
                    assert_eq!(a, b)
                }
                (Packet::Connected { player: a, .. }, Packet::Connected { player: b, .. }) => {
                    assert_eq!(a, b)
                }
                (Packet::Delta { changes: a, .. }, Packet::Delta { changes: b, .. }) => {
                    assert_eq!(a, b)
                }
                (Packet::RoundOver { winner: a }, Packet::RoundOver { winner: b }) => {
                    assert_eq!(a, b)
                }
                (Packet::Disconnected { .. }, Packet::Disconnected { .. }) => {}
                _ => panic!("Packet type mismatch after serialization"),
            }
        }
    }

    /// Tests real UDP socket communication
    #[tokio::test]
    async fn udp_socket_communication() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind server socket");
        let server_addr = server_socket.local_addr().unwrap();

        // Echo server
        let server_socket_clone = server_socket.try_clone().unwrap();
        thread::spawn(move || {
            let mut buf = [0; MAX_PACKET_SIZE];
            if let Ok((size, client_addr)) = server_socket_clone.recv_from(&mut buf) {
                let _ = server_socket_clone.send_to(&buf[..size], client_addr);
            }
        });

        sleep(Duration::from_millis(10)).await;

        let client_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
        client_socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let test_packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        client_socket
            .send_to(&serialize(&test_packet).unwrap(), server_addr)
            .unwrap();

        let mut buf = [0; MAX_PACKET_SIZE];
        let (size, _) = client_socket.recv_from(&mut buf).unwrap();
        match deserialize::<Packet>(&buf[..size]).unwrap() {
            Packet::Connect { client_version } => assert_eq!(client_version, PROTOCOL_VERSION),
            _ => panic!("Wrong packet type received"),
        }
    }
}

/// MATCH FLOW TESTS
mod match_tests {
    use super::*;

    fn fall(game: &mut Match, id: EntityId) {
        if let Some(player) = game.player_mut(id) {
            player.position = Vec3::new(0.0, -10.0, 0.0);
        }
        game.tick(DT);
    }

    /// Drives two players out of the match one life at a time
    #[test]
    fn eliminations_decide_the_winner() {
        let mut config = GameConfig::default();
        config.bomb.fuse_time = 60.0;
        let (mut game, ids) = active_match(config, 3);
        let holder = game.bomb().unwrap().holder().unwrap();
        let victims: Vec<EntityId> = ids.iter().copied().filter(|&id| id != holder).collect();
        game.take_events();

        for (round, &victim) in victims.iter().enumerate() {
            for lives_left in (0..3u32).rev() {
                fall(&mut game, victim);
                if lives_left > 0 {
                    let player = game.player(victim).unwrap();
                    assert_eq!(player.life.current_lives, lives_left);
                    assert_eq!(player.life.state, LifeStatus::Respawning);
                    run(&mut game, 3.1);
                    assert_eq!(game.player(victim).unwrap().life.state, LifeStatus::Alive);
                }
            }

            assert!(game.player(victim).is_none());
            let events = game.take_events();
            assert!(events.contains(&MatchEvent::PlayerEliminated(victim)));

            if round == 0 {
                assert!(game.round().is_game_active());
                assert_eq!(game.round().winner(), None);
            }
        }

        assert_eq!(game.round().winner(), Some(holder));
        assert!(!game.round().is_game_active());

        run(&mut game, 5.1);
        assert!(game.is_finished());
        assert!(game.take_events().contains(&MatchEvent::Shutdown));
    }

    /// The bomb carries its fuse between holders and explodes on schedule
    #[test]
    fn fuse_runs_out_and_bomb_respawns() {
        let mut config = GameConfig::default();
        config.bomb.fuse_time = 2.0;
        let (mut game, _) = active_match(config, 2);

        run(&mut game, 2.1);
        assert!(game.bomb().is_none());
        let record = game.last_explosion().unwrap();
        assert_eq!(record.sequence, 1);

        assert!(game.round().bomb_respawn_pending() || !game.round().is_game_active());

        run(&mut game, 2.1);
        if game.round().is_game_active() {
            assert!(game.bomb().is_some() || game.round().bomb_respawn_pending());
        }
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    #[derive(Default)]
    struct LivesCounter {
        changes: usize,
    }

    impl ReplicaObserver for LivesCounter {
        fn on_lives_changed(&mut self, _id: EntityId, _old: u32, _new: u32) {
            self.changes += 1;
        }
    }

    /// Every tick's delta reproduces the server snapshot on the client
    #[test]
    fn replicated_world_tracks_server_every_tick() {
        let mut config = GameConfig::default();
        config.bomb.fuse_time = 1.5;
        let mut game = Match::new(config.clone(), 5);
        let a = game.add_player(0).unwrap();
        let b = game.add_player(1).unwrap();

        let mut world = ClientWorld::new(config.knockback.clone());
        let mut observer = LivesCounter::default();
        let mut previous = game.snapshot();
        world.apply_snapshot(previous.clone(), &mut observer);

        for step in 0..600u32 {
            match step {
                200 => {
                    game.player_mut(a).unwrap().reset_body(Vec3::new(-0.5, 0.0, 0.0));
                    game.player_mut(b).unwrap().reset_body(Vec3::new(0.5, 0.0, 0.0));
                }
                400 => {
                    if let Some(player) = game.player_mut(b) {
                        player.position = Vec3::new(0.0, -10.0, 0.0);
                    }
                }
                _ => {}
            }
            game.apply_command(
                a,
                PlayerCommand::Move {
                    x: (step as f32 * 0.05).sin(),
                    z: (step as f32 * 0.05).cos(),
                    jump: step % 90 == 0,
                },
            );
            game.tick(DT);

            let next = game.snapshot();
            if next.tick % KEYFRAME_INTERVAL == 0 {
                world.apply_snapshot(next.clone(), &mut observer);
            } else {
                let changes = diff(&previous, &next);
                assert!(world.apply_delta(previous.tick, next.tick, &changes, &mut observer));
            }
            assert_eq!(world.snapshot(), &next, "diverged at tick {}", next.tick);
            previous = next;
        }

        assert!(world.snapshot().last_explosion.is_some());
        assert!(observer.changes >= 1);
    }

    /// The aim preview matches the authoritative flight until the first landing
    #[test]
    fn preview_matches_server_flight() {
        let (mut game, ids) = active_match(GameConfig::default(), 2);
        let holder = game.bomb().unwrap().holder().unwrap();
        let other = *ids.iter().find(|&&id| id != holder).unwrap();

        game.player_mut(holder).unwrap().reset_body(Vec3::ZERO);
        game.player_mut(other).unwrap().reset_body(Vec3::new(-10.0, 0.0, 10.0));
        game.tick(DT);

        let start = game.bomb().unwrap().position();
        let config = game.config().clone();
        let prediction = TrajectoryPredictor::new(config.arena, config.bomb)
            .predict(start, Vec3::X, ThrowType::Normal);

        game.apply_command(
            holder,
            PlayerCommand::Throw {
                direction: Vec3::X,
                throw_type: ThrowType::Normal,
            },
        );
        for frame in 1..=20 {
            game.tick(DT);
            let actual = game.bomb().unwrap().position();
            let predicted = prediction.points[frame];
            assert!(
                actual.distance(predicted) < 1e-4,
                "frame {}: server {:?}, preview {:?}",
                frame,
                actual,
                predicted
            );
        }
    }

    async fn recv_packet(socket: &tokio::net::UdpSocket) -> Option<Packet> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let received = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .ok()?
            .ok()?;
        deserialize(&buffer[..received.0]).ok()
    }

    async fn new_server(config: GameConfig) -> Server {
        Server::new("127.0.0.1:0", Duration::from_millis(10), 4, config, 3)
        .await
        .unwrap()
    }

    /// Tests the handshake and state stream over a real socket
    #[tokio::test]
    async fn udp_client_joins_and_follows_deltas() {
        let mut rules_sent = GameConfig::default();
        rules_sent.bomb.normal_throw.speed = 18.0;
        rules_sent.knockback.base_distance = 9.0;
        let mut server = new_server(rules_sent.clone()).await;
        let server_addr = server.local_addr().unwrap();

        let client = async {
            let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let connect = Packet::Connect {
                client_version: PROTOCOL_VERSION,
            };
            socket
                .send_to(&serialize(&connect).unwrap(), server_addr)
                .await
                .unwrap();

            let mut world = ClientWorld::new(GameConfig::default().knockback);
            let mut rules = None;
            let mut player = None;
            let mut applied = 0;

            for _ in 0..60 {
                match recv_packet(&socket).await {
                    Some(Packet::Connected {
                        player: id, config, ..
                    }) => {
                        world.set_knockback(config.knockback.clone());
                        rules = Some(config);
                        player = Some(id);
                    }
                    Some(Packet::Snapshot { snapshot }) => {
                        world.apply_snapshot(snapshot, &mut NoopObserver)
                    }
                    Some(Packet::Delta {
                        base_tick,
                        tick,
                        changes,
                    }) => {
                        if world.apply_delta(base_tick, tick, &changes, &mut NoopObserver) {
                            applied += 1;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            (player, rules, world.snapshot().clone(), applied)
        };

        let (player, rules, snapshot, applied): (
            Option<EntityId>,
            Option<GameConfig>,
            WorldSnapshot,
            usize,
        ) = tokio::select! {
            result = client => result,
            _ = server.run() => panic!("server stopped early"),
        };

        let player = player.expect("no Connected packet");
        assert_eq!(rules.as_ref(), Some(&rules_sent));
        assert!(snapshot.player(player).is_some());
        assert_eq!(snapshot.round_phase, RoundPhase::Lobby);
        assert!(applied > 0);
    }

    /// Tests that a client with the wrong protocol version is turned away
    #[tokio::test]
    async fn udp_version_mismatch_is_rejected() {
        let mut server = new_server(GameConfig::default()).await;
        let server_addr = server.local_addr().unwrap();

        let client = async {
            let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let connect = Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
            };
            socket
                .send_to(&serialize(&connect).unwrap(), server_addr)
                .await
                .unwrap();
            recv_packet(&socket).await
        };

        let reply = tokio::select! {
            result = client => result,
            _ = server.run() => panic!("server stopped early"),
        };

        match reply {
            Some(Packet::Disconnected { reason }) => assert_eq!(reason, "Protocol version mismatch"),
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert!(server.game().players().is_empty());
    }
}
