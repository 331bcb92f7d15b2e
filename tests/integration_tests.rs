//! Integration tests for networked multiplayer components
//!
//! These tests validate cross-component interactions: the server tick feeding
//! the client view, and a real client talking to a real server over UDP and
//! HTTP.

use bincode::{deserialize, serialize};
use client::game::ClientGameState;
use client::input::InputManager;
use client::network::Client;
use server::game::GameState;
use server::http::StateServer;
use server::network::{Server, ServerMessage};
use shared::codec::{decode, encode_all, try_decode, UpdateRecord};
use shared::{
    Direction, EntityState, LatencyEstimator, Packet, Snapshot, SnapshotInterpolation, Vec2,
    NO_PROJECTILE, PLAYER_SPEED,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};

const DT: f32 = 1.0 / 60.0;

fn join(game: &mut GameState) -> u32 {
    let id = game.assign_player_id();
    assert!(game.add_player(id));
    id
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests packet serialization round-trip for network protocol validation
    #[test]
    fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::GetPlayerId,
            Packet::PlayerMove {
                direction: Direction::Up,
            },
            Packet::SetPlayerId {
                id: "a".to_string(),
            },
            Packet::PlayersUpdate {
                timestamp: 123456789,
                updates: "0,0,N1,0,-1,-1,5k,dc,".to_string(),
            },
            Packet::Latency { ms: 42 },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();
            assert_eq!(packet, deserialized);
        }
    }

    /// Decoding an encoding gives back the same records, rounding aside.
    #[test]
    fn codec_roundtrip() {
        let records = vec![
            UpdateRecord {
                id: 0,
                dead: false,
                zone_id: "N1".to_string(),
                damaged: false,
                fired_projectile: NO_PROJECTILE,
                hit_projectile: NO_PROJECTILE,
                x: 200,
                y: 480,
            },
            UpdateRecord {
                id: 1_295,
                dead: true,
                zone_id: "C1".to_string(),
                damaged: true,
                fired_projectile: 9,
                hit_projectile: 3,
                x: -17,
                y: 0,
            },
        ];

        let buffer = encode_all(&records);
        assert_eq!(buffer.matches(',').count(), 16);
        assert_eq!(try_decode(&buffer).unwrap(), records);
    }

    #[test]
    fn empty_and_partial_buffers() {
        assert!(decode("").is_empty());
        assert!(try_decode("0,0,N1,").is_err());
    }
}

/// SIMULATION TESTS
mod simulation_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn join_move_and_leave() {
        let mut game = GameState::new();
        let id = join(&mut game);
        assert_eq!(id, 0);
        let start = game.players[&id].position();

        game.set_intent(id, Direction::Right);
        for tick in 0..10 {
            game.step(DT, tick * 16);
        }
        let moved = game.players[&id].position().x - start.x;
        assert_approx_eq!(moved, PLAYER_SPEED * 10.0 * DT, 0.01);

        assert!(game.remove_player(id));
        let out = game.step(DT, 200);
        assert!(out.updates.iter().any(|r| r.id == id && r.dead));

        // The dead id comes back only through assignment and spawn.
        assert_eq!(game.assign_player_id(), id);
        assert!(!game.players[&id].alive);
        assert!(game.add_player(id));
        assert!(game.players[&id].alive);
    }

    #[test]
    fn fire_respects_cooldown() {
        let mut game = GameState::new();
        let id = join(&mut game);
        assert_eq!(game.fire(id, 1_000), Some(0));
        assert_eq!(game.fire(id, 1_100), None);
        assert_eq!(game.fire(id, 1_260), Some(1));
    }

    /// Drives the server tick straight into the client view.
    #[test]
    fn client_follows_warp() {
        let mut game = GameState::new();
        let id = join(&mut game);
        let mut view = ClientGameState::new();
        view.set_local_id(id);

        let out = game.step(DT, 0);
        view.apply_records(&out.updates, 0);
        assert_eq!(view.predictor.as_ref().unwrap().zone_id, "N1");

        game.players
            .get_mut(&id)
            .unwrap()
            .body
            .reset(Vec2::new(1180.0, 480.0));
        game.set_intent(id, Direction::Right);
        view.set_intent(Direction::Right);

        for tick in 1..120u64 {
            let out = game.step(DT, tick * 16);
            view.apply_updates(&encode_all(&out.updates), tick * 16);
            if let Some(snapshot) = out.snapshot {
                view.apply_snapshot(snapshot);
            }
            view.update(DT, tick * 16);
            if game.zones.zone_of(id) == Some("N2") {
                break;
            }
        }

        assert_eq!(game.zones.zone_of(id), Some("N2"));
        let predictor = view.predictor.as_ref().unwrap();
        assert_eq!(predictor.zone_id, "N2");
        // Snapped to the spawn point, then predicted for one frame.
        let spawn = game.zones.spawn_point("N2").unwrap();
        assert_approx_eq!(predictor.position.x, spawn.x + PLAYER_SPEED * DT, 0.01);
    }

    #[test]
    fn interpolation_between_snapshots() {
        let mut interpolation = SnapshotInterpolation::new(100);
        for (id, timestamp, x) in [(0, 1_000, 0.0), (1, 1_100, 10.0)] {
            interpolation.add_snapshot(Snapshot::new(
                id,
                timestamp,
                vec![EntityState {
                    id: 7,
                    zone_id: "N1".to_string(),
                    x,
                    y: 0.0,
                }],
            ));
        }

        for now in [1_101, 1_125, 1_150, 1_199] {
            let x = interpolation.interpolate(now)[&7].x;
            assert!(x > 0.0 && x < 10.0, "x = {} at {}", x, now);
        }
    }

    #[test]
    fn latency_median_ignores_spike() {
        let mut estimator = LatencyEstimator::default();
        for sample in [100, 120, 90, 500, 110] {
            estimator.push_sample(sample);
        }
        assert_eq!(estimator.median(), 110);
    }
}

/// END-TO-END TESTS
mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_joins_and_leaves() {
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(16), 4)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let control = server.control();
        let state = server.shared_state();

        let mut state_server = StateServer::new("127.0.0.1:0");
        state_server.start(server.shared_state()).unwrap();
        let http_addr = format!("127.0.0.1:{}", state_server.actual_port().unwrap());

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let input = InputManager::from_pattern("right:30,left:30", 20).unwrap();
        let mut client = Client::new(&server_addr.to_string(), &http_addr, input)
            .await
            .unwrap();
        client.run(Some(Duration::from_secs(2))).await.unwrap();

        assert_eq!(client.player_id(), Some(0));
        let view = client.game_state();
        assert!(view.players.contains_key(&0));
        assert_eq!(view.predictor.as_ref().unwrap().zone_id, "N1");
        assert!(!view.interpolation.vault.is_empty());

        // The disconnect sent at the end of the run kills the player.
        let dead = timeout(Duration::from_secs(2), async {
            loop {
                let encoded = state.lock().unwrap().clone();
                if decode(&encoded).iter().any(|r| r.id == 0 && r.dead) {
                    return;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(dead.is_ok(), "player 0 was never removed");

        control.send(ServerMessage::Shutdown).unwrap();
    }
}
