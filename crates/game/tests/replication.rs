use glam::{Quat, Vec3};

use netsync::net::LoopbackEndpoint;
use netsync::{
    ClientSession, EntityStore, LoopbackNetwork, MovementButton, PeerId, PlayerInputs,
    ServerSession, SessionConfig, Transform,
};

const DT: f32 = 1.0 / 60.0;

struct Match {
    network: LoopbackNetwork,
    server: ServerSession<LoopbackEndpoint>,
    clients: Vec<ClientSession<LoopbackEndpoint>>,
}

impl Match {
    fn new(clients: usize) -> Self {
        let config = SessionConfig::default();
        let network = LoopbackNetwork::new();
        let server = ServerSession::new(network.server(), config.clone());
        let clients = (0..clients)
            .map(|_| ClientSession::new(network.connect(), &config))
            .collect();
        Self {
            network,
            server,
            clients,
        }
    }

    fn frame(&mut self, inputs: &[PlayerInputs]) {
        self.server.update(DT).unwrap();
        for (i, client) in self.clients.iter_mut().enumerate() {
            let input = inputs.get(i).copied().unwrap_or_default();
            client.update(DT, input).unwrap();
        }
    }

    fn run(&mut self, frames: usize, inputs: &[PlayerInputs]) {
        for _ in 0..frames {
            self.frame(inputs);
        }
    }
}

fn walking_forward() -> PlayerInputs {
    let mut inputs = PlayerInputs::default();
    inputs.set_pressed(MovementButton::Forward, true);
    inputs
}

fn assert_mirrors(server: &ServerSession<LoopbackEndpoint>, client: &ClientSession<LoopbackEndpoint>) {
    let server_world = server.world();
    let client_world = client.world();

    for id in server_world.entity_ids() {
        let expected = server_world.transform(id).unwrap();
        let actual = client_world
            .transform(id)
            .unwrap_or_else(|| panic!("client is missing entity {}", id));

        let error = (actual.position - expected.position).abs();
        assert!(error.max_element() < 1.0, "entity {} off by {:?}", id, error);

        let got = actual.orientation.to_array();
        let want = expected.orientation.to_array();
        for i in 0..4 {
            assert!((got[i] - want[i]).abs() <= 1.0 / 127.0 + 1e-5);
        }
    }
}

#[test]
fn test_clients_converge_on_lossless_link() {
    let mut game = Match::new(2);
    let prop = game
        .server
        .world_mut()
        .spawn_prop(Transform::new(Vec3::new(3.0, 0.0, 3.0), Quat::IDENTITY));

    game.run(30, &[]);

    assert_eq!(game.server.roster().occupied_count(), 3);
    for client in &game.clients {
        assert_mirrors(&game.server, client);
        assert!(client.world().get_entity(prop).is_some());
        assert_eq!(client.diagnostics().stale_full, 0);
    }
    assert_eq!(game.clients[0].player_slot(), Some(1));
    assert_eq!(game.clients[1].player_slot(), Some(2));
}

#[test]
fn test_input_moves_remote_player_and_replicates() {
    let mut game = Match::new(1);
    game.run(10, &[]);
    let start = game.server.world().transform(1).unwrap().position;

    game.run(60, &[walking_forward()]);
    game.run(30, &[]);

    let end = game.server.world().transform(1).unwrap().position;
    let travelled = start - end;
    assert!(travelled.z > 3.0, "player moved {:?}", end - start);
    assert!(travelled.x.abs() < 1e-3);
    assert_mirrors(&game.server, &game.clients[0]);
}

#[test]
fn test_convergence_despite_loss() {
    let mut game = Match::new(2);
    let prop = game.server.world_mut().spawn_prop(Transform::default());

    let mut sent = 0u32;
    game.network.set_drop_filter(move |from, _, _| {
        if from != PeerId::SERVER {
            return false;
        }
        sent += 1;
        sent % 3 == 0
    });

    for step in 0..240 {
        let t = step as f32 * DT;
        game.server.world_mut().set_transform(
            prop,
            Transform::new(
                Vec3::new(t.sin() * 20.0, 0.0, t * 4.0),
                Quat::from_rotation_y(t),
            ),
        );
        game.frame(&[walking_forward(), PlayerInputs::default()]);
    }
    assert!(game.network.dropped() > 0);

    game.network.clear_drop_filter();
    game.run(40, &[]);

    for client in &game.clients {
        assert_mirrors(&game.server, client);
        assert!(client.last_accepted_version() > 0);
    }
}

#[test]
fn test_disconnect_vacates_slot_on_other_clients() {
    let mut game = Match::new(2);
    game.run(10, &[]);
    assert!(game.clients[0].world().get_entity(2).is_some());

    game.network.disconnect(PeerId(2));
    game.clients.truncate(1);
    game.run(10, &[]);

    assert!(game.server.world().get_entity(2).is_none());
    assert!(game.clients[0].world().get_entity(2).is_none());
    assert_eq!(game.clients[0].roster().occupied_count(), 2);
}

#[test]
fn test_despawned_prop_leaves_every_client() {
    let mut game = Match::new(2);
    let prop = game.server.world_mut().spawn_prop(Transform::default());
    game.run(30, &[]);
    for client in &game.clients {
        assert!(client.tracked_entities().contains(&prop));
    }

    game.server.world_mut().despawn_entity(prop);
    game.run(30, &[]);

    for client in &game.clients {
        assert!(client.world().get_entity(prop).is_none());
        assert!(!client.tracked_entities().contains(&prop));
        assert_mirrors(&game.server, client);
    }
}
