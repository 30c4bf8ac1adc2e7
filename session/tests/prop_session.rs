use std::sync::Arc;

use codec::EntityId;
use command::UserCmd;
use proptest::prelude::*;
use repgraph::{ClientId, GraphResult, ReplicationGraph};
use schema::{ClassId, FieldDef, FieldKind, Schema, SchemaRegistry};
use session::{
    ClientConfig, ClientSession, MemoryTransport, PlayerContext, PlayerFactory, ServerConfig,
    ServerContext, Simulation,
};

struct Idle {
    class: ClassId,
}

impl PlayerFactory for Idle {
    fn spawn_player(
        &mut self,
        graph: &mut ReplicationGraph,
        _client: ClientId,
    ) -> GraphResult<EntityId> {
        graph.spawn(self.class)
    }
}

impl Simulation for Idle {
    fn run_command(
        &mut self,
        _graph: &mut ReplicationGraph,
        _player: PlayerContext,
        _cmd: &UserCmd,
    ) -> GraphResult<()> {
        Ok(())
    }
}

fn schema() -> (Arc<Schema>, ClassId) {
    let mut registry = SchemaRegistry::new();
    let class = registry.register_class("player").unwrap();
    registry
        .add_field(class, FieldDef::new("origin", FieldKind::Vec3))
        .unwrap();
    (Arc::new(registry.build()), class)
}

proptest! {
    #[test]
    fn server_survives_arbitrary_datagrams(
        datagrams in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16),
    ) {
        let (schema, class) = schema();
        let mut server = ServerContext::new(ServerConfig::for_testing(), schema).unwrap();
        let mut transport = MemoryTransport::new();
        let mut game = Idle { class };
        let client = server.connect(&mut transport, &mut game).unwrap();

        for bytes in &datagrams {
            server.handle_datagram(&mut transport, &mut game, client, bytes, 1.0);
            server.run_tick(&mut transport, &mut game);
        }
        prop_assert!(server.client_count() <= 1);
    }

    #[test]
    fn client_survives_arbitrary_datagrams(
        datagrams in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16),
    ) {
        let (schema, _) = schema();
        let mut client = ClientSession::new(ClientConfig::for_testing(), schema).unwrap();
        for bytes in &datagrams {
            let _ = client.handle_datagram(bytes, 1.0);
        }
    }
}
