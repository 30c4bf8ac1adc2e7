//! Hooks the server context calls into game code through.

use codec::EntityId;
use command::UserCmd;
use log::warn;
use repgraph::{ClientId, GraphResult, ReplicationGraph};

/// The player a command is run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerContext {
    pub client: ClientId,
    pub entity: EntityId,
    /// Simulation tick of this command.
    pub tick: i32,
}

/// Game simulation driven by the server tick loop.
pub trait Simulation {
    /// Applies one user command to the player's entity.
    fn run_command(
        &mut self,
        graph: &mut ReplicationGraph,
        player: PlayerContext,
        cmd: &UserCmd,
    ) -> GraphResult<()>;

    /// Advances everything not driven by player input. Runs once per tick
    /// after every player's commands.
    fn simulate_world(&mut self, _graph: &mut ReplicationGraph, _tick: i32) -> GraphResult<()> {
        Ok(())
    }
}

/// Creates and destroys the entity each client controls.
pub trait PlayerFactory {
    fn spawn_player(
        &mut self,
        graph: &mut ReplicationGraph,
        client: ClientId,
    ) -> GraphResult<EntityId>;

    fn despawn_player(&mut self, graph: &mut ReplicationGraph, client: ClientId, entity: EntityId) {
        if let Err(err) = graph.remove(entity) {
            warn!("despawning player of client {}: {err}", client.0);
        }
    }
}
