use command::{
    decode_usercmd_batch, encode_usercmd_batch, CommandConfig, CommandQueue, UserCmd,
    UserCmdBatch,
};
use proptest::prelude::*;
use wire::Limits;

fn arb_cmd() -> impl Strategy<Value = UserCmd> {
    (
        any::<u32>(),
        any::<u32>(),
        prop::array::uniform3(-360.0f32..360.0),
        (-450.0f32..450.0, -450.0f32..450.0, -450.0f32..450.0),
        any::<u32>(),
        (any::<u8>(), any::<u8>()),
        (any::<i16>(), any::<i16>()),
    )
        .prop_map(
            |(command_number, tick_count, view_angles, moves, buttons, weapon, mouse)| UserCmd {
                command_number,
                tick_count,
                view_angles,
                forward_move: moves.0,
                side_move: moves.1,
                up_move: moves.2,
                buttons,
                weapon_select: weapon.0,
                weapon_subtype: weapon.1,
                mouse_dx: mouse.0,
                mouse_dy: mouse.1,
            },
        )
}

proptest! {
    #[test]
    fn batches_survive_the_wire(
        commands in prop::collection::vec(arb_cmd(), 1..=62),
        backup in 0usize..4,
    ) {
        let backup_count = backup.min(commands.len() - 1);
        let batch = UserCmdBatch::new(backup_count, commands);
        let config = CommandConfig::default();
        let bytes = encode_usercmd_batch(&batch, &config, &Limits::default()).unwrap();
        let message = wire::decode_message(&bytes, &Limits::default()).unwrap();
        let decoded = decode_usercmd_batch(&message, &config).unwrap();
        prop_assert_eq!(decoded, batch);
    }

    /// With at most two backups and fewer lost commands than the gap fill
    /// limit, every command number between two received batches runs once.
    #[test]
    fn gap_fill_covers_every_lost_tick(last in 1u32..1000, lost in 0u32..20, new in 1usize..4) {
        let mut queue = CommandQueue::new(CommandConfig::default());
        let first: Vec<_> = (1..=last)
            .map(|n| UserCmd { command_number: n, tick_count: n, ..UserCmd::NULL })
            .collect();
        let first_new = first.len();
        queue.receive(0, UserCmdBatch::new(first_new - 1, first), false).unwrap();
        queue.drain(1);

        let newest = last + lost + new as u32;
        let oldest = newest + 1 - (new as u32 + 2).min(newest);
        let commands: Vec<_> = (oldest..=newest)
            .map(|n| UserCmd { command_number: n, tick_count: n, ..UserCmd::NULL })
            .collect();
        let backups = commands.len() - new;
        queue.receive(1, UserCmdBatch::new(backups, commands), false).unwrap();

        let expected_ticks = new + lost as usize;
        prop_assert_eq!(queue.determine_simulation_ticks(), expected_ticks);
        let run = queue.drain(1);
        prop_assert_eq!(run.len(), expected_ticks);
        let ticks: Vec<_> = run.iter().map(|cmd| cmd.tick_count).collect();
        let wanted: Vec<_> = (last + 1..=newest).collect();
        prop_assert_eq!(ticks, wanted);
    }

    #[test]
    fn decoder_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut bytes = 5u16.to_le_bytes().to_vec();
        bytes.extend(body);
        if let Ok(message) = wire::decode_message(&bytes, &Limits::default()) {
            let _ = decode_usercmd_batch(&message, &CommandConfig::default());
        }
    }
}
