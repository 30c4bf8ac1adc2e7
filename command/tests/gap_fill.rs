//! Client buffer to server queue over a lossy link.

use command::{
    decode_usercmd_batch, encode_usercmd_batch, CommandBuffer, CommandConfig, CommandQueue,
    UserCmd, UserCmdBatch,
};
use wire::Limits;

fn input(tick: u32) -> UserCmd {
    UserCmd {
        tick_count: tick,
        buttons: tick * 2,
        view_angles: [tick as f32, 0.0, 0.0],
        ..UserCmd::NULL
    }
}

fn transmit(batch: &UserCmdBatch, config: &CommandConfig) -> UserCmdBatch {
    let bytes = encode_usercmd_batch(batch, config, &Limits::default()).unwrap();
    let message = wire::decode_message(&bytes, &Limits::default()).unwrap();
    decode_usercmd_batch(&message, config).unwrap()
}

#[test]
fn single_loss_recovered_in_order() {
    let config = CommandConfig::default();
    let mut client = CommandBuffer::new(&config);
    let mut server = CommandQueue::new(config.clone());
    let mut executed = Vec::new();

    for tick in 1..=10u32 {
        client.push(input(tick));
        let batch = client.take_batch();
        // Every fourth packet is lost.
        if tick % 4 == 0 {
            continue;
        }
        let received = transmit(&batch, &config);
        server.receive(tick as i32, received, false).unwrap();
        executed.extend(server.drain(1).iter().map(|cmd| cmd.command_number));
    }

    assert_eq!(executed, (1..=10).collect::<Vec<_>>());
}

#[test]
fn burst_loss_beyond_backups_replays_last_command() {
    let config = CommandConfig::default();
    let mut client = CommandBuffer::new(&config);
    let mut server = CommandQueue::new(config.clone());

    client.push(input(1));
    let first = transmit(&client.take_batch(), &config);
    server.receive(1, first, false).unwrap();
    server.drain(1);

    for tick in 2..=4u32 {
        client.push(input(tick));
        client.take_batch();
    }
    client.push(input(5));
    let batch = transmit(&client.take_batch(), &config);
    server.receive(5, batch, false).unwrap();

    let run = server.drain(1);
    let numbers: Vec<_> = run.iter().map(|cmd| cmd.command_number).collect();
    // 2 is replayed from command 1, 3 and 4 come from backups.
    assert_eq!(numbers, vec![1, 3, 4, 5]);
    assert_eq!(run[0].tick_count, 2);
    assert_eq!(run[0].buttons, input(1).buttons);
}

#[test]
fn choked_commands_run_in_one_tick() {
    let config = CommandConfig::default();
    let mut client = CommandBuffer::new(&config);
    let mut server = CommandQueue::new(config.clone());

    for tick in 1..=3u32 {
        client.push(input(tick));
        client.choke();
    }
    client.push(input(4));
    let batch = transmit(&client.take_batch(), &config);
    server.receive(1, batch, false).unwrap();

    assert_eq!(server.determine_simulation_ticks(), 4);
    let numbers: Vec<_> = server.drain(1).iter().map(|c| c.command_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}
