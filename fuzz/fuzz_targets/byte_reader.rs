#![no_main]

use bytestream::ByteReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = ByteReader::new(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 7;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_u8();
            }
            1 => {
                let _ = reader.read_u16();
            }
            2 => {
                let _ = reader.read_u32();
            }
            3 => {
                let _ = reader.read_f32_array::<3>();
            }
            4 => {
                let len = usize::from(data[idx.saturating_sub(1)] % 32);
                let _ = reader.read_bytes(len);
            }
            5 => {
                let _ = reader.read_string();
            }
            _ => {
                let _ = reader.read_u64();
            }
        }
    }
});
