//! Benchmark workloads for the h2fuzz capture/replay engine.
//!
//! [`fuzz_session`] builds a reproducible mix of frame records shaped
//! like a fuzzing run: mostly DATA and WINDOW_UPDATE traffic with
//! occasional control frames and stream resets.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use h2fuzz_core::{PushPromise, Setting, Settings};
use h2fuzz_replay::FrameRecord;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Build `n` records from `seed`. Same seed, same session.
pub fn fuzz_session(n: usize, seed: u64) -> Vec<FrameRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| random_record(&mut rng)).collect()
}

/// Same as [`fuzz_session`] without `ResetFrame`s, so a replay stays on
/// one connection.
pub fn fuzz_session_without_resets(n: usize, seed: u64) -> Vec<FrameRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(n);
    while records.len() < n {
        let record = random_record(&mut rng);
        if !matches!(record, FrameRecord::ResetFrame { .. }) {
            records.push(record);
        }
    }
    records
}

fn random_bytes(rng: &mut ChaCha8Rng, max_len: usize) -> Vec<u8> {
    let len = rng.random_range(0..=max_len);
    (0..len).map(|_| rng.random()).collect()
}

fn random_record(rng: &mut ChaCha8Rng) -> FrameRecord {
    // Odd client stream IDs.
    let stream_id = rng.random_range(0..64u32) * 2 + 1;
    match rng.random_range(0..100u32) {
        0..=39 => FrameRecord::DataFrame {
            stream_id,
            end_stream: rng.random_bool(0.1),
            data: random_bytes(rng, 1024),
        },
        40..=59 => FrameRecord::WindowUpdateFrame {
            stream_id,
            incr: rng.random_range(1..=i32::MAX as u32),
        },
        60..=69 => FrameRecord::ContinuationFrame {
            stream_id,
            end_stream: rng.random_bool(0.5),
            data: random_bytes(rng, 256),
        },
        70..=77 => FrameRecord::PriorityFrame {
            stream_id,
            stream_dep: rng.random_range(0..stream_id),
            weight: rng.random(),
            exclusive: rng.random_bool(0.2),
        },
        78..=83 => FrameRecord::Ping { data: rng.random() },
        84..=88 => {
            let mut settings = Settings::new();
            for id in 1..=6u16 {
                if rng.random_bool(0.5) {
                    settings.push(Setting::new(id, rng.random()));
                }
            }
            FrameRecord::SettingsFrame { settings }
        }
        89..=92 => FrameRecord::PushPromiseFrame(PushPromise {
            stream_id,
            promise_id: stream_id + 1,
            block_fragment: random_bytes(rng, 128),
            end_headers: rng.random_bool(0.5),
            pad_length: rng.random(),
        }),
        93..=96 => FrameRecord::RawFrame {
            frame_type: rng.random(),
            flags: rng.random(),
            stream_id,
            payload: random_bytes(rng, 64),
        },
        _ => FrameRecord::ResetFrame {
            stream_id,
            error_code: rng.random_range(0..=0xd),
        },
    }
}
