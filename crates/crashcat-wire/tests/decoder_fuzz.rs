// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fuzz-style regression tests for CrashCat packet decoding.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use crashcat_wire::{
    decode_packet, CauseType, Containment, Packet, ReportV1, ReporterData, RiscvMode,
    Riscv64TraceV1, SourceCause, TaskContext, TraceType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn fuzz_decode_never_panics() {
    let iterations = std::env::var("CRASHCAT_FUZZ_ITERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512);
    let mut rng = StdRng::seed_from_u64(0xC4A5_11CA_u64);

    for _ in 0..iterations {
        let mut frame = random_packet(&mut rng).encode().unwrap();
        mutate_frame(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| decode_packet(&frame)));
        let decoded = result.expect("decoder panicked on mutated frame");
        if let Ok((_, consumed)) = decoded {
            assert!(consumed <= frame.len(), "decoder consumed past the input");
        }
    }
}

fn mutate_frame<R: Rng>(rng: &mut R, frame: &mut Vec<u8>) {
    match rng.random_range(0..3) {
        0 => {
            let index = rng.random_range(0..8);
            frame[index] ^= rng.random_range(1..=0xFF);
        }
        1 => {
            let new_len = rng.random_range(0..frame.len());
            frame.truncate(new_len);
        }
        _ => {
            let tail_len = rng.random_range(1..16);
            let mut tail = vec![0u8; tail_len];
            rng.fill_bytes(&mut tail);
            frame.extend_from_slice(&tail);
            let index = rng.random_range(0..frame.len());
            frame[index] = rng.random();
        }
    }
}

fn random_packet<R: Rng>(rng: &mut R) -> Packet {
    match rng.random_range(0..2) {
        0 => Packet::Report(ReportV1 {
            implementer_signature: rng.random(),
            reporter_id: TaskContext::new(rng.random(), rng.random(), RiscvMode::M, 0),
            reporter_data: ReporterData::new(rng.random(), rng.random()),
            source_id: TaskContext::new(rng.random(), rng.random(), RiscvMode::U, 0),
            source_cause: SourceCause::new(CauseType::Panic, Containment::RiscvHart, 0),
            source_pc: rng.random(),
            source_data: rng.random(),
        }),
        _ => {
            let len = rng.random_range(1..32);
            Packet::Riscv64Trace(Riscv64TraceV1 {
                mode: RiscvMode::M,
                trace_type: TraceType::Stack,
                entries: (0..len).map(|_| rng.random()).collect(),
            })
        }
    }
}
