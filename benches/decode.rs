use criterion::{criterion_group, criterion_main, Criterion};
use crashcat::wire::{
    Packet, ReportV1, Riscv64GprStateV1, Riscv64TraceV1, RiscvMode, TraceType,
    IMPLEMENTER_SIGNATURE_LIBOS3,
};
use crashcat::CrashReport;

fn make_dump() -> Vec<u8> {
    let mut report = CrashReport::new(ReportV1 {
        implementer_signature: IMPLEMENTER_SIGNATURE_LIBOS3,
        source_pc: 0x8000_0000,
        ..ReportV1::default()
    });
    report.attach(Packet::Riscv64GprState(Riscv64GprStateV1 {
        mode: RiscvMode::M,
        gpr: [0x1234; 31],
    }));
    report.attach(Packet::Riscv64Trace(Riscv64TraceV1 {
        mode: RiscvMode::M,
        trace_type: TraceType::Stack,
        entries: (0..64).map(|i| 0x8000_0000 + i * 4).collect(),
    }));
    report
        .packets()
        .iter()
        .flat_map(|packet| packet.encode().unwrap_or_default())
        .collect()
}

fn bench_report_decode(c: &mut Criterion) {
    let dump = make_dump();
    c.bench_function("report_decode", |b| {
        b.iter(|| {
            let (report, used) = CrashReport::decode(&dump).unwrap();
            assert_eq!(used, dump.len());
            report.lines()
        });
    });
}

criterion_group!(benches, bench_report_decode);
criterion_main!(benches);
