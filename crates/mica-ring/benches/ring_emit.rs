use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use mica_ring::{CmdRing, RingTransport};

struct NullTransport;

impl RingTransport for NullTransport {
    fn submit_batch(&mut self, words: &[u32]) {
        black_box(words);
    }
}

fn bench_emit_flush(c: &mut Criterion) {
    const CAPACITY: usize = 16 * 1024;
    const PACKET: [u32; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(CAPACITY as u64));
    group.bench_function("fill_and_flush", |b| {
        let mut ring = CmdRing::new(CAPACITY);
        let mut transport = NullTransport;
        b.iter(|| {
            while ring.require_space(PACKET.len()) {
                ring.emit_all(&PACKET);
            }
            ring.flush(&mut transport);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_emit_flush);
criterion_main!(benches);
