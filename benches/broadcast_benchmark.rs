use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use signal_relay::relay::{ConnectionId, OutboundMessage, RegistryHandle};

const OFFER: &str = r#"{"type":"offer","sdp":"v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n"}"#;

/// register `peers` connections and return their receivers
fn setup(
    rt: &Runtime,
    peers: usize,
) -> (RegistryHandle, ConnectionId, Vec<mpsc::Receiver<OutboundMessage>>) {
    rt.block_on(async {
        let registry = RegistryHandle::spawn(1024);
        let mut receivers = Vec::with_capacity(peers);
        let mut first = None;
        for _ in 0..peers {
            let (tx, rx) = mpsc::channel(16);
            let id = ConnectionId::next();
            registry.open(id, tx).await.unwrap();
            first.get_or_insert(id);
            receivers.push(rx);
        }
        (registry, first.unwrap(), receivers)
    })
}

/// fan-out benchmark
fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("Broadcast");

    for peers in [2usize, 10, 100] {
        let (registry, sender, mut receivers) = setup(&rt, peers);
        group.throughput(Throughput::Elements((peers - 1) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(peers), &peers, |b, _| {
            b.iter(|| {
                let report = rt
                    .block_on(registry.broadcast(sender, OutboundMessage::text(black_box(OFFER))))
                    .unwrap();
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
                black_box(report)
            })
        });
    }

    group.finish();
}

/// open/close cycle benchmark
fn bench_membership(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = rt.block_on(async { RegistryHandle::spawn(1024) });

    let mut group = c.benchmark_group("Membership");
    group.throughput(Throughput::Elements(1));

    group.bench_function("open_close", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, _rx) = mpsc::channel(1);
                let id = ConnectionId::next();
                registry.open(id, tx).await.unwrap();
                black_box(registry.close(id).await.unwrap())
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast, bench_membership);
criterion_main!(benches);
