//! # Matching Benchmarks
//!
//! Query-to-registration matching over a populated registration store:
//!
//! | Lookup | Cost |
//! |--------|------|
//! | Shard index | path walk plus candidate filtering |
//! | Full scan | every registration tested |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use databus_member::{
    find_matches, AckHandler, Action, Category, Lookup, Query, QuerySpec, RegFlags,
    RegistrationRequest, RegistrationStore, RequestId, TransactionId,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// `colonies` x 8 interface registrations.
fn populated_store(colonies: usize) -> RegistrationStore {
    let mut store = RegistrationStore::new("bench");
    for c in 0..colonies {
        for i in 0..8 {
            let key = format!("/colony[name=c{}]/bundle-ether[name=be{}]", c, i);
            store
                .register(
                    RegistrationRequest::new(key, RegFlags::PUBLISHER),
                    Arc::new(AckHandler),
                )
                .unwrap();
        }
    }
    store
}

fn query(action: Action, key: String) -> Query {
    Query::from_spec(
        0,
        QuerySpec::new(action, key),
        Category::Any,
        TransactionId(1),
        RequestId(1),
    )
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching-lookup");
    group.measurement_time(Duration::from_secs(5));

    for colonies in [10, 100, 1000] {
        let store = populated_store(colonies);
        let target = rand::thread_rng().gen_range(0..colonies);
        let key = format!("/colony[name=c{}]", target);

        group.throughput(Throughput::Elements((colonies * 8) as u64));
        for (label, lookup) in [("shard", Lookup::Shard), ("scan", Lookup::Scan)] {
            group.bench_with_input(BenchmarkId::new(label, colonies), &key, |b, key| {
                b.iter(|| {
                    let mut q = query(Action::Read, key.clone());
                    black_box(find_matches(&store, &mut q, lookup).unwrap())
                })
            });
        }
    }

    group.finish();
}

fn bench_wildcard_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching-wildcard");
    let store = populated_store(100);

    group.bench_function("read_all_interfaces", |b| {
        b.iter(|| {
            let mut q = query(
                Action::Read,
                "/colony[name=*]/bundle-ether[name=*]".to_string(),
            );
            black_box(find_matches(&store, &mut q, Lookup::Shard).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_wildcard_read);
criterion_main!(benches);
