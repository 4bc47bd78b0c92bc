//! Consensus benchmarks.
//!
//! Measures poll processing for Snowball, the transaction conflict
//! graph, and chain voting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use glacier_consensus::{Block, Parameters, Snowball, Snowman, Status, Tx};
use glacier_ids::Id;
use glacier_utils::Bag;

fn make_id(n: u64) -> Id {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    Id::from_bytes(bytes)
}

fn params() -> Parameters {
    Parameters::default()
}

struct BenchTx {
    id: Id,
    inputs: Vec<Id>,
}

impl Tx for BenchTx {
    fn id(&self) -> Id {
        self.id
    }

    fn input_ids(&self) -> Vec<Id> {
        self.inputs.clone()
    }
}

struct BenchBlock {
    id: Id,
    parent: Id,
    height: u64,
}

impl Block for BenchBlock {
    fn id(&self) -> Id {
        self.id
    }

    fn parent(&self) -> Id {
        self.parent
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
    }
}

fn bench_snowball_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("snowball_record_poll");
    for choices in [2usize, 8, 32] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(choices),
            &choices,
            |b, &choices| {
                let mut sb = Snowball::new(params()).unwrap();
                for i in 0..choices as u64 {
                    sb.add_choice(make_id(i)).unwrap();
                }
                // Split votes keep the instance unfinalized forever.
                let mut votes = Bag::new();
                votes.add_count(make_id(0), 10);
                votes.add_count(make_id(1), 10);

                b.iter(|| sb.record_poll(black_box(&votes)));
            },
        );
    }
    group.finish();
}

fn bench_directed_poll(c: &mut Criterion) {
    use glacier_consensus::Directed;

    let mut group = c.benchmark_group("directed_record_poll");
    for txs in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(txs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(txs), &txs, |b, &txs| {
            let mut dag = Directed::new(params()).unwrap();
            let mut votes = Bag::new();
            for i in 0..txs as u64 {
                // Pairwise conflicts: tx 2i and 2i+1 share an input.
                let tx = BenchTx {
                    id: make_id(i),
                    inputs: vec![make_id(1_000_000 + i / 2)],
                };
                dag.add(&tx).unwrap();
                // Below alpha: confidence churns but nothing decides.
                votes.add_count(make_id(i), 3);
            }
            b.iter(|| dag.record_poll(black_box(&votes)).unwrap());
        });
    }
    group.finish();
}

fn bench_snowman_fork(c: &mut Criterion) {
    c.bench_function("snowman_fork_resolution", |b| {
        b.iter_batched(
            || {
                let mut chain = Snowman::new(params()).unwrap();
                chain.set_genesis(make_id(0), 0).unwrap();
                for i in 1..=8u64 {
                    chain
                        .add_block(&BenchBlock {
                            id: make_id(i),
                            parent: make_id(0),
                            height: 1,
                        })
                        .unwrap();
                }
                let mut votes = Bag::new();
                votes.add_count(make_id(1), 20);
                (chain, votes)
            },
            |(mut chain, votes)| {
                while chain.status(&make_id(1)) != Status::Accepted {
                    chain.record_poll(black_box(&votes)).unwrap();
                }
                chain
            },
            criterion::BatchSize::SmallBatch,
        );
    });
}

criterion_group!(
    benches,
    bench_snowball_poll,
    bench_directed_poll,
    bench_snowman_fork
);
criterion_main!(benches);
