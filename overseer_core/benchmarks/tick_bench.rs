use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use overseer_core::{Hivemind, OverseerConfig, RoomName, RoomSnapshot, SimWorld, StructureKind};

fn colony_world(count: i32) -> SimWorld {
    let mut world = SimWorld::new(1);
    for index in 0..count {
        let name = RoomName::from_coords(-(index * 2) - 2, -2);
        world.insert_room(
            RoomSnapshot::owned(name, 7)
                .with_structure(StructureKind::Spawn, 20, 20)
                .with_structure(StructureKind::Storage, 22, 22)
                .with_energy(5_600, 5_600)
                .with_sources(&[(10, 10), (40, 40)]),
        );
        world.set_role_count(name, "queen", 1);
    }
    world
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for colonies in [1i32, 4, 16, 32] {
        group.bench_with_input(
            BenchmarkId::new("colonies", colonies),
            &colonies,
            |b, &colonies| {
                b.iter_batched(
                    || Hivemind::new(colony_world(colonies), OverseerConfig::builtin()),
                    |mut hivemind| {
                        let _ = hivemind.tick();
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
