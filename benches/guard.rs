use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use medilink::guard::decide;
use medilink::identity::{machine, AuthState, AuthStatus, Event, Profile, Role};
use medilink::routes;

const PATHS: [&str; 8] = [
    "/",
    "/dashboard",
    "/provider",
    "/provider/patient/p1",
    "/records/",
    "/messages?tab=unread",
    "/schedule",
    "/nowhere",
];

fn bench_guard(c: &mut Criterion) {
    let statuses = [
        ("unauthenticated", AuthStatus::Unauthenticated),
        ("patient", AuthStatus::Authenticated(Role::Patient)),
        ("demo_provider", AuthStatus::DemoActive(Role::Provider)),
    ];
    let mut group = c.benchmark_group("guard");
    group.throughput(Throughput::Elements(PATHS.len() as u64));

    for (name, status) in statuses {
        group.bench_with_input(BenchmarkId::new("lookup_decide", name), &status, |b, &status| {
            b.iter(|| {
                for path in PATHS {
                    if let Some(route) = routes::lookup(path) {
                        criterion::black_box(decide(status, &route.requirement, path));
                    }
                }
            });
        });
    }

    group.bench_function("nav_items", |b| {
        b.iter(|| criterion::black_box(routes::nav_items(Role::Provider, "/patients")));
    });
    group.finish();
}

fn bench_machine(c: &mut Criterion) {
    let demo = AuthState::DemoActive { profile: Profile::demo(Role::Patient) };
    c.bench_function("machine/switch_demo_role", |b| {
        b.iter(|| criterion::black_box(machine::apply(&demo, Event::SwitchDemoRole(Role::Provider))));
    });
    c.bench_function("machine/sign_out", |b| {
        b.iter(|| criterion::black_box(machine::apply(&demo, Event::SignOut)));
    });
}

criterion_group!(benches, bench_guard, bench_machine);
criterion_main!(benches);
