use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use changeflow_auth::{Action, Actor, Caller, Resource, Role, decide};
use changeflow_core::{IdentityId, RequestStatus};
use changeflow_infra::EngineConfig;
use changeflow_workflow::{ChangeType, Engine, RequestDraft, RequestQuery, RiskLevel};

fn draft(i: usize) -> RequestDraft {
    RequestDraft {
        title: format!("Upgrade database replica {i}"),
        description: if i % 10 == 0 {
            "Apply the kernel PATCH and reboot".to_string()
        } else {
            "Bump the minor version during the maintenance window".to_string()
        },
        change_type: ChangeType::ALL[i % ChangeType::ALL.len()],
        risk_level: RiskLevel::ALL[i % RiskLevel::ALL.len()],
    }
}

fn seeded_engine(requests: usize) -> (Engine, Caller) {
    let engine = Engine::in_memory(EngineConfig::default()).expect("default config is valid");
    let creator = Caller::from_actor(Actor::new(IdentityId::new(), Role::Employee));
    for i in 0..requests {
        engine.requests.submit(&creator, draft(i)).expect("submit");
    }
    (engine, creator)
}

/// Policy decisions across every role and action against a pending request.
fn bench_policy_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_decide");
    let creator = IdentityId::new();
    let resource = Resource::new(creator, RequestStatus::Pending);
    let actors: Vec<Actor> = Role::ALL.iter().map(|r| Actor::new(IdentityId::new(), *r)).collect();

    group.throughput(Throughput::Elements((actors.len() * Action::ALL.len()) as u64));
    group.bench_function("full_matrix", |b| {
        b.iter(|| {
            let mut allowed = 0usize;
            for actor in &actors {
                for action in Action::ALL.iter() {
                    if decide(black_box(actor), *action, Some(black_box(&resource))).is_allowed() {
                        allowed += 1;
                    }
                }
            }
            black_box(allowed)
        });
    });
    group.finish();
}

/// Submit followed by approve, including both audit appends.
fn bench_submit_and_approve(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_and_approve");
    let (engine, creator) = seeded_engine(0);
    let manager = Caller::from_actor(Actor::new(IdentityId::new(), Role::Manager));

    group.throughput(Throughput::Elements(1));
    group.bench_function("single_request", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            let request = engine.requests.submit(&creator, draft(i)).expect("submit");
            black_box(engine.requests.approve(&manager, request.id_typed()).expect("approve"))
        });
    });
    group.finish();
}

/// Manager listing with a search term over differently sized collections.
fn bench_filtered_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_list");
    let manager = Caller::from_actor(Actor::new(IdentityId::new(), Role::Manager));

    for size in [100usize, 1_000, 5_000] {
        let (engine, _) = seeded_engine(size);
        let query = RequestQuery {
            statuses: vec![RequestStatus::Pending],
            search: Some("patch".to_string()),
            limit: Some(50),
            ..RequestQuery::default()
        };

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("search", size), &query, |b, query| {
            b.iter(|| black_box(engine.requests.list(&manager, query).expect("list")));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_policy_decide,
    bench_submit_and_approve,
    bench_filtered_list
);
criterion_main!(benches);
