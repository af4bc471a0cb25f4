use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tenantnotes_auth::{AccessRequest, PolicyGate, PolicyTable, RuleTablePolicy};
use tenantnotes_core::{OrganizationId, UserId};

/// Table with `n` tenant-specific rules ahead of the catch-all rules, so a
/// request for the last tenant walks the whole table.
fn table_with_tenants(n: usize) -> PolicyTable {
    let mut text = String::new();
    for i in 0..n {
        text.push_str(&format!("p, editor, org{i}, /api/notes*, GET|POST\n"));
        text.push_str(&format!("g, user{i}, editor, org{i}\n"));
    }
    text.push_str("p, *, *, /api/whoami, GET\n");
    PolicyTable::parse(&text).expect("bench policy parses")
}

fn bench_first_match_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_first_match_position");

    for rules in [1usize, 10, 100, 1000].iter() {
        let gate = RuleTablePolicy::new(table_with_tenants(*rules));
        let user = UserId::new(format!("user{}", rules - 1)).expect("user id");
        let org = OrganizationId::new(format!("org{}", rules - 1)).expect("org id");

        group.throughput(Throughput::Elements(*rules as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rules), rules, |b, _| {
            b.iter(|| {
                let decision = gate
                    .enforce(&AccessRequest {
                        subject: &user,
                        tenant: &org,
                        resource: black_box("/api/notes/42"),
                        action: black_box("GET"),
                    })
                    .expect("evaluates");
                black_box(decision)
            });
        });
    }

    group.finish();
}

fn bench_default_deny(c: &mut Criterion) {
    let gate = RuleTablePolicy::new(table_with_tenants(100));
    let user = UserId::new("stranger").expect("user id");
    let org = OrganizationId::new("orgX").expect("org id");

    c.bench_function("policy_default_deny_100", |b| {
        b.iter(|| {
            let decision = gate
                .enforce(&AccessRequest {
                    subject: &user,
                    tenant: &org,
                    resource: black_box("/api/notes"),
                    action: black_box("POST"),
                })
                .expect("evaluates");
            black_box(decision)
        });
    });
}

criterion_group!(benches, bench_first_match_position, bench_default_deny);
criterion_main!(benches);
