//! Roll-up benchmark
//!
//! Bottom-up summaries over a synthetic organization.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ctrack_common::{ControlCode, NodeId};
use ctrack_compliance::hierarchy::{CapabilityCentre, Framework, Product, System};
use ctrack_compliance::{Aggregator, Assessment, ComplianceStatus, Hierarchy, Scope, ScopeKind};

const CONTROLS_PER_SYSTEM: usize = 100;

fn node_id(raw: String) -> NodeId {
    NodeId::new(raw).expect("generated id")
}

/// `width` centres, each with `width` frameworks, products and systems
fn organization(width: usize) -> (Hierarchy, Vec<Assessment>) {
    let mut assessments = Vec::new();
    let capability_centres = (0..width)
        .map(|c| CapabilityCentre {
            id: node_id(format!("cc-{c}")),
            name: format!("Centre {c}"),
            frameworks: (0..width)
                .map(|f| Framework {
                    id: node_id(format!("fw-{c}-{f}")),
                    name: format!("Framework {f}"),
                    products: (0..width)
                        .map(|p| Product {
                            id: node_id(format!("prod-{c}-{f}-{p}")),
                            name: format!("Product {p}"),
                            systems: (0..width)
                                .map(|s| {
                                    let id = node_id(format!("sys-{c}-{f}-{p}-{s}"));
                                    for n in 0..CONTROLS_PER_SYSTEM {
                                        let code = ControlCode::parse(format!("PR.AA-{n}")).expect("generated code");
                                        let status = ComplianceStatus::ALL[n % ComplianceStatus::ALL.len()];
                                        assessments.push(Assessment::new(id.clone(), code, status));
                                    }
                                    System { id, name: format!("System {s}") }
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    (Hierarchy { capability_centres }, assessments)
}

fn rollup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollup");

    for width in [2usize, 4, 6].iter() {
        let (hierarchy, assessments) = organization(*width);
        group.bench_with_input(BenchmarkId::new("full_tree", width), width, |b, _| {
            b.iter(|| {
                let aggregator = Aggregator::new(&hierarchy, &assessments);
                black_box(aggregator.rollup())
            })
        });
        group.bench_with_input(BenchmarkId::new("single_product", width), width, |b, _| {
            let aggregator = Aggregator::new(&hierarchy, &assessments);
            let scope = Scope::node(ScopeKind::Product, node_id("prod-0-0-0".to_string()));
            b.iter(|| black_box(aggregator.summary_for_scope(&scope)))
        });
    }

    group.finish();
}

criterion_group!(benches, rollup_benchmark);
criterion_main!(benches);
