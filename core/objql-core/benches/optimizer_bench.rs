// 옵티마이저 성능 벤치마크
//
// Section 1: 조인 순열 열거 (3 ~ 6 익스텐트)
// Section 2: 전체 최적화 (조건 분배 + 접근 경로 + 비용 비교)
// Section 3: 조건 사전 구성

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use objql_core::catalog::{ColumnType, IndexColumn, IndexRepository};
use objql_core::sql::optimizer::{ConditionDictionary, OptimizationNode, OptimizerInput, QueryOptimizer};
use objql_core::sql::planner::{Condition, JoinType, ValueExpr};

fn repository(extents: usize) -> IndexRepository {
    let mut builder = IndexRepository::builder();
    for extent in 0..extents {
        let type_name = format!("T{extent}");
        builder.register_type(&type_name, None).unwrap();
        builder
            .create_index(
                &format!("T{extent}KeyIdx"),
                &type_name,
                vec![IndexColumn::asc("Key", ColumnType::Integer)],
            )
            .unwrap();
    }
    builder.build()
}

fn chain_join(extents: usize) -> OptimizationNode {
    let mut tree = OptimizationNode::extent(0, "T0");
    for extent in 1..extents {
        tree = OptimizationNode::join(
            JoinType::Inner,
            tree,
            OptimizationNode::extent(extent, format!("T{extent}")),
        );
    }
    tree
}

// e0.Key = 1 AND e1.Ref = e0 AND e2.Ref = e1 ...
fn chain_condition(extents: usize) -> Condition {
    let mut condition = Condition::eq(ValueExpr::column(0, "Key"), ValueExpr::int(1));
    for extent in 1..extents {
        condition = condition.and(Condition::eq(
            ValueExpr::column(extent, "Ref"),
            ValueExpr::Object(extent - 1),
        ));
    }
    condition
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: 조인 순열 열거
// ═══════════════════════════════════════════════════════════════════════════

fn bench_permutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_permutations");

    for extents in 3..=6 {
        let tree = chain_join(extents);
        group.bench_with_input(BenchmarkId::from_parameter(extents), &tree, |b, tree| {
            b.iter(|| black_box(tree.all_permutations().unwrap()))
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: 전체 최적화
// ═══════════════════════════════════════════════════════════════════════════

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");

    for extents in 3..=6 {
        let repo = repository(extents);
        let optimizer = QueryOptimizer::new(&repo);
        let mut input = OptimizerInput::new(chain_join(extents), format!("chain join of {extents}"));
        input.conditions.add_condition(chain_condition(extents)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(extents), &input, |b, input| {
            b.iter(|| black_box(optimizer.optimize(input.clone()).unwrap()))
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 3: 조건 사전 구성
// ═══════════════════════════════════════════════════════════════════════════

fn bench_condition_dictionary(c: &mut Criterion) {
    let condition = chain_condition(16);

    c.bench_function("condition_dictionary_16_conjuncts", |b| {
        b.iter(|| {
            let mut dict = ConditionDictionary::new();
            dict.add_condition(black_box(condition.clone())).unwrap();
            dict
        })
    });
}

criterion_group!(benches, bench_permutations, bench_optimize, bench_condition_dictionary);
criterion_main!(benches);
