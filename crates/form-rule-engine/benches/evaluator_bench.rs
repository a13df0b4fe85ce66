//! 规则评估性能基准测试
//!
//! 覆盖单个操作符比较、嵌套条件树和整套规则集评估（表单每次编辑都会触发一次）。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{
    Action, Condition, ConditionEvaluator, ConditionGroup, ConditionNode, EngineConfig,
    EvaluationContext, Operator, Rule, RuleCompiler, RuleSetEvaluator,
};
use serde_json::{Value, json};
use std::hint::black_box;

fn create_context() -> EvaluationContext {
    EvaluationContext::from_parts(
        json!({
            "vitals": {"heartRate": 130, "systolic": 150, "temperature": 38.6},
            "weight": 82,
            "height": 178,
            "allergies": ["penicillin", "latex", "nsaid"],
            "chiefComplaint": "fever and productive cough for three days"
        }),
        Some(json!({"gender": "female", "age": 34})),
        Some(json!({"department": "emergency"})),
    )
}

/// 单个操作符比较
fn bench_operators(c: &mut Criterion) {
    let mut group = c.benchmark_group("operators");

    let cases: Vec<(&str, Value, Operator, Value)> = vec![
        ("equals", json!("female"), Operator::Equals, json!("female")),
        ("greater_than", json!(130), Operator::GreaterThan, json!(120)),
        ("greater_than_str", json!("130"), Operator::GreaterThan, json!(120)),
        ("between", json!(38.6), Operator::Between, json!([36, 37.5])),
        ("contains", json!("fever and productive cough"), Operator::Contains, json!("cough")),
        ("in", json!("emergency"), Operator::In, json!(["icu", "emergency", "ward"])),
        ("matches", json!("MRN-004512"), Operator::Matches, json!(r"^MRN-\d{6}$")),
        ("is_empty", json!(""), Operator::IsEmpty, Value::Null),
    ];

    for (name, field, op, expected) in &cases {
        group.bench_function(*name, |b| {
            b.iter(|| {
                ConditionEvaluator::compare(
                    black_box(Some(field)),
                    black_box(*op),
                    black_box(expected),
                )
            })
        });
    }

    group.finish();
}

/// in 操作符随列表长度的扩展性
fn bench_in_operator_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_operator_scaling");

    for size in [10, 100, 1000].iter() {
        let list: Vec<Value> = (0..*size).map(|i| json!(format!("code-{}", i))).collect();
        let expected = Value::Array(list);
        let field = json!(format!("code-{}", size - 1));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                ConditionEvaluator::compare(
                    black_box(Some(&field)),
                    black_box(Operator::In),
                    black_box(&expected),
                )
            })
        });
    }

    group.finish();
}

/// 嵌套条件树
fn bench_nested_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_groups");
    let evaluator = ConditionEvaluator::new();
    let context = create_context();

    for depth in [1usize, 5, 15].iter() {
        let mut node = ConditionGroup::all_of([Condition::new("vitals.heartRate", Operator::GreaterThan, 120)]);
        for _ in 1..*depth {
            node = ConditionGroup::and(vec![
                Condition::new("patient.gender", Operator::Equals, "female").into(),
                ConditionNode::Group(node),
            ]);
        }
        let node = ConditionNode::Group(node);

        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| evaluator.evaluate(black_box(&node), black_box(&context)))
        });
    }

    group.finish();
}

/// 整套规则集评估
fn bench_rule_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_set");
    let context = create_context();
    let evaluator = RuleSetEvaluator::new(&EngineConfig::default());

    for count in [10usize, 100, 500].iter() {
        let rules: Vec<Rule> = (0..*count)
            .map(|i| {
                Rule::new(
                    format!("rule-{}", i),
                    ConditionGroup::or(vec![
                        Condition::new("vitals.heartRate", Operator::GreaterThan, 100 + (i % 50) as i64).into(),
                        Condition::new("allergies", Operator::Contains, "latex").into(),
                    ]),
                    vec![
                        Action::Show { target: format!("field-{}", i) },
                        Action::ShowWarning { target: Some("vitals".into()), message: format!("提示 {}", i) },
                    ],
                )
                .with_priority((i % 7) as i32)
            })
            .collect();
        let rule_set = RuleCompiler::default().compile_set(rules, None).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| evaluator.evaluate(black_box(&rule_set), black_box(&context)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_operators,
    bench_in_operator_scaling,
    bench_nested_groups,
    bench_rule_set
);
criterion_main!(benches);
