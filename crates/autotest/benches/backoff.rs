//! Backoff and Condition Benchmarks
//!
//! Benchmarks for interval scheduling, virtual-time polling, condition
//! dispatch against the mock driver, and request signing.
//!
//! Run with: `cargo bench --bench backoff`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use autotest::signature::md5_sign;
use autotest::{
    BackoffPolicy, ConditionArgs, ConditionRegistry, ElementCondition, FakeClock, MockDriver,
    MockElement, Poller,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_schedule");

    for timeout_secs in [1_u64, 10, 60, 300] {
        let policy = BackoffPolicy::try_new(
            Duration::from_secs(timeout_secs),
            Duration::from_millis(100),
            1.5,
            Duration::from_secs(5),
        )
        .unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(timeout_secs),
            &policy,
            |bench, policy| {
                bench.iter(|| black_box(policy.schedule()));
            },
        );
    }

    group.finish();
}

fn bench_poll_virtual_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_virtual_time");

    for attempts in [1_u32, 5, 20] {
        group.bench_with_input(
            BenchmarkId::from_parameter(attempts),
            &attempts,
            |bench, &attempts| {
                bench.iter(|| {
                    let poller = Poller::with_clock(
                        BackoffPolicy::try_new(
                            Duration::from_secs(600),
                            Duration::from_millis(100),
                            1.5,
                            Duration::from_secs(5),
                        )
                        .unwrap(),
                        FakeClock::new(),
                    );
                    let mut calls = 0;
                    let outcome = poller
                        .poll(
                            || {
                                calls += 1;
                                Ok((calls >= attempts).then_some(calls))
                            },
                            None,
                        )
                        .unwrap();
                    black_box(outcome)
                });
            },
        );
    }

    group.finish();
}

fn bench_condition_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition_dispatch");

    let driver = MockDriver::new();
    driver.add_element(
        "#status",
        MockElement::new("span").with_text("Order paid"),
    );
    let registry = ConditionRegistry::with_defaults();

    let cases = [
        (ElementCondition::Visible, ConditionArgs::selector("#status")),
        (ElementCondition::Present, ConditionArgs::selector("#status")),
        (
            ElementCondition::TextContains,
            ConditionArgs::selector("#status").with_text("paid"),
        ),
    ];

    for (condition, args) in &cases {
        let handler = registry.get_handler(*condition).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(condition.as_str()),
            args,
            |bench, args| {
                bench.iter(|| black_box(handler.check(&driver, *condition, args).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_md5_sign(c: &mut Criterion) {
    let mut params = BTreeMap::new();
    for (k, v) in [
        ("mch_id", "1900000109"),
        ("device_info", "WEB"),
        ("nonce_str", "5K8264ILTKCH16CQ2502SI8ZNMTM67VS"),
        ("total_fee", "1"),
        ("pay_type", "WECHAT_JSAPI"),
        ("notify_url", "https://notify.test/pay"),
        ("spbill_create_id", "127.0.0.1"),
        ("charset", "UTF-8"),
        ("sign_type", "MD5"),
    ] {
        params.insert(k.to_string(), Value::String(v.to_string()));
    }

    c.bench_function("md5_sign", |bench| {
        bench.iter(|| black_box(md5_sign(black_box(&params), "bench-key").unwrap()));
    });
}

criterion_group!(
    benches,
    bench_schedule,
    bench_poll_virtual_time,
    bench_condition_dispatch,
    bench_md5_sign
);
criterion_main!(benches);
