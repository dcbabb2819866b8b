//! Benchmarks for the health-sql store and query engine
//!
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::fmt::Write;
use std::path::Path;
use tempfile::tempdir;

use health_sql::query::{execute_records, parse_query_in, OutputFormat, QueryOptions};
use health_sql::storage::{DateRange, Record, StoreConfig, TimeSeriesStore, Zone};

const STEPS: &str = "Step Count (steps)";
const HEART: &str = "Heart Rate [Avg] (bpm)";

const DAILY_TOTALS: &str = "SELECT DATE(timestamp), SUM(`Step Count (steps)`), \
     AVG(`Heart Rate [Avg] (bpm)`) FROM health_data \
     WHERE `Step Count (steps)` > 10 GROUP BY DATE(timestamp) \
     ORDER BY DATE(timestamp) DESC LIMIT 30";

fn create_test_records(count: usize) -> Vec<Record> {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let record = Record::new(start + Duration::minutes(i as i64))
                .with(STEPS, (i % 120) as f64);
            if i % 3 == 0 {
                record.with(HEART, 55.0 + (i % 40) as f64)
            } else {
                record
            }
        })
        .collect()
}

/// One export per day with a reading every minute
fn write_exports(dir: &Path, days: u32) {
    for day in 1..=days {
        let mut body = format!("Date/Time,{},{}\n", STEPS, HEART);
        for minute in 0..24 * 60 {
            let _ = writeln!(
                body,
                "2025-01-{:02} {:02}:{:02}:00,{},{}",
                day,
                minute / 60,
                minute % 60,
                minute % 120,
                55 + minute % 40
            );
        }
        std::fs::write(dir.join(format!("HealthMetrics-2025-01-{:02}.csv", day)), body).unwrap();
    }
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    group.bench_function("select_star", |b| {
        b.iter(|| parse_query_in(black_box("SELECT * FROM health_data LIMIT 10"), &Zone::utc()))
    });

    group.bench_function("daily_totals", |b| {
        b.iter(|| parse_query_in(black_box(DAILY_TOTALS), &Zone::utc()).unwrap())
    });

    group.finish();
}

fn bench_executor(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor");
    let zone = Zone::utc();

    for size in [1_000, 10_000, 100_000] {
        let records = create_test_records(size);
        group.throughput(Throughput::Elements(size as u64));

        let grouped = parse_query_in(DAILY_TOTALS, &zone).unwrap();
        group.bench_function(format!("group_by_date_{}", size), |b| {
            b.iter(|| execute_records(&grouped, black_box(&records), &QueryOptions::default(), &zone))
        });

        let sorted = parse_query_in(
            "SELECT timestamp, `Heart Rate [Avg] (bpm)` FROM health_data \
             ORDER BY `Heart Rate [Avg] (bpm)` DESC, timestamp",
            &zone,
        )
        .unwrap();
        group.bench_function(format!("sort_{}", size), |b| {
            b.iter(|| execute_records(&sorted, black_box(&records), &QueryOptions::default(), &zone))
        });

        let summary = parse_query_in("SELECT * FROM health_data", &zone).unwrap();
        let options = QueryOptions::new(OutputFormat::Summary);
        group.bench_function(format!("summary_{}", size), |b| {
            b.iter(|| execute_records(&summary, black_box(&records), &options, &zone))
        });
    }

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("store");

    group.bench_function("range_week_cold", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                write_exports(dir.path(), 7);
                let store = TimeSeriesStore::new(
                    StoreConfig::new(dir.path()).zone(Zone::utc()).cache_enabled(false),
                )
                .unwrap();
                let range = store.date_summary().await.unwrap().unwrap().range();

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    let _ = store.get_data_in_range(black_box(&range)).await.unwrap();
                }
                start.elapsed()
            })
        });
    });

    group.bench_function("range_day_cached", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                write_exports(dir.path(), 7);
                let store =
                    TimeSeriesStore::new(StoreConfig::new(dir.path()).zone(Zone::utc())).unwrap();
                let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
                let range = DateRange::day(day, &Zone::utc()).unwrap();
                store.get_data_in_range(&range).await.unwrap();

                let start = std::time::Instant::now();
                for _ in 0..iters {
                    let _ = store.get_data_in_range(black_box(&range)).await.unwrap();
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parser, bench_executor, bench_store);
criterion_main!(benches);
