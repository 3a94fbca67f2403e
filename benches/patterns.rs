//! Benchmarks for feature extraction, single-security scans and universe fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use volspike::prelude::*;

/// Deterministic pseudo-random daily bars
fn generate_bars(code: &str, n: usize) -> Vec<DailyBar> {
  let start = TradeDate::parse("20100104").unwrap().date();
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0;
    let volume = if i % 37 == 0 { 5000.0 } else { 800.0 + ((i * 11) % 400) as f64 };

    let open = price;
    let close = price + change;
    let mas = (0..6).map(|k| Some(price + (k as f64 - 2.5) * 0.3)).collect();

    bars.push(DailyBar {
      ts_code: code.to_string(),
      trade_date: (start + chrono::Days::new(i as u64)).into(),
      open: Some(open),
      close: Some(close),
      pre_close: Some(open - 0.1),
      volume: Some(volume),
      moving_averages: mas,
    });
    price = close;
  }

  bars
}

fn bench_extract(c: &mut Criterion) {
  let bars = generate_bars("BENCH", 1000);
  let windows = MaWindow::defaults();

  c.bench_function("extract_features_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(extract_features(black_box(&bars), &windows));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let scanner = ScannerBuilder::new().build().unwrap();

  let mut group = c.benchmark_group("scaling");

  for size in [100, 500, 1000, 5000].iter() {
    let records = extract_features(&generate_bars("BENCH", *size), scanner.ma_windows()).unwrap();

    group.bench_with_input(BenchmarkId::new("scan_features", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(scanner.scan_features(black_box(&records)));
      })
    });
  }

  group.finish();
}

fn bench_universe(c: &mut Criterion) {
  let mut source = InMemorySource::new();
  for i in 0..200 {
    let code = format!("{i:06}.SZ");
    let bars = generate_bars(&code, 500);
    source = source.with_series(Security::new(code), bars);
  }
  let universe = source.list_universe().unwrap();
  let range = DateRange::new(
    TradeDate::parse("20100101").unwrap(),
    TradeDate::parse("20121231").unwrap(),
  )
  .unwrap();

  let mut group = c.benchmark_group("universe_200");
  for workers in [1, 5, 10] {
    let scanner = ScannerBuilder::new().workers(workers).build().unwrap();
    group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
      b.iter(|| {
        let _ = black_box(scanner.scan_universe(&source, &universe, &range));
      })
    });
  }
  group.finish();
}

criterion_group!(benches, bench_extract, bench_scaling, bench_universe);

criterion_main!(benches);
