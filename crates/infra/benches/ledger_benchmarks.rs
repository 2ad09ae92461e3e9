use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::runtime::Runtime;

use stockbook_core::{LocationId, Money, MovementId, MovementLineId};
use stockbook_events::{EventEnvelope, InMemoryEventBus};
use stockbook_infra::{InMemoryLedgerStore, LedgerConfig, LedgerService, NewLocation, StockReadModel};
use stockbook_ledger::{Balances, LineRequest, Movement, MovementLine, MovementRequest, MovementType, Origin, scan_balance};
use stockbook_reference::{InMemoryCatalog, LocationKind, ProductRef};
use stockbook_series::{DocumentSeries, SeriesScope};

type Service = LedgerService<InMemoryLedgerStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

const SKUS: [&str; 4] = ["A", "B", "C", "D"];

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::with_products(SKUS.iter().map(|sku| ProductRef {
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        base_price_b2c: Money::from_cents(1_000),
        base_price_b2b: Money::from_cents(800),
        cost: Money::from_cents(400),
        category_id: None,
        supplier_id: None,
        active: true,
    }))
}

fn setup(rt: &Runtime) -> (Service, LocationId) {
    let service = LedgerService::new(
        InMemoryLedgerStore::new(),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(catalog()),
        LedgerConfig::default(),
    );
    let warehouse = rt.block_on(async {
        service
            .upsert_series(DocumentSeries::new("B2C", SeriesScope::SaleB2c, "B2C-", None).unwrap())
            .await
            .unwrap();
        service
            .create_location(NewLocation {
                kind: LocationKind::Warehouse,
                name: "Bench warehouse".into(),
            })
            .await
            .unwrap()
            .id
    });
    (service, warehouse)
}

/// Synthetic history alternating purchases into and transfers between two locations.
fn history(len: usize) -> (Vec<Movement>, LocationId, LocationId) {
    let (a, b) = (LocationId::new(), LocationId::new());
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let movements = (0..len)
        .map(|i| {
            let (kind, from, to) = if i % 2 == 0 {
                (MovementType::Purchase, None, Some(a))
            } else {
                (MovementType::Transfer, Some(a), Some(b))
            };
            Movement {
                id: MovementId::new(),
                kind,
                channel: None,
                origin: Origin::Pos,
                date: start + Duration::minutes(i as i64),
                from,
                to,
                reference: None,
                notes: None,
                payment: None,
                return_of: None,
                lines: SKUS
                    .iter()
                    .map(|sku| MovementLine {
                        id: MovementLineId::new(),
                        sku: sku.to_string(),
                        quantity: 3,
                        unit_price: None,
                        unit_cost: Money::from_cents(400),
                        discount_bp: 0,
                        addons: Vec::new(),
                    })
                    .collect(),
            }
        })
        .collect();
    (movements, a, b)
}

fn bench_record_movement_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("record_movement_latency");

    // Benchmark: purchase (no stock check, no reference)
    group.bench_function("purchase", |b| {
        let (service, warehouse) = setup(&rt);
        b.iter(|| {
            let req = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("A", black_box(5))]).to(warehouse);
            rt.block_on(service.record_movement(req)).unwrap();
        });
    });

    // Benchmark: sale (price resolution, stock lock, series allocation)
    group.bench_function("b2c_sale", |b| {
        let (service, warehouse) = setup(&rt);
        let stock = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("A", 1_000_000)]).to(warehouse);
        rt.block_on(service.record_movement(stock)).unwrap();
        b.iter(|| {
            let req = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("A", black_box(1))]).from(warehouse);
            rt.block_on(service.record_movement(req)).unwrap();
        });
    });

    group.finish();
}

fn bench_series_allocation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (service, _) = setup(&rt);
    c.bench_function("series_allocate", |b| {
        b.iter(|| black_box(rt.block_on(service.allocate(SeriesScope::SaleB2c, Utc::now())).unwrap()));
    });
}

fn bench_balance_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance_derivation");

    for len in [100usize, 1_000, 10_000] {
        let (movements, a, b) = history(len);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("scan_one_key", len), &movements, |bench, ms| {
            bench.iter(|| black_box(scan_balance(ms, "A", a).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("replay_all_keys", len), &movements, |bench, ms| {
            bench.iter(|| black_box(Balances::replay(ms).unwrap().get("C", b)));
        });

        group.bench_with_input(BenchmarkId::new("read_model_rebuild", len), &movements, |bench, ms| {
            let model = StockReadModel::new();
            bench.iter(|| {
                model.rebuild(ms, 0).unwrap();
                black_box(model.balance("C", b).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_record_movement_latency,
    bench_series_allocation,
    bench_balance_derivation
);
criterion_main!(benches);
