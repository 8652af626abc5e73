use chrono::{Duration, Utc};
use common::{ProductId, SellerId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::settlement::{self, Channel, Settlement};
use domain::{AddressSnapshot, Money, NewOrder, Order, OrderItem, PaymentIntent};

fn placed(lines: u32) -> (PaymentIntent, Order) {
    let now = Utc::now();
    let items = (1..=lines)
        .map(|n| OrderItem {
            product_id: ProductId::new(format!("SKU-{n:03}")),
            seller_id: SellerId::new(),
            title: format!("Product {n}"),
            quantity: 1 + n % 3,
            unit_price: Money::from_minor(1_000 + n as i64),
            final_price: Money::from_minor(900 + n as i64),
        })
        .collect();
    let order = Order::place(
        NewOrder {
            buyer_id: UserId::new(),
            items,
            address: AddressSnapshot::default(),
            tax_total: Money::from_minor(500),
            wallet_applied: Money::from_minor(200),
        },
        now,
    )
    .unwrap();
    let intent = PaymentIntent::for_order(&order, "INR", now + Duration::minutes(30), None, now);
    (intent, order)
}

fn bench_place_order(c: &mut Criterion) {
    c.bench_function("settlement/place_order_10_lines", |b| {
        b.iter(|| placed(10));
    });
}

fn bench_capture(c: &mut Criterion) {
    let capture = Settlement::capture(Channel::Webhook, Some("pay_bench".into()));

    c.bench_function("settlement/capture", |b| {
        b.iter_batched(
            || placed(5),
            |(mut intent, mut order)| {
                settlement::apply(&mut intent, Some(&mut order), &capture, Utc::now()).unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_fail_with_compensation(c: &mut Criterion) {
    let fail = Settlement::fail(Channel::Sweeper, "no payment attempts");

    c.bench_function("settlement/fail_50_lines", |b| {
        b.iter_batched(
            || placed(50),
            |(mut intent, mut order)| {
                settlement::apply(&mut intent, Some(&mut order), &fail, Utc::now()).unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_duplicate_delivery(c: &mut Criterion) {
    let capture = Settlement::capture(Channel::Webhook, Some("pay_bench".into()));
    let (mut intent, mut order) = placed(5);
    settlement::apply(&mut intent, Some(&mut order), &capture, Utc::now()).unwrap();

    c.bench_function("settlement/duplicate_capture", |b| {
        b.iter(|| settlement::apply(&mut intent, Some(&mut order), &capture, Utc::now()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_place_order,
    bench_capture,
    bench_fail_with_compensation,
    bench_duplicate_delivery,
);
criterion_main!(benches);
