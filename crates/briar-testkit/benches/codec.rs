use briar_core::{MessageId, Offer, PacketPayload, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn offer_payload(n: usize) -> Vec<u8> {
    let offer = Offer {
        message_ids: (0..n)
            .map(|i| MessageId::from_bytes([(i % 251) as u8; 32]))
            .collect(),
    };
    offer.encode_payload().unwrap()
}

fn nested_value() -> Vec<u8> {
    let leaf = Value::List(vec![
        Value::Integer(70_000),
        Value::String("transport".into()),
        Value::Bytes(vec![7; 64]),
        Value::Null,
    ]);
    Value::Map(
        (0..64)
            .map(|i| (Value::Integer(i), leaf.clone()))
            .collect(),
    )
    .to_bytes()
    .unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let offer = offer_payload(900);
    c.bench_function("decode offer of 900 ids", |b| {
        b.iter(|| Offer::decode_payload(black_box(&offer)).unwrap())
    });

    let value = nested_value();
    c.bench_function("decode nested value", |b| {
        b.iter(|| Value::from_bytes(black_box(&value), usize::MAX).unwrap())
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
