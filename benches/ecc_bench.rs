use criterion::{black_box, criterion_group, criterion_main, Criterion};
use apack::ecc::RsCodec;
fn bench_reed_solomon(c: &mut Criterion) {
    let codec = RsCodec::new(16, 1).unwrap();
    let data: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
    let encoded = codec.encode_blob(&data).unwrap();
    c.bench_function("rs_encode_64k", |b| b.iter(|| codec.encode_blob(black_box(&data))));
    c.bench_function("rs_decode_clean_64k", |b| b.iter(|| codec.decode_blob(black_box(&encoded))));
    c.bench_function("rs_verify_64k", |b| b.iter(|| codec.verify_blob(black_box(&encoded))));
}
criterion_group!(benches, bench_reed_solomon);
criterion_main!(benches);
