use criterion::{criterion_group, criterion_main, Criterion};
use msgid_codec::MsgIdCodec;

fn bench_pack_unpack(c: &mut Criterion) {
    let codec = MsgIdCodec::with_hosts(["news.example.com".to_string(), "usenet.test".to_string()]);
    let msgid = "1234567890.123456@news.example.com";

    c.bench_function("pack", |b| {
        b.iter(|| codec.pack(msgid).unwrap());
    });

    let packed = codec.pack(msgid).unwrap();
    c.bench_function("unpack", |b| {
        b.iter(|| codec.unpack(&packed).unwrap());
    });
}

criterion_group!(benches, bench_pack_unpack);
criterion_main!(benches);
