use archive_core::lexicon::LexiconBuilder;
use archive_core::search::{search, SearchFlags};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_search(c: &mut Criterion) {
    let mut builder = LexiconBuilder::new();
    for i in 0..2000u32 {
        builder.tokenize_message(
            i,
            "poster@example.com",
            "archive search engine discussion thread",
            "the archive stores usenet messages and supports full text search across threads",
        );
    }
    let bytes = builder.build();
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, data: &[u8]| -> std::path::PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, data).unwrap();
        p
    };
    let lexicon = archive_core::lexicon::Lexicon::open(
        &write("lexmeta_str.bin", &bytes.lexmeta_str),
        &write("lexstr.bin", &bytes.lexstr),
        &write("lexhash.bin", &bytes.lexhash),
        &write("lexhashdata.bin", &bytes.lexhashdata),
        &write("lexmeta.bin", &bytes.lexmeta),
        &write("lexdata.bin", &bytes.lexdata),
        &write("lexhit.bin", &bytes.lexhit),
    )
    .unwrap();

    c.bench_function("search two-word and query", |b| {
        b.iter(|| search(&lexicon, "archive search", SearchFlags::default()))
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
