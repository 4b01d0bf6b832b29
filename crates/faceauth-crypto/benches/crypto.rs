use faceauth_crypto::chunk::generate_base_nonce;
use faceauth_crypto::{
    decrypt_stream, derive_key, encrypt_stream, generate_salt, normalize, DerivedKey,
    FeatureVector, KdfAlgorithm, KdfParams,
};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn make_vector(dim: usize) -> FeatureVector {
    FeatureVector::new((0..dim).map(|i| ((i * 37) % 101) as f32 / 50.0 - 1.0).collect())
}

#[divan::bench(args = [128, 512, 2048])]
fn bench_normalize(bencher: divan::Bencher, dim: usize) {
    let vector = make_vector(dim);
    bencher.bench(|| normalize(divan::black_box(&vector)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576, 4194304])]
fn bench_encrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = DerivedKey::from_bytes([0x42u8; 32]);
    let nonce = generate_base_nonce();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + 64);
            encrypt_stream(
                &mut divan::black_box(data.as_slice()),
                &mut out,
                &key,
                &nonce,
            )
            .unwrap();
            out
        });
}

#[divan::bench(args = [1024, 65536, 1048576, 4194304])]
fn bench_decrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = DerivedKey::from_bytes([0x42u8; 32]);
    let nonce = generate_base_nonce();
    let data = make_data(size);
    let mut body = Vec::new();
    encrypt_stream(&mut data.as_slice(), &mut body, &key, &nonce).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            decrypt_stream(
                &mut divan::black_box(body.as_slice()),
                &mut out,
                &key,
                &nonce,
                size as u64,
            )
            .unwrap();
            out
        });
}

// Production costs are seconds per sample; keep the sample count low.
#[divan::bench(args = [KdfAlgorithm::Pbkdf2Sha256, KdfAlgorithm::Scrypt, KdfAlgorithm::Argon2id], sample_count = 5)]
fn bench_derive_key(bencher: divan::Bencher, algorithm: KdfAlgorithm) {
    let embedding = normalize(&make_vector(512)).unwrap();
    let salt = generate_salt();
    let params = KdfParams::default();
    bencher.bench(|| {
        derive_key(
            divan::black_box(&embedding),
            &salt,
            Some(b"report.pdf".as_slice()),
            algorithm,
            &params,
        )
        .unwrap()
    });
}

fn main() {
    divan::main();
}
