use std::io::Cursor;

use fvault_crypto::{build_cipher, generate_key, CipherKind, StreamCodec};

const CHUNK_SIZE: usize = 64 * 1024;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn codec(kind: CipherKind) -> StreamCodec {
    StreamCodec::new(build_cipher(kind, &generate_key()), CHUNK_SIZE)
}

#[divan::bench(args = [CipherKind::XChaCha20Poly1305, CipherKind::Aes256Cbc])]
fn bench_encrypt_chunk(bencher: divan::Bencher, kind: CipherKind) {
    let cipher = build_cipher(kind, &generate_key());
    let iv = cipher.generate_iv();
    let data = make_data(CHUNK_SIZE);
    bencher
        .counter(divan::counter::BytesCount::new(CHUNK_SIZE))
        .bench(|| {
            cipher
                .encrypt_chunk(0, true, divan::black_box(&iv), divan::black_box(&data))
                .unwrap()
        });
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_encrypt_stream(bencher: divan::Bencher, size: usize) {
    let codec = codec(CipherKind::XChaCha20Poly1305);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + size / 256);
            codec
                .encrypt(&mut Cursor::new(divan::black_box(&data)), &mut out)
                .unwrap();
            out
        });
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_decrypt_stream(bencher: divan::Bencher, size: usize) {
    let codec = codec(CipherKind::XChaCha20Poly1305);
    let mut encrypted = Vec::new();
    codec
        .encrypt(&mut Cursor::new(make_data(size)), &mut encrypted)
        .unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            codec
                .decrypt(&mut Cursor::new(divan::black_box(&encrypted)), &mut out)
                .unwrap();
            out
        });
}

fn main() {
    divan::main();
}
