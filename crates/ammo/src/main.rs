//! Ammo generator: emits size-prefixed HTTP requests for load testing.
//!
//! Usage: `okv-ammo <mode> <count>` with mode one of `puts_unique`,
//! `puts_overwrite`, `gets_existing`, `gets_latest`, `mixed`.
//!
//! Output framing, one round per request: `<N> <verb>\n<raw request>\r\n`
//! where N is the byte length of the raw request. Keys are hex-encoded
//! sequence numbers so the read modes can target the keyspace the put
//! modes populate.

use rand::Rng;
use std::io::{self, Write};

const VALUE_LENGTH: usize = 512;

fn key(index: u64) -> String {
    format!("{index:x}")
}

fn random_value(rng: &mut impl Rng) -> Vec<u8> {
    let mut value = vec![0u8; VALUE_LENGTH];
    rng.fill(value.as_mut_slice());
    value
}

fn put_request(key: &str, value: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "PUT /v0/entity?id={key} HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        value.len()
    )
    .into_bytes();
    request.extend_from_slice(value);
    request
}

fn get_request(key: &str) -> Vec<u8> {
    format!("GET /v0/entity?id={key} HTTP/1.1\r\n\r\n").into_bytes()
}

fn emit(out: &mut impl Write, verb: &str, request: &[u8]) -> io::Result<()> {
    writeln!(out, "{} {verb}", request.len())?;
    out.write_all(request)?;
    out.write_all(b"\r\n")
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn puts_unique(out: &mut impl Write, count: u64, rng: &mut impl Rng) -> io::Result<()> {
    for i in 0..count {
        emit(out, "put", &put_request(&key(i), &random_value(rng)))?;
    }
    Ok(())
}

fn puts_overwrite(out: &mut impl Write, count: u64, rng: &mut impl Rng) -> io::Result<()> {
    for i in 0..count {
        // Every tenth request rewrites an earlier key.
        let k = if i % 10 == 9 { key(i / 2) } else { key(i) };
        emit(out, "put", &put_request(&k, &random_value(rng)))?;
    }
    Ok(())
}

fn gets_existing(out: &mut impl Write, count: u64, rng: &mut impl Rng) -> io::Result<()> {
    for _ in 0..count {
        let i = rng.gen_range(0..count);
        emit(out, "get", &get_request(&key(i)))?;
    }
    Ok(())
}

fn gets_latest(out: &mut impl Write, count: u64, rng: &mut impl Rng) -> io::Result<()> {
    for _ in 0..count {
        // Exponential recency bias: most reads hit the newest tenth.
        let unit: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let offset = (-unit.ln() * count as f64 / 10.0) as u64;
        let i = count - 1 - offset.min(count - 1);
        emit(out, "get", &get_request(&key(i)))?;
    }
    Ok(())
}

fn mixed(out: &mut impl Write, count: u64, rng: &mut impl Rng) -> io::Result<()> {
    for i in 0..count {
        if i % 2 == 0 {
            emit(out, "put", &put_request(&key(i / 2), &random_value(rng)))?;
        } else {
            let j = rng.gen_range(0..=i / 2);
            emit(out, "get", &get_request(&key(j)))?;
        }
    }
    Ok(())
}

fn run(mode: &str, count: u64, out: &mut impl Write) -> io::Result<bool> {
    let mut rng = rand::thread_rng();
    match mode {
        "puts_unique" => puts_unique(out, count, &mut rng)?,
        "puts_overwrite" => puts_overwrite(out, count, &mut rng)?,
        "gets_existing" => gets_existing(out, count, &mut rng)?,
        "gets_latest" => gets_latest(out, count, &mut rng)?,
        "mixed" => mixed(out, count, &mut rng)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let (mode, count) = match (args.get(1), args.get(2).and_then(|c| c.parse::<u64>().ok())) {
        (Some(mode), Some(count)) => (mode.clone(), count),
        _ => {
            eprintln!(
                "Usage: okv-ammo <puts_unique|puts_overwrite|gets_existing|gets_latest|mixed> <count>"
            );
            std::process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if !run(&mode, count, &mut out)? {
        eprintln!("unsupported mode: {mode}");
        std::process::exit(1);
    }
    out.flush()
}
