use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let limit = parse_limit()?;
    let primes = pipenut_sieve::run_sieve(limit);
    tracing::info!(limit, count = primes.len(), "scheduler exited properly");
    Ok(())
}

/// Parse the candidate bound from `--limit <n>` CLI arg or the
/// `SIEVE_LIMIT` env var; defaults to 100.
fn parse_limit() -> Result<u64> {
    let args: Vec<String> = std::env::args().collect();
    if let Some(raw) = args
        .windows(2)
        .find(|w| w[0] == "--limit")
        .map(|w| w[1].clone())
    {
        return Ok(raw.parse()?);
    }
    if let Ok(raw) = std::env::var("SIEVE_LIMIT") {
        return Ok(raw.parse()?);
    }
    Ok(100)
}
