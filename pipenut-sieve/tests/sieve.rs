use pipenut_sieve::run_sieve;

/// End-to-end drain of the whole chain: every prime below the bound, in
/// order, exactly once, and the runtime left empty behind it.
#[test]
fn sieve_finds_the_primes_below_100() {
    let primes = run_sieve(100);
    assert_eq!(
        primes,
        vec![
            2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79,
            83, 89, 97
        ]
    );
}

#[test]
fn sieve_handles_a_small_bound() {
    assert_eq!(run_sieve(10), vec![2, 3, 5, 7]);
}

#[test]
fn sieve_with_nothing_to_pump_still_unwinds() {
    // The first stage exists before any candidate flows; it alone survives.
    assert_eq!(run_sieve(2), vec![2]);
}
