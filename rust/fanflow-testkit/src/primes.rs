//! Primality helpers: a trial-division predicate to run inside pipelines and a
//! sieve to compute the expected answer independently.

/// Trial-division primality test.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i <= n / i {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Sieve of Eratosthenes over `[0, limit)`.
pub fn primes_below(limit: u64) -> Vec<u64> {
    let limit = limit as usize;
    if limit < 3 {
        return Vec::new();
    }
    let mut composite = vec![false; limit];
    let mut primes = Vec::new();
    for i in 2..limit {
        if composite[i] {
            continue;
        }
        primes.push(i as u64);
        let mut j = i * i;
        while j < limit {
            composite[j] = true;
            j += i;
        }
    }
    primes
}

/// Number of primes in `[0, limit)`.
pub fn count_primes_below(limit: u64) -> usize {
    primes_below(limit).len()
}
