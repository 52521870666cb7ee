use base58::ToBase58;

/// Number of random bytes behind every swiss number.
pub const SWISS_NUMBER_SIZE: usize = 32;

/// Draws a fresh swiss number: [`SWISS_NUMBER_SIZE`] bytes from the thread
/// CSPRNG rendered as base58, prefixed with `prefix`.
///
/// Unforgeability of every capability identifier rests on this entropy;
/// identifiers are never derived from content.
pub fn swiss_number(prefix: &str) -> String {
    let entropy = rand::random::<[u8; SWISS_NUMBER_SIZE]>();
    format!("{prefix}{}", entropy.to_base58())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn it_draws_distinct_prefixed_numbers() {
        let drawn: HashSet<String> = (0..64).map(|_| swiss_number("mem0-")).collect();

        assert_eq!(drawn.len(), 64);
        assert!(drawn.iter().all(|number| number.starts_with("mem0-")));
        assert!(drawn.iter().all(|number| number.len() >= "mem0-".len() + 32));
    }
}
