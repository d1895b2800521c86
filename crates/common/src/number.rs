//! Business number generation for orders and payments.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

/// Generator shared by every order created in this process.
pub static ORDER_NUMBERS: NumberGenerator = NumberGenerator::new("LG");

/// Generator shared by every payment created in this process.
pub static PAYMENT_NUMBERS: NumberGenerator = NumberGenerator::new("PAY");

const SEQUENCE_MODULUS: u64 = 10_000;
const RANDOM_MODULUS: u128 = 10_000;

/// Produces `prefix + yyyyMMddHHmmss + 4-digit sequence + 4 random digits`.
///
/// The sequence is a process-wide atomic counter, so two numbers generated
/// in the same second by the same process differ until the counter wraps.
/// The random tail separates processes that share a clock second.
#[derive(Debug)]
pub struct NumberGenerator {
    prefix: &'static str,
    sequence: AtomicU64,
}

impl NumberGenerator {
    /// Creates a generator for the given prefix.
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the next business number.
    pub fn next_number(&self) -> String {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % SEQUENCE_MODULUS;
        let random = Uuid::new_v4().as_u128() % RANDOM_MODULUS;
        format!("{}{timestamp}{seq:04}{random:04}", self.prefix)
    }

    /// Returns the prefix this generator stamps on every number.
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn number_has_prefix_and_fixed_width() {
        let generator = NumberGenerator::new("LG");
        let no = generator.next_number();
        assert!(no.starts_with("LG"));
        assert_eq!(no.len(), 2 + 14 + 8);
        assert!(no[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn burst_in_one_second_does_not_collide() {
        let generator = NumberGenerator::new("PAY");
        let numbers: HashSet<String> = (0..5_000).map(|_| generator.next_number()).collect();
        assert_eq!(numbers.len(), 5_000);
    }

    #[test]
    fn concurrent_generation_is_unique() {
        let generator = std::sync::Arc::new(NumberGenerator::new("LG"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..1_000)
                        .map(|_| generator.next_number())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for no in handle.join().unwrap() {
                assert!(all.insert(no));
            }
        }
        assert_eq!(all.len(), 4_000);
    }

    #[test]
    fn static_generators_use_business_prefixes() {
        assert_eq!(ORDER_NUMBERS.prefix(), "LG");
        assert_eq!(PAYMENT_NUMBERS.prefix(), "PAY");
        assert!(PAYMENT_NUMBERS.next_number().starts_with("PAY"));
    }
}
