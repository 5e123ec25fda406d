//! Byte-pattern extraction of currency amounts.
//!
//! The scan looks for ASCII currency codes and decodes the bytes that follow as
//! an amount. The format is unknown, so decoding is heuristic: a little-endian
//! `u32` in cents first, then a little-endian `f64`. Implausible values are
//! dropped without error.

use crate::scan::aggregator::BalanceAggregator;
use crate::scan::currency::Currency;

/// Bytes at the end of a buffer that are never treated as a pattern start.
const TAIL_GUARD: usize = 11;

/// Upper bound for the integer (cents) reading.
const MAX_CENTS: f64 = 1e11;

/// Upper bound for the floating point reading.
const MAX_FLOAT: f64 = 1e9;

/// Width of the amount field skipped after a successful match.
const AMOUNT_WIDTH: usize = 8;

/// Scan `data` and record every plausible amount into `aggregator`.
///
/// Returns the number of matches recorded.
pub fn extract_balances(data: &[u8], aggregator: &mut BalanceAggregator) -> usize {
	let len = data.len();
	let mut matches = 0;
	let mut i = 0;

	while i + TAIL_GUARD < len {
		if !data[i].is_ascii_uppercase() {
			i += 1;
			continue;
		}

		match match_at(data, i) {
			Some((currency, amount)) => {
				aggregator.add_match(currency.code(), amount);
				matches += 1;
				i += currency.pattern().len() + AMOUNT_WIDTH;
			}
			None => i += 1,
		}
	}

	matches
}

/// First currency in table order whose pattern sits at `offset` and is
/// followed by a plausible amount.
fn match_at(data: &[u8], offset: usize) -> Option<(Currency, f64)> {
	Currency::ALL.into_iter().find_map(|currency| {
		let pattern = currency.pattern();
		if !data[offset..].starts_with(pattern) {
			return None;
		}
		let amount = decode_amount(data, offset + pattern.len());
		(amount > 0.0).then_some((currency, amount))
	})
}

/// Decode the amount stored at `offset`. Returns 0 when neither reading is
/// plausible or the buffer is too short.
pub fn decode_amount(data: &[u8], offset: usize) -> f64 {
	if let Some(bytes) = data.get(offset..offset + 4) {
		let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64;
		if raw > 0.0 && raw < MAX_CENTS {
			return raw / 100.0;
		}
	}

	if let Some(bytes) = data.get(offset..offset + 8) {
		let mut buf = [0u8; 8];
		buf.copy_from_slice(bytes);
		let value = f64::from_le_bytes(buf);
		if !value.is_nan() && value > 0.0 && value < MAX_FLOAT {
			return value;
		}
	}

	0.0
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(code: &[u8], tail: &[u8]) -> Vec<u8> {
		let mut data = vec![0u8; 4];
		data.extend_from_slice(code);
		data.extend_from_slice(tail);
		data.extend_from_slice(&[0u8; 16]);
		data
	}

	#[test]
	fn integer_amount_is_read_as_cents() {
		let data = record(b"USD", &150000u32.to_le_bytes());
		let mut agg = BalanceAggregator::new();

		assert_eq!(extract_balances(&data, &mut agg), 1);
		let usd = agg.get("USD").unwrap();
		assert_eq!(usd.total_amount, 1500.0);
		assert_eq!(usd.transaction_count, 1);
	}

	#[test]
	fn float_amount_is_used_when_low_word_is_zero() {
		// 2500.5 has an all-zero low 32-bit word, so the integer read yields 0.
		let data = record(b"EUR", &2500.5f64.to_le_bytes());
		let mut agg = BalanceAggregator::new();

		assert_eq!(extract_balances(&data, &mut agg), 1);
		assert_eq!(agg.get("EUR").unwrap().total_amount, 2500.5);
	}

	#[test]
	fn implausible_amount_is_discarded() {
		let data = record(b"GBP", &[0u8; 8]);
		let mut agg = BalanceAggregator::new();

		assert_eq!(extract_balances(&data, &mut agg), 0);
		assert!(agg.is_empty());
	}

	#[test]
	fn pattern_in_tail_is_ignored() {
		// Pattern starts exactly 11 bytes before the end.
		let mut data = vec![0u8; 20];
		data.extend_from_slice(b"USD");
		data.extend_from_slice(&100u32.to_le_bytes());
		data.extend_from_slice(&[0u8; 4]);
		let mut agg = BalanceAggregator::new();

		assert_eq!(extract_balances(&data, &mut agg), 0);
	}

	#[test]
	fn repeated_records_are_all_counted() {
		let mut data = Vec::new();
		for _ in 0..3 {
			data.extend_from_slice(&record(b"CAD", &500u32.to_le_bytes()));
		}
		let mut agg = BalanceAggregator::new();

		assert_eq!(extract_balances(&data, &mut agg), 3);
		let cad = agg.get("CAD").unwrap();
		assert_eq!(cad.transaction_count, 3);
		assert_eq!(cad.total_amount, 15.0);
	}

	#[test]
	fn same_bytes_give_same_totals_in_independent_aggregators() {
		let mut data = Vec::new();
		data.extend_from_slice(&record(b"USD", &123_456u32.to_le_bytes()));
		data.extend_from_slice(&record(b"EUR", &2500.5f64.to_le_bytes()));
		data.extend_from_slice(&record(b"USD", &99u32.to_le_bytes()));
		data.extend_from_slice(&record(b"JPY", &[0u8; 8]));

		let mut first = BalanceAggregator::new();
		let mut second = BalanceAggregator::new();
		assert_eq!(
			extract_balances(&data, &mut first),
			extract_balances(&data, &mut second)
		);

		let totals = |agg: &BalanceAggregator| {
			agg.sorted_balances()
				.into_iter()
				.map(|b| (b.currency, b.total_amount, b.transaction_count))
				.collect::<Vec<_>>()
		};
		assert_eq!(totals(&first), totals(&second));
		assert_eq!(first.get("USD").unwrap().transaction_count, 2);
	}

	#[test]
	fn decode_handles_short_buffers() {
		assert_eq!(decode_amount(&[1, 0], 0), 0.0);
		assert_eq!(decode_amount(&[], 0), 0.0);
	}
}
