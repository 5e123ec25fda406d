use crate::scan::types::CurrencyBalance;

use std::cmp::Ordering;
use std::collections::HashMap;

/// Running per-currency statistics across all chunks of one scan.
#[derive(Debug, Clone, Default)]
pub struct BalanceAggregator {
	balances: HashMap<String, CurrencyBalance>,
}

impl BalanceAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed the aggregator from balances restored out of a checkpoint.
	pub fn from_balances(balances: &[CurrencyBalance]) -> Self {
		let balances = balances
			.iter()
			.map(|b| (b.currency.clone(), b.clone()))
			.collect();
		Self { balances }
	}

	/// Record one observed amount. Matches are never deduplicated.
	pub fn add_match(&mut self, currency: &str, amount: f64) {
		self.balances
			.entry(currency.to_string())
			.or_insert_with(|| CurrencyBalance::new(currency))
			.record(amount);
	}

	pub fn get(&self, currency: &str) -> Option<&CurrencyBalance> {
		self.balances.get(currency)
	}

	pub fn len(&self) -> usize {
		self.balances.len()
	}

	pub fn is_empty(&self) -> bool {
		self.balances.is_empty()
	}

	/// Balances ordered USD, EUR, then by descending total.
	pub fn sorted_balances(&self) -> Vec<CurrencyBalance> {
		let mut balances: Vec<CurrencyBalance> = self.balances.values().cloned().collect();
		balances.sort_by(compare_balances);
		balances
	}
}

fn rank(currency: &str) -> u8 {
	match currency {
		"USD" => 0,
		"EUR" => 1,
		_ => 2,
	}
}

fn compare_balances(a: &CurrencyBalance, b: &CurrencyBalance) -> Ordering {
	rank(&a.currency)
		.cmp(&rank(&b.currency))
		.then_with(|| b.total_amount.total_cmp(&a.total_amount))
		.then_with(|| a.currency.cmp(&b.currency))
}
