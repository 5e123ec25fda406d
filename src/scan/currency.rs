use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency codes recognised by the extractor, in match-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
	USD,
	EUR,
	GBP,
	CAD,
	AUD,
	JPY,
	CHF,
	CNY,
	INR,
	MXN,
	BRL,
	RUB,
	KRW,
	SGD,
	HKD,
}

impl Currency {
	/// All supported currencies. The extractor tries them in this order.
	pub const ALL: [Currency; 15] = [
		Currency::USD,
		Currency::EUR,
		Currency::GBP,
		Currency::CAD,
		Currency::AUD,
		Currency::JPY,
		Currency::CHF,
		Currency::CNY,
		Currency::INR,
		Currency::MXN,
		Currency::BRL,
		Currency::RUB,
		Currency::KRW,
		Currency::SGD,
		Currency::HKD,
	];

	pub fn code(&self) -> &'static str {
		match self {
			Currency::USD => "USD",
			Currency::EUR => "EUR",
			Currency::GBP => "GBP",
			Currency::CAD => "CAD",
			Currency::AUD => "AUD",
			Currency::JPY => "JPY",
			Currency::CHF => "CHF",
			Currency::CNY => "CNY",
			Currency::INR => "INR",
			Currency::MXN => "MXN",
			Currency::BRL => "BRL",
			Currency::RUB => "RUB",
			Currency::KRW => "KRW",
			Currency::SGD => "SGD",
			Currency::HKD => "HKD",
		}
	}

	/// The ASCII marker searched for in the raw bytes.
	pub fn pattern(&self) -> &'static [u8] {
		self.code().as_bytes()
	}

	pub fn account_name(&self) -> &'static str {
		match self {
			Currency::USD => "US Dollars Account",
			Currency::EUR => "Euros Account",
			Currency::GBP => "Pound Sterling Account",
			Currency::CAD => "Canadian Dollars Account",
			Currency::AUD => "Australian Dollars Account",
			Currency::JPY => "Japanese Yen Account",
			Currency::CHF => "Swiss Francs Account",
			Currency::CNY => "Chinese Yuan Account",
			Currency::INR => "Indian Rupees Account",
			Currency::MXN => "Mexican Pesos Account",
			Currency::BRL => "Brazilian Reals Account",
			Currency::RUB => "Russian Rubles Account",
			Currency::KRW => "South Korean Won Account",
			Currency::SGD => "Singapore Dollars Account",
			Currency::HKD => "Hong Kong Dollars Account",
		}
	}

	pub fn from_code(code: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|c| c.code() == code)
	}
}

impl fmt::Display for Currency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.code())
	}
}

/// Display label for a currency code, including codes outside the table.
pub fn account_name_for(code: &str) -> String {
	match Currency::from_code(code) {
		Some(currency) => currency.account_name().to_string(),
		None => format!("{} Account", code),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_codes_have_labels() {
		assert_eq!(account_name_for("USD"), "US Dollars Account");
		assert_eq!(account_name_for("KRW"), "South Korean Won Account");
		assert_eq!(Currency::from_code("HKD"), Some(Currency::HKD));
	}

	#[test]
	fn unknown_codes_fall_back_to_generic_label() {
		assert_eq!(account_name_for("XYZ"), "XYZ Account");
		assert_eq!(Currency::from_code("XYZ"), None);
	}

	#[test]
	fn table_order_starts_with_usd_and_eur() {
		assert_eq!(Currency::ALL[0], Currency::USD);
		assert_eq!(Currency::ALL[1], Currency::EUR);
		assert_eq!(Currency::ALL.len(), 15);
	}
}
