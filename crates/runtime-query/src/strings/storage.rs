// SPDX-License-Identifier: GPL-3.0

//! Module and item names of frequently queried storage entries.

pub mod system {
	pub const MODULE: &str = "System";
	pub const ACCOUNT: &str = "Account";
	pub const NUMBER: &str = "Number";
}

pub mod balances {
	pub const MODULE: &str = "Balances";
	pub const TOTAL_ISSUANCE: &str = "TotalIssuance";
}

pub mod staking {
	pub const MODULE: &str = "Staking";
	pub const LEDGER: &str = "Ledger";
	pub const ERAS_STAKERS: &str = "ErasStakers";
}

pub mod session {
	pub const MODULE: &str = "Session";
}
