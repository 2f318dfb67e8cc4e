// src/overlap_stats.rs
// Summary statistics over an enriched address list

use crate::types::EnrichmentRecord;
use colored::Colorize;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How much of the source-chain population is present on the counterpart chain.
///
/// Counts are per record; `active` counts distinct source addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapReport {
    pub dust_threshold: Decimal,
    pub total: usize,
    pub with_balance: usize,
    pub dust: usize,
    pub zero: usize,
    pub staking: usize,
    pub active: usize,
    pub inactive: usize,
}

impl OverlapReport {
    pub fn compute(records: &[EnrichmentRecord], dust_threshold: Decimal) -> Self {
        let mut with_balance = 0;
        let mut dust = 0;
        let mut zero = 0;
        let mut staking = 0;
        let mut active: HashSet<&str> = HashSet::new();

        for record in records {
            // unparseable balances land in the zero bucket
            let balance = Decimal::from_str(record.balance.trim()).unwrap_or(Decimal::ZERO);
            if balance > dust_threshold {
                with_balance += 1;
                active.insert(&record.source_address);
            } else if balance > Decimal::ZERO {
                dust += 1;
            } else {
                zero += 1;
            }

            if record.is_staking.is_staking() {
                staking += 1;
                active.insert(&record.source_address);
            }
        }

        let total = records.len();
        Self {
            dust_threshold,
            total,
            with_balance,
            dust,
            zero,
            staking,
            active: active.len(),
            inactive: total.saturating_sub(active.len()),
        }
    }

    /// Share of all records, in percent with two decimals.
    pub fn percent_of_total(&self, count: usize) -> Decimal {
        percent(count, self.total)
    }

    /// Share of meaningful-balance holders that also stake.
    pub fn staking_among_holders(&self) -> Decimal {
        percent(self.staking, self.with_balance)
    }
}

fn percent(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO.round_dp(2);
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}

impl fmt::Display for OverlapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |n| self.percent_of_total(n);

        writeln!(f, "{}", "=== Balance Analysis ===".bold())?;
        writeln!(f, "Dust threshold: {}", self.dust_threshold)?;
        writeln!(f, "Accounts analyzed: {}", self.total)?;
        writeln!(
            f,
            "Meaningful balance (>{}): {} ({:.2}%)",
            self.dust_threshold,
            self.with_balance,
            pct(self.with_balance)
        )?;
        writeln!(
            f,
            "Dust balance (0-{}): {} ({:.2}%)",
            self.dust_threshold,
            self.dust,
            pct(self.dust)
        )?;
        writeln!(f, "Zero balance: {} ({:.2}%)", self.zero, pct(self.zero))?;
        writeln!(f, "Staking: {} ({:.2}%)", self.staking, pct(self.staking))?;
        writeln!(f)?;

        writeln!(f, "{}", "=== Counterpart Activity ===".bold())?;
        writeln!(
            f,
            "{} With activity: {} ({:.2}%)",
            "✅".green(),
            self.active,
            pct(self.active)
        )?;
        writeln!(
            f,
            "{} Without activity: {} ({:.2}%)",
            "❌".red(),
            self.inactive,
            pct(self.inactive)
        )?;
        write!(
            f,
            "Of accounts with meaningful balance, {:.2}% are also staking",
            self.staking_among_holders()
        )
    }
}
