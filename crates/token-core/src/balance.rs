//! Native and token balances for one owner.

use std::collections::BTreeMap;

use chain_sol::Pubkey;
use tracing::debug;

use crate::error::TokenError;
use crate::ledger::{LocalLedger, LocalToken};
use crate::network::{LedgerClient, TokenAccountBalance};
use crate::types::{BalanceOrigin, BalanceReport, BalanceSnapshot};

pub struct BalanceAggregator<'a, C: ?Sized> {
    client: &'a C,
    ledger: &'a LocalLedger,
    min_fee_budget: u64,
}

impl<'a, C: LedgerClient + ?Sized> BalanceAggregator<'a, C> {
    pub fn new(client: &'a C, ledger: &'a LocalLedger, min_fee_budget: u64) -> Self {
        Self {
            client,
            ledger,
            min_fee_budget,
        }
    }

    pub async fn report(&self, owner: &Pubkey) -> Result<BalanceReport, TokenError> {
        let native_lamports = self.client.get_balance(owner).await?;
        let accounts = self.client.get_token_accounts_by_owner(owner).await?;
        let tokens = aggregate(&accounts, &self.ledger.tokens());

        debug!(
            owner = %owner.short(),
            native_lamports,
            accounts = accounts.len(),
            mints = tokens.len(),
            "balances aggregated"
        );

        Ok(BalanceReport {
            owner: *owner,
            native_lamports,
            tokens,
            below_fee_budget: native_lamports < self.min_fee_budget,
        })
    }
}

/// One snapshot per mint, sorted by mint.
///
/// Token accounts of the same mint are summed. A chain mint is listed when
/// its total is positive or the session created it; a session token with no
/// chain account falls back to its overlay balance.
pub fn aggregate(chain: &[TokenAccountBalance], local: &[LocalToken]) -> Vec<BalanceSnapshot> {
    let local: BTreeMap<Pubkey, &LocalToken> =
        local.iter().map(|t| (t.descriptor.mint, t)).collect();

    let mut totals: BTreeMap<Pubkey, (u64, u8)> = BTreeMap::new();
    for account in chain {
        let total = totals.entry(account.mint).or_insert((0, account.decimals));
        total.0 = total.0.saturating_add(account.amount);
    }

    let mut snapshots: BTreeMap<Pubkey, BalanceSnapshot> = totals
        .into_iter()
        .filter(|(mint, (amount, _))| *amount > 0 || local.contains_key(mint))
        .map(|(mint, (amount, decimals))| {
            let session = local.get(&mint);
            (
                mint,
                BalanceSnapshot {
                    mint,
                    on_chain_amount: Some(amount),
                    local_overlay_amount: session.map(|t| t.balance),
                    decimals,
                    origin: BalanceOrigin::Chain,
                    symbol: session.map(|t| t.descriptor.symbol.clone()),
                },
            )
        })
        .collect();

    for (mint, token) in &local {
        snapshots.entry(*mint).or_insert_with(|| BalanceSnapshot {
            mint: *mint,
            on_chain_amount: None,
            local_overlay_amount: Some(token.balance),
            decimals: token.descriptor.decimals,
            origin: BalanceOrigin::Local,
            symbol: Some(token.descriptor.symbol.clone()),
        });
    }

    snapshots.into_values().collect()
}
