//! Balance gate: joins the supported-currency catalog against live on-chain
//! fungible-asset balances and answers sufficiency checks.
//!
//! All arithmetic is decimal. The sufficiency check and the base-unit
//! conversion used to size the on-chain transaction share one rounding
//! policy (truncation toward zero), so a payment the gate approves can
//! never be rounded up past the balance it was checked against.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::chain::FungibleAssetBalance;
use crate::network::GAS_COIN_TYPE_TAG;
use crate::types::{crypto_currencies, SupportedCurrency};

/// Largest decimals value [`Decimal`] can represent as a scale.
const MAX_DECIMALS: u32 = 28;

/// Errors raised converting between display amounts and base units.
#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    #[error("negative amount {0} cannot be converted to base units")]
    Negative(Decimal),

    #[error("amount {amount} overflows u64 base units at {decimals} decimals")]
    Overflow { amount: Decimal, decimals: u32 },

    #[error("{0} decimals exceed the supported precision")]
    UnsupportedDecimals(u32),
}

/// Convert a display amount into integer base units: `floor(amount * 10^decimals)`.
///
/// Truncation, never rounding up: the contract must not be authorized to
/// spend more than the computed amount.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u64, AmountError> {
    if amount.is_sign_negative() {
        return Err(AmountError::Negative(amount));
    }
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let scale = pow10(decimals)?;
    let scaled = amount
        .checked_mul(scale)
        .ok_or(AmountError::Overflow { amount, decimals })?;
    scaled
        .trunc()
        .to_u64()
        .ok_or(AmountError::Overflow { amount, decimals })
}

/// Convert integer base units back into a display amount.
pub fn from_base_units(raw: u64, decimals: u32) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    Ok(Decimal::from_i128_with_scale(raw as i128, decimals))
}

fn pow10(decimals: u32) -> Result<Decimal, AmountError> {
    let mut scale = Decimal::ONE;
    let ten = Decimal::from(10u32);
    for _ in 0..decimals {
        scale = scale
            .checked_mul(ten)
            .ok_or(AmountError::UnsupportedDecimals(decimals))?;
    }
    Ok(scale)
}

/// Decimals assumed for catalog entries that do not declare any.
pub const DEFAULT_DECIMALS: u32 = 8;

/// One supported currency joined with the connected account's live balance.
#[derive(Debug, Clone, PartialEq)]
pub struct CryptoBalance {
    pub currency: SupportedCurrency,
    /// Raw on-chain amount in base units.
    pub raw_amount: u64,
    /// `raw_amount` shifted by the currency's decimals.
    pub formatted: Decimal,
}

impl CryptoBalance {
    /// Decimals of this currency, catalog-declared or the default.
    pub fn decimals(&self) -> u32 {
        self.currency.decimals.unwrap_or(DEFAULT_DECIMALS)
    }
}

/// The connected account's balances across every supported crypto currency.
///
/// Built by joining the catalog against live fungible-asset records;
/// recomputed whenever the account, network, or catalog changes.
#[derive(Debug, Clone, Default)]
pub struct BalanceSheet {
    balances: Vec<CryptoBalance>,
}

impl BalanceSheet {
    /// Join the crypto subset of a currency catalog against on-chain
    /// balance records.
    ///
    /// Matching is exact address equality, with one special case: the
    /// native gas coin is listed in the catalog with a placeholder address
    /// and matches on its well-known coin-type tag instead. Currencies with
    /// no matching record get a zero balance, not an error.
    pub fn join(catalog: &[SupportedCurrency], onchain: &[FungibleAssetBalance]) -> Self {
        let balances = crypto_currencies(catalog)
            .into_iter()
            .map(|currency| {
                let matched = onchain.iter().find(|asset| matches_currency(&currency, asset));
                let raw_amount = matched
                    .map(|asset| asset.amount_base_units())
                    .unwrap_or(0);
                let decimals = currency.decimals.unwrap_or(DEFAULT_DECIMALS);
                let formatted =
                    from_base_units(raw_amount, decimals).unwrap_or(Decimal::ZERO);
                CryptoBalance {
                    currency,
                    raw_amount,
                    formatted,
                }
            })
            .collect();
        Self { balances }
    }

    /// All joined balances, one per supported crypto currency.
    pub fn balances(&self) -> &[CryptoBalance] {
        &self.balances
    }

    /// Balance for a currency id.
    pub fn by_id(&self, currency_id: &str) -> Option<&CryptoBalance> {
        self.balances.iter().find(|b| b.currency.id == currency_id)
    }

    /// Balance for a currency symbol.
    pub fn by_symbol(&self, symbol: &str) -> Option<&CryptoBalance> {
        self.balances.iter().find(|b| b.currency.symbol == symbol)
    }

    /// Whether the account can cover `required` units of the currency.
    ///
    /// Exact at the boundary: `required == balance` passes, one base unit
    /// more fails. Unknown currencies cannot cover anything.
    pub fn has_sufficient_balance(&self, currency_id: &str, required: Decimal) -> bool {
        match self.by_id(currency_id) {
            Some(balance) => required <= balance.formatted,
            None => false,
        }
    }
}

/// Match a catalog currency against a live balance record.
fn matches_currency(currency: &SupportedCurrency, asset: &FungibleAssetBalance) -> bool {
    if asset.asset_type.is_empty() {
        return false;
    }
    if currency.symbol == "APT" && asset.asset_type.ends_with(GAS_COIN_TYPE_TAG) {
        return true;
    }
    match &currency.address {
        Some(address) => asset.asset_type == *address,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyType;
    use std::str::FromStr;

    fn currency(
        id: &str,
        symbol: &str,
        address: Option<&str>,
        decimals: Option<u32>,
    ) -> SupportedCurrency {
        SupportedCurrency {
            currency_type: CurrencyType::Crypto,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            id: id.to_string(),
            country: None,
            description: String::new(),
            chain: Some("tooma".to_string()),
            address: address.map(str::to_string),
            is_fungible_asset: Some(true),
            decimals,
        }
    }

    fn onchain(asset_type: &str, amount: u64) -> FungibleAssetBalance {
        FungibleAssetBalance {
            asset_type: asset_type.to_string(),
            amount: amount.to_string(),
        }
    }

    #[test]
    fn floor_truncates_and_never_rounds_up() {
        // 5.2 APT at 8 decimals.
        let apt = Decimal::from_str("5.2").unwrap();
        assert_eq!(to_base_units(apt, 8).unwrap(), 520_000_000);
        // Sub-base-unit residue truncates.
        let fractional = Decimal::from_str("0.123456789").unwrap();
        assert_eq!(to_base_units(fractional, 8).unwrap(), 12_345_678);
        // Exactly representable amounts stay exact.
        let exact = Decimal::from_str("0.00000001").unwrap();
        assert_eq!(to_base_units(exact, 8).unwrap(), 1);
    }

    #[test]
    fn base_unit_round_trip_is_idempotent() {
        for raw in [0u64, 1, 12_345_678, 520_000_000, u64::from(u32::MAX)] {
            let display = from_base_units(raw, 8).unwrap();
            assert_eq!(to_base_units(display, 8).unwrap(), raw);
        }
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let negative = Decimal::from_str("-1").unwrap();
        assert!(matches!(
            to_base_units(negative, 8),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn join_matches_by_exact_address() {
        let catalog = vec![currency("usdc", "USDC", Some("0xbb1"), Some(6))];
        let sheet = BalanceSheet::join(&catalog, &[onchain("0xbb1", 1_500_000)]);
        let balance = sheet.by_id("usdc").unwrap();
        assert_eq!(balance.raw_amount, 1_500_000);
        assert_eq!(balance.formatted, Decimal::from_str("1.5").unwrap());
    }

    #[test]
    fn join_matches_gas_coin_by_type_tag() {
        // The catalog's address for the gas coin is a placeholder.
        let catalog = vec![currency("apt", "APT", Some("0xa"), Some(8))];
        let sheet = BalanceSheet::join(
            &catalog,
            &[onchain("0x1::aptos_coin::AptosCoin", 520_000_000)],
        );
        assert_eq!(sheet.by_symbol("APT").unwrap().raw_amount, 520_000_000);
    }

    #[test]
    fn unmatched_currency_yields_zero_balance() {
        let catalog = vec![currency("usdt", "USDT", Some("0xcc2"), Some(6))];
        let sheet = BalanceSheet::join(&catalog, &[]);
        let balance = sheet.by_id("usdt").unwrap();
        assert_eq!(balance.raw_amount, 0);
        assert_eq!(balance.formatted, Decimal::ZERO);
    }

    #[test]
    fn sufficiency_is_exact_at_the_boundary() {
        let catalog = vec![currency("apt", "APT", Some("0xa"), Some(8))];
        let sheet = BalanceSheet::join(
            &catalog,
            &[onchain("0x1::aptos_coin::AptosCoin", 520_000_000)],
        );
        let exact = Decimal::from_str("5.2").unwrap();
        let one_unit_more = Decimal::from_str("5.20000001").unwrap();
        assert!(sheet.has_sufficient_balance("apt", exact));
        assert!(!sheet.has_sufficient_balance("apt", one_unit_more));
        assert!(!sheet.has_sufficient_balance("missing", Decimal::ZERO));
    }

    #[test]
    fn insufficient_balance_scenario() {
        // Balance 0.05 APT, required 0.06 APT.
        let catalog = vec![currency("apt", "APT", Some("0xa"), Some(8))];
        let sheet = BalanceSheet::join(
            &catalog,
            &[onchain("0x1::aptos_coin::AptosCoin", 5_000_000)],
        );
        assert!(!sheet.has_sufficient_balance("apt", Decimal::from_str("0.06").unwrap()));
        assert!(sheet.has_sufficient_balance("apt", Decimal::from_str("0.05").unwrap()));
    }
}
