//! Fee calculation
//!
//! `network_fee = gas_price × gas_limit / 10^decimals`, rounded up to the
//! coin's precision so the quoted fee never undershoots what the chain
//! charges. `total_amount = amount + network_fee` exactly.
//!
//! [`quote`] is pure and cheap enough to run on every keystroke; only
//! [`FeeCalculator::market`] touches the rail.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::debug;

use crate::core_types::{Coin, FiatCurrency};
use crate::money::{self, MoneyError};
use crate::payment::PaymentError;
use crate::rail::{GasQuote, PaymentRail, PriceTable};

/// Derived quote for one amount/coin pair. Recompute whenever either changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub coin: Coin,
    pub amount: Decimal,
    pub network_fee: Decimal,
    pub total_amount: Decimal,
    /// USD value of `amount`
    pub fiat_value: Decimal,
    pub fiat_display: String,
}

impl FeeQuote {
    /// Whether this quote still describes `amount` of `coin` and is internally consistent
    pub fn matches(&self, amount: Decimal, coin: Coin) -> bool {
        self.coin == coin
            && self.amount == amount
            && self.network_fee + self.amount == self.total_amount
    }
}

/// Network fee in whole coin units
pub fn network_fee(coin: Coin, gas: &GasQuote) -> Result<Decimal, MoneyError> {
    if gas.gas_price.is_sign_negative() || gas.gas_limit.is_sign_negative() {
        return Err(MoneyError::InvalidAmount);
    }
    let decimals = coin.decimals();
    let base_units = gas
        .gas_price
        .checked_mul(gas.gas_limit)
        .ok_or(MoneyError::Overflow)?;
    let fee = base_units
        .checked_mul(Decimal::new(1, decimals))
        .ok_or(MoneyError::Overflow)?;
    Ok(fee
        .round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
        .normalize())
}

/// Pure quote from already-fetched market data
pub fn quote(
    amount: Decimal,
    coin: Coin,
    gas: &GasQuote,
    prices: &PriceTable,
) -> Result<FeeQuote, PaymentError> {
    money::check_amount(amount, coin.decimals())?;

    let network_fee = network_fee(coin, gas)?;
    let total_amount = amount
        .checked_add(network_fee)
        .ok_or(MoneyError::Overflow)?;

    let price = prices.usd(coin).ok_or(PaymentError::PriceUnavailable(coin))?;
    let fiat_value = amount.checked_mul(price).ok_or(MoneyError::Overflow)?;

    Ok(FeeQuote {
        coin,
        amount,
        network_fee,
        total_amount,
        fiat_value,
        fiat_display: money::format_fiat(fiat_value, FiatCurrency::Usd),
    })
}

/// Gas and price data fetched together for one coin
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub gas: GasQuote,
    pub prices: PriceTable,
}

pub struct FeeCalculator {
    rail: Arc<dyn PaymentRail>,
}

impl FeeCalculator {
    pub fn new(rail: Arc<dyn PaymentRail>) -> Self {
        Self { rail }
    }

    /// Fetch gas parameters and the USD price for `coin`
    pub async fn market(&self, coin: Coin) -> Result<MarketSnapshot, PaymentError> {
        let coins = [coin];
        let (gas, prices) = tokio::join!(self.rail.network_fees(coin), self.rail.prices(&coins));
        let gas = gas.map_err(PaymentError::from_rail)?;
        let prices = prices.map_err(PaymentError::from_rail)?;
        debug!(%coin, gas_price = %gas.gas_price, gas_limit = %gas.gas_limit, "Market data fetched");
        Ok(MarketSnapshot { gas, prices })
    }

    /// Fetch market data and quote in one step
    pub async fn quote_live(&self, amount: Decimal, coin: Coin) -> Result<FeeQuote, PaymentError> {
        // amount errors must not cost a network round trip
        money::check_amount(amount, coin.decimals())?;
        let market = self.market(coin).await?;
        quote(amount, coin, &market.gas, &market.prices)
    }
}
