//! Lifecycle Manager
//!
//! Entry point for the UI collaborator. Wires validator, fee calculator,
//! initiator, poller and store around one member session.
//!
//! Starting a new payment discards the current one first: its poller is
//! cancelled and its entry removed, so at most one payment is in flight.

use std::str::FromStr;
use std::sync::Arc;

use bitcoincore_rpc::bitcoin::Network;
use rust_decimal::Decimal;
use tracing::info;

use super::error::PaymentError;
use super::initiator::PaymentInitiator;
use super::poller::{PollerConfig, StatusPoller, VerifyOutcome};
use super::store::TransactionStateStore;
use super::types::{CryptoTransfer, PaymentRequest, StatusSnapshot, Transaction};
use crate::chain::{AddressValidator, FeeCalculator, FeeQuote, ValidatedAddress};
use crate::config::AppConfig;
use crate::core_types::{Coin, TransactionId};
use crate::money;
use crate::rail::{HttpRail, PaymentRail, RailError};
use crate::session::Session;

pub struct LifecycleManager {
    session: Arc<Session>,
    store: Arc<TransactionStateStore>,
    initiator: PaymentInitiator,
    poller: StatusPoller,
    validator: AddressValidator,
    fees: FeeCalculator,
}

impl LifecycleManager {
    pub fn new(
        rail: Arc<dyn PaymentRail>,
        session: Arc<Session>,
        poller_config: PollerConfig,
        btc_network: Network,
    ) -> Self {
        let store = Arc::new(TransactionStateStore::new());
        Self {
            initiator: PaymentInitiator::new(Arc::clone(&rail), Arc::clone(&store)),
            poller: StatusPoller::new(Arc::clone(&rail), Arc::clone(&store), poller_config),
            validator: AddressValidator::new(Arc::clone(&rail), btc_network),
            fees: FeeCalculator::new(rail),
            session,
            store,
        }
    }

    /// Build against the HTTP rail described by `config`
    pub fn from_config(config: &AppConfig, session: Arc<Session>) -> Result<Self, RailError> {
        let rail = HttpRail::new(&config.rail, Arc::clone(&session))?;
        info!(base_url = rail.base_url(), "Payment rail configured");
        Ok(Self::new(
            Arc::new(rail),
            session,
            PollerConfig::from(&config.poller),
            config.btc_network.network(),
        ))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Discard the current payment, submit `req`, and start polling it
    pub async fn start_payment(&self, req: PaymentRequest) -> Result<Transaction, PaymentError> {
        self.abandon();
        let tx = self.initiator.initiate(req).await?;
        self.poller.start(&tx.id)?;
        Ok(tx)
    }

    /// Discard the current payment, submit `transfer`, and start polling it
    pub async fn start_crypto_transfer(
        &self,
        transfer: CryptoTransfer,
    ) -> Result<Transaction, PaymentError> {
        self.abandon();
        let tx = self.initiator.transfer_crypto(transfer).await?;
        self.poller.start(&tx.id)?;
        Ok(tx)
    }

    pub async fn validate_address(
        &self,
        address: &str,
        coin: Coin,
    ) -> Result<ValidatedAddress, PaymentError> {
        self.validator.validate(address, coin).await
    }

    /// Fresh fee quote from live gas and price data
    pub async fn quote(&self, amount: Decimal, coin: Coin) -> Result<FeeQuote, PaymentError> {
        self.fees.quote_live(amount, coin).await
    }

    /// Quote straight from form input: amount text and coin symbol
    pub async fn quote_input(&self, amount: &str, coin: &str) -> Result<FeeQuote, PaymentError> {
        let coin = Coin::from_str(coin)
            .map_err(|_| PaymentError::UnsupportedCoin(coin.trim().to_string()))?;
        let amount = money::parse_amount(amount, coin.decimals())?;
        self.fees.quote_live(amount, coin).await
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    /// One manual status check. Never restarts polling.
    pub async fn verify(&self, id: &TransactionId) -> Result<VerifyOutcome, PaymentError> {
        self.poller.verify_once(id).await
    }

    pub fn current(&self) -> Option<Transaction> {
        self.store.current()
    }

    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.store.get(id)
    }

    pub fn history(&self, id: &TransactionId) -> Option<Vec<StatusSnapshot>> {
        self.store.history(id)
    }

    pub fn is_polling(&self, id: &TransactionId) -> bool {
        self.poller.is_active(id)
    }

    /// Wait until polling for `id` stops, then return the stored Transaction
    pub async fn wait_for_outcome(&self, id: &TransactionId) -> Result<Transaction, PaymentError> {
        self.poller.wait(id).await;
        self.store
            .get(id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))
    }

    /// Cancel and discard the current payment. `false` if there was none.
    pub fn abandon(&self) -> bool {
        let Some(id) = self.store.current_id() else {
            return false;
        };
        self.poller.cancel(&id);
        let discarded = self.store.discard(&id);
        if discarded {
            info!(tx_id = %id, "Payment abandoned");
        }
        discarded
    }

    /// Cancel every poller, drop all state and clear the credential
    pub fn end_session(&self) {
        let cancelled = self.poller.cancel_all();
        let discarded = self.store.clear();
        self.session.clear();
        info!(cancelled, discarded, "Session ended");
    }
}
