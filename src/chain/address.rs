//! Destination address validation

use std::str::FromStr;
use std::sync::Arc;

use bitcoincore_rpc::bitcoin::{Address, Network};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core_types::{AddressFormat, Coin};
use crate::payment::PaymentError;
use crate::rail::PaymentRail;

/// An address that passed both the local rule and the rail check.
///
/// Only [`AddressValidator`] constructs one, so a crypto `PaymentRequest`
/// cannot carry an unchecked destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedAddress {
    address: String,
    coin: Coin,
}

impl ValidatedAddress {
    pub(crate) fn new(address: impl Into<String>, coin: Coin) -> Self {
        Self {
            address: address.into(),
            coin,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }
}

/// Local syntax/checksum rule for `coin`
///
/// BTC addresses must decode (base58check or bech32) and belong to `network`.
/// EVM addresses are `0x` followed by 40 hex digits; mixed-case checksums are
/// left to the rail.
pub fn check_format(address: &str, coin: Coin, network: Network) -> bool {
    match coin.address_format() {
        AddressFormat::Bitcoin => Address::from_str(address)
            .map(|addr| addr.is_valid_for_network(network))
            .unwrap_or(false),
        AddressFormat::Evm => address
            .strip_prefix("0x")
            .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())),
    }
}

pub struct AddressValidator {
    rail: Arc<dyn PaymentRail>,
    network: Network,
}

impl AddressValidator {
    pub fn new(rail: Arc<dyn PaymentRail>, network: Network) -> Self {
        Self { rail, network }
    }

    /// Validate `address` for `coin`: local rule first, then the rail.
    pub async fn validate(&self, address: &str, coin: Coin) -> Result<ValidatedAddress, PaymentError> {
        let address = address.trim();
        let invalid = || PaymentError::InvalidAddress {
            address: address.to_string(),
            coin,
        };

        if address.is_empty() || !check_format(address, coin, self.network) {
            debug!(%coin, address, "Address failed local format check");
            return Err(invalid());
        }

        match self.rail.validate_address(address, coin).await {
            Ok(true) => Ok(ValidatedAddress::new(address, coin)),
            Ok(false) => {
                debug!(%coin, address, "Rail rejected address");
                Err(invalid())
            }
            Err(e) => {
                warn!(%coin, error = %e, "Address validation unavailable");
                Err(PaymentError::ProviderUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rail::{MockRail, RailError};

    const P2PKH: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
    const BECH32: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const EVM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn test_btc_checksum() {
        assert!(check_format(P2PKH, Coin::Btc, Network::Bitcoin));
        assert!(check_format(BECH32, Coin::Btc, Network::Bitcoin));
        // last character altered
        assert!(!check_format("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3", Coin::Btc, Network::Bitcoin));
        assert!(!check_format("not-an-address", Coin::Btc, Network::Bitcoin));
    }

    #[test]
    fn test_btc_network_mismatch() {
        assert!(!check_format(P2PKH, Coin::Btc, Network::Testnet));
        assert!(!check_format(BECH32, Coin::Btc, Network::Regtest));
    }

    #[test]
    fn test_evm_format() {
        assert!(check_format(EVM, Coin::Eth, Network::Bitcoin));
        assert!(check_format(&EVM.to_lowercase(), Coin::Usdt, Network::Bitcoin));
        assert!(!check_format("0x1234", Coin::Eth, Network::Bitcoin));
        assert!(!check_format(&EVM[2..], Coin::Bnb, Network::Bitcoin));
        assert!(!check_format(
            "0xZZ908400098527886E0F7030069857D2E4169EE7",
            Coin::Eth,
            Network::Bitcoin
        ));
        // BTC address is not an EVM address
        assert!(!check_format(P2PKH, Coin::Eth, Network::Bitcoin));
    }

    #[tokio::test]
    async fn test_local_rejection_skips_rail() {
        let rail = Arc::new(MockRail::new());
        let validator = AddressValidator::new(rail.clone(), Network::Bitcoin);

        let err = validator.validate("   ", Coin::Btc).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
        let err = validator.validate("0x1234", Coin::Eth).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
        assert_eq!(rail.validate_count(), 0);
    }

    #[tokio::test]
    async fn test_rail_confirms_address() {
        let rail = Arc::new(MockRail::new());
        let validator = AddressValidator::new(rail.clone(), Network::Bitcoin);

        let validated = validator.validate(&format!(" {} ", P2PKH), Coin::Btc).await.unwrap();
        assert_eq!(validated.address(), P2PKH);
        assert_eq!(validated.coin(), Coin::Btc);
        assert_eq!(rail.validate_count(), 1);
    }

    #[tokio::test]
    async fn test_rail_rejection_and_outage() {
        let rail = Arc::new(MockRail::new());
        let validator = AddressValidator::new(rail.clone(), Network::Bitcoin);

        rail.set_address_valid(Ok(false));
        let err = validator.validate(EVM, Coin::Eth).await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::InvalidAddress {
                address: EVM.to_string(),
                coin: Coin::Eth
            }
        );

        rail.set_address_valid(Err(RailError::Transport("refused".into())));
        let err = validator.validate(EVM, Coin::Eth).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
