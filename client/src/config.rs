use std::time::Duration;

use motherlode_api::prelude::*;

use crate::error::ConfigError;

pub const DEFAULT_TESTNET_RPC_URL: &str = "https://testnet.movementnetwork.xyz/v1";
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://full.mainnet.movementinfra.xyz/v1";
pub const EXPLORER_URL: &str = "https://explorer.movementnetwork.xyz";

/// Which network a client talks to, with the fullnode URL to use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Mainnet { url: String },
    Testnet { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Mainnet { url } | NetworkTarget::Testnet { url } => url,
        }
    }

    fn explorer_network(&self) -> &'static str {
        match self {
            NetworkTarget::Mainnet { .. } => "mainnet",
            NetworkTarget::Testnet { .. } => "bardock+testnet",
        }
    }
}

/// Cadence of every poller owned by a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    /// Authoritative round-status read.
    pub round_sync: Duration,
    /// Local countdown refresh.
    pub tick: Duration,
    pub grid: Duration,
    pub game_state: Duration,
    pub motherlode: Duration,
    pub balances: Duration,
    pub miner_stats: Duration,
    pub automation: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            round_sync: Duration::from_secs(30),
            tick: Duration::from_secs(1),
            grid: Duration::from_secs(5),
            game_state: Duration::from_secs(10),
            motherlode: Duration::from_secs(10),
            balances: Duration::from_secs(15),
            miner_stats: Duration::from_secs(15),
            automation: Duration::from_secs(15),
        }
    }
}

impl PollIntervals {
    fn named(&self) -> [(&'static str, Duration); 8] {
        [
            ("round_sync", self.round_sync),
            ("tick", self.tick),
            ("grid", self.grid),
            ("game_state", self.game_state),
            ("motherlode", self.motherlode),
            ("balances", self.balances),
            ("miner_stats", self.miner_stats),
            ("automation", self.automation),
        ]
    }
}

/// Everything a client needs to reach the game. Built once and passed down.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub network: NetworkTarget,
    pub contract: Contract,
    /// Upper bound on any single read.
    pub request_timeout: Duration,
    /// How long to wait for a submitted transaction to be committed.
    pub confirmation_timeout: Duration,
    pub confirmation_poll: Duration,
    /// Consecutive failed round syncs before the countdown is flagged stale.
    pub stale_after_failures: u32,
    /// Drift beyond which the clock offset is recomputed, in seconds.
    pub drift_threshold_secs: f64,
    pub max_gas_amount: u64,
    pub transaction_ttl: Duration,
    pub intervals: PollIntervals,
}

impl ClientConfig {
    pub fn testnet() -> Self {
        let address = TESTNET_CONTRACT
            .parse()
            .unwrap_or_else(|_| Address::default());
        Self::new(
            NetworkTarget::Testnet {
                url: DEFAULT_TESTNET_RPC_URL.to_string(),
            },
            Contract::new(address),
        )
    }

    pub fn mainnet(contract: Address) -> Self {
        Self::new(
            NetworkTarget::Mainnet {
                url: DEFAULT_MAINNET_RPC_URL.to_string(),
            },
            Contract::new(contract),
        )
    }

    pub fn new(network: NetworkTarget, contract: Contract) -> Self {
        Self {
            network,
            contract,
            request_timeout: Duration::from_secs(12),
            confirmation_timeout: Duration::from_secs(60),
            confirmation_poll: Duration::from_secs(1),
            stale_after_failures: 3,
            drift_threshold_secs: 2.0,
            max_gas_amount: 200_000,
            transaction_ttl: Duration::from_secs(60),
            intervals: PollIntervals::default(),
        }
    }

    /// Testnet preset with `NETWORK`, `RPC`, `CONTRACT` and
    /// `REQUEST_TIMEOUT_SECS` overrides from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("NETWORK").as_deref() {
            None | Some("testnet") => Self::testnet(),
            Some("mainnet") => {
                let contract = lookup("CONTRACT").ok_or(ConfigError::InvalidVar {
                    var: "CONTRACT",
                    reason: "required on mainnet".to_string(),
                })?;
                Self::mainnet(parse_address("CONTRACT", &contract)?)
            }
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    var: "NETWORK",
                    reason: format!("unknown network {other}"),
                })
            }
        };

        if let Some(url) = lookup("RPC") {
            let url = url.trim_end_matches('/').to_string();
            config.network = match config.network {
                NetworkTarget::Mainnet { .. } => NetworkTarget::Mainnet { url },
                NetworkTarget::Testnet { .. } => NetworkTarget::Testnet { url },
            };
        }
        if let Some(contract) = lookup("CONTRACT") {
            config.contract.address = parse_address("CONTRACT", &contract)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidVar {
                var: "REQUEST_TIMEOUT_SECS",
                reason: format!("not a number: {secs}"),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, interval) in self.intervals.named() {
            if interval.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        if self.confirmation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("confirmation_timeout"));
        }
        if self.confirmation_poll.is_zero() {
            return Err(ConfigError::ZeroDuration("confirmation_poll"));
        }
        Ok(())
    }

    pub fn fullnode_url(&self) -> &str {
        self.network.url()
    }

    pub fn tx_explorer_url(&self, hash: &str) -> String {
        let hash = if hash.starts_with("0x") {
            hash.to_string()
        } else {
            format!("0x{hash}")
        };
        format!(
            "{EXPLORER_URL}/txn/{hash}?network={}",
            self.network.explorer_network()
        )
    }

    pub fn account_explorer_url(&self, address: &Address) -> String {
        format!(
            "{EXPLORER_URL}/account/{address}?network={}",
            self.network.explorer_network()
        )
    }
}

fn parse_address(var: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|e: MotherlodeError| ConfigError::InvalidVar {
        var,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_testnet() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.fullnode_url(), DEFAULT_TESTNET_RPC_URL);
        assert_eq!(config.contract.address.to_string(), TESTNET_CONTRACT);
        assert_eq!(config.intervals.round_sync, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("RPC", "http://localhost:8080/v1/"),
            ("CONTRACT", "0xabc"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.fullnode_url(), "http://localhost:8080/v1");
        assert_eq!(config.contract.address, "0xabc".parse().unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_mainnet_requires_contract() {
        assert!(ClientConfig::from_lookup(lookup(&[("NETWORK", "mainnet")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("NETWORK", "devnet")])).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = ClientConfig::testnet();
        config.intervals.grid = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("grid")));
    }

    #[test]
    fn test_explorer_urls() {
        let config = ClientConfig::testnet();
        assert_eq!(
            config.tx_explorer_url("abc"),
            "https://explorer.movementnetwork.xyz/txn/0xabc?network=bardock+testnet"
        );
        assert!(config
            .account_explorer_url(&config.contract.address)
            .contains(TESTNET_CONTRACT));
    }
}
