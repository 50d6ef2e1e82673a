use serde::{Deserialize, Serialize};
use std::fmt;

/// Wormhole chain identifier (not an EVM chain id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u16);

impl ChainId {
    pub const SOLANA: ChainId = ChainId(1);
    pub const ETHEREUM: ChainId = ChainId(2);
    pub const TERRA: ChainId = ChainId(3);
    pub const BSC: ChainId = ChainId(4);
    pub const POLYGON: ChainId = ChainId(5);
    pub const AVALANCHE: ChainId = ChainId(6);
    pub const OASIS: ChainId = ChainId(7);
    pub const ALGORAND: ChainId = ChainId(8);
    pub const AURORA: ChainId = ChainId(9);
    pub const FANTOM: ChainId = ChainId(10);
    pub const KARURA: ChainId = ChainId(11);
    pub const ACALA: ChainId = ChainId(12);
    pub const KLAYTN: ChainId = ChainId(13);
    pub const CELO: ChainId = ChainId(14);
    pub const NEAR: ChainId = ChainId(15);
    pub const MOONBEAM: ChainId = ChainId(16);
    pub const NEON: ChainId = ChainId(17);
    pub const TERRA2: ChainId = ChainId(18);
    pub const INJECTIVE: ChainId = ChainId(19);
    pub const OSMOSIS: ChainId = ChainId(20);
    pub const SUI: ChainId = ChainId(21);
    pub const APTOS: ChainId = ChainId(22);
    pub const ARBITRUM: ChainId = ChainId(23);
    pub const OPTIMISM: ChainId = ChainId(24);
    pub const GNOSIS: ChainId = ChainId(25);
    pub const PYTHNET: ChainId = ChainId(26);
    pub const XPLA: ChainId = ChainId(28);
    pub const BTC: ChainId = ChainId(29);
    pub const BASE: ChainId = ChainId(30);
    pub const SEI: ChainId = ChainId(32);
    pub const WORMCHAIN: ChainId = ChainId(3104);
    pub const SEPOLIA: ChainId = ChainId(10002);

    /// Human readable name, used as a low-cardinality metrics label.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::SOLANA => "solana",
            Self::ETHEREUM => "ethereum",
            Self::TERRA => "terra",
            Self::BSC => "bsc",
            Self::POLYGON => "polygon",
            Self::AVALANCHE => "avalanche",
            Self::OASIS => "oasis",
            Self::ALGORAND => "algorand",
            Self::AURORA => "aurora",
            Self::FANTOM => "fantom",
            Self::KARURA => "karura",
            Self::ACALA => "acala",
            Self::KLAYTN => "klaytn",
            Self::CELO => "celo",
            Self::NEAR => "near",
            Self::MOONBEAM => "moonbeam",
            Self::NEON => "neon",
            Self::TERRA2 => "terra2",
            Self::INJECTIVE => "injective",
            Self::OSMOSIS => "osmosis",
            Self::SUI => "sui",
            Self::APTOS => "aptos",
            Self::ARBITRUM => "arbitrum",
            Self::OPTIMISM => "optimism",
            Self::GNOSIS => "gnosis",
            Self::PYTHNET => "pythnet",
            Self::XPLA => "xpla",
            Self::BTC => "btc",
            Self::BASE => "base",
            Self::SEI => "sei",
            Self::WORMCHAIN => "wormchain",
            Self::SEPOLIA => "sepolia",
            _ => "unknown",
        }
    }
}

impl From<u16> for ChainId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
