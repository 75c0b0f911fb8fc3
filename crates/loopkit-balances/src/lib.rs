//! ERC-20 balance reads for the three supported tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

use loopkit_codec::{decode_u256, format_units};
use loopkit_types::{Address, Call, Result};
use loopkit_wallet::WalletSession;

pub const BALANCE_OF_ENTRYPOINT: &str = "balanceOf";

/// Every supported token is scaled by 10^18 for display.
pub const TOKEN_DECIMALS: u32 = 18;
pub const DISPLAY_PRECISION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSymbol {
    Eth,
    Usdc,
    Strk,
}

impl TokenSymbol {
    pub const ALL: [TokenSymbol; 3] = [TokenSymbol::Eth, TokenSymbol::Usdc, TokenSymbol::Strk];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::Eth => "ETH",
            TokenSymbol::Usdc => "USDC",
            TokenSymbol::Strk => "STRK",
        }
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token contract addresses. Defaults to Starknet mainnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenAddresses {
    pub eth: String,
    pub usdc: String,
    pub strk: String,
}

impl TokenAddresses {
    pub fn mainnet() -> Self {
        Self {
            eth: "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7".into(),
            usdc: "0x53c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8".into(),
            strk: "0x4718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d".into(),
        }
    }

    pub fn get(&self, symbol: TokenSymbol) -> &str {
        match symbol {
            TokenSymbol::Eth => &self.eth,
            TokenSymbol::Usdc => &self.usdc,
            TokenSymbol::Strk => &self.strk,
        }
    }
}

impl Default for TokenAddresses {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Outcome of one token's balance read.
///
/// A failed read is kept distinct from a real zero balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceLookup {
    Found(String),
    Failed,
}

impl BalanceLookup {
    /// Text shown to the user; failures show as `"0"`.
    pub fn display(&self) -> &str {
        match self {
            BalanceLookup::Found(amount) => amount,
            BalanceLookup::Failed => "0",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BalanceLookup::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceSet {
    pub eth: BalanceLookup,
    pub usdc: BalanceLookup,
    pub strk: BalanceLookup,
}

impl TokenBalanceSet {
    pub fn get(&self, symbol: TokenSymbol) -> &BalanceLookup {
        match symbol {
            TokenSymbol::Eth => &self.eth,
            TokenSymbol::Usdc => &self.usdc,
            TokenSymbol::Strk => &self.strk,
        }
    }
}

pub fn balance_of_call(token: &Address, owner: &Address) -> Call {
    Call {
        contract_address: token.clone(),
        entrypoint: BALANCE_OF_ENTRYPOINT.to_string(),
        calldata: vec![owner.to_string()],
    }
}

async fn read_balance(session: &WalletSession, token: &str, owner: &Address) -> Result<String> {
    let token = Address::parse("token", token)?;
    let result = session.call_contract(&balance_of_call(&token, owner)).await?;
    let raw = decode_u256(&result)?;
    Ok(format_units(raw, TOKEN_DECIMALS, DISPLAY_PRECISION))
}

async fn lookup(
    session: &WalletSession,
    symbol: TokenSymbol,
    tokens: &TokenAddresses,
    owner: &Address,
) -> BalanceLookup {
    match read_balance(session, tokens.get(symbol), owner).await {
        Ok(amount) => BalanceLookup::Found(amount),
        Err(e) => {
            log::warn!("Error fetching {} balance: {}", symbol, e);
            BalanceLookup::Failed
        }
    }
}

/// Read ETH, USDC and STRK balances of `owner`.
///
/// The three reads run concurrently; one failing never affects the others.
pub async fn read_balances(
    session: &WalletSession,
    owner: &Address,
    tokens: &TokenAddresses,
) -> TokenBalanceSet {
    let (eth, usdc, strk) = tokio::join!(
        lookup(session, TokenSymbol::Eth, tokens, owner),
        lookup(session, TokenSymbol::Usdc, tokens, owner),
        lookup(session, TokenSymbol::Strk, tokens, owner),
    );
    TokenBalanceSet { eth, usdc, strk }
}

/// Balances of the session's connected account.
pub async fn read_own_balances(
    session: &WalletSession,
    tokens: &TokenAddresses,
) -> Result<TokenBalanceSet> {
    let owner = session.current_address()?.clone();
    Ok(read_balances(session, &owner, tokens).await)
}
