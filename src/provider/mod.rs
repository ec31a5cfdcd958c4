// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Provider Method Surface
//!
//! Maps wallet-provider method names to their approval class and decides
//! which calls can answer immediately versus which must enter the approval
//! pipeline.
//!
//! | Method | Class |
//! |--------|-------|
//! | `eth_requestAccounts` | Connect approval, always |
//! | `eth_accounts`, `eth_chainId`, read-only passthrough | Silent when the origin is connected, else Connect approval |
//! | `personal_sign`, `eth_sign`, `eth_signTypedData*`, `eth_sendTransaction` | Sign approval, always |
//! | `wallet_switchEthereumChain`, `wallet_addEthereumChain` | Local state update, immediate |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::chains::{ChainInfo, ChainRegistry};
use crate::connections::ConnectedDirectory;
use crate::error::{WalletError, WalletResult};
use crate::rpc::{is_read_only_method, RpcBridge};
use crate::vault::KeyVault;

/// Approval class of a provider method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalClass {
    /// Discloses accounts; requires a Connect approval.
    Connect,
    /// Invokes the signing capability; always requires a Sign approval.
    Sign,
    /// Read-only; silent for connected origins.
    ReadOnly,
    /// Pure local state; never prompts and makes no remote call.
    LocalState,
}

/// A parsed provider method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletMethod {
    RequestAccounts,
    Accounts,
    ChainId,
    PersonalSign,
    EthSign,
    SignTypedData,
    SendTransaction,
    SwitchChain,
    AddChain,
    /// A read-only RPC method passed through verbatim.
    ReadPassthrough(String),
}

impl WalletMethod {
    /// Parse a provider method name. Unknown non-read-only methods are
    /// rejected.
    pub fn parse(method: &str) -> WalletResult<Self> {
        match method {
            "eth_requestAccounts" => Ok(Self::RequestAccounts),
            "eth_accounts" => Ok(Self::Accounts),
            "eth_chainId" => Ok(Self::ChainId),
            "personal_sign" => Ok(Self::PersonalSign),
            "eth_sign" => Ok(Self::EthSign),
            "eth_signTypedData" | "eth_signTypedData_v3" | "eth_signTypedData_v4" => {
                Ok(Self::SignTypedData)
            }
            "eth_sendTransaction" => Ok(Self::SendTransaction),
            "wallet_switchEthereumChain" => Ok(Self::SwitchChain),
            "wallet_addEthereumChain" => Ok(Self::AddChain),
            other if is_read_only_method(other) => Ok(Self::ReadPassthrough(other.to_string())),
            other => Err(WalletError::InvalidInput(format!(
                "unsupported method {other}"
            ))),
        }
    }

    /// Approval class for this method.
    pub fn approval_class(&self) -> ApprovalClass {
        match self {
            Self::RequestAccounts => ApprovalClass::Connect,
            Self::Accounts | Self::ChainId | Self::ReadPassthrough(_) => ApprovalClass::ReadOnly,
            Self::PersonalSign | Self::EthSign | Self::SignTypedData | Self::SendTransaction => {
                ApprovalClass::Sign
            }
            Self::SwitchChain | Self::AddChain => ApprovalClass::LocalState,
        }
    }

    /// Canonical wire name.
    pub fn name(&self) -> &str {
        match self {
            Self::RequestAccounts => "eth_requestAccounts",
            Self::Accounts => "eth_accounts",
            Self::ChainId => "eth_chainId",
            Self::PersonalSign => "personal_sign",
            Self::EthSign => "eth_sign",
            Self::SignTypedData => "eth_signTypedData",
            Self::SendTransaction => "eth_sendTransaction",
            Self::SwitchChain => "wallet_switchEthereumChain",
            Self::AddChain => "wallet_addEthereumChain",
            Self::ReadPassthrough(name) => name,
        }
    }
}

/// How a call proceeds after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Answered without allocating a pending request.
    Immediate(serde_json::Value),
    /// Must enter the approval pipeline.
    NeedsApproval,
}

/// Front door for provider calls: answers what it can, defers the rest to
/// the pipeline.
pub struct ProviderService {
    vault: Arc<KeyVault>,
    connections: Arc<ConnectedDirectory>,
    chains: Arc<ChainRegistry>,
    rpc: Arc<RpcBridge>,
}

impl ProviderService {
    pub fn new(
        vault: Arc<KeyVault>,
        connections: Arc<ConnectedDirectory>,
        chains: Arc<ChainRegistry>,
        rpc: Arc<RpcBridge>,
    ) -> Self {
        Self {
            vault,
            connections,
            chains,
            rpc,
        }
    }

    /// Dispatch a call, answering immediately where the method surface
    /// allows it.
    pub async fn dispatch(
        &self,
        method: &WalletMethod,
        params: &serde_json::Value,
        origin: &str,
    ) -> WalletResult<Disposition> {
        match method.approval_class() {
            ApprovalClass::Connect | ApprovalClass::Sign => Ok(Disposition::NeedsApproval),

            ApprovalClass::ReadOnly => {
                if !self.connections.is_connected(origin) {
                    return Ok(Disposition::NeedsApproval);
                }
                Ok(Disposition::Immediate(
                    self.answer_read_only(method, params).await?,
                ))
            }

            ApprovalClass::LocalState => {
                Ok(Disposition::Immediate(self.apply_local(method, params)?))
            }
        }
    }

    /// Answer a read-only call for a connected origin.
    pub async fn answer_read_only(
        &self,
        method: &WalletMethod,
        params: &serde_json::Value,
    ) -> WalletResult<serde_json::Value> {
        match method {
            WalletMethod::Accounts => Ok(serde_json::json!(self.vault.disclosed_accounts()?)),
            WalletMethod::ChainId => Ok(serde_json::json!(self.chains.active_chain_id())),
            WalletMethod::ReadPassthrough(name) => {
                let chain = self.chains.active();
                let rpc_url = chain.rpc_url.ok_or_else(|| {
                    WalletError::Rpc(format!(
                        "no rpc endpoint configured for chain {}",
                        chain.chain_id
                    ))
                })?;
                self.rpc.passthrough(&rpc_url, name, params.clone()).await
            }
            other => Err(WalletError::InvalidInput(format!(
                "{} is not read-only",
                other.name()
            ))),
        }
    }

    /// Apply a local-state method.
    fn apply_local(
        &self,
        method: &WalletMethod,
        params: &serde_json::Value,
    ) -> WalletResult<serde_json::Value> {
        let first = params
            .get(0)
            .ok_or_else(|| WalletError::InvalidInput("missing chain params".into()))?;

        match method {
            WalletMethod::SwitchChain => {
                let chain_id = first
                    .get("chainId")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| WalletError::InvalidInput("missing chainId".into()))?;
                self.chains.switch(chain_id)?;
                Ok(serde_json::Value::Null)
            }
            WalletMethod::AddChain => {
                let chain_id = first
                    .get("chainId")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| WalletError::InvalidInput("missing chainId".into()))?;
                let name = first
                    .get("chainName")
                    .and_then(|v| v.as_str())
                    .unwrap_or(chain_id);
                let rpc_url = first
                    .get("rpcUrls")
                    .and_then(|v| v.get(0))
                    .and_then(|v| v.as_str())
                    .map(String::from);

                self.chains.add(ChainInfo {
                    chain_id: chain_id.to_string(),
                    name: name.to_string(),
                    rpc_url,
                })?;
                Ok(serde_json::Value::Null)
            }
            other => Err(WalletError::InvalidInput(format!(
                "{} is not a local-state method",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonStore, StoragePaths};
    use std::env;
    use std::fs;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_service() -> (ProviderService, std::path::PathBuf) {
        let dir = env::temp_dir().join(format!("test-provider-{}", uuid::Uuid::new_v4()));
        let mut store = JsonStore::new(StoragePaths::new(&dir));
        store.initialize().unwrap();

        let vault = Arc::new(KeyVault::open(store.clone()).unwrap());
        vault.create(KEY, "pw", "Main").unwrap();

        let service = ProviderService::new(
            vault,
            Arc::new(ConnectedDirectory::open(store).unwrap()),
            Arc::new(ChainRegistry::new()),
            Arc::new(RpcBridge::new()),
        );
        (service, dir)
    }

    #[test]
    fn method_table_matches_spec_surface() {
        assert_eq!(
            WalletMethod::parse("eth_requestAccounts")
                .unwrap()
                .approval_class(),
            ApprovalClass::Connect
        );
        assert_eq!(
            WalletMethod::parse("personal_sign").unwrap().approval_class(),
            ApprovalClass::Sign
        );
        assert_eq!(
            WalletMethod::parse("eth_signTypedData_v4")
                .unwrap()
                .approval_class(),
            ApprovalClass::Sign
        );
        assert_eq!(
            WalletMethod::parse("eth_accounts").unwrap().approval_class(),
            ApprovalClass::ReadOnly
        );
        assert_eq!(
            WalletMethod::parse("eth_getBalance").unwrap(),
            WalletMethod::ReadPassthrough("eth_getBalance".into())
        );
        assert_eq!(
            WalletMethod::parse("wallet_switchEthereumChain")
                .unwrap()
                .approval_class(),
            ApprovalClass::LocalState
        );
        assert!(matches!(
            WalletMethod::parse("eth_coinbase"),
            Err(WalletError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn sign_class_always_needs_approval() {
        let (service, dir) = test_service();
        service
            .connections
            .upsert("https://dapp.example", "Example")
            .unwrap();

        let disposition = service
            .dispatch(
                &WalletMethod::PersonalSign,
                &serde_json::json!(["0xdead", "0xabc"]),
                "https://dapp.example",
            )
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::NeedsApproval);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn accounts_is_silent_only_when_connected() {
        let (service, dir) = test_service();

        let before = service
            .dispatch(
                &WalletMethod::Accounts,
                &serde_json::json!([]),
                "https://dapp.example",
            )
            .await
            .unwrap();
        assert_eq!(before, Disposition::NeedsApproval);

        service
            .connections
            .upsert("https://dapp.example", "Example")
            .unwrap();

        match service
            .dispatch(
                &WalletMethod::Accounts,
                &serde_json::json!([]),
                "https://dapp.example",
            )
            .await
            .unwrap()
        {
            Disposition::Immediate(value) => {
                let accounts = value.as_array().unwrap();
                assert_eq!(accounts.len(), 1);
                assert!(accounts[0].as_str().unwrap().starts_with("0x"));
            }
            other => panic!("expected immediate answer, got {other:?}"),
        }

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn accounts_answers_even_while_locked() {
        let (service, dir) = test_service();
        service
            .connections
            .upsert("https://dapp.example", "Example")
            .unwrap();
        service.vault.lock();

        // Addresses are public; disclosure needs no signing capability
        let disposition = service
            .dispatch(
                &WalletMethod::Accounts,
                &serde_json::json!([]),
                "https://dapp.example",
            )
            .await
            .unwrap();
        assert!(matches!(disposition, Disposition::Immediate(_)));

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn chain_switch_is_local_and_immediate() {
        let (service, dir) = test_service();

        service
            .dispatch(
                &WalletMethod::AddChain,
                &serde_json::json!([{"chainId": "0x89", "chainName": "Polygon"}]),
                "https://dapp.example",
            )
            .await
            .unwrap();

        let disposition = service
            .dispatch(
                &WalletMethod::SwitchChain,
                &serde_json::json!([{"chainId": "0x89"}]),
                "https://dapp.example",
            )
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Immediate(serde_json::Value::Null));
        assert_eq!(service.chains.active_chain_id(), "0x89");

        let _ = fs::remove_dir_all(dir);
    }
}
