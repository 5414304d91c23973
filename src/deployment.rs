//! Contract deployment lookup from a build artifact's `networks` table.
//!
//! The artifact is the JSON the contract toolchain writes after migrating,
//! keyed by network id:
//!
//! ```json
//! { "contractName": "Lottery", "networks": { "5777": { "address": "0x5b18..." } } }
//! ```

use crate::ledger::{
    Address,
    NetworkId,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeployment {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "transactionHash", skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    #[serde(default, rename = "contractName", skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDeployment>,
}

impl DeploymentArtifact {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: Some(contract_name.into()),
            networks: BTreeMap::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).wrap_err_with(|| {
            format!("Failed to read deployment artifact: {}", path.display())
        })?;
        Self::from_json_slice(&data)
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(data).wrap_err("Failed to parse deployment artifact JSON")
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .wrap_err("Failed to serialize deployment artifact")?;
        fs::write(path.as_ref(), json).wrap_err("Failed to write deployment artifact")?;
        Ok(())
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn record(&mut self, network_id: NetworkId, address: &Address) {
        self.networks.insert(
            network_id.to_string(),
            NetworkDeployment {
                address: Some(address.to_string()),
                transaction_hash: None,
            },
        );
    }

    /// Address deployed on `network_id`. A blank address counts as absent.
    pub fn resolve(&self, network_id: NetworkId) -> Option<Address> {
        self.networks
            .get(&network_id.to_string())
            .and_then(|deployment| deployment.address.as_deref())
            .map(Address::new)
            .filter(|address| !address.is_empty())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    const ARTIFACT: &str = r#"{
        "contractName": "Lottery",
        "abi": [],
        "networks": {
            "5777": { "address": "0x5b1869D9A4C187F2EAa108f3062412ecf0526b24", "transactionHash": "0x01" },
            "3": { "address": "" }
        }
    }"#;

    #[test]
    fn resolve__known_network__returns_address() {
        // given
        let artifact = DeploymentArtifact::from_json_slice(ARTIFACT.as_bytes()).unwrap();

        // when
        let actual = artifact.resolve(5777);

        // then
        let expected = Address::new("0x5b1869D9A4C187F2EAa108f3062412ecf0526b24");
        assert_eq!(actual, Some(expected));
    }

    #[test]
    fn resolve__blank_or_unknown_network__is_absent() {
        let artifact = DeploymentArtifact::from_json_slice(ARTIFACT.as_bytes()).unwrap();
        assert_eq!(artifact.resolve(3), None);
        assert_eq!(artifact.resolve(1), None);
    }

    #[test]
    fn from_json_slice__empty_input__has_no_networks() {
        let artifact = DeploymentArtifact::from_json_slice(b"  \n").unwrap();
        assert!(artifact.networks.is_empty());
    }

    #[test]
    fn from_json_slice__malformed_input__is_an_error() {
        assert!(DeploymentArtifact::from_json_slice(b"{ networks: ").is_err());
    }

    #[test]
    fn save_then_load__keeps_recorded_networks() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let path = dir.path().join("Lottery.json");
        let address = Address::new("0xfeed");
        let mut artifact = DeploymentArtifact::new("Lottery");
        artifact.record(42, &address);

        // when
        artifact.save(&path).unwrap();
        let loaded = DeploymentArtifact::load(&path).unwrap();

        // then
        assert_eq!(loaded.resolve(42), Some(address));
        assert_eq!(loaded.contract_name.as_deref(), Some("Lottery"));
    }

    #[test]
    fn load__missing_file__reports_path() {
        let dir = TempDir::new("deployments").unwrap();
        let err = DeploymentArtifact::load(dir.path().join("nope.json")).unwrap_err();
        assert!(format!("{err:?}").contains("nope.json"));
    }
}
