// ABOUTME: Static catalog of backend source kinds and their configuration fields.
// ABOUTME: Adapters are selected through this registry rather than ad hoc branching.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of backend kinds the sync layer can dispatch to.
/// Wire names are kebab-case and appear in persisted SyncState.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    LocalStore,
    SpreadsheetForm,
    Gist,
    RepoFile,
    HostedBin,
    HostedEndpoint,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::LocalStore => "local-store",
            SourceId::SpreadsheetForm => "spreadsheet-form",
            SourceId::Gist => "gist",
            SourceId::RepoFile => "repo-file",
            SourceId::HostedBin => "hosted-bin",
            SourceId::HostedEndpoint => "hosted-endpoint",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-store" => Ok(SourceId::LocalStore),
            "spreadsheet-form" => Ok(SourceId::SpreadsheetForm),
            "gist" => Ok(SourceId::Gist),
            "repo-file" => Ok(SourceId::RepoFile),
            "hosted-bin" => Ok(SourceId::HostedBin),
            "hosted-endpoint" => Ok(SourceId::HostedEndpoint),
            other => Err(format!("unknown source id: {}", other)),
        }
    }
}

/// One configuration field of a source. Optional fields (typically tokens)
/// are accepted empty; required fields must be non-empty to activate.
#[derive(Debug, Clone, Copy)]
pub struct ConfigField {
    pub name: &'static str,
    pub required: bool,
}

const fn req(name: &'static str) -> ConfigField {
    ConfigField {
        name,
        required: true,
    }
}

const fn opt(name: &'static str) -> ConfigField {
    ConfigField {
        name,
        required: false,
    }
}

/// Immutable description of one backend kind: identity, display label,
/// and the configuration fields it understands.
#[derive(Debug, Clone, Copy)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub label: &'static str,
    pub requires_config: bool,
    pub fields: &'static [ConfigField],
}

impl SourceDescriptor {
    /// Names of the fields that must be present and non-empty.
    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }
}

const REGISTRY: &[SourceDescriptor] = &[
    SourceDescriptor {
        id: SourceId::LocalStore,
        label: "Local Storage",
        requires_config: false,
        fields: &[],
    },
    SourceDescriptor {
        id: SourceId::SpreadsheetForm,
        label: "Spreadsheet Form",
        requires_config: true,
        fields: &[req("form_url"), req("api_url")],
    },
    SourceDescriptor {
        id: SourceId::Gist,
        label: "Gist",
        requires_config: true,
        fields: &[req("gist_id"), req("filename"), opt("token")],
    },
    SourceDescriptor {
        id: SourceId::RepoFile,
        label: "Repo File",
        requires_config: true,
        fields: &[
            req("owner"),
            req("repo"),
            req("path"),
            req("branch"),
            opt("token"),
        ],
    },
    SourceDescriptor {
        id: SourceId::HostedBin,
        label: "Hosted Bin",
        requires_config: true,
        fields: &[req("bin_id"), req("api_key")],
    },
    SourceDescriptor {
        id: SourceId::HostedEndpoint,
        label: "Hosted Endpoint",
        requires_config: true,
        fields: &[req("endpoint_id")],
    },
];

/// All known source descriptors, in registry order.
pub fn registry() -> &'static [SourceDescriptor] {
    REGISTRY
}

/// Look up the descriptor for a source kind. The registry covers every
/// SourceId variant, so this never fails.
pub fn descriptor(id: SourceId) -> &'static SourceDescriptor {
    REGISTRY
        .iter()
        .find(|d| d.id == id)
        .expect("registry covers all source ids")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_sources() {
        let ids = [
            SourceId::LocalStore,
            SourceId::SpreadsheetForm,
            SourceId::Gist,
            SourceId::RepoFile,
            SourceId::HostedBin,
            SourceId::HostedEndpoint,
        ];

        assert_eq!(registry().len(), ids.len());
        for id in ids {
            let d = descriptor(id);
            assert_eq!(d.id, id);
        }
    }

    #[test]
    fn local_store_needs_no_config() {
        let d = descriptor(SourceId::LocalStore);
        assert!(!d.requires_config);
        assert_eq!(d.required_fields().count(), 0);
    }

    #[test]
    fn tokens_are_optional() {
        let repo = descriptor(SourceId::RepoFile);
        let required: Vec<_> = repo.required_fields().collect();
        assert!(required.contains(&"owner"));
        assert!(required.contains(&"branch"));
        assert!(!required.contains(&"token"));

        let gist = descriptor(SourceId::Gist);
        assert!(!gist.required_fields().any(|f| f == "token"));
    }

    #[test]
    fn source_id_round_trips_through_str() {
        for d in registry() {
            let parsed: SourceId = d.id.as_str().parse().unwrap();
            assert_eq!(parsed, d.id);
        }
        assert!("floppy-disk".parse::<SourceId>().is_err());
    }

    #[test]
    fn source_id_serializes_kebab_case() {
        let json = serde_json::to_string(&SourceId::RepoFile).unwrap();
        assert_eq!(json, "\"repo-file\"");

        let back: SourceId = serde_json::from_str("\"hosted-bin\"").unwrap();
        assert_eq!(back, SourceId::HostedBin);
    }
}
