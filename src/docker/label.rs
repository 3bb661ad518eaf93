//! Typed-metadata codec over the runtime's flat label store.
//!
//! Docker only stores flat string key-value labels, so every owning-entity
//! reference a runner carries is encoded as one label cluster per entity:
//! `<prefix>.<namespace>.<field> = <value>`, with kebab-case namespaces and
//! field names. This module converts between those clusters and typed domain
//! models, tracking which fields were actually supplied (see
//! [`Tracked`]) so that sparse labels stay distinguishable from zero values.
//!
//! The namespace registry is closed: `vpn-identity`, `provider`,
//! `proxy-downstream`, `proxy-upstream`. Parsing fails hard on anything
//! else; there is no partial success.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FleetError;
use crate::model::identity::VpnIdentity;
use crate::model::provider::Provider;
use crate::model::proxy::{ProxyDownstream, ProxyUpstream};
use crate::model::tracked::Tracked;

/// One untyped label cluster: a namespace discriminator plus its fields,
/// keyed by wire (kebab) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    /// Namespace discriminator, e.g. `vpn-identity`.
    pub namespace: String,
    /// Field values by wire name.
    pub fields: BTreeMap<String, String>,
}

impl LabelEntry {
    /// Start an entry for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field by wire name.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A domain type that owns a label namespace.
pub trait Labeled: Sized {
    /// The namespace discriminator this type decodes from.
    const NAMESPACE: &'static str;

    /// Decode wire fields into a tracked instance. Fields absent from the
    /// map stay at their default and are flagged as such.
    fn decode(fields: &BTreeMap<String, String>) -> Tracked<Self>;

    /// Encode the label-visible, non-default fields back to wire pairs.
    fn encode(tracked: &Tracked<Self>) -> Vec<(&'static str, String)>;

    /// Pull this type's instance out of a parsed entry, if it is one.
    fn extract(parsed: &ParsedLabel) -> Option<&Tracked<Self>>;
}

/// A label entry resolved against the namespace registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLabel {
    /// `vpn-identity` cluster.
    Identity(Tracked<VpnIdentity>),
    /// `provider` cluster.
    Provider(Tracked<Provider>),
    /// `proxy-downstream` cluster.
    ProxyDownstream(Tracked<ProxyDownstream>),
    /// `proxy-upstream` cluster.
    ProxyUpstream(Tracked<ProxyUpstream>),
}

impl ParsedLabel {
    fn namespace(&self) -> &'static str {
        match self {
            Self::Identity(_) => VpnIdentity::NAMESPACE,
            Self::Provider(_) => Provider::NAMESPACE,
            Self::ProxyDownstream(_) => ProxyDownstream::NAMESPACE,
            Self::ProxyUpstream(_) => ProxyUpstream::NAMESPACE,
        }
    }

    fn encode(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Identity(t) => VpnIdentity::encode(t),
            Self::Provider(t) => Provider::encode(t),
            Self::ProxyDownstream(t) => ProxyDownstream::encode(t),
            Self::ProxyUpstream(t) => ProxyUpstream::encode(t),
        }
    }
}

/// Decodes label entries against the fixed namespace registry.
#[derive(Debug, Clone)]
pub struct LabelParser {
    models: Vec<ParsedLabel>,
}

impl LabelParser {
    /// Resolve every entry against the registry.
    ///
    /// Fails on an empty entry list and on any unrecognized namespace; there
    /// is never a partial result.
    pub fn parse(entries: &[LabelEntry]) -> Result<Self, FleetError> {
        if entries.is_empty() {
            return Err(FleetError::IncompleteInput { fields: vec!["label"] });
        }

        let mut models = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = match entry.namespace.as_str() {
                VpnIdentity::NAMESPACE => ParsedLabel::Identity(VpnIdentity::decode(&entry.fields)),
                Provider::NAMESPACE => ParsedLabel::Provider(Provider::decode(&entry.fields)),
                ProxyDownstream::NAMESPACE => {
                    ParsedLabel::ProxyDownstream(ProxyDownstream::decode(&entry.fields))
                }
                ProxyUpstream::NAMESPACE => {
                    ParsedLabel::ProxyUpstream(ProxyUpstream::decode(&entry.fields))
                }
                other => {
                    return Err(FleetError::UnrecognizedNamespace {
                        namespace: other.to_string(),
                    });
                }
            };
            models.push(parsed);
        }

        Ok(Self { models })
    }

    /// The decoded instance for `T`, or `MissingModel` if no entry of that
    /// namespace was parsed.
    pub fn instance<T: Labeled>(&self) -> Result<&Tracked<T>, FleetError> {
        self.models
            .iter()
            .find_map(T::extract)
            .ok_or(FleetError::MissingModel {
                namespace: T::NAMESPACE,
            })
    }

    /// Flatten every parsed entry's supplied fields to
    /// `<prefix>.<namespace>.<field> = value`, omitting fields named in
    /// `exclude` and fields still flagged default.
    pub fn to_label_map(&self, prefix: &str, exclude: &[&str]) -> BTreeMap<String, String> {
        let prefix = normalize_prefix(prefix);
        let mut map = BTreeMap::new();

        for parsed in &self.models {
            let namespace = parsed.namespace();
            for (field, value) in parsed.encode() {
                if exclude.contains(&field) {
                    continue;
                }
                map.insert(format!("{prefix}.{namespace}.{field}"), value);
            }
        }

        map
    }
}

/// Regroup a flat label map back into entries, the stateless inverse of
/// [`LabelParser::to_label_map`].
///
/// Only keys of the form `<prefix>.<namespace>.<field>` participate; an
/// empty result means nothing under the prefix matched. Namespaces are not
/// validated here: unknown ones flow through as entries and fail at
/// [`LabelParser::parse`], so the hard-failure invariant holds at one place.
pub fn from_label_map(prefix: &str, flat: &BTreeMap<String, String>) -> Vec<LabelEntry> {
    let prefix = normalize_prefix(prefix);
    let lead = format!("{prefix}.");
    let mut entries: Vec<LabelEntry> = Vec::new();

    for (key, value) in flat {
        let Some(rest) = key.strip_prefix(&lead) else {
            continue;
        };
        let mut parts = rest.splitn(2, '.');
        let (Some(namespace), Some(field)) = (parts.next(), parts.next()) else {
            continue;
        };
        if namespace.is_empty() || field.is_empty() || field.contains('.') {
            continue;
        }

        match entries.iter_mut().find(|e| e.namespace == namespace) {
            Some(entry) => {
                entry.fields.insert(field.to_string(), value.clone());
            }
            None => {
                entries.push(LabelEntry::new(namespace).field(field, value.clone()));
            }
        }
    }

    entries
}

/// Trim one trailing `.` from a configured label prefix.
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix('.').unwrap_or(prefix)
}

macro_rules! decode_fields {
    ($fields:expr, $value:expr, $defaults:expr, { $($wire:literal => $field:ident),+ $(,)? }) => {
        $(
            if let Some(supplied) = $fields.get($wire) {
                $value.$field = supplied.clone();
                $defaults.remove($wire);
            }
        )+
    };
}

impl Labeled for VpnIdentity {
    const NAMESPACE: &'static str = "vpn-identity";

    fn decode(fields: &BTreeMap<String, String>) -> Tracked<Self> {
        let mut value = Self::default();
        let mut defaults: std::collections::BTreeSet<&'static str> =
            ["id", "identity", "passphrase", "path", "filename", "is-use", "insert-date"]
                .into_iter()
                .collect();

        decode_fields!(fields, value, defaults, {
            "id" => id,
            "identity" => identity,
            "passphrase" => passphrase,
        });

        Tracked::new(value, defaults)
    }

    fn encode(tracked: &Tracked<Self>) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if !tracked.is_default("id") {
            out.push(("id", tracked.id.clone()));
        }
        if !tracked.is_default("identity") {
            out.push(("identity", tracked.identity.clone()));
        }
        if !tracked.is_default("passphrase") {
            out.push(("passphrase", tracked.passphrase.clone()));
        }
        out
    }

    fn extract(parsed: &ParsedLabel) -> Option<&Tracked<Self>> {
        match parsed {
            ParsedLabel::Identity(t) => Some(t),
            _ => None,
        }
    }
}

impl Labeled for Provider {
    const NAMESPACE: &'static str = "provider";

    fn decode(fields: &BTreeMap<String, String>) -> Tracked<Self> {
        let mut value = Self::default();
        let mut defaults: std::collections::BTreeSet<&'static str> = [
            "id",
            "user-identity",
            "provider-identity",
            "service-type",
            "ip-type",
            "country",
            "is-register",
            "insert-date",
        ]
        .into_iter()
        .collect();

        decode_fields!(fields, value, defaults, {
            "id" => id,
            "provider-identity" => provider_identity,
        });
        if let Some(supplied) = fields.get("user-identity") {
            value.user_identity = Some(supplied.clone());
            defaults.remove("user-identity");
        }

        Tracked::new(value, defaults)
    }

    fn encode(tracked: &Tracked<Self>) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if !tracked.is_default("id") {
            out.push(("id", tracked.id.clone()));
        }
        if !tracked.is_default("user-identity") {
            if let Some(user_identity) = &tracked.user_identity {
                out.push(("user-identity", user_identity.clone()));
            }
        }
        if !tracked.is_default("provider-identity") {
            out.push(("provider-identity", tracked.provider_identity.clone()));
        }
        out
    }

    fn extract(parsed: &ParsedLabel) -> Option<&Tracked<Self>> {
        match parsed {
            ParsedLabel::Provider(t) => Some(t),
            _ => None,
        }
    }
}

impl Labeled for ProxyDownstream {
    const NAMESPACE: &'static str = "proxy-downstream";

    fn decode(fields: &BTreeMap<String, String>) -> Tracked<Self> {
        let mut value = Self {
            id: String::new(),
            ref_id: String::new(),
            ip: None,
            mask: None,
            kind: crate::model::proxy::ProxyType::Vpn,
            runner: None,
            status: crate::model::proxy::ProxyStatus::Offline,
        };
        let mut defaults: std::collections::BTreeSet<&'static str> =
            ["id", "ref-id", "ip", "mask", "kind", "status"].into_iter().collect();

        decode_fields!(fields, value, defaults, {
            "id" => id,
            "ref-id" => ref_id,
        });

        Tracked::new(value, defaults)
    }

    fn encode(tracked: &Tracked<Self>) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if !tracked.is_default("id") {
            out.push(("id", tracked.id.clone()));
        }
        if !tracked.is_default("ref-id") {
            out.push(("ref-id", tracked.ref_id.clone()));
        }
        out
    }

    fn extract(parsed: &ParsedLabel) -> Option<&Tracked<Self>> {
        match parsed {
            ParsedLabel::ProxyDownstream(t) => Some(t),
            _ => None,
        }
    }
}

impl Labeled for ProxyUpstream {
    const NAMESPACE: &'static str = "proxy-upstream";

    fn decode(fields: &BTreeMap<String, String>) -> Tracked<Self> {
        let mut value = Self {
            id: String::new(),
            listen_addr: String::new(),
            listen_port: 0,
            downstream: Vec::new(),
            runner: None,
            insert_date: chrono::Utc::now(),
        };
        let mut defaults: std::collections::BTreeSet<&'static str> =
            ["id", "listen-addr", "listen-port", "insert-date"].into_iter().collect();

        decode_fields!(fields, value, defaults, {
            "id" => id,
        });

        Tracked::new(value, defaults)
    }

    fn encode(tracked: &Tracked<Self>) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if !tracked.is_default("id") {
            out.push(("id", tracked.id.clone()));
        }
        out
    }

    fn extract(parsed: &ParsedLabel) -> Option<&Tracked<Self>> {
        match parsed {
            ParsedLabel::ProxyUpstream(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PREFIX: &str = "com.mystfleet";

    #[test]
    fn parse_rejects_empty_label_set() {
        let err = LabelParser::parse(&[]).unwrap_err();
        assert!(matches!(err, FleetError::IncompleteInput { .. }));
    }

    #[test]
    fn parse_rejects_unrecognized_namespace_without_partial_result() {
        let entries = vec![
            LabelEntry::new("vpn-identity").field("id", "i1"),
            LabelEntry::new("mystery-box").field("id", "x"),
        ];

        let err = LabelParser::parse(&entries).unwrap_err();
        match err {
            FleetError::UnrecognizedNamespace { namespace } => {
                assert_eq!(namespace, "mystery-box");
            }
            other => panic!("expected UnrecognizedNamespace, got {other:?}"),
        }
    }

    #[test]
    fn missing_model_is_reported_by_namespace() {
        let parser =
            LabelParser::parse(&[LabelEntry::new("vpn-identity").field("id", "i1")]).unwrap();

        let err = parser.instance::<Provider>().unwrap_err();
        match err {
            FleetError::MissingModel { namespace } => assert_eq!(namespace, "provider"),
            other => panic!("expected MissingModel, got {other:?}"),
        }
    }

    #[test]
    fn partial_decode_flags_omitted_fields_default() {
        let entries = vec![
            LabelEntry::new("vpn-identity")
                .field("id", "X")
                .field("identity", "Y"),
        ];
        let parser = LabelParser::parse(&entries).unwrap();
        let identity = parser.instance::<VpnIdentity>().unwrap();

        assert_eq!(identity.id, "X");
        assert_eq!(identity.identity, "Y");
        assert!(!identity.is_default("id"));
        assert!(!identity.is_default("identity"));
        assert!(identity.is_default("passphrase"));
    }

    #[test]
    fn round_trip_reproduces_every_set_field() {
        let entries = vec![
            LabelEntry::new("vpn-identity")
                .field("id", "i1")
                .field("identity", "0xuser"),
            LabelEntry::new("provider")
                .field("id", "p1")
                .field("user-identity", "0xuser")
                .field("provider-identity", "0xprov"),
        ];

        let parser = LabelParser::parse(&entries).unwrap();
        let flat = parser.to_label_map(PREFIX, &[]);
        let decoded = from_label_map(PREFIX, &flat);
        let reparsed = LabelParser::parse(&decoded).unwrap();
        let reencoded = reparsed.to_label_map(PREFIX, &[]);

        assert_eq!(flat, reencoded);
        assert_eq!(flat.get("com.mystfleet.vpn-identity.id").map(String::as_str), Some("i1"));
        assert_eq!(
            flat.get("com.mystfleet.provider.provider-identity").map(String::as_str),
            Some("0xprov")
        );
    }

    #[test]
    fn to_label_map_omits_excluded_and_default_fields() {
        let entries = vec![
            LabelEntry::new("vpn-identity")
                .field("id", "i1")
                .field("identity", "0xuser")
                .field("passphrase", "secret"),
        ];
        let parser = LabelParser::parse(&entries).unwrap();

        let flat = parser.to_label_map(PREFIX, &["passphrase"]);
        assert_eq!(flat.len(), 2);
        assert!(!flat.keys().any(|k| k.contains("passphrase")));
    }

    #[test]
    fn from_label_map_regroups_by_namespace() {
        let mut flat = BTreeMap::new();
        flat.insert("com.mystfleet.vpn-identity.id".to_string(), "i1".to_string());
        flat.insert("com.mystfleet.provider.id".to_string(), "p1".to_string());
        flat.insert(
            "com.mystfleet.provider.provider-identity".to_string(),
            "0xprov".to_string(),
        );
        // Structure labels and foreign keys must not contribute entries.
        flat.insert("com.mystfleet.id".to_string(), "runner-id".to_string());
        flat.insert("com.mystfleet.project".to_string(), "identity".to_string());
        flat.insert("autoheal".to_string(), "true".to_string());

        let entries = from_label_map(PREFIX, &flat);
        assert_eq!(entries.len(), 2);

        let provider = entries.iter().find(|e| e.namespace == "provider").unwrap();
        assert_eq!(provider.fields.len(), 2);
        assert_eq!(provider.fields.get("id").map(String::as_str), Some("p1"));
    }

    #[test]
    fn from_label_map_on_foreign_prefix_matches_nothing() {
        let mut flat = BTreeMap::new();
        flat.insert("io.other.vpn-identity.id".to_string(), "i1".to_string());

        assert!(from_label_map(PREFIX, &flat).is_empty());
    }

    #[test]
    fn unknown_namespace_survives_regroup_and_fails_at_parse() {
        let mut flat = BTreeMap::new();
        flat.insert("com.mystfleet.legacy-thing.id".to_string(), "z".to_string());

        let entries = from_label_map(PREFIX, &flat);
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            LabelParser::parse(&entries),
            Err(FleetError::UnrecognizedNamespace { .. })
        ));
    }

    #[test]
    fn trailing_dot_prefix_is_normalized() {
        let entries = vec![LabelEntry::new("vpn-identity").field("id", "i1")];
        let parser = LabelParser::parse(&entries).unwrap();

        let with_dot = parser.to_label_map("com.mystfleet.", &[]);
        let without = parser.to_label_map("com.mystfleet", &[]);
        assert_eq!(with_dot, without);
    }
}
