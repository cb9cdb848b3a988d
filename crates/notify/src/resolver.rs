//! Participant merging and identity resolution.
//!
//! Both shift queries of a schedule are merged into one [`ParticipantSet`],
//! which a [`ParticipantResolver`] then turns into display identities using
//! the configured strategy.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use config::ResolutionMode;
use tracing::{debug, warn};

use crate::channels::UserDirectory;
use crate::error::ResolveError;

/// Raw on-call identifiers of one schedule, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSet(BTreeSet<String>);

impl ParticipantSet {
    /// Union of the early and late shift identifiers (exact string match).
    #[must_use]
    pub fn merge<E, L>(early: E, late: L) -> Self
    where
        E: IntoIterator<Item = String>,
        L: IntoIterator<Item = String>,
    {
        Self(early.into_iter().chain(late).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for ParticipantSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Local part of an identifier: everything before the first `@`, then
/// everything before the first `+`.
///
/// `jane.doe+oncall@example.com` becomes `jane.doe`.
#[must_use]
pub fn normalize_identifier(identifier: &str) -> &str {
    let local = identifier.split('@').next().unwrap_or(identifier);
    local.split('+').next().unwrap_or(local)
}

/// Normalized identifier -> preferred display identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable(HashMap<String, String>);

impl AliasTable {
    #[must_use]
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(aliases)
    }

    /// Display identity for `identifier`: the alias of its normalized form,
    /// or the normalized form itself.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> String {
        let local = normalize_identifier(identifier);
        self.0
            .get(local)
            .cloned()
            .unwrap_or_else(|| local.to_string())
    }
}

/// A resolved on-call participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// What the message shows
    pub display: String,
    /// Chat user id, known only after a successful remote lookup
    pub user_id: Option<String>,
}

impl Identity {
    fn unlinked(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            user_id: None,
        }
    }
}

/// Outcome of resolving one schedule's participants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub identities: Vec<Identity>,
    /// Remote lookups that fell back to the raw identifier
    pub failures: usize,
    pub error: Option<ResolveError>,
}

impl Resolution {
    /// Display identities in output order.
    #[must_use]
    pub fn display_names(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.display.clone()).collect()
    }
}

enum Strategy {
    Email,
    RemoteLookup(Arc<dyn UserDirectory>),
    AliasTable(AliasTable),
}

/// Maps raw identifiers to display identities.
pub struct ParticipantResolver {
    strategy: Strategy,
}

impl ParticipantResolver {
    /// Show identifiers unchanged.
    #[must_use]
    pub fn email() -> Self {
        Self {
            strategy: Strategy::Email,
        }
    }

    /// Look every identifier up as an email address in the chat directory.
    #[must_use]
    pub fn remote_lookup(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            strategy: Strategy::RemoteLookup(directory),
        }
    }

    /// Map normalized identifiers through `aliases`.
    #[must_use]
    pub fn alias_table(aliases: AliasTable) -> Self {
        Self {
            strategy: Strategy::AliasTable(aliases),
        }
    }

    /// Build the resolver selected by `mode`.
    ///
    /// Remote lookup needs a directory; without one the resolver falls back
    /// to showing identifiers unchanged.
    #[must_use]
    pub fn for_mode(
        mode: ResolutionMode,
        directory: Option<Arc<dyn UserDirectory>>,
        aliases: &HashMap<String, String>,
    ) -> Self {
        match (mode, directory) {
            (ResolutionMode::RemoteLookup, Some(directory)) => Self::remote_lookup(directory),
            (ResolutionMode::RemoteLookup, None) => {
                warn!("Remote lookup requested without a user directory, showing raw identifiers");
                Self::email()
            }
            (ResolutionMode::AliasTable, _) => Self::alias_table(AliasTable::new(aliases.clone())),
            (ResolutionMode::Email, _) => Self::email(),
        }
    }

    /// Whether identities come back with chat user ids.
    #[must_use]
    pub fn links_users(&self) -> bool {
        matches!(self.strategy, Strategy::RemoteLookup(_))
    }

    /// Resolve every participant of `schedule`.
    pub async fn resolve(&self, schedule: &str, participants: &ParticipantSet) -> Resolution {
        match &self.strategy {
            Strategy::Email => Resolution {
                identities: participants.iter().map(Identity::unlinked).collect(),
                ..Resolution::default()
            },
            Strategy::AliasTable(aliases) => {
                // Distinct identifiers may share a local part or an alias.
                let mut seen = BTreeSet::new();
                let identities = participants
                    .iter()
                    .map(|id| aliases.resolve(id))
                    .filter(|display| seen.insert(display.clone()))
                    .map(Identity::unlinked)
                    .collect();
                Resolution {
                    identities,
                    ..Resolution::default()
                }
            }
            Strategy::RemoteLookup(directory) => {
                Self::lookup_all(directory.as_ref(), schedule, participants).await
            }
        }
    }

    async fn lookup_all(
        directory: &dyn UserDirectory,
        schedule: &str,
        participants: &ParticipantSet,
    ) -> Resolution {
        let mut identities = Vec::with_capacity(participants.len());
        let mut failures = 0;

        for email in participants.iter() {
            match directory.user_by_email(email).await {
                Ok(user) => {
                    debug!(schedule, email, username = %user.username, "Resolved chat user");
                    identities.push(Identity {
                        display: format!("@{}", user.username),
                        user_id: Some(user.id),
                    });
                }
                Err(e) => {
                    warn!(
                        schedule,
                        email,
                        error = %e,
                        "Chat user lookup failed, using raw identifier"
                    );
                    failures += 1;
                    identities.push(Identity::unlinked(email));
                }
            }
        }

        let error = if failures > 0 && failures == participants.len() {
            Some(ResolveError::AllLookupsFailed {
                schedule: schedule.to_string(),
                attempted: failures,
            })
        } else {
            if failures > 0 {
                warn!(
                    schedule,
                    failures,
                    total = participants.len(),
                    "Some chat user lookups failed"
                );
            }
            None
        };

        Resolution {
            identities,
            failures,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChatUser;
    use crate::error::ChannelError;
    use async_trait::async_trait;

    /// Directory knowing a fixed set of users.
    struct StaticDirectory(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn user_by_email(&self, email: &str) -> Result<ChatUser, ChannelError> {
            self.0
                .get(email)
                .map(|username| ChatUser {
                    id: format!("id-{username}"),
                    username: (*username).to_string(),
                })
                .ok_or_else(|| ChannelError::UserNotFound(email.to_string()))
        }
    }

    fn set(ids: &[&str]) -> ParticipantSet {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_merge_deduplicates_overlap() {
        let merged = ParticipantSet::merge(
            strings(&["a@x.com", "b@x.com", "a@x.com"]),
            strings(&["b@x.com", "c@x.com"]),
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn test_merge_is_exact_match() {
        let merged = ParticipantSet::merge(strings(&["A@x.com"]), strings(&["a@x.com"]));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("jane.doe+oncall@example.com"), "jane.doe");
        assert_eq!(normalize_identifier("jane.doe@example.com"), "jane.doe");
        assert_eq!(normalize_identifier("jane.doe"), "jane.doe");
        assert_eq!(normalize_identifier("a+b+c@x@y"), "a");
        assert_eq!(normalize_identifier(""), "");
    }

    #[test]
    fn test_alias_table_uses_normalized_key() {
        let table = AliasTable::new(HashMap::from([("jane.doe".to_string(), "jdoe".to_string())]));

        assert_eq!(table.resolve("jane.doe+oncall@example.com"), "jdoe");
        assert_eq!(table.resolve("john.roe+oncall@example.com"), "john.roe");
    }

    #[test]
    fn test_alias_table_never_keyed_by_full_identifier() {
        let table = AliasTable::new(HashMap::from([(
            "jane.doe@example.com".to_string(),
            "wrong".to_string(),
        )]));
        assert_eq!(table.resolve("jane.doe@example.com"), "jane.doe");
    }

    #[tokio::test]
    async fn test_email_mode_passes_identifiers_through() {
        let resolution = ParticipantResolver::email()
            .resolve("ops", &set(&["b@x.com", "a@x.com"]))
            .await;

        assert_eq!(resolution.display_names(), strings(&["a@x.com", "b@x.com"]));
        assert!(resolution.error.is_none());
    }

    #[tokio::test]
    async fn test_alias_mode_resolves_local_parts() {
        let resolver = ParticipantResolver::alias_table(AliasTable::default());
        let merged = ParticipantSet::merge(strings(&["a@x.com", "b@x.com"]), strings(&["b@x.com"]));
        let resolution = resolver.resolve("opsA", &merged).await;

        assert_eq!(resolution.display_names(), strings(&["a", "b"]));
        assert_eq!(resolution.failures, 0);
    }

    #[tokio::test]
    async fn test_alias_mode_collapses_shared_local_part() {
        let resolver = ParticipantResolver::alias_table(AliasTable::default());
        let merged = ParticipantSet::merge(
            strings(&["jane.doe@example.com"]),
            strings(&["jane.doe+oncall@example.com"]),
        );
        assert_eq!(merged.len(), 2);

        let resolution = resolver.resolve("ops", &merged).await;

        assert_eq!(resolution.display_names(), strings(&["jane.doe"]));
    }

    #[tokio::test]
    async fn test_alias_mode_collapses_shared_alias() {
        let table = AliasTable::new(HashMap::from([
            ("jane.doe".to_string(), "jdoe".to_string()),
            ("jane".to_string(), "jdoe".to_string()),
        ]));
        let resolver = ParticipantResolver::alias_table(table);
        let resolution = resolver
            .resolve("ops", &set(&["jane.doe@example.com", "jane@other.com", "zed@x.com"]))
            .await;

        assert_eq!(resolution.display_names(), strings(&["jdoe", "zed"]));
    }

    #[tokio::test]
    async fn test_remote_lookup_formats_handles() {
        let directory = StaticDirectory(HashMap::from([("a@x.com", "alice"), ("b@x.com", "bob")]));
        let resolver = ParticipantResolver::remote_lookup(Arc::new(directory));
        let resolution = resolver.resolve("ops", &set(&["a@x.com", "b@x.com"])).await;

        assert_eq!(resolution.display_names(), strings(&["@alice", "@bob"]));
        assert_eq!(resolution.identities[0].user_id.as_deref(), Some("id-alice"));
        assert!(resolution.error.is_none());
    }

    #[tokio::test]
    async fn test_remote_lookup_partial_failure_is_not_flagged() {
        let directory = StaticDirectory(HashMap::from([("a@x.com", "alice")]));
        let resolver = ParticipantResolver::remote_lookup(Arc::new(directory));
        let resolution = resolver.resolve("ops", &set(&["a@x.com", "z@x.com"])).await;

        assert_eq!(resolution.display_names(), strings(&["@alice", "z@x.com"]));
        assert_eq!(resolution.failures, 1);
        assert!(resolution.error.is_none());
    }

    #[tokio::test]
    async fn test_remote_lookup_total_failure_keeps_raw_and_flags() {
        let directory = StaticDirectory(HashMap::new());
        let resolver = ParticipantResolver::remote_lookup(Arc::new(directory));
        let resolution = resolver.resolve("ops", &set(&["a@x.com", "b@x.com"])).await;

        assert_eq!(resolution.display_names(), strings(&["a@x.com", "b@x.com"]));
        assert_eq!(resolution.failures, 2);
        assert_eq!(
            resolution.error,
            Some(ResolveError::AllLookupsFailed {
                schedule: "ops".to_string(),
                attempted: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_remote_lookup_empty_set_is_not_an_error() {
        let directory = StaticDirectory(HashMap::new());
        let resolver = ParticipantResolver::remote_lookup(Arc::new(directory));
        let resolution = resolver.resolve("ops", &ParticipantSet::default()).await;

        assert!(resolution.identities.is_empty());
        assert!(resolution.error.is_none());
    }

    #[test]
    fn test_for_mode_selects_strategy() {
        let aliases = HashMap::new();
        let alias = ParticipantResolver::for_mode(ResolutionMode::AliasTable, None, &aliases);
        assert!(!alias.links_users());
        let remote = ParticipantResolver::for_mode(ResolutionMode::RemoteLookup, None, &aliases);
        assert!(!remote.links_users());

        let directory: Arc<dyn UserDirectory> = Arc::new(StaticDirectory(HashMap::new()));
        assert!(
            ParticipantResolver::for_mode(ResolutionMode::RemoteLookup, Some(directory), &aliases)
                .links_users()
        );
    }
}
