//! Account switching logic.
//!
//! This module implements the core mechanism of `ccswap`: moving the host
//! application from one managed account to another. A switch always runs in
//! the same order:
//!
//! 1. Work out which account is live right now, from the host's own files.
//! 2. Back up the live OAuth login, or tear down the live API environment.
//! 3. Restore the target's OAuth login, or project its API environment.
//! 4. Commit the registry.
//!
//! The registry write is last, so a switch that fails part-way leaves the
//! registry pointing at the account that was active before and can simply
//! be retried.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backup::Backups;
use crate::environment::{EnvironmentProjector, export_lines, unset_line};
use crate::error::AccountError;
use crate::host::{HostConfig, Identity};
use crate::identifier::resolve;
use crate::paths::Paths;
use crate::registry::{AccountEntry, AccountType, Registry};
use crate::secrets::{LIVE_CREDENTIALS, SecretBackend};
use crate::store::AccountStore;
use crate::vault::{ApiRecord, ApiVault};

/// What an account needs in order to be activated. An API account always
/// carries its vault record.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountKind {
    Oauth,
    Api(ApiRecord),
}

impl AccountKind {
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountKind::Oauth => AccountType::Oauth,
            AccountKind::Api(_) => AccountType::Api,
        }
    }
}

/// A registry entry joined with its vault record
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub number: u32,
    /// Email for OAuth accounts, display name for API accounts
    pub label: String,
    pub uuid: String,
    pub added: DateTime<Utc>,
    pub kind: AccountKind,
}

impl Account {
    fn load(registry: &Registry, vault: &ApiVault, number: u32) -> Result<Self, AccountError> {
        let entry = registry
            .get(number)
            .ok_or_else(|| AccountError::AccountNotFound(number.to_string()))?;
        let kind = match entry.account_type {
            AccountType::Oauth => AccountKind::Oauth,
            AccountType::Api => AccountKind::Api(
                vault
                    .get(number)
                    .cloned()
                    .ok_or(AccountError::VaultRecordMissing(number))?,
            ),
        };
        Ok(Self {
            number,
            label: entry.email.clone(),
            uuid: entry.uuid.clone(),
            added: entry.added,
            kind,
        })
    }

    pub fn account_type(&self) -> AccountType {
        self.kind.account_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { number: u32, email: String },
    /// The live login is already registered; nothing changed
    AlreadyManaged { number: u32, email: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched {
        from: Option<u32>,
        to: u32,
        label: String,
        account_type: AccountType,
    },
    /// The host was logged in to an unmanaged account; it has been
    /// registered instead of rotating. Rotate again to move on.
    RegisteredLive { number: u32, email: String },
}

/// What a removal would do, for the confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPreview {
    pub number: u32,
    pub label: String,
    pub account_type: AccountType,
    /// Removing it leaves no account active
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub accounts: Vec<Account>,
    pub active: Option<u32>,
    /// Who the host application is logged in as
    pub live: Option<Identity>,
    /// Number of the OAuth account matching `live`, if managed
    pub live_number: Option<u32>,
    pub env_applied: bool,
}

/// The account currently in effect, as far as the host's files say
#[derive(Debug, Clone, PartialEq)]
enum Current {
    Nothing,
    Oauth { number: u32, email: String },
    Api { number: u32 },
    Unmanaged(Identity),
}

pub struct SwitchEngine<'a> {
    store: &'a dyn AccountStore,
    secrets: &'a dyn SecretBackend,
    projector: &'a dyn EnvironmentProjector,
    backups: Backups<'a>,
    host: HostConfig,
}

impl<'a> SwitchEngine<'a> {
    pub fn new(
        paths: &'a Paths,
        store: &'a dyn AccountStore,
        secrets: &'a dyn SecretBackend,
        projector: &'a dyn EnvironmentProjector,
    ) -> Self {
        Self {
            store,
            secrets,
            projector,
            backups: Backups::new(paths, secrets),
            host: HostConfig::new(&paths.claude_config),
        }
    }

    pub fn backups(&self) -> &Backups<'a> {
        &self.backups
    }

    /// Register whoever the host is logged in as and make it active
    pub fn add_oauth(&self) -> Result<AddOutcome> {
        let _lock = self.store.lock()?;
        let mut registry = self.store.load_registry()?;

        let identity = self
            .host
            .current_identity()?
            .ok_or(AccountError::NotLoggedIn)?;

        if let Some(number) = registry.find_oauth(&identity.email) {
            warn!(number, email = %identity.email, "account already managed");
            return Ok(AddOutcome::AlreadyManaged {
                number,
                email: identity.email,
            });
        }

        let number = self.register_live(&mut registry, &identity)?;
        Ok(AddOutcome::Added {
            number,
            email: identity.email,
        })
    }

    /// Register an API account from its endpoint and token. The new account
    /// is not activated.
    pub fn add_api(
        &self,
        name: Option<&str>,
        base_url: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<u32> {
        let base_url = base_url.map(str::trim).filter(|s| !s.is_empty());
        let auth_token = auth_token.map(str::trim).filter(|s| !s.is_empty());

        let mut missing = Vec::new();
        if base_url.is_none() {
            missing.push(crate::environment::BASE_URL_VAR);
        }
        if auth_token.is_none() {
            missing.push(crate::environment::AUTH_TOKEN_VAR);
        }
        let (Some(base_url), Some(auth_token)) = (base_url, auth_token) else {
            return Err(AccountError::MissingCredentials(missing).into());
        };

        let _lock = self.store.lock()?;
        let mut registry = self.store.load_registry()?;
        let mut vault = self.store.load_vault()?;

        let number = registry.next_account_number();
        let label = match name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => default_api_label(base_url, number),
        };
        if registry.find_by_email(&label).is_some() {
            return Err(AccountError::LabelInUse(label).into());
        }

        let uuid = format!("api-{}-{}", number, Utc::now().timestamp());
        vault.upsert(number, ApiRecord::new(&label, base_url, auth_token));
        registry.insert(number, AccountEntry::new(&label, uuid, AccountType::Api));

        // vault before registry: a crash in between leaves an orphan record,
        // never an API account without one
        self.store.save_vault(&vault, &registry)?;
        self.store.save_registry(&registry)?;

        info!(number, name = %label, "added API account");
        Ok(number)
    }

    /// Look up what removing `identifier` would affect
    pub fn removal_preview(&self, identifier: &str) -> Result<RemovalPreview> {
        let registry = self.store.load_registry()?;
        let number = resolve(&registry, identifier)?;
        let entry = registry
            .get(number)
            .ok_or_else(|| AccountError::AccountNotFound(identifier.to_string()))?;
        Ok(RemovalPreview {
            number,
            label: entry.email.clone(),
            account_type: entry.account_type,
            is_active: registry.active_account_number == Some(number),
        })
    }

    /// Forget an account and everything stored for it. Removing the active
    /// account leaves nothing active.
    pub fn remove(&self, identifier: &str) -> Result<RemovalPreview> {
        let _lock = self.store.lock()?;
        let mut registry = self.store.load_registry()?;
        let mut vault = self.store.load_vault()?;

        let number = resolve(&registry, identifier)?;
        let is_active = registry.active_account_number == Some(number);
        let entry = registry
            .remove(number)
            .ok_or_else(|| AccountError::AccountNotFound(identifier.to_string()))?;
        vault.remove(number);

        // registry before vault: a crash in between leaves an orphan record,
        // never an API account without one
        self.store.save_registry(&registry)?;
        self.store.save_vault(&vault, &registry)?;

        match entry.account_type {
            AccountType::Oauth => self.backups.discard(number, &entry.email)?,
            AccountType::Api if is_active => self.projector.clear()?,
            AccountType::Api => {}
        }

        info!(number, label = %entry.email, was_active = is_active, "removed account");
        Ok(RemovalPreview {
            number,
            label: entry.email,
            account_type: entry.account_type,
            is_active,
        })
    }

    /// Move to the next account in rotation order
    pub fn rotate(&self) -> Result<SwitchOutcome> {
        let _lock = self.store.lock()?;
        let mut registry = self.store.load_registry()?;
        if registry.is_empty() {
            return Err(AccountError::NoAccounts.into());
        }

        if let Some((number, email)) = self.heal_drift(&mut registry)? {
            return Ok(SwitchOutcome::RegisteredLive { number, email });
        }

        let target = registry.next_in_rotation()?;
        self.perform_switch(registry, target)
    }

    /// Switch to the account named by a number or an email address
    pub fn switch_to(&self, identifier: &str) -> Result<SwitchOutcome> {
        let _lock = self.store.lock()?;
        let mut registry = self.store.load_registry()?;
        let target = resolve(&registry, identifier)?;

        // the target is fixed, so a freshly registered live login only
        // needs to be preserved before moving on
        self.heal_drift(&mut registry)?;
        self.perform_switch(registry, target)
    }

    /// Shell commands that bring a shell in line with the active account
    pub fn environment_commands(&self) -> Result<Vec<String>> {
        let registry = self.store.load_registry()?;
        let vault = self.store.load_vault()?;
        match registry.active() {
            Some((number, entry)) if entry.account_type == AccountType::Api => {
                let record = vault
                    .get(number)
                    .ok_or(AccountError::VaultRecordMissing(number))?;
                Ok(export_lines(record))
            }
            _ => Ok(vec![unset_line()]),
        }
    }

    pub fn overview(&self) -> Result<Overview> {
        let registry = self.store.load_registry()?;
        let vault = self.store.load_vault()?;
        let accounts = registry
            .sequence
            .iter()
            .map(|number| Account::load(&registry, &vault, *number))
            .collect::<Result<Vec<_>, _>>()?;
        let live = self.host.current_identity()?;
        let live_number = live.as_ref().and_then(|id| registry.find_oauth(&id.email));
        Ok(Overview {
            accounts,
            active: registry.active_account_number,
            live,
            live_number,
            env_applied: self.projector.is_applied(),
        })
    }

    /// Back up the live login as a new account and make it active.
    /// Caller holds the store lock.
    fn register_live(&self, registry: &mut Registry, identity: &Identity) -> Result<u32> {
        let previous = registry.active().map(|(n, e)| (n, e.account_type));
        let number = registry.next_account_number();

        self.backups.backup(&self.host, number, &identity.email)?;

        // an OAuth login becoming active retires any projected API env
        if matches!(previous, Some((_, AccountType::Api))) || self.projector.is_applied() {
            self.projector.clear()?;
        }

        registry.insert(
            number,
            AccountEntry::new(&identity.email, &identity.uuid, AccountType::Oauth),
        );
        registry.set_active(number);
        self.store.save_registry(registry)?;

        info!(number, email = %identity.email, "added OAuth account");
        Ok(number)
    }

    /// Register the live login if the host moved to an account we do not
    /// manage. Returns the new number when that happened.
    fn heal_drift(&self, registry: &mut Registry) -> Result<Option<(u32, String)>> {
        match self.current(registry)? {
            Current::Unmanaged(identity) => {
                warn!(email = %identity.email, "host is logged in to an unmanaged account, registering it");
                let number = self.register_live(registry, &identity)?;
                Ok(Some((number, identity.email)))
            }
            _ => Ok(None),
        }
    }

    /// Re-derive the live account from the host's files instead of trusting
    /// the registry alone. A login only counts as unmanaged drift while an
    /// OAuth account is active; with nothing active it is left alone.
    fn current(&self, registry: &Registry) -> Result<Current> {
        let active = registry.active().map(|(number, entry)| (number, entry.account_type));
        if let Some((number, AccountType::Api)) = active {
            return Ok(Current::Api { number });
        }

        let Some(identity) = self.host.current_identity()? else {
            if active.is_some() {
                warn!("host is not logged in; nothing to back up");
            }
            return Ok(Current::Nothing);
        };

        Ok(match (registry.find_oauth(&identity.email), active) {
            (Some(number), _) => Current::Oauth {
                number,
                email: identity.email,
            },
            (None, Some(_)) => Current::Unmanaged(identity),
            (None, None) => {
                debug!(email = %identity.email, "no active account; leaving live login alone");
                Current::Nothing
            }
        })
    }

    fn perform_switch(&self, mut registry: Registry, target_number: u32) -> Result<SwitchOutcome> {
        let vault = self.store.load_vault()?;
        let target = Account::load(&registry, &vault, target_number)?;
        let from = registry.active_account_number;

        let current = self.current(&registry)?;
        debug!(?current, target = target.number, "switching");

        match &current {
            Current::Oauth { number, email } => {
                self.backups.backup(&self.host, *number, email)?;
            }
            Current::Api { number } => {
                debug!(number, "tearing down API environment");
                self.projector.clear()?;
            }
            Current::Unmanaged(identity) => {
                return Err(anyhow!(
                    "Host is logged in as {}, which is not managed by ccswap",
                    identity.email
                ));
            }
            Current::Nothing => {}
        }

        match &target.kind {
            AccountKind::Api(record) => {
                self.projector.apply(record)?;
            }
            AccountKind::Oauth => {
                if self.projector.is_applied() {
                    self.projector.clear()?;
                }
                let snapshot = self.backups.restore(target.number, &target.label)?;
                self.secrets.set(LIVE_CREDENTIALS, &snapshot.credentials)?;
                self.host.merge_identity(&snapshot.config)?;
            }
        }

        registry.set_active(target.number);
        self.store.save_registry(&registry)?;

        info!(from = ?from, to = target.number, label = %target.label, "switched account");
        let account_type = target.account_type();
        Ok(SwitchOutcome::Switched {
            from,
            to: target.number,
            label: target.label,
            account_type,
        })
    }
}

/// Name an API account after its endpoint host
fn default_api_label(base_url: &str, number: u32) -> String {
    let without_scheme = base_url.split("://").nth(1).unwrap_or(base_url);
    let host = without_scheme
        .split(['/', ':', '?'])
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        format!("api-{}", number)
    } else {
        format!("{} ({})", host, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{BLOCK_END, BLOCK_START, ShellProjector};
    use crate::error::{ErrorKind, kind_of};
    use crate::secrets::MemorySecrets;
    use crate::store::MemoryStore;
    use crate::test_utils::{host_config, login_as, read_host_config, setup_test_paths};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        paths: Paths,
        store: MemoryStore,
        secrets: MemorySecrets,
        projector: ShellProjector,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let paths = setup_test_paths(&temp_dir);
            paths.ensure_dirs().unwrap();
            let projector = ShellProjector::new(&paths);
            Self {
                _temp_dir: temp_dir,
                paths,
                store: MemoryStore::new(),
                secrets: MemorySecrets::new(),
                projector,
            }
        }

        fn engine(&self) -> SwitchEngine<'_> {
            SwitchEngine::new(&self.paths, &self.store, &self.secrets, &self.projector)
        }

        /// Simulate the user logging in to the host application directly
        fn login(&self, email: &str) {
            login_as(&self.paths, email, &format!("uuid-{email}"));
            self.secrets
                .set(LIVE_CREDENTIALS, &format!("blob-{email}"))
                .unwrap();
        }

        fn live_email(&self) -> String {
            read_host_config(&self.paths)["oauthAccount"]["emailAddress"]
                .as_str()
                .unwrap()
                .to_string()
        }

        fn live_blob(&self) -> String {
            self.secrets.get(LIVE_CREDENTIALS).unwrap().unwrap()
        }

        fn registry(&self) -> Registry {
            let registry = self.store.load_registry().unwrap();
            let seq: BTreeSet<u32> = registry.sequence.iter().copied().collect();
            let keys: BTreeSet<u32> = registry.accounts.keys().copied().collect();
            assert_eq!(seq, keys);
            if let Some(active) = registry.active_account_number {
                assert!(registry.accounts.contains_key(&active));
            }
            registry
        }

        fn add_api(&self, name: &str, url: &str) -> u32 {
            self.engine()
                .add_api(Some(name), Some(url), Some("sk-token"))
                .unwrap()
        }
    }

    #[test]
    fn test_add_oauth_registers_and_activates() {
        let fx = Fixture::new();
        fx.login("a@b.com");

        let outcome = fx.engine().add_oauth().unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Added {
                number: 1,
                email: "a@b.com".into()
            }
        );

        let registry = fx.registry();
        assert_eq!(registry.active_account_number, Some(1));
        assert_eq!(registry.accounts[&1].uuid, "uuid-a@b.com");
        assert!(fx.engine().backups().presence(1, "a@b.com").unwrap().complete());
    }

    #[test]
    fn test_add_oauth_twice_is_a_warning() {
        let fx = Fixture::new();
        fx.login("a@b.com");

        fx.engine().add_oauth().unwrap();
        let second = fx.engine().add_oauth().unwrap();

        assert!(matches!(second, AddOutcome::AlreadyManaged { number: 1, .. }));
        assert_eq!(fx.registry().accounts.len(), 1);
    }

    #[test]
    fn test_add_oauth_requires_login() {
        let fx = Fixture::new();
        let err = fx.engine().add_oauth().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AccountError>(),
            Some(AccountError::NotLoggedIn)
        ));
        assert!(fx.registry().is_empty());
    }

    #[test]
    fn test_add_api_lists_every_missing_value() {
        let fx = Fixture::new();

        let err = fx.engine().add_api(Some("proxy"), None, Some("  ")).unwrap_err();
        match err.downcast_ref::<AccountError>() {
            Some(AccountError::MissingCredentials(missing)) => {
                assert_eq!(missing, &vec!["ANTHROPIC_BASE_URL", "ANTHROPIC_AUTH_TOKEN"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(fx.registry().is_empty());
    }

    #[test]
    fn test_add_api_is_not_activated() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();

        let number = fx.add_api("proxy", "https://api.example.com");
        assert_eq!(number, 2);

        let registry = fx.registry();
        assert_eq!(registry.active_account_number, Some(1));
        assert_eq!(registry.accounts[&2].account_type, AccountType::Api);
        assert!(registry.accounts[&2].uuid.starts_with("api-2-"));
        let vault = fx.store.load_vault().unwrap();
        assert_eq!(vault.get(2).unwrap().base_url, "https://api.example.com");
    }

    #[test]
    fn test_add_api_default_label_and_duplicates() {
        let fx = Fixture::new();
        let number = fx
            .engine()
            .add_api(None, Some("https://proxy.example.com/v1"), Some("t"))
            .unwrap();
        assert_eq!(fx.registry().accounts[&number].email, "proxy.example.com (1)");

        fx.add_api("team", "https://x.example.com");
        let err = fx
            .engine()
            .add_api(Some("team"), Some("https://y.example.com"), Some("t"))
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Precondition));
    }

    #[test]
    fn test_roundtrip_restores_host_config() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        let before = read_host_config(&fx.paths);

        fx.engine().add_oauth().unwrap();
        let outcome = fx.engine().switch_to("1").unwrap();

        assert!(matches!(outcome, SwitchOutcome::Switched { to: 1, .. }));
        assert_eq!(read_host_config(&fx.paths), before);
        assert_eq!(fx.live_blob(), "blob-a@b.com");
    }

    #[test]
    fn test_switch_between_oauth_accounts() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();
        assert_eq!(fx.registry().active_account_number, Some(2));

        let outcome = fx.engine().switch_to("a@b.com").unwrap();
        assert_eq!(
            outcome,
            SwitchOutcome::Switched {
                from: Some(2),
                to: 1,
                label: "a@b.com".into(),
                account_type: AccountType::Oauth,
            }
        );
        assert_eq!(fx.live_email(), "a@b.com");
        assert_eq!(fx.live_blob(), "blob-a@b.com");
        // the account we left was backed up on the way out
        let snapshot = fx.engine().backups().restore(2, "c@d.com").unwrap();
        assert_eq!(snapshot.credentials, "blob-c@d.com");

        fx.engine().rotate().unwrap();
        assert_eq!(fx.live_email(), "c@d.com");
        assert_eq!(fx.registry().active_account_number, Some(2));
    }

    #[test]
    fn test_backup_captures_refreshed_credentials() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        fx.engine().switch_to("1").unwrap();
        // host refreshed its token while account 1 was live
        fx.secrets.set(LIVE_CREDENTIALS, "blob-a-refreshed").unwrap();
        fx.engine().switch_to("2").unwrap();
        fx.engine().switch_to("1").unwrap();

        assert_eq!(fx.live_blob(), "blob-a-refreshed");
    }

    #[test]
    fn test_rotation_follows_sequence() {
        let fx = Fixture::new();
        for email in ["a@b.com", "c@d.com", "e@f.com"] {
            fx.login(email);
            fx.engine().add_oauth().unwrap();
        }
        fx.engine().switch_to("1").unwrap();

        let mut visited = Vec::new();
        for _ in 0..3 {
            match fx.engine().rotate().unwrap() {
                SwitchOutcome::Switched { to, .. } => visited.push(to),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(visited, vec![2, 3, 1]);
    }

    #[test]
    fn test_rotate_empty_registry() {
        let fx = Fixture::new();
        let err = fx.engine().rotate().unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_rotate_registers_unmanaged_login() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        // user logs in to a third account behind our back
        fx.login("new@x.com");
        let outcome = fx.engine().rotate().unwrap();
        assert_eq!(
            outcome,
            SwitchOutcome::RegisteredLive {
                number: 3,
                email: "new@x.com".into()
            }
        );
        let registry = fx.registry();
        assert_eq!(registry.active_account_number, Some(3));
        assert_eq!(fx.live_email(), "new@x.com");

        // the next rotate wraps around to the head of the sequence
        assert!(matches!(
            fx.engine().rotate().unwrap(),
            SwitchOutcome::Switched { to: 1, .. }
        ));
    }

    #[test]
    fn test_switch_to_preserves_unmanaged_login() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("new@x.com");

        fx.engine().switch_to("1").unwrap();

        let registry = fx.registry();
        assert_eq!(registry.find_oauth("new@x.com"), Some(2));
        assert_eq!(registry.active_account_number, Some(1));
        let snapshot = fx.engine().backups().restore(2, "new@x.com").unwrap();
        assert_eq!(snapshot.credentials, "blob-new@x.com");
    }

    #[test]
    fn test_invalid_identifier_touches_nothing() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        let before = fx.registry();

        let err = fx.engine().switch_to("not-an-email").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Precondition));
        assert_eq!(fx.registry(), before);

        let err = fx.engine().switch_to("zz@nowhere.org").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NotFound));
        assert_eq!(fx.registry(), before);
    }

    #[test]
    fn test_failed_restore_keeps_previous_active() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        fs::remove_file(fx.paths.config_backup(1, "a@b.com")).unwrap();
        fx.secrets.set(LIVE_CREDENTIALS, "blob-c-newer").unwrap();

        let err = fx.engine().switch_to("1").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::MissingBackup));

        assert_eq!(fx.registry().active_account_number, Some(2));
        assert_eq!(fx.live_email(), "c@d.com");
        // the backup step ran before the failure
        let snapshot = fx.engine().backups().restore(2, "c@d.com").unwrap();
        assert_eq!(snapshot.credentials, "blob-c-newer");
    }

    #[test]
    fn test_switch_while_logged_out() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        fs::remove_file(&fx.paths.claude_config).unwrap();
        fx.secrets.delete(LIVE_CREDENTIALS).unwrap();

        fx.engine().switch_to("1").unwrap();
        assert_eq!(fx.live_email(), "a@b.com");
        assert_eq!(fx.live_blob(), "blob-a@b.com");
    }

    #[test]
    fn test_remove_active_clears_active() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        let preview = fx.engine().removal_preview("c@d.com").unwrap();
        assert!(preview.is_active);
        assert_eq!(preview.number, 2);

        let removed = fx.engine().remove("2").unwrap();
        assert!(removed.is_active);

        let registry = fx.registry();
        assert_eq!(registry.active_account_number, None);
        assert_eq!(registry.sequence, vec![1]);
        let presence = fx.engine().backups().presence(2, "c@d.com").unwrap();
        assert!(!presence.credentials && !presence.config);
        // the removed number is never handed out again
        assert_eq!(registry.next_account_number(), 3);
    }

    #[test]
    fn test_rotate_after_removing_active_keeps_it_removed() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        // host is still logged in as the account being removed
        fx.engine().remove("2").unwrap();

        let outcome = fx.engine().rotate().unwrap();
        assert!(matches!(outcome, SwitchOutcome::Switched { from: None, to: 1, .. }));
        let registry = fx.registry();
        assert_eq!(registry.sequence, vec![1]);
        assert_eq!(registry.find_oauth("c@d.com"), None);
        assert_eq!(fx.live_email(), "a@b.com");
    }

    #[test]
    fn test_switch_to_after_removing_active_keeps_it_removed() {
        let fx = Fixture::new();
        for email in ["a@b.com", "c@d.com", "e@f.com"] {
            fx.login(email);
            fx.engine().add_oauth().unwrap();
        }

        fx.engine().remove("e@f.com").unwrap();
        fx.engine().switch_to("c@d.com").unwrap();

        let registry = fx.registry();
        assert_eq!(registry.sequence, vec![1, 2]);
        assert_eq!(registry.active_account_number, Some(2));
        assert_eq!(fx.live_email(), "c@d.com");
    }

    #[test]
    fn test_remove_api_drops_vault_record() {
        let fx = Fixture::new();
        let number = fx.add_api("proxy", "https://api.example.com");
        assert!(!fx.engine().removal_preview("1").unwrap().is_active);

        fx.engine().remove(&number.to_string()).unwrap();
        assert!(fx.registry().is_empty());
        assert!(fx.store.load_vault().unwrap().get(number).is_none());
    }

    #[test]
    fn test_remove_unknown_account() {
        let fx = Fixture::new();
        let err = fx.engine().remove("4").unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_api_switch_projects_and_clears_environment() {
        let fx = Fixture::new();
        fs::write(&fx.paths.shell_rc, "export EDITOR=vim\n").unwrap();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        let api = fx.add_api("proxy", "https://api.example.com");

        fx.engine().switch_to(&api.to_string()).unwrap();
        assert!(fx.paths.env_file.exists());
        let rc = fs::read_to_string(&fx.paths.shell_rc).unwrap();
        assert_eq!(rc.matches(BLOCK_START).count(), 1);
        assert_eq!(
            fx.engine().environment_commands().unwrap(),
            vec![
                "export ANTHROPIC_BASE_URL='https://api.example.com'".to_string(),
                "export ANTHROPIC_AUTH_TOKEN='sk-token'".to_string(),
            ]
        );

        // back and forth a few times
        fx.engine().switch_to("1").unwrap();
        fx.engine().switch_to(&api.to_string()).unwrap();
        let rc = fs::read_to_string(&fx.paths.shell_rc).unwrap();
        assert_eq!(rc.matches(BLOCK_START).count(), 1);
        fx.engine().switch_to("1").unwrap();

        let rc = fs::read_to_string(&fx.paths.shell_rc).unwrap();
        assert!(!rc.contains(BLOCK_START));
        assert!(!rc.contains(BLOCK_END));
        assert_eq!(rc, "export EDITOR=vim\n");
        assert!(!fx.paths.env_file.exists());
        assert_eq!(
            fx.engine().environment_commands().unwrap(),
            vec!["unset ANTHROPIC_BASE_URL ANTHROPIC_AUTH_TOKEN".to_string()]
        );
        assert_eq!(fx.live_email(), "a@b.com");
    }

    #[test]
    fn test_removing_active_api_account_clears_environment() {
        let fx = Fixture::new();
        let api = fx.add_api("proxy", "https://api.example.com");
        fx.engine().switch_to(&api.to_string()).unwrap();
        assert!(fx.paths.env_file.exists());

        fx.engine().remove(&api.to_string()).unwrap();
        assert!(!fx.paths.env_file.exists());
        let rc = fs::read_to_string(&fx.paths.shell_rc).unwrap();
        assert!(!rc.contains(BLOCK_START));
    }

    #[test]
    fn test_overview() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.add_api("proxy", "https://api.example.com");
        fx.login("other@x.com");

        let overview = fx.engine().overview().unwrap();
        assert_eq!(overview.accounts.len(), 2);
        assert_eq!(overview.active, Some(1));
        assert_eq!(overview.live.unwrap().email, "other@x.com");
        assert_eq!(overview.live_number, None);
        assert!(!overview.env_applied);
        match &overview.accounts[1].kind {
            AccountKind::Api(record) => assert_eq!(record.name, "proxy"),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_host_config_fields_survive_switch() {
        let fx = Fixture::new();
        fx.login("a@b.com");
        fx.engine().add_oauth().unwrap();
        fx.login("c@d.com");
        fx.engine().add_oauth().unwrap();

        // host writes unrelated state while account 2 is live
        let mut live = host_config("c@d.com", "uuid-c@d.com");
        live["numStartups"] = serde_json::json!(500);
        crate::test_utils::write_host_config(&fx.paths, &live);

        fx.engine().switch_to("1").unwrap();
        let after = read_host_config(&fx.paths);
        assert_eq!(after["numStartups"], 500);
        assert_eq!(after["oauthAccount"]["emailAddress"], "a@b.com");
    }
}
