//! In-memory fakes of the persistence ports and a wired-up service harness.

use crate::auth::service::{AuthDependencies, AuthService};
use crate::cache::{MemorySessionStore, SessionCache};
use crate::database::models::{ActionAudit, Identity, IdentityWithRoles, LoginAudit, RoleAssignment, RoleLevel};
use crate::repositories::{AuditSink, IdentityStore, SecondFactorVerifier, SecurityPolicy, SettingsProvider};
use crate::services::credential_verifier::CredentialVerifier;
use crate::state::AppState;
use crate::utils::jwt::TokenCodec;
use crate::utils::network::ClientContext;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PASSWORD: &str = "correct-horse";
pub const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

pub fn role_name(level: i64) -> &'static str {
    match level {
        5 => "Platform Admin",
        4 => "Company Admin",
        3 => "Manager",
        2 => "Staff",
        1 => "Branch Admin",
        _ => "Employee",
    }
}

pub fn assignment(
    id: i64,
    user_id: &str,
    level: i64,
    company_id: Option<&str>,
    branch_id: Option<&str>,
) -> RoleAssignment {
    RoleAssignment {
        id,
        user_id: user_id.to_string(),
        role_id: format!("role-{}", level),
        role_name: role_name(level).to_string(),
        level: RoleLevel(level),
        company_id: company_id.map(str::to_string),
        branch_id: branch_id.map(str::to_string),
    }
}

async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(value) = check() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

#[derive(Default)]
pub struct FakeIdentityStore {
    identities: Mutex<Vec<Identity>>,
    assignments: Mutex<Vec<RoleAssignment>>,
    codes: Mutex<HashMap<String, String>>,
    companies: Mutex<HashMap<String, bool>>,
    touches: Mutex<Vec<String>>,
    next_assignment_id: AtomicI64,
    fail_code_lookups: AtomicBool,
}

impl FakeIdentityStore {
    pub fn new() -> Self {
        Self {
            next_assignment_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn add_identity(&self, identity: Identity) {
        self.identities.lock().unwrap().push(identity);
    }

    pub fn update_identity(&self, user_id: &str, change: impl FnOnce(&mut Identity)) {
        let mut identities = self.identities.lock().unwrap();
        let identity = identities
            .iter_mut()
            .find(|identity| identity.id == user_id)
            .expect("identity seeded");
        change(identity);
    }

    pub fn add_assignment(&self, assignment: RoleAssignment) {
        self.assignments.lock().unwrap().push(assignment);
    }

    pub fn next_assignment_id(&self) -> i64 {
        self.next_assignment_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn add_student_code(&self, code: &str, email: &str) {
        self.codes
            .lock()
            .unwrap()
            .insert(code.to_uppercase(), email.to_string());
    }

    /// Makes every login code lookup fail as if storage were down.
    pub fn fail_code_lookups(&self) {
        self.fail_code_lookups.store(true, Ordering::SeqCst);
    }

    pub fn set_company_active(&self, company_id: &str, active: bool) {
        self.companies
            .lock()
            .unwrap()
            .insert(company_id.to_string(), active);
    }

    pub async fn wait_for_last_login_touches(&self, count: usize) -> Vec<String> {
        eventually(|| {
            let touches = self.touches.lock().unwrap().clone();
            (touches.len() >= count).then_some(touches)
        })
        .await
    }
}

#[async_trait]
impl IdentityStore for FakeIdentityStore {
    async fn find_identity_with_roles(&self, email: &str) -> Result<Option<IdentityWithRoles>> {
        let identity = self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.email.eq_ignore_ascii_case(email))
            .cloned();
        let Some(identity) = identity else {
            return Ok(None);
        };
        let assignments = self.role_assignments(&identity.id).await?;

        Ok(Some(IdentityWithRoles {
            identity,
            assignments,
        }))
    }

    async fn find_identity_by_id(&self, user_id: &str) -> Result<Option<Identity>> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.id == user_id)
            .cloned())
    }

    async fn find_email_by_code(&self, code: &str) -> Result<Option<String>> {
        if self.fail_code_lookups.load(Ordering::SeqCst) {
            anyhow::bail!("students table unavailable");
        }
        Ok(self.codes.lock().unwrap().get(code).cloned())
    }

    async fn role_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn is_company_active(&self, company_id: &str) -> Result<bool> {
        Ok(self
            .companies
            .lock()
            .unwrap()
            .get(company_id)
            .copied()
            .unwrap_or(false))
    }

    async fn touch_last_login(&self, user_id: &str) -> Result<()> {
        self.touches.lock().unwrap().push(user_id.to_string());
        Ok(())
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()> {
        self.update_identity(user_id, |identity| {
            identity.password_hash = password_hash.to_string()
        });
        Ok(())
    }
}

pub struct FakeSettings {
    session_timeout_hours: Mutex<u64>,
    max_sessions: Mutex<u32>,
    min_password_length: Mutex<usize>,
    mfa_enforced_min_level: Mutex<Option<RoleLevel>>,
}

impl Default for FakeSettings {
    fn default() -> Self {
        Self {
            session_timeout_hours: Mutex::new(24),
            max_sessions: Mutex::new(3),
            min_password_length: Mutex::new(6),
            mfa_enforced_min_level: Mutex::new(None),
        }
    }
}

impl FakeSettings {
    pub fn set_session_timeout_hours(&self, hours: u64) {
        *self.session_timeout_hours.lock().unwrap() = hours;
    }

    pub fn set_min_password_length(&self, length: usize) {
        *self.min_password_length.lock().unwrap() = length;
    }

    pub fn set_max_sessions(&self, max: u32) {
        *self.max_sessions.lock().unwrap() = max;
    }

    pub fn set_mfa_enforced_min_level(&self, level: Option<RoleLevel>) {
        *self.mfa_enforced_min_level.lock().unwrap() = level;
    }
}

#[async_trait]
impl SettingsProvider for FakeSettings {
    async fn session_timeout_hours(&self) -> u64 {
        *self.session_timeout_hours.lock().unwrap()
    }

    async fn max_concurrent_sessions(&self) -> u32 {
        *self.max_sessions.lock().unwrap()
    }

    async fn min_password_length(&self) -> usize {
        *self.min_password_length.lock().unwrap()
    }

    async fn mfa_enforced_min_level(&self) -> Option<RoleLevel> {
        *self.mfa_enforced_min_level.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeSecurityPolicy {
    deny_ips: Mutex<bool>,
    trusted: Mutex<HashSet<(String, String)>>,
}

impl FakeSecurityPolicy {
    pub fn deny_all_ips(&self) {
        *self.deny_ips.lock().unwrap() = true;
    }

    pub fn trust_device(&self, user_id: &str, fingerprint: &str) {
        self.trusted
            .lock()
            .unwrap()
            .insert((user_id.to_string(), fingerprint.to_string()));
    }
}

#[async_trait]
impl SecurityPolicy for FakeSecurityPolicy {
    async fn is_ip_allowed(&self, _company_id: Option<&str>, _ip: Option<IpAddr>) -> Result<bool> {
        Ok(!*self.deny_ips.lock().unwrap())
    }

    async fn is_device_trusted(&self, user_id: &str, fingerprint: Option<&str>) -> Result<bool> {
        let Some(fingerprint) = fingerprint else {
            return Ok(false);
        };
        Ok(self
            .trusted
            .lock()
            .unwrap()
            .contains(&(user_id.to_string(), fingerprint.to_string())))
    }
}

#[derive(Default)]
pub struct FakeSecondFactor {
    codes: Mutex<HashMap<String, String>>,
}

impl FakeSecondFactor {
    pub fn issue_code(&self, user_id: &str, code: &str) {
        self.codes
            .lock()
            .unwrap()
            .insert(user_id.to_string(), code.to_string());
    }
}

#[async_trait]
impl SecondFactorVerifier for FakeSecondFactor {
    async fn verify_code(&self, user_id: &str, code: &str) -> Result<bool> {
        let mut codes = self.codes.lock().unwrap();
        if codes.get(user_id).is_some_and(|issued| issued == code) {
            codes.remove(user_id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Default)]
pub struct FakeAuditSink {
    logins: Mutex<Vec<LoginAudit>>,
    actions: Mutex<Vec<ActionAudit>>,
}

impl FakeAuditSink {
    pub fn logins(&self) -> Vec<LoginAudit> {
        self.logins.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<ActionAudit> {
        self.actions.lock().unwrap().clone()
    }

    /// Waits for spawned audit writes to land.
    pub async fn wait_for_logins(&self, count: usize) -> Vec<LoginAudit> {
        eventually(|| {
            let logins = self.logins();
            (logins.len() >= count).then_some(logins)
        })
        .await
    }

    pub async fn wait_for_actions(&self, count: usize) -> Vec<ActionAudit> {
        eventually(|| {
            let actions = self.actions();
            (actions.len() >= count).then_some(actions)
        })
        .await
    }
}

#[async_trait]
impl AuditSink for FakeAuditSink {
    async fn record_login(&self, entry: LoginAudit) -> Result<()> {
        self.logins.lock().unwrap().push(entry);
        Ok(())
    }

    async fn record_action(&self, entry: ActionAudit) -> Result<()> {
        self.actions.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Services wired against the fakes, with handles to every fake.
pub struct Harness {
    pub auth: AuthService,
    pub tokens: TokenCodec,
    pub sessions: SessionCache,
    pub state: Arc<AppState>,
    pub identities: Arc<FakeIdentityStore>,
    pub settings: Arc<FakeSettings>,
    pub security: Arc<FakeSecurityPolicy>,
    pub second_factor: Arc<FakeSecondFactor>,
    pub audit: Arc<FakeAuditSink>,
    password_hash: String,
}

impl Harness {
    pub async fn new() -> Self {
        let identities = Arc::new(FakeIdentityStore::new());
        identities.set_company_active("c1", true);
        let settings = Arc::new(FakeSettings::default());
        let security = Arc::new(FakeSecurityPolicy::default());
        let second_factor = Arc::new(FakeSecondFactor::default());
        let audit = Arc::new(FakeAuditSink::default());
        let sessions = SessionCache::new(Arc::new(MemorySessionStore::new()));
        let tokens = TokenCodec::new(JWT_SECRET, Duration::from_secs(7 * 24 * 3600));
        let credentials = CredentialVerifier::new(4);
        let password_hash = credentials.hash(PASSWORD).await.unwrap();

        let state = Arc::new(AppState::new(AuthDependencies {
            identities: identities.clone(),
            settings: settings.clone(),
            security: security.clone(),
            second_factor: second_factor.clone(),
            audit: audit.clone(),
            sessions: sessions.clone(),
            tokens: tokens.clone(),
            credentials,
        }));

        Self {
            auth: state.auth.clone(),
            tokens,
            sessions,
            state,
            identities,
            settings,
            security,
            second_factor,
            audit,
            password_hash,
        }
    }

    /// Active, unlocked identity without any role assignment.
    pub fn seed_identity(&self, user_id: &str, email: &str) {
        self.identities.add_identity(Identity {
            id: user_id.to_string(),
            email: email.to_string(),
            password_hash: self.password_hash.clone(),
            first_name: "Test".to_string(),
            last_name: user_id.to_string(),
            is_active: true,
            is_locked: false,
            mfa_enabled: false,
        });
    }

    pub fn seed_company_admin(&self, user_id: &str, email: &str, company_id: &str) {
        self.seed_identity(user_id, email);
        self.identities.set_company_active(company_id, true);
        self.identities.add_assignment(assignment(
            self.identities.next_assignment_id(),
            user_id,
            RoleLevel::COMPANY_ADMIN.0,
            Some(company_id),
            None,
        ));
    }

    pub fn client(&self) -> ClientContext {
        ClientContext {
            ip_address: "203.0.113.7".parse().ok(),
            user_agent: Some("tests/1.0".to_string()),
            device_fingerprint: Some("fp-1".to_string()),
        }
    }
}
