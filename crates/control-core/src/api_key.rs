use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

const BCRYPT_COST: u32 = 10;
const SECRET_BYTES: usize = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Suspended,
    Revoked,
}

/// Durable record of an API key. The plaintext secret is never stored —
/// only `secret_digest` (a bcrypt hash) and `prefix` (the lookup index
/// that avoids a full-table scan) persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub secret_digest: String,
    pub prefix: String,
    pub status: KeyStatus,
    pub rate_limit_rpm_override: Option<u32>,
    pub concurrency_override: Option<u32>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Returned exactly once, at creation — the only place the plaintext
/// secret exists outside of the caller's own records.
pub struct NewApiKeyMaterial {
    pub key: ApiKey,
    pub plaintext_secret: String,
}

impl ApiKey {
    /// Mints a new key: generates a random secret, hashes it, and returns
    /// both the durable record and the one-time plaintext.
    pub fn generate(tenant_id: Uuid, environment_id: Uuid) -> NewApiKeyMaterial {
        let mut raw = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let secret = hex::encode(raw);
        let prefix = format!("cp_{}", &secret[..8]);
        let plaintext_secret = format!("{prefix}.{secret}");

        let secret_digest =
            bcrypt::hash(&secret, BCRYPT_COST).expect("bcrypt hashing must not fail for fixed-size input");

        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id,
            environment_id,
            secret_digest,
            prefix,
            status: KeyStatus::Active,
            rate_limit_rpm_override: None,
            concurrency_override: None,
            last_used_at: None,
        };

        NewApiKeyMaterial { key, plaintext_secret }
    }

    /// Parses `Bearer <prefix>.<secret>` (or a bare `<prefix>.<secret>`
    /// token) into its prefix and secret parts without touching the
    /// digest — used to pick the lookup row before verifying.
    pub fn split_presented_token(token: &str) -> Option<(&str, &str)> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        token.split_once('.')
    }

    /// Constant-time verification of a presented secret against this
    /// key's stored digest. bcrypt's own comparison is already
    /// constant-time over the hash; the prefix match upstream of this
    /// call is not secret-dependent so no timing guard is needed there.
    pub fn verify_secret(&self, presented_secret: &str) -> bool {
        bcrypt::verify(presented_secret, &self.secret_digest).unwrap_or(false)
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, KeyStatus::Active)
    }
}

/// Constant-time string compare for the admin token check (§4.2) where
/// there is no hash, only a process-configured secret.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
