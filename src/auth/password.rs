/// Password Hashing and Verification
///
/// bcrypt hashes embed their salt and cost, so a stored hash is all that is
/// needed to verify it later. The async `PasswordHasher` moves the work onto
/// tokio's blocking pool and caps how many hashes run at once.

use std::sync::Arc;

use bcrypt::{hash, verify};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::sync::Semaphore;

use crate::configuration::PasswordPolicy;
use crate::error::{AppError, ValidationError};

/// Hash a password with a fresh random salt
///
/// # Errors
/// Returns `AppError::Internal` if bcrypt rejects the input or cost
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored bcrypt hash
///
/// A missing or unparsable hash verifies as `false`; it never errors and
/// never passes.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match verify(password, stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}

/// Enforce the configured password policy
///
/// Every policy failure yields the same message describing the whole policy.
pub fn validate_password(candidate: &str, policy: &PasswordPolicy) -> Result<(), ValidationError> {
    if candidate.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    // Minimum in characters, maximum in bytes (what bcrypt actually consumes)
    let long_enough = candidate.chars().count() >= policy.min_length;
    let short_enough = candidate.len() <= policy.max_length;
    let has_lowercase = !policy.require_lowercase || candidate.chars().any(|c| c.is_lowercase());
    let has_uppercase = !policy.require_uppercase || candidate.chars().any(|c| c.is_uppercase());
    let has_digit = !policy.require_digit || candidate.chars().any(|c| c.is_ascii_digit());
    let has_special = !policy.require_special
        || candidate
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && short_enough && has_lowercase && has_uppercase && has_digit && has_special {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword(policy.describe()))
    }
}

/// Policy-aware, concurrency-bounded front end to bcrypt.
#[derive(Clone)]
pub struct PasswordHasher {
    policy: PasswordPolicy,
    permits: Arc<Semaphore>,
    /// Verified against when the account does not exist, so a miss costs
    /// as much as a wrong password.
    decoy_hash: Arc<str>,
}

impl PasswordHasher {
    pub fn new(policy: PasswordPolicy) -> Result<Self, AppError> {
        let decoy: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let decoy_hash = hash_password(&decoy, policy.hash_cost)?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(policy.max_concurrent_hashes.max(1))),
            policy,
            decoy_hash: Arc::from(decoy_hash),
        })
    }

    pub fn validate(&self, candidate: &str) -> Result<(), ValidationError> {
        validate_password(candidate, &self.policy)
    }

    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let cost = self.policy.hash_cost;
        let password = password.to_string();
        self.run_blocking(move || hash_password(&password, cost)).await?
    }

    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();
        self.run_blocking(move || verify_password(&password, &stored_hash))
            .await
    }

    /// Spend one verification's worth of CPU and discard the result.
    pub async fn verify_decoy(&self, password: &str) -> Result<(), AppError> {
        let decoy = self.decoy_hash.to_string();
        self.verify(password, &decoy).await.map(|_| ())
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, AppError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        // Owned by the blocking task: released only once bcrypt returns,
        // even if the caller's future is dropped first.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("password hashing pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let result = work();
            drop(permit);
            result
        })
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    fn test_policy() -> PasswordPolicy {
        PasswordPolicy {
            hash_cost: TEST_COST,
            ..PasswordPolicy::default()
        }
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("S3cure!pass", TEST_COST).expect("Failed to hash password");

        assert!(verify_password("S3cure!pass", &hash));
        assert!(!verify_password("S3cure!pasS", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("ValidPassword123", TEST_COST).unwrap();
        let second = hash_password("ValidPassword123", TEST_COST).unwrap();

        assert_ne!(first, second);
        assert!(verify_password("ValidPassword123", &first));
        assert!(verify_password("ValidPassword123", &second));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
        assert!(!verify_password("anything", "$2b$04$truncated"));
    }

    #[test]
    fn test_policy_accepts_strong_password() {
        assert!(validate_password("S3cure!pass", &test_policy()).is_ok());
        assert!(validate_password("ValidPassword123", &test_policy()).is_ok());
    }

    #[test]
    fn test_policy_rejections_share_one_message() {
        let policy = test_policy();
        let weak = [
            "Short1",
            "nouppercase123",
            "NOLOWERCASE123",
            "NoDigitsHere",
        ];

        let messages: Vec<String> = weak
            .iter()
            .map(|candidate| validate_password(candidate, &policy).unwrap_err().to_string())
            .collect();

        assert!(messages.iter().all(|m| m == &messages[0]));
        assert_eq!(messages[0], format!("password must be {}", policy.describe()));
    }

    #[test]
    fn test_policy_rejects_overlong_password() {
        let long_password = format!("Aa1{}", "a".repeat(72));
        assert!(matches!(
            validate_password(&long_password, &test_policy()),
            Err(ValidationError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_empty_password() {
        assert!(matches!(
            validate_password("", &test_policy()),
            Err(ValidationError::EmptyField(_))
        ));
    }

    #[test]
    fn test_special_character_requirement() {
        let policy = PasswordPolicy {
            require_special: true,
            ..test_policy()
        };
        assert!(validate_password("Password123", &policy).is_err());
        assert!(validate_password("Password123!", &policy).is_ok());
    }

    #[test]
    fn test_length_bounds_for_multibyte_passwords() {
        let policy = test_policy();

        // 21 characters, 39 bytes
        let fits = "Пароль1".repeat(3);
        assert!(validate_password(&fits, &policy).is_ok());

        // 42 characters but 78 bytes
        let too_long = "Пароль1".repeat(6);
        assert!(too_long.chars().count() < policy.max_length);
        let message = validate_password(&too_long, &policy).unwrap_err().to_string();
        assert!(message.contains("at most 72 bytes"));

        // 4 characters, 8 bytes: still too short
        assert!(validate_password("Пар1", &policy).is_err());
    }

    #[tokio::test]
    async fn test_abandoned_hash_keeps_its_permit() {
        let hasher = PasswordHasher::new(PasswordPolicy {
            hash_cost: 12,
            max_concurrent_hashes: 1,
            ..PasswordPolicy::default()
        })
        .expect("Failed to build hasher");

        let task = {
            let hasher = hasher.clone();
            tokio::spawn(async move { hasher.hash("S3cure!pass").await })
        };
        while hasher.permits.available_permits() != 0 {
            tokio::task::yield_now().await;
        }

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        // bcrypt is still running on the blocking pool
        assert_eq!(hasher.permits.available_permits(), 0);

        // and hands the permit back once it finishes
        let permit = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            hasher.permits.acquire(),
        )
        .await
        .expect("Permit never released")
        .expect("Semaphore closed");
        drop(permit);
    }

    #[tokio::test]
    async fn test_async_hasher_round_trip() {
        let hasher = PasswordHasher::new(test_policy()).expect("Failed to build hasher");

        let hash = hasher.hash("S3cure!pass").await.expect("Failed to hash");
        assert!(hasher.verify("S3cure!pass", &hash).await.unwrap());
        assert!(!hasher.verify("wrong", &hash).await.unwrap());
        assert!(hasher.verify_decoy("S3cure!pass").await.is_ok());
    }
}
