//! Integration tests for key derivation and the rotation workflow.
//!
//! The chain and detector are hand-written fakes that record every call.
//! Timeouts run on tokio's paused clock, so no test sleeps for real.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use frw_crypto::kdf::Argon2Params;
use frw_crypto::mnemonic::{SeedPhrase, SeedStrength};
use frw_crypto::{PassphraseCipher, VaultCipher};
use frw_types::config::RotationConfig;
use frw_types::{
    AccountKeyDescriptor, FlowAddress, FrwError, HashAlgorithm, NewAccountKey, Result,
    SignatureAlgorithm,
};
use frw_vault::{KeyValueStorage, MemoryStorage, VaultStore};
use frw_wallet::{
    unlock_vault_key, BackupFlow, BloctoDetectionResult, KeyDerivationService, KeyDeriver,
    KeyRotationWorkflow, NewKeyMaterial, RotationErrorKind, RotationRequest, RotationResult,
    TransactionSubmitter, WeakKeyDetector,
};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

type TestResult = std::result::Result<(), FrwError>;

const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                             abandon abandon abandon abandon abandon about";
const PASSPHRASE: &str = "vault passphrase";
const LEGACY_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111\
                          1111111111111111111111111111111111111111111111111111111111111111";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Detect {
    Return(BloctoDetectionResult),
    Fail,
    Hang,
}

struct FakeDetector {
    behavior: Detect,
    detect_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl FakeDetector {
    fn new(behavior: Detect) -> Self {
        Self {
            behavior,
            detect_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WeakKeyDetector for FakeDetector {
    async fn detect_weak_key(&self, _address: &FlowAddress) -> Result<BloctoDetectionResult> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Detect::Return(result) => Ok(result.clone()),
            Detect::Fail => Err(FrwError::ChainError {
                reason: "access node unreachable".into(),
            }),
            Detect::Hang => std::future::pending().await,
        }
    }

    fn list_revoke_indexes(&self, result: &BloctoDetectionResult) -> Vec<u32> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        result.weak_key_indexes.clone()
    }
}

#[derive(Clone)]
enum Submit {
    Seal(&'static str),
    Reject,
    Hang,
    Panic,
}

struct FakeSubmitter {
    behavior: Submit,
    calls: Mutex<Vec<(Vec<String>, Vec<u32>)>>,
}

impl FakeSubmitter {
    fn new(behavior: Submit) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(Vec<String>, Vec<u32>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TransactionSubmitter for FakeSubmitter {
    async fn add_and_revoke_keys(&self, new_public_keys: &[String], revoke_indexes: &[u32]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((new_public_keys.to_vec(), revoke_indexes.to_vec()));
        }
        match self.behavior {
            Submit::Seal(tx_id) => Ok(tx_id.to_string()),
            Submit::Reject => Err(FrwError::ChainError {
                reason: "transaction reverted".into(),
            }),
            Submit::Hang => std::future::pending().await,
            Submit::Panic => panic!("submitter bug"),
        }
    }
}

/// Real derivation with switchable failures.
struct FakeDeriver {
    inner: KeyDerivationService,
    fail_generate: bool,
    fail_derive: bool,
}

impl FakeDeriver {
    fn real() -> Self {
        Self {
            inner: KeyDerivationService::new(&RotationConfig::default()),
            fail_generate: false,
            fail_derive: false,
        }
    }
}

impl KeyDeriver for FakeDeriver {
    fn generate_seed_phrase(&self, strength: SeedStrength) -> Result<SeedPhrase> {
        if self.fail_generate {
            return Err(FrwError::EntropySourceUnavailable {
                reason: "getrandom failed".into(),
            });
        }
        self.inner.generate_seed_phrase(strength)
    }

    fn derive_key(&self, seed_phrase: &SeedPhrase, algorithm: SignatureAlgorithm) -> Result<NewAccountKey> {
        if self.fail_derive {
            return Err(FrwError::DerivationError {
                reason: "curve unavailable".into(),
            });
        }
        self.inner.derive_key(seed_phrase, algorithm)
    }
}

struct BrokenCipher;

impl VaultCipher for BrokenCipher {
    fn encrypt(&self, _plaintext: &[u8], _passphrase: &str) -> Result<Vec<u8>> {
        Err(FrwError::CryptoError {
            reason: "argon2 out of memory".into(),
        })
    }

    fn decrypt(&self, _ciphertext: &[u8], _passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
        Err(FrwError::WrongPassphrase)
    }
}

/// Memory storage whose writes can be switched off or made to panic once.
#[derive(Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    read_only: AtomicBool,
    panic_next_write: AtomicBool,
}

impl KeyValueStorage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.panic_next_write.swap(false, Ordering::SeqCst) {
            panic!("storage backend bug");
        }
        if self.read_only.load(Ordering::SeqCst) {
            return Err(FrwError::StorageError {
                reason: "disk full".into(),
            });
        }
        self.inner.set(key, value)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    detector: Arc<FakeDetector>,
    submitter: Arc<FakeSubmitter>,
    deriver: Arc<FakeDeriver>,
    cipher: Arc<dyn VaultCipher>,
    storage: Arc<FlakyStorage>,
    vault: Arc<VaultStore>,
}

impl Harness {
    fn new(detect: Detect, submit: Submit) -> Self {
        init_tracing();
        let storage = Arc::new(FlakyStorage::default());
        Self {
            detector: Arc::new(FakeDetector::new(detect)),
            submitter: Arc::new(FakeSubmitter::new(submit)),
            deriver: Arc::new(FakeDeriver::real()),
            cipher: Arc::new(PassphraseCipher::new(Argon2Params::insecure_fast())),
            vault: Arc::new(VaultStore::new(storage.clone())),
            storage,
        }
    }

    fn workflow(&self) -> KeyRotationWorkflow {
        KeyRotationWorkflow::new(
            self.detector.clone(),
            self.deriver.clone(),
            self.submitter.clone(),
            self.vault.clone(),
            self.cipher.clone(),
            RotationConfig::default(),
        )
    }

    fn detect_calls(&self) -> usize {
        self.detector.detect_calls.load(Ordering::SeqCst)
    }

    fn list_calls(&self) -> usize {
        self.detector.list_calls.load(Ordering::SeqCst)
    }
}

fn address() -> FlowAddress {
    FlowAddress::new([0x01, 0xcf, 0x0e, 0x2f, 0x2f, 0x71, 0x54, 0x50])
}

fn account_key(index: u32, public_key: &str) -> AccountKeyDescriptor {
    AccountKeyDescriptor {
        index,
        public_key: public_key.into(),
        signature_algorithm: SignatureAlgorithm::P256,
        hash_algorithm: HashAlgorithm::Sha3_256,
        weight: 1000,
        revoked: false,
    }
}

fn weak(indexes: &[u32]) -> Detect {
    Detect::Return(BloctoDetectionResult {
        is_weak_key_present: true,
        full_account_keys: indexes.iter().map(|&i| account_key(i, LEGACY_KEY)).collect(),
        weak_key_indexes: indexes.to_vec(),
    })
}

fn not_weak() -> Detect {
    Detect::Return(BloctoDetectionResult {
        is_weak_key_present: false,
        full_account_keys: vec![account_key(0, LEGACY_KEY)],
        weak_key_indexes: Vec::new(),
    })
}

fn prepared_key(public_key: &str) -> std::result::Result<NewKeyMaterial, FrwError> {
    Ok(NewKeyMaterial {
        seed_phrase: SeedPhrase::parse(ABANDON_ABOUT)?,
        derived_key: NewAccountKey {
            public_key: public_key.into(),
            signature_algorithm: SignatureAlgorithm::P256,
            hash_algorithm: HashAlgorithm::Sha3_256,
            weight: 1000,
        },
    })
}

fn confirmed_request() -> RotationRequest {
    RotationRequest::new(address(), PASSPHRASE).with_backup_confirmed(true)
}

fn first_kind(result: &RotationResult) -> Option<RotationErrorKind> {
    result.first_error().map(|e| e.kind)
}

// ---------------------------------------------------------------------------
// Precondition gate and fast fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unconfirmed_backup_is_rejected_before_any_network_call() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx"));

    let request = RotationRequest::new(address(), PASSPHRASE).with_new_key(prepared_key("0xabcdef")?);
    let result = h.workflow().execute(request).await;

    assert!(!result.success);
    assert_eq!(first_kind(&result), Some(RotationErrorKind::ValidationFailed));
    assert_eq!(h.detect_calls(), 0);
    assert!(h.submitter.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn no_weak_key_fails_fast_without_listing_indexes() {
    let h = Harness::new(not_weak(), Submit::Seal("tx"));

    let result = h.workflow().execute(confirmed_request()).await;

    assert!(!result.success);
    assert_eq!(first_kind(&result), Some(RotationErrorKind::ValidationFailed));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(h.detect_calls(), 1);
    assert_eq!(h.list_calls(), 0);
    assert!(h.submitter.calls().is_empty());
}

#[tokio::test]
async fn weak_flag_without_indexes_is_not_need_rotate() {
    let h = Harness::new(
        Detect::Return(BloctoDetectionResult {
            is_weak_key_present: true,
            full_account_keys: Vec::new(),
            weak_key_indexes: Vec::new(),
        }),
        Submit::Seal("tx"),
    );

    let result = h.workflow().execute(confirmed_request()).await;

    assert_eq!(first_kind(&result), Some(RotationErrorKind::NotNeedRotate));
    assert_eq!(h.list_calls(), 1);
    assert!(h.submitter.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prepared_key_is_submitted_without_prefix() -> TestResult {
    let h = Harness::new(weak(&[0, 1]), Submit::Seal("tx-abc"));

    let request = confirmed_request().with_new_key(prepared_key("0xabcdef")?);
    let result = h.workflow().execute(request).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.tx_id.as_deref(), Some("tx-abc"));
    assert!(result.errors.is_empty());
    assert_eq!(
        h.submitter.calls(),
        vec![(vec!["abcdef".to_string()], vec![0, 1])]
    );

    let state = h.vault.load()?;
    assert_eq!(state.vault.len(), 1);
    assert_eq!(state.vault[0].public_key, "0xabcdef");
    assert_eq!(
        h.vault.current_pointer()?.map(|p| p.id),
        Some(state.vault[0].id.clone())
    );
    Ok(())
}

#[tokio::test]
async fn generated_key_is_stored_sealed_and_unlockable() -> TestResult {
    let h = Harness::new(weak(&[2]), Submit::Seal("tx-gen"));

    let request = confirmed_request().with_algorithm(SignatureAlgorithm::Secp256k1);
    let result = h.workflow().execute(request).await;
    assert!(result.success, "{result:?}");

    let calls = h.submitter.calls();
    assert_eq!(calls.len(), 1);
    let submitted = &calls[0].0[0];
    assert_eq!(submitted.len(), 128);

    let record = h
        .vault
        .records()?
        .into_iter()
        .next()
        .ok_or(FrwError::NoVaultFound)?;
    assert_eq!(&record.public_key, submitted);
    assert_eq!(record.signature_algorithm, SignatureAlgorithm::Secp256k1);

    let unlocked = unlock_vault_key(&h.vault, h.cipher.as_ref(), h.deriver.as_ref(), &record.id, PASSPHRASE)?;
    assert_eq!(unlocked.seed_phrase.word_count(), 12);
    Ok(())
}

#[tokio::test]
async fn revoked_keys_leave_the_local_vault() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx"));
    let legacy = NewAccountKey {
        public_key: LEGACY_KEY.into(),
        signature_algorithm: SignatureAlgorithm::P256,
        hash_algorithm: HashAlgorithm::Sha3_256,
        weight: 1000,
    };
    h.vault.commit_new_key(&legacy, vec![0xaa])?;

    let result = h.workflow().execute(confirmed_request()).await;
    assert!(result.success, "{result:?}");

    let keys: Vec<String> = h.vault.records()?.into_iter().map(|r| r.public_key).collect();
    assert_eq!(keys.len(), 1);
    assert_ne!(keys[0], LEGACY_KEY);
    Ok(())
}

#[tokio::test]
async fn backup_flow_feeds_the_rotation() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx-backup"));

    let mut flow = BackupFlow::start(h.deriver.as_ref(), SeedStrength::Bits256, SignatureAlgorithm::P256)?;
    let words = flow.mnemonic()?.to_owned();
    flow.acknowledge_shown()?;
    flow.confirm(&words)?;
    let material = flow.into_key_material()?;
    let expected = material.derived_key.bare_public_key().to_owned();

    let result = h
        .workflow()
        .execute(confirmed_request().with_new_key(material))
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(h.submitter.calls()[0].0, vec![expected]);
    Ok(())
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

#[test]
fn derivation_is_deterministic_and_curve_specific() -> TestResult {
    let service = KeyDerivationService::new(&RotationConfig::default());
    let seed = SeedPhrase::parse(ABANDON_ABOUT)?;

    let first = service.derive_key(&seed, SignatureAlgorithm::P256)?;
    let second = service.derive_key(&seed, SignatureAlgorithm::P256)?;
    let evm = service.derive_key(&seed, SignatureAlgorithm::Secp256k1)?;

    assert_eq!(first.public_key, second.public_key);
    assert_ne!(first.public_key, evm.public_key);
    Ok(())
}

#[tokio::test]
async fn seed_generation_failure() {
    let mut h = Harness::new(weak(&[0]), Submit::Seal("tx"));
    h.deriver = Arc::new(FakeDeriver {
        fail_generate: true,
        ..FakeDeriver::real()
    });

    let result = h.workflow().execute(confirmed_request()).await;

    assert_eq!(first_kind(&result), Some(RotationErrorKind::SeedGenerationFailed));
    assert!(h.submitter.calls().is_empty());
}

#[tokio::test]
async fn key_derivation_failure() {
    let mut h = Harness::new(weak(&[0]), Submit::Seal("tx"));
    h.deriver = Arc::new(FakeDeriver {
        fail_derive: true,
        ..FakeDeriver::real()
    });

    let result = h.workflow().execute(confirmed_request()).await;

    assert_eq!(first_kind(&result), Some(RotationErrorKind::KeyDerivationFailed));
    assert!(h.submitter.calls().is_empty());
}

#[tokio::test]
async fn sealing_failure_stops_before_submission() -> TestResult {
    let mut h = Harness::new(weak(&[0]), Submit::Seal("tx"));
    h.cipher = Arc::new(BrokenCipher);

    let result = h
        .workflow()
        .execute(confirmed_request().with_new_key(prepared_key("abcdef")?))
        .await;

    assert_eq!(first_kind(&result), Some(RotationErrorKind::KeyDerivationFailed));
    assert!(h.submitter.calls().is_empty());
    Ok(())
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submit_timeout_reports_unknown_outcome_and_does_not_resubmit() -> TestResult {
    let h = Harness::new(weak(&[0, 1]), Submit::Hang);

    let request = confirmed_request()
        .with_new_key(prepared_key("0xabcdef")?)
        .with_submit_timeout(Duration::from_secs(30));
    let result = h.workflow().execute(request).await;

    assert!(!result.success);
    assert_eq!(result.tx_id, None);
    let error = result.first_error().expect("rotation error");
    assert_eq!(error.kind, RotationErrorKind::CadenceTransactionFailed);
    assert!(error.unknown_outcome);
    assert!(!error.is_retryable());

    assert_eq!(h.submitter.calls().len(), 1);
    assert!(matches!(h.vault.load(), Err(FrwError::NoVaultFound)));
    Ok(())
}

#[tokio::test]
async fn rejected_transaction_is_retryable() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Reject);

    let result = h
        .workflow()
        .execute(confirmed_request().with_new_key(prepared_key("abcdef")?))
        .await;

    let error = result.first_error().expect("rotation error");
    assert_eq!(error.kind, RotationErrorKind::CadenceTransactionFailed);
    assert!(!error.unknown_outcome);
    assert!(error.is_retryable());
    assert_eq!(h.submitter.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_collaborator_becomes_unknown() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Panic);

    let result = h
        .workflow()
        .execute(confirmed_request().with_new_key(prepared_key("abcdef")?))
        .await;

    assert!(!result.success);
    assert_eq!(first_kind(&result), Some(RotationErrorKind::Unknown));
    assert!(result.first_error().is_some_and(|e| !e.is_retryable()));
    assert_eq!(result.pending_commit, None);
    Ok(())
}

// ---------------------------------------------------------------------------
// Detection failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detection_error_is_unknown() {
    let h = Harness::new(Detect::Fail, Submit::Seal("tx"));
    let result = h.workflow().execute(confirmed_request()).await;
    assert_eq!(first_kind(&result), Some(RotationErrorKind::Unknown));
    assert!(result.first_error().is_some_and(|e| e.is_retryable()));
    assert!(h.submitter.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn detection_timeout_is_unknown() {
    let h = Harness::new(Detect::Hang, Submit::Seal("tx"));
    let request = confirmed_request().with_detect_timeout(Duration::from_secs(5));
    let result = h.workflow().execute(request).await;
    assert_eq!(first_kind(&result), Some(RotationErrorKind::Unknown));
    assert!(result.first_error().is_some_and(|e| e.is_retryable()));
    assert_eq!(h.list_calls(), 0);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_failure_after_seal_hands_back_the_generated_key() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx-sealed"));
    h.storage.read_only.store(true, Ordering::SeqCst);
    let workflow = h.workflow();

    let result = workflow.execute(confirmed_request()).await;

    assert!(result.success);
    assert_eq!(result.tx_id.as_deref(), Some("tx-sealed"));
    let error = result.first_error().expect("rotation error");
    assert_eq!(error.kind, RotationErrorKind::StorageUpdateFailed);
    assert!(error.is_persistence_only());
    assert!(matches!(h.vault.load(), Err(FrwError::NoVaultFound)));

    let pending = result.pending_commit.clone().expect("pending commit");
    let submitted = &h.submitter.calls()[0].0[0];
    assert_eq!(&pending.key.public_key, submitted);

    // Still failing: the pending key must survive another attempt.
    let again = workflow.retry_persistence(&pending).expect_err("storage is read-only");
    assert_eq!(again.kind, RotationErrorKind::StorageUpdateFailed);

    h.storage.read_only.store(false, Ordering::SeqCst);
    let id = workflow.retry_persistence(&pending).expect("retry_persistence");
    assert_eq!(workflow.retry_persistence(&pending).expect("retry_persistence"), id);
    assert_eq!(h.vault.current_pointer()?.map(|p| p.id), Some(id.clone()));
    assert_eq!(h.vault.records()?.len(), 1);

    let unlocked = unlock_vault_key(&h.vault, h.cipher.as_ref(), h.deriver.as_ref(), &id, PASSPHRASE)?;
    assert_eq!(&unlocked.public_key, submitted);
    assert_eq!(h.submitter.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_storage_keeps_pending_key_and_vault_usable() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx-panic"));
    h.storage.panic_next_write.store(true, Ordering::SeqCst);
    let workflow = h.workflow();

    let result = workflow.execute(confirmed_request()).await;

    assert_eq!(first_kind(&result), Some(RotationErrorKind::Unknown));
    assert!(!result.first_error().expect("rotation error").is_retryable());
    assert_eq!(result.tx_id.as_deref(), Some("tx-panic"));
    let pending = result.pending_commit.expect("pending commit");

    let id = workflow.retry_persistence(&pending).expect("retry_persistence");
    assert_eq!(h.vault.load()?.vault.len(), 1);
    assert_eq!(h.vault.current_pointer()?.map(|p| p.id), Some(id));
    Ok(())
}

#[tokio::test]
async fn completed_rotation_has_no_pending_commit() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Seal("tx"));
    let result = h.workflow().execute(confirmed_request()).await;
    assert!(result.success);
    assert_eq!(result.pending_commit, None);
    Ok(())
}

// ---------------------------------------------------------------------------
// Exclusivity
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_rotation_for_same_account_is_rejected() -> TestResult {
    let h = Harness::new(weak(&[0]), Submit::Hang);
    let workflow = h.workflow();

    let first = confirmed_request()
        .with_new_key(prepared_key("aa")?)
        .with_submit_timeout(Duration::from_secs(10));
    let second = confirmed_request().with_new_key(prepared_key("bb")?);

    let (first, second) = tokio::join!(
        workflow.execute_exclusive(first),
        workflow.execute_exclusive(second)
    );

    let mut kinds = [first_kind(&first), first_kind(&second)];
    kinds.sort_by_key(|k| k.map(RotationErrorKind::as_str));
    assert_eq!(
        kinds,
        [
            Some(RotationErrorKind::CadenceTransactionFailed),
            Some(RotationErrorKind::ValidationFailed),
        ]
    );
    assert_eq!(h.submitter.calls().len(), 1);
    assert_eq!(h.detect_calls(), 1);
    assert!(!workflow.locks().is_locked(&address()));
    Ok(())
}
