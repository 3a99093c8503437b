//! Hybrid access validator.
//!
//! Runs one institution access attempt end to end: throttle, parse, resolve
//! the matching patients through the authority and/or the fallback path,
//! fetch documents, audit. Every attempt produces exactly one audit row and
//! one metric sample, whatever the outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dplus_core::{CodeLifetime, Directive, InstitutionCode, Profile, UserId};
use serde_json::json;
use sqlx::PgPool;

use super::audit::{build_entry, mask_submitted, AccessAuditor};
use super::lookup::{lookup_code, CodeLookup};
use super::matcher::{match_candidates, SubmittedIdentity};
use super::{
    documents, AccessFailure, AccessGrant, AccessReport, AccessRequest, GrantedPatient,
    ValidationPath, ValidationStrategy,
};
use crate::directory::{AuthorityRequest, Directory, DirectoryError};
use crate::extractors::ClientContext;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{AttemptKind, AttemptLimiter};

/// Result of resolving a submission against storage.
#[derive(Debug)]
enum Resolution {
    Matched(Vec<(Profile, Vec<Directive>)>),
    Refused {
        failure: AccessFailure,
        /// Owner of the code, when it resolved to exactly one patient.
        subject: Option<UserId>,
    },
}

/// Decision before auditing.
#[derive(Debug)]
struct Decision {
    result: Result<AccessGrant, AccessFailure>,
    path: Option<ValidationPath>,
    subject: Option<UserId>,
}

impl Decision {
    fn refused(failure: AccessFailure, path: Option<ValidationPath>) -> Self {
        Self {
            result: Err(failure),
            path,
            subject: None,
        }
    }
}

/// The institution access flow.
#[derive(Debug, Clone)]
pub struct AccessValidator {
    directory: Arc<dyn Directory>,
    strategy: ValidationStrategy,
    limiter: AttemptLimiter,
    metrics: ApiMetrics,
    auditor: AccessAuditor,
}

impl AccessValidator {
    pub fn new(
        directory: Arc<dyn Directory>,
        strategy: ValidationStrategy,
        limiter: AttemptLimiter,
        metrics: ApiMetrics,
        ledger: Option<PgPool>,
    ) -> Self {
        let auditor = AccessAuditor::new(directory.clone(), ledger, metrics.clone());
        Self {
            directory,
            strategy,
            limiter,
            metrics,
            auditor,
        }
    }

    pub fn strategy(&self) -> ValidationStrategy {
        self.strategy
    }

    /// Validate one submission.
    ///
    /// Never fails: storage errors become [`AccessFailure::Technical`], and
    /// audit failures only clear [`AccessReport::audit_recorded`].
    pub async fn validate(&self, request: &AccessRequest, context: &ClientContext) -> AccessReport {
        let now = Utc::now();
        let decision = self.decide(request, context, now).await;

        let path_label = decision.path.map_or("none", |p| p.as_str());
        let outcome = match &decision.result {
            Ok(_) => dplus_core::AccessOutcome::Granted,
            Err(failure) => failure.outcome(),
        };

        let mut details = json!({
            "validation_path": path_label,
            "strategy": self.strategy.as_str(),
        });
        let mut subject = decision.subject;
        if let Ok(grant) = &decision.result {
            let user_ids = grant.user_ids();
            if user_ids.len() == 1 {
                subject = user_ids.first().copied();
            }
            details["patients"] = json!(user_ids);
            details["document_ids"] = json!(grant.document_ids());
        }

        let entry = build_entry(request, context, outcome, subject, details, now);
        let audit_recorded = self.auditor.record(&entry).await;
        self.metrics.record_access(outcome.as_str(), path_label);

        tracing::info!(
            code = %entry.code_used,
            outcome = %outcome,
            validation_path = path_label,
            audit_recorded,
            "institution access attempt"
        );

        AccessReport {
            result: decision.result,
            path: decision.path,
            audit_recorded,
        }
    }

    async fn decide(
        &self,
        request: &AccessRequest,
        context: &ClientContext,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Err(failure) = self.throttle(request, context) {
            return Decision::refused(failure, None);
        }

        let Ok(code) = InstitutionCode::parse(&request.code) else {
            return Decision::refused(AccessFailure::InvalidCode, None);
        };

        let identity = match SubmittedIdentity::from_request(request) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(code = %code.masked(), "submitted identity rejected: {e}");
                return Decision::refused(AccessFailure::ProfileMismatch, None);
            }
        };

        let (resolved, path) = match self.strategy {
            ValidationStrategy::Hybrid => {
                match self.via_authority(&code, request, &identity, now).await {
                    Ok(resolution) => (Ok(resolution), ValidationPath::Authority),
                    Err(e) => {
                        tracing::warn!(
                            code = %code.masked(),
                            "validation authority failed, using fallback: {e}"
                        );
                        self.metrics.record_authority_fallback();
                        (
                            self.via_fallback(&code, &identity, now).await,
                            ValidationPath::Fallback,
                        )
                    }
                }
            }
            ValidationStrategy::AuthorityOnly => (
                self.via_authority(&code, request, &identity, now).await,
                ValidationPath::Authority,
            ),
            ValidationStrategy::FallbackOnly => (
                self.via_fallback(&code, &identity, now).await,
                ValidationPath::Fallback,
            ),
        };

        let matched = match resolved {
            Ok(Resolution::Matched(matched)) => matched,
            Ok(Resolution::Refused { failure, subject }) => {
                return Decision {
                    result: Err(failure),
                    path: Some(path),
                    subject,
                };
            }
            Err(e) => return self.technical(e, path),
        };

        let mut patients = Vec::with_capacity(matched.len());
        for (profile, directives) in matched {
            let documents = match documents::retrieve(self.directory.as_ref(), profile.id).await {
                Ok(documents) => documents,
                Err(e) => return self.technical(e, path),
            };
            patients.push(GrantedPatient {
                profile,
                directives,
                documents,
            });
        }

        self.limiter
            .reset(AttemptKind::InstitutionCode, &code_key(code.as_str()));

        Decision {
            result: Ok(AccessGrant { code, patients }),
            path: Some(path),
            subject: None,
        }
    }

    /// Consume one attempt for the code and, when known, for the client.
    fn throttle(&self, request: &AccessRequest, context: &ClientContext) -> Result<(), AccessFailure> {
        let mut keys = vec![code_key(&request.code.trim().to_ascii_uppercase())];
        if let Some(ip) = &context.ip_address {
            keys.push(format!("ip:{ip}"));
        }

        for key in keys {
            if let Err(retry_after) = self.limiter.check(AttemptKind::InstitutionCode, &key) {
                tracing::warn!(
                    code = %mask_submitted(&request.code),
                    client = context.ip_address.as_deref().unwrap_or("unknown"),
                    "institution code attempts exceeded"
                );
                return Err(AccessFailure::RateLimited {
                    retry_after_secs: retry_after.secs(),
                });
            }
        }
        Ok(())
    }

    /// Ask the authority, then reconcile its answer with the code lookup.
    ///
    /// Matches whose expiry is past are discarded, and only owners of a
    /// currently valid directive carrying the code are released.
    async fn via_authority(
        &self,
        code: &InstitutionCode,
        request: &AccessRequest,
        identity: &SubmittedIdentity,
        now: DateTime<Utc>,
    ) -> Result<Resolution, DirectoryError> {
        let authority_request = AuthorityRequest {
            code: code.clone(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            birth_date: identity.birth_date().map(str::to_string),
        };
        let mut matches = self.directory.authority_validate(&authority_request).await?;

        let reported = matches.len();
        matches.retain(|m| {
            m.expires_at
                .map_or(true, |expires_at| !CodeLifetime::is_expired(expires_at, now))
        });
        if matches.len() < reported {
            tracing::warn!(
                code = %code.masked(),
                discarded = reported - matches.len(),
                "authority returned expired matches"
            );
        }

        let lookup = lookup_code(self.directory.as_ref(), code, now).await?;
        let directives = match lookup {
            CodeLookup::Valid(ref directives) => directives,
            _ => return Ok(refusal(&lookup)),
        };

        let mut accepted: Vec<UserId> = Vec::new();
        for m in &matches {
            if !accepted.contains(&m.user_id) && directives.iter().any(|d| d.user_id == m.user_id) {
                accepted.push(m.user_id);
            }
        }

        let mut matched = Vec::with_capacity(accepted.len());
        for user_id in accepted {
            let Some(profile) = self.directory.profile(user_id).await? else {
                tracing::warn!(user_id = %user_id, "authority matched a user without a profile row");
                continue;
            };
            let own = directives
                .iter()
                .filter(|d| d.user_id == user_id)
                .cloned()
                .collect();
            matched.push((profile, own));
        }

        if matched.is_empty() {
            return Ok(Resolution::Refused {
                failure: AccessFailure::ProfileMismatch,
                subject: lookup.sole_owner(),
            });
        }
        Ok(Resolution::Matched(matched))
    }

    /// Table lookups and the in-process matcher.
    async fn via_fallback(
        &self,
        code: &InstitutionCode,
        identity: &SubmittedIdentity,
        now: DateTime<Utc>,
    ) -> Result<Resolution, DirectoryError> {
        let lookup = lookup_code(self.directory.as_ref(), code, now).await?;
        let CodeLookup::Valid(directives) = &lookup else {
            return Ok(refusal(&lookup));
        };

        let matched = match_candidates(self.directory.as_ref(), identity, directives).await?;
        if matched.is_empty() {
            return Ok(Resolution::Refused {
                failure: AccessFailure::ProfileMismatch,
                subject: lookup.sole_owner(),
            });
        }
        Ok(Resolution::Matched(matched))
    }

    fn technical(&self, error: DirectoryError, path: ValidationPath) -> Decision {
        tracing::error!(
            operation = error.operation(),
            validation_path = path.as_str(),
            "institution access failed: {error}"
        );
        Decision::refused(AccessFailure::Technical(error.to_string()), Some(path))
    }
}

fn code_key(normalized: &str) -> String {
    format!("code:{normalized}")
}

fn refusal(lookup: &CodeLookup) -> Resolution {
    Resolution::Refused {
        failure: lookup.failure().unwrap_or(AccessFailure::InvalidCode),
        subject: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::middleware::rate_limit::RateLimitConfig;
    use chrono::Duration;
    use dplus_core::{AccessOutcome, DirectiveId, DocumentId, DocumentKind, MedicalDocument};

    struct Fixture {
        directory: MemoryDirectory,
        metrics: ApiMetrics,
        farid: UserId,
    }

    fn fixture() -> Fixture {
        let directory = MemoryDirectory::new();
        let farid = UserId::new();
        directory.insert_profile(Profile {
            id: farid,
            first_name: Some("FARID".into()),
            last_name: Some("AREZKI".into()),
            birth_date: Some("1963-08-13".into()),
            email: None,
            phone: None,
            address: None,
        });
        directory.insert_directive(Directive {
            id: DirectiveId::new(),
            user_id: farid,
            content: json!({"reanimation": "non"}),
            institution_code: Some("9E5CUV7X".into()),
            institution_code_expires_at: Some(Utc::now() + Duration::days(30)),
            created_at: Utc::now(),
            updated_at: None,
        });
        for (name, age) in [("ancien.pdf", 20), ("recent.pdf", 2)] {
            directory.insert_document(MedicalDocument {
                id: DocumentId::new(),
                user_id: farid,
                file_name: name.into(),
                file_path: format!("documents/{name}"),
                content_type: Some("application/pdf".into()),
                kind: DocumentKind::Medical,
                created_at: Utc::now() - Duration::days(age),
            });
        }
        Fixture {
            directory,
            metrics: ApiMetrics::new(),
            farid,
        }
    }

    impl Fixture {
        fn validator(&self, strategy: ValidationStrategy) -> AccessValidator {
            AccessValidator::new(
                Arc::new(self.directory.clone()),
                strategy,
                AttemptLimiter::new(RateLimitConfig::default()),
                self.metrics.clone(),
                None,
            )
        }

        fn expire_code(&self) {
            self.directory.insert_directive(Directive {
                id: DirectiveId::new(),
                user_id: self.farid,
                content: json!({}),
                institution_code: Some("EXP1RED0".into()),
                institution_code_expires_at: Some(Utc::now() - Duration::hours(1)),
                created_at: Utc::now() - Duration::days(31),
                updated_at: None,
            });
        }
    }

    fn request(code: &str, last_name: &str) -> AccessRequest {
        AccessRequest {
            code: code.into(),
            first_name: "Farid".into(),
            last_name: last_name.into(),
            birth_date: Some("1963-08-13".into()),
            accessor_name: Some("Dr Martin".into()),
            accessor_institution: Some("CHU de Lyon".into()),
        }
    }

    fn context() -> ClientContext {
        ClientContext {
            ip_address: Some("203.0.113.7".into()),
            user_agent: Some("test".into()),
        }
    }

    #[tokio::test]
    async fn grant_through_authority() {
        let f = fixture();
        let report = f
            .validator(ValidationStrategy::Hybrid)
            .validate(&request("9e5cuv7x", "Arezki"), &context())
            .await;

        assert_eq!(report.path, Some(ValidationPath::Authority));
        assert!(report.audit_recorded);
        let grant = report.result.unwrap();
        assert_eq!(grant.user_ids(), vec![f.farid]);
        let names: Vec<&str> = grant.patients[0]
            .documents
            .iter()
            .map(|d| d.file_name.as_str())
            .collect();
        assert_eq!(names, ["recent.pdf", "ancien.pdf"]);

        let logs = f.directory.access_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, AccessOutcome::Granted);
        assert_eq!(logs[0].user_id, Some(f.farid));
        assert_eq!(logs[0].code_used, "9E5C****");
        assert_eq!(logs[0].details["document_ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn hybrid_falls_back_when_authority_fails() {
        let f = fixture();
        f.directory.set_authority_failing(true);
        let report = f
            .validator(ValidationStrategy::Hybrid)
            .validate(&request("9E5CUV7X", "Arezki"), &context())
            .await;

        assert_eq!(report.path, Some(ValidationPath::Fallback));
        assert!(report.result.is_ok());
        assert_eq!(f.metrics.authority_fallbacks(), 1);
        assert_eq!(f.directory.access_logs()[0].details["validation_path"], "fallback");
    }

    #[tokio::test]
    async fn authority_only_failure_is_technical() {
        let f = fixture();
        f.directory.set_authority_failing(true);
        let report = f
            .validator(ValidationStrategy::AuthorityOnly)
            .validate(&request("9E5CUV7X", "Arezki"), &context())
            .await;

        assert!(matches!(report.result, Err(AccessFailure::Technical(_))));
        assert_eq!(report.outcome(), AccessOutcome::TechnicalError);
        assert_eq!(f.metrics.authority_fallbacks(), 0);
    }

    #[tokio::test]
    async fn both_paths_agree() {
        for strategy in [ValidationStrategy::AuthorityOnly, ValidationStrategy::FallbackOnly] {
            let f = fixture();
            f.expire_code();
            let validator = f.validator(strategy);

            let ok = validator.validate(&request("9E5CUV7X", "AREZKI "), &context()).await;
            assert_eq!(ok.outcome(), AccessOutcome::Granted, "{strategy:?}");

            let typo = validator.validate(&request("9E5CUV7X", "Arezk"), &context()).await;
            assert_eq!(typo.result.unwrap_err(), AccessFailure::ProfileMismatch, "{strategy:?}");

            let expired = validator.validate(&request("EXP1RED0", "Arezki"), &context()).await;
            assert_eq!(expired.result.unwrap_err(), AccessFailure::ExpiredCode, "{strategy:?}");

            let unknown = validator.validate(&request("ZZZZ9999", "Arezki"), &context()).await;
            assert_eq!(unknown.result.unwrap_err(), AccessFailure::InvalidCode, "{strategy:?}");
        }
    }

    #[tokio::test]
    async fn mismatch_audit_names_code_owner() {
        let f = fixture();
        f.validator(ValidationStrategy::Hybrid)
            .validate(&request("9E5CUV7X", "Arezk"), &context())
            .await;
        let logs = f.directory.access_logs();
        assert_eq!(logs[0].outcome, AccessOutcome::ProfileMismatch);
        assert_eq!(logs[0].user_id, Some(f.farid));
        assert!(logs[0].details.get("document_ids").is_none());
    }

    #[tokio::test]
    async fn malformed_code_never_touches_storage() {
        let f = fixture();
        f.directory.set_storage_failing(true);
        let report = f
            .validator(ValidationStrategy::Hybrid)
            .validate(&request("9E5C-UV7", "Arezki"), &context())
            .await;

        assert_eq!(report.result.unwrap_err(), AccessFailure::InvalidCode);
        assert_eq!(report.path, None);
        assert_eq!(f.metrics.authority_fallbacks(), 0);
    }

    #[tokio::test]
    async fn audit_failure_does_not_block_grant() {
        let f = fixture();
        f.directory.set_audit_failing(true);
        let report = f
            .validator(ValidationStrategy::Hybrid)
            .validate(&request("9E5CUV7X", "Arezki"), &context())
            .await;

        assert!(report.result.is_ok());
        assert!(!report.audit_recorded);
        assert_eq!(f.metrics.audit_write_failures(), 1);
    }

    #[tokio::test]
    async fn stale_authority_match_is_discarded() {
        let f = fixture();
        f.expire_code();
        f.directory.set_authority_stale(true);
        let report = f
            .validator(ValidationStrategy::AuthorityOnly)
            .validate(&request("EXP1RED0", "Arezki"), &context())
            .await;
        assert_eq!(report.result.unwrap_err(), AccessFailure::ExpiredCode);
    }

    #[tokio::test]
    async fn storage_failure_in_fallback_is_technical() {
        let f = fixture();
        f.directory.set_storage_failing(true);
        let report = f
            .validator(ValidationStrategy::Hybrid)
            .validate(&request("9E5CUV7X", "Arezki"), &context())
            .await;

        assert_eq!(report.path, Some(ValidationPath::Fallback));
        assert_eq!(report.outcome(), AccessOutcome::TechnicalError);
        assert_eq!(f.directory.access_logs().len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_after_five_attempts() {
        let f = fixture();
        let validator = f.validator(ValidationStrategy::Hybrid);
        for _ in 0..5 {
            let report = validator.validate(&request("9E5CUV7X", "Arezk"), &context()).await;
            assert_eq!(report.outcome(), AccessOutcome::ProfileMismatch);
        }
        let report = validator.validate(&request("9E5CUV7X", "Arezki"), &context()).await;
        match report.result {
            Err(AccessFailure::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 900)
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert_eq!(f.directory.access_logs().len(), 6);
        assert_eq!(f.directory.access_logs()[5].outcome, AccessOutcome::RateLimited);
    }

    #[tokio::test]
    async fn grant_resets_code_window() {
        let f = fixture();
        let validator = f.validator(ValidationStrategy::Hybrid);
        let no_ip = ClientContext::default();
        for _ in 0..4 {
            validator.validate(&request("9E5CUV7X", "Arezk"), &no_ip).await;
        }
        assert!(validator
            .validate(&request("9E5CUV7X", "Arezki"), &no_ip)
            .await
            .result
            .is_ok());
        let next = validator.validate(&request("9E5CUV7X", "Arezk"), &no_ip).await;
        assert_eq!(next.outcome(), AccessOutcome::ProfileMismatch);
    }

    #[tokio::test]
    async fn one_metric_sample_per_attempt() {
        let f = fixture();
        let validator = f.validator(ValidationStrategy::Hybrid);
        validator.validate(&request("9E5CUV7X", "Arezki"), &context()).await;
        validator.validate(&request("bad", "Arezki"), &context()).await;
        assert_eq!(f.metrics.access_attempts(), 2);
        assert_eq!(f.directory.access_logs().len(), 2);
    }
}
