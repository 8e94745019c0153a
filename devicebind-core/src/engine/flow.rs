use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::cascade;
use super::context::TransactionContext;
use super::step::{
    AccountCandidate, AccountSelection, ConsentPrompt, ConsentResponse, Progress,
    RemediationMessage, RemediationStep, SignalRequest, StepAnswer, VerificationOutcome,
};
use super::{FlowOptions, VerificationEngine};
use crate::consent::UserConsentValue;
use crate::enrollment::Enrollment;
use crate::error::{DeviceBindError, KeyUnavailableError, ProtocolError, Result};
use crate::keystore::{KeyData, KeyReadError};
use crate::policy::{KeyRequirementResolver, KeyType, KeyTypeList};
use crate::push::{PushChallenge, PushDecision, UserResponse};
use crate::response::ResponseTokenBuilder;
use crate::signals::collect_providers;
use crate::submit::VerificationSubmitter;
use crate::token::ChallengeToken;

/// Which entry point started the flow.
#[derive(Debug, Clone)]
pub enum FlowKind {
    Generic,
    Push(PushChallenge),
}

impl FlowKind {
    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    SelectAccount,
    UserConsent,
    DeviceSignals,
}

/// Interactive step waiting for its answer.
#[derive(Debug)]
enum Pending {
    SelectAccount(Vec<Enrollment>),
    UserConsent,
    DeviceSignals,
}

impl Pending {
    fn name(&self) -> &'static str {
        match self {
            Self::SelectAccount(_) => "selectAccount",
            Self::UserConsent => "userConsent",
            Self::DeviceSignals => "deviceSignals",
        }
    }
}

#[derive(Debug)]
enum Phase {
    Triage,
    Awaiting(Pending),
    Cascade(KeyTypeList),
    Finished,
}

enum Attempt {
    Completed(VerificationOutcome),
    Fallback(RemediationMessage, KeyTypeList),
    NeedsConsent,
}

/// One in-flight verification. Owns its [`TransactionContext`] exclusively.
#[derive(Debug)]
pub struct Flow {
    engine: VerificationEngine,
    kind: FlowKind,
    options: FlowOptions,
    context: TransactionContext,
    queue: VecDeque<Event>,
    phase: Phase,
}

impl Flow {
    pub(crate) fn generic(
        engine: VerificationEngine,
        token: ChallengeToken,
        options: FlowOptions,
    ) -> Self {
        Self {
            engine,
            kind: FlowKind::Generic,
            options,
            context: TransactionContext::new(token),
            queue: VecDeque::from([Event::SelectAccount, Event::DeviceSignals]),
            phase: Phase::Triage,
        }
    }

    /// Push flows ask for an explicit decision first unless one was recorded already.
    pub(crate) fn push(
        engine: VerificationEngine,
        challenge: PushChallenge,
        options: FlowOptions,
    ) -> Self {
        let mut context = TransactionContext::new(challenge.token().clone());
        let mut queue = VecDeque::from([Event::SelectAccount]);
        match challenge.user_response() {
            UserResponse::NotResponded => queue.push_back(Event::UserConsent),
            response => apply_push_response(&mut context, response),
        }
        queue.push_back(Event::DeviceSignals);

        Self {
            engine,
            kind: FlowKind::Push(challenge),
            options,
            context,
            queue,
            phase: Phase::Triage,
        }
    }

    pub fn kind(&self) -> &FlowKind {
        &self.kind
    }

    pub fn push_challenge(&self) -> Option<&PushChallenge> {
        match &self.kind {
            FlowKind::Push(challenge) => Some(challenge),
            FlowKind::Generic => None,
        }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    /// Run until the next step or the final outcome.
    ///
    /// `Message` steps need no answer; calling `next` again continues the
    /// cascade. Errors other than step-protocol misuse finish the flow.
    pub async fn next(&mut self) -> Result<Progress> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return Err(ProtocolError::FlowFinished.into()),
                Phase::Awaiting(pending) => {
                    self.phase = Phase::Awaiting(pending);
                    return Err(ProtocolError::StepOutstanding.into());
                }
                Phase::Triage => match self.triage().await {
                    Ok(Some(step)) => {
                        debug!(
                            transaction_id = %self.context.token().transaction_id(),
                            step = step.name(),
                            "Awaiting remediation answer"
                        );
                        return Ok(Progress::Step(step));
                    }
                    Ok(None) => {}
                    Err(e) => return Err(self.fail(e)),
                },
                Phase::Cascade(list) => match self.attempt(list).await {
                    Ok(Attempt::Completed(outcome)) => return Ok(Progress::Completed(outcome)),
                    Ok(Attempt::Fallback(message, remaining)) => {
                        self.phase = Phase::Cascade(remaining);
                        return Ok(Progress::Step(RemediationStep::Message(message)));
                    }
                    Ok(Attempt::NeedsConsent) => {
                        self.queue.push_back(Event::UserConsent);
                        self.phase = Phase::Triage;
                    }
                    Err(e) => return Err(self.fail(e)),
                },
            }
        }
    }

    /// Answer the outstanding interactive step.
    ///
    /// A rejected answer leaves the step outstanding so it can be answered again.
    pub fn answer(&mut self, answer: StepAnswer) -> Result<()> {
        let pending = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Awaiting(pending) => pending,
            Phase::Finished => return Err(ProtocolError::FlowFinished.into()),
            other => {
                self.phase = other;
                return Err(ProtocolError::NoStepOutstanding.into());
            }
        };

        match self.apply_answer(&pending, answer) {
            Ok(()) => {
                self.phase = Phase::Triage;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.phase = Phase::Awaiting(pending);
                Err(e)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: DeviceBindError) -> DeviceBindError {
        self.phase = Phase::Finished;
        warn!(
            transaction_id = %self.context.token().transaction_id(),
            error = %error,
            "Verification failed"
        );
        error
    }

    async fn triage(&mut self) -> Result<Option<RemediationStep>> {
        while let Some(event) = self.queue.pop_front() {
            match event {
                Event::SelectAccount => {
                    if let Some(step) = self.select_account().await? {
                        return Ok(Some(step));
                    }
                }
                Event::UserConsent => {
                    let token = self.context.token();
                    let prompt = ConsentPrompt {
                        transaction_id: token.transaction_id().to_string(),
                        app_instance_name: token.app_instance_name().map(str::to_string),
                        context: token.context().clone(),
                        push: self.kind.is_push(),
                    };
                    self.phase = Phase::Awaiting(Pending::UserConsent);
                    return Ok(Some(RemediationStep::UserConsent(prompt)));
                }
                Event::DeviceSignals => {
                    if self.options.collect_app_signals {
                        let names = self.context.token().signals().to_vec();
                        self.phase = Phase::Awaiting(Pending::DeviceSignals);
                        return Ok(Some(RemediationStep::DeviceSignals(SignalRequest { names })));
                    }
                }
            }
        }

        if !self.context.providers_collected() {
            let collaborators = Arc::clone(&self.engine.collaborators);
            let token = self.context.token();
            let integrations =
                collect_providers(collaborators.providers.as_ref(), token.integrations()).await;
            let signal_providers =
                collect_providers(collaborators.providers.as_ref(), token.signal_providers())
                    .await;
            self.context.record_providers(integrations, signal_providers);
        }

        let token = self.context.token();
        let list = KeyRequirementResolver::resolve(
            token.user_verification(),
            token.key_types(),
            self.context.forced_key_types(),
        );
        debug!(
            transaction_id = %token.transaction_id(),
            key_types = ?list.remaining(),
            forced = self.context.forced_key_types().is_some(),
            "Entering key selection"
        );
        self.phase = Phase::Cascade(list);
        Ok(None)
    }

    async fn select_account(&mut self) -> Result<Option<RemediationStep>> {
        if self.context.enrollment().is_some() {
            return Ok(None);
        }

        let bound = match &self.kind {
            FlowKind::Push(challenge) => challenge.enrollment().cloned(),
            FlowKind::Generic => None,
        };
        if let Some(enrollment) = bound {
            self.bind_account(enrollment)?;
            return Ok(None);
        }

        let org_id = self.context.token().org_id().to_string();
        let mut candidates = self.engine.collaborators.enrollments.lookup(&org_id).await?;
        if self.kind.is_push() {
            // A push that names no enrollment is addressed to the challenge subject.
            if let Some(subject) = self.context.token().subject() {
                candidates.retain(|e| e.user_id == subject);
            }
        }

        match candidates.len() {
            0 => Err(ProtocolError::AccountNotFound { org_id }.into()),
            1 => {
                let enrollment = candidates.remove(0);
                debug!(enrollment_id = %enrollment.enrollment_id, "Account selected");
                self.bind_account(enrollment)?;
                Ok(None)
            }
            n if self.options.allow_account_selection => {
                let step = RemediationStep::SelectAccount(AccountSelection {
                    org_id,
                    candidates: candidates.iter().map(AccountCandidate::from).collect(),
                });
                self.phase = Phase::Awaiting(Pending::SelectAccount(candidates));
                debug!(candidates = n, "Account selection required");
                Ok(Some(step))
            }
            n => Err(ProtocolError::AmbiguousAccount {
                org_id,
                candidates: n,
            }
            .into()),
        }
    }

    /// Push flows only answer for enrollments of the issuing organization.
    fn bind_account(&mut self, enrollment: Enrollment) -> Result<()> {
        if let FlowKind::Push(challenge) = &mut self.kind {
            check_issuer(self.context.token(), &enrollment)?;
            challenge.bind_enrollment(enrollment.clone());
        }
        self.context.bind_enrollment(enrollment)?;
        Ok(())
    }

    fn apply_answer(&mut self, pending: &Pending, answer: StepAnswer) -> Result<()> {
        match (pending, answer) {
            (Pending::SelectAccount(candidates), StepAnswer::Account { enrollment_id }) => {
                let enrollment = candidates
                    .iter()
                    .find(|e| e.enrollment_id == enrollment_id)
                    .cloned()
                    .ok_or(ProtocolError::UnknownEnrollment(enrollment_id))?;
                self.bind_account(enrollment)?;
            }
            (Pending::UserConsent, StepAnswer::Consent(response)) => {
                self.apply_consent(response)?;
            }
            (Pending::DeviceSignals, StepAnswer::Signals(signals)) => {
                if let Some(signals) = signals {
                    self.context.add_device_signals(signals);
                }
            }
            (pending, _) => {
                return Err(ProtocolError::UnexpectedAnswer {
                    expected: pending.name(),
                }
                .into())
            }
        }
        Ok(())
    }

    fn apply_consent(&mut self, response: ConsentResponse) -> Result<()> {
        match &mut self.kind {
            FlowKind::Push(challenge) => {
                let decision = match response {
                    ConsentResponse::Approved => PushDecision::Approve,
                    ConsentResponse::Denied => PushDecision::Deny,
                    ConsentResponse::NoResponse => {
                        return Err(ProtocolError::ResponseRequired.into())
                    }
                };
                challenge.respond(decision)?;
                apply_push_response(&mut self.context, challenge.user_response());
            }
            FlowKind::Generic => self.context.set_consent(response.into()),
        }
        Ok(())
    }

    async fn attempt(&mut self, list: KeyTypeList) -> Result<Attempt> {
        let key_type = list.head().ok_or(ProtocolError::NoKeyTypesProvided)?;

        if key_type.is_user_verification() {
            // Corrected by the fallback rules if the read fails.
            self.context
                .set_consent(UserConsentValue::ApprovedUserVerification);
        } else if self.context.forced_key_types().is_none() && !self.kind.is_push() {
            if self.context.token().user_mediation().wants_consent() {
                self.context
                    .force_key_types(KeyTypeList::single(KeyType::ProofOfPossession));
                return Ok(Attempt::NeedsConsent);
            }
            self.context.set_consent(UserConsentValue::None);
        }

        let collaborators = Arc::clone(&self.engine.collaborators);
        let enrollment = self.context.enrollment().ok_or_else(|| {
            ProtocolError::AccountNotFound {
                org_id: self.context.token().org_id().to_string(),
            }
        })?;

        let read = match enrollment.key_binding(key_type) {
            Some(binding) => {
                collaborators
                    .key_store
                    .read_or_use_key(binding.key_tag, key_type)
                    .await
            }
            None => Err(KeyReadError::permanently_unavailable(format!(
                "Enrollment holds no {key_type} key"
            ))),
        };

        match read {
            Ok(key) => self.complete(key).await.map(Attempt::Completed),
            Err(error) => self.fall_back(key_type, error, list),
        }
    }

    fn fall_back(
        &mut self,
        failed: KeyType,
        error: KeyReadError,
        list: KeyTypeList,
    ) -> Result<Attempt> {
        let next = cascade::fall_back(
            failed,
            error.kind,
            list.advance(),
            self.context.token().user_verification(),
            self.context.consent(),
        );
        self.context.set_consent(next.consent);
        self.context.force_key_types(next.remaining.clone());

        warn!(
            transaction_id = %self.context.token().transaction_id(),
            key_type = %failed,
            reason = %error.kind,
            consent = %next.consent,
            "Key unavailable"
        );

        let Some(next_type) = next.remaining.head() else {
            return Err(KeyUnavailableError {
                key_type: failed,
                reason: error.kind,
                message: error.message,
            }
            .into());
        };

        let message = RemediationMessage {
            skipped: failed,
            reason: error.kind,
            next: Some(next_type),
            consent: next.consent,
            text: format!(
                "Could not use the {failed} key ({}): {}. Trying {next_type}.",
                error.kind, error.message
            ),
        };
        Ok(Attempt::Fallback(message, next.remaining))
    }

    async fn complete(&mut self, key: KeyData) -> Result<VerificationOutcome> {
        let engine = self.engine.clone();
        let collaborators = &engine.collaborators;

        let response_token = ResponseTokenBuilder::new(
            &engine.config,
            collaborators.key_store.as_ref(),
            collaborators.signals.as_ref(),
        )
        .build(&self.context, &key)
        .await?;

        let request = VerificationSubmitter::build_request(
            self.context.token(),
            &response_token,
            self.options.state_handle.as_deref(),
        );
        let response = VerificationSubmitter::new(collaborators.rest.as_ref())
            .submit(request)
            .await?;

        let body = serde_json::from_slice(&response.body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&response.body).into_owned())
        });

        let outcome = VerificationOutcome {
            transaction_id: self.context.token().transaction_id().to_string(),
            consent: self.context.consent(),
            key_type: key.key_type,
            status: response.status,
            body,
        };
        info!(
            transaction_id = %outcome.transaction_id,
            key_type = %outcome.key_type,
            consent = %outcome.consent,
            "Verification completed"
        );
        Ok(outcome)
    }
}

fn apply_push_response(context: &mut TransactionContext, response: UserResponse) {
    match response {
        UserResponse::Approved => context.set_consent(UserConsentValue::Approved),
        UserResponse::Denied => {
            context.set_consent(UserConsentValue::Denied);
            context.force_key_types(KeyTypeList::single(KeyType::ProofOfPossession));
        }
        UserResponse::NotResponded => {}
    }
}

fn check_issuer(token: &ChallengeToken, enrollment: &Enrollment) -> Result<()> {
    let issuer = token.issuer();
    if issuer.is_some_and(|iss| enrollment.owns_issuer(iss)) {
        return Ok(());
    }
    Err(ProtocolError::IssuerMismatch {
        issuer: issuer.map(str::to_string),
        org_url: enrollment.org_url.to_string(),
    }
    .into())
}
