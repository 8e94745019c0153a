//! Per-transaction state owned by a single verification flow.

use crate::consent::UserConsentValue;
use crate::enrollment::Enrollment;
use crate::error::ProtocolError;
use crate::policy::KeyTypeList;
use crate::signals::{DeviceSignalSnapshot, ProviderResult};
use crate::token::ChallengeToken;

#[derive(Debug, Clone)]
pub struct TransactionContext {
    token: ChallengeToken,
    enrollment: Option<Enrollment>,
    consent: UserConsentValue,
    forced_key_types: Option<KeyTypeList>,
    integrations: Option<Vec<ProviderResult>>,
    signal_providers: Option<Vec<ProviderResult>>,
    device_signals: DeviceSignalSnapshot,
}

impl TransactionContext {
    pub(crate) fn new(token: ChallengeToken) -> Self {
        Self {
            token,
            enrollment: None,
            consent: UserConsentValue::None,
            forced_key_types: None,
            integrations: None,
            signal_providers: None,
            device_signals: DeviceSignalSnapshot::new(),
        }
    }

    pub fn token(&self) -> &ChallengeToken {
        &self.token
    }

    pub fn enrollment(&self) -> Option<&Enrollment> {
        self.enrollment.as_ref()
    }

    /// The enrollment can be bound once; it never changes afterwards.
    pub(crate) fn bind_enrollment(&mut self, enrollment: Enrollment) -> Result<(), ProtocolError> {
        if self.enrollment.is_some() {
            return Err(ProtocolError::EnrollmentAlreadyBound);
        }
        self.enrollment = Some(enrollment);
        Ok(())
    }

    pub fn consent(&self) -> UserConsentValue {
        self.consent
    }

    pub(crate) fn set_consent(&mut self, consent: UserConsentValue) {
        self.consent = consent;
    }

    /// List recorded by an earlier cascade decision, if any.
    pub fn forced_key_types(&self) -> Option<&KeyTypeList> {
        self.forced_key_types.as_ref()
    }

    pub(crate) fn force_key_types(&mut self, list: KeyTypeList) {
        self.forced_key_types = Some(list);
    }

    pub fn integrations(&self) -> &[ProviderResult] {
        self.integrations.as_deref().unwrap_or_default()
    }

    pub fn signal_providers(&self) -> &[ProviderResult] {
        self.signal_providers.as_deref().unwrap_or_default()
    }

    pub(crate) fn providers_collected(&self) -> bool {
        self.integrations.is_some() && self.signal_providers.is_some()
    }

    pub(crate) fn record_providers(
        &mut self,
        integrations: Vec<ProviderResult>,
        signal_providers: Vec<ProviderResult>,
    ) {
        self.integrations = Some(integrations);
        self.signal_providers = Some(signal_providers);
    }

    /// Signals supplied by the application through the device-signals step.
    pub fn device_signals(&self) -> &DeviceSignalSnapshot {
        &self.device_signals
    }

    pub(crate) fn add_device_signals(&mut self, signals: DeviceSignalSnapshot) {
        self.device_signals.extend(signals);
    }
}
