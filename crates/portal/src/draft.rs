//! Multi-step claim draft.
//!
//! `BaseInfo` -> `ServiceFields` (only when the service has extra fields)
//! -> `Submitting` -> `Submitted`. A failed submission returns the draft to
//! the last editable step with its contents intact, so the citizen can retry.

use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{FieldDefinition, PortalError, Priority, ServiceDefinition};

use crate::evaluator::{self, FieldValues};
use crate::registry::ServiceRegistry;
use crate::submission::SubmissionReceipt;
use crate::upload::StagedFile;

pub const DEFAULT_MAX_FILES: usize = shared_types::MAX_ATTACHMENTS;

#[derive(Debug, Clone, PartialEq)]
pub enum DraftStep {
    BaseInfo,
    ServiceFields,
    Submitting,
    Submitted(SubmissionReceipt),
}

/// Output of the map/geocoding picker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationSelection {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Immutable copy of a draft taken when it enters `Submitting`.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftSnapshot {
    pub service_id: String,
    pub title: String,
    pub description: String,
    pub location: LocationSelection,
    pub priority: Priority,
    pub staged_files: Vec<StagedFile>,
    /// Answers to currently visible fields only.
    pub extra_values: FieldValues,
}

/// Result of pressing "continue".
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    ServiceFields,
    Submit(DraftSnapshot),
}

#[derive(Debug, Clone)]
pub struct ClaimDraft {
    registry: Arc<ServiceRegistry>,
    step: DraftStep,
    service_id: Option<String>,
    title: String,
    description: String,
    location: LocationSelection,
    priority: Priority,
    staged_files: Vec<StagedFile>,
    extra_values: FieldValues,
    max_files: usize,
    last_error: Option<PortalError>,
}

impl ClaimDraft {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            step: DraftStep::BaseInfo,
            service_id: None,
            title: String::new(),
            description: String::new(),
            location: LocationSelection::default(),
            priority: Priority::default(),
            staged_files: Vec::new(),
            extra_values: FieldValues::new(),
            max_files: DEFAULT_MAX_FILES,
            last_error: None,
        }
    }

    /// Lower the attachment limit. Values above [`DEFAULT_MAX_FILES`] are capped.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.min(DEFAULT_MAX_FILES);
        self
    }

    pub fn step(&self) -> &DraftStep {
        &self.step
    }

    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> &LocationSelection {
        &self.location
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn staged_files(&self) -> &[StagedFile] {
        &self.staged_files
    }

    pub fn extra_values(&self) -> &FieldValues {
        &self.extra_values
    }

    /// Error from the most recent failed submission, cleared on the next attempt.
    pub fn last_error(&self) -> Option<&PortalError> {
        self.last_error.as_ref()
    }

    /// The selected service definition.
    pub fn service(&self) -> Result<Option<&ServiceDefinition>, PortalError> {
        self.service_id
            .as_deref()
            .map(|id| self.registry.lookup(id))
            .transpose()
    }

    fn ensure_editable(&self) -> Result<(), PortalError> {
        match self.step {
            DraftStep::BaseInfo | DraftStep::ServiceFields => Ok(()),
            DraftStep::Submitting => Err(PortalError::validation(
                "The claim is being submitted",
                HashMap::new(),
            )),
            DraftStep::Submitted(_) => Err(PortalError::validation(
                "The claim has already been submitted",
                HashMap::new(),
            )),
        }
    }

    // ── Step 1: base info ───────────────────────────────────────────

    /// Pick the service type. Switching to a different service drops prior extra answers.
    pub fn select_service(&mut self, service_id: &str) -> Result<(), PortalError> {
        self.ensure_editable()?;
        if self.step != DraftStep::BaseInfo {
            return Err(PortalError::validation(
                "The service type can only be changed on the first step",
                HashMap::new(),
            ));
        }
        self.registry.lookup(service_id)?;
        if self.service_id.as_deref() != Some(service_id) {
            self.service_id = Some(service_id.to_string());
            self.extra_values.clear();
        }
        Ok(())
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), PortalError> {
        self.ensure_editable()?;
        self.title = title.into();
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), PortalError> {
        self.ensure_editable()?;
        self.description = description.into();
        Ok(())
    }

    pub fn set_priority(&mut self, priority: Priority) -> Result<(), PortalError> {
        self.ensure_editable()?;
        self.priority = priority;
        Ok(())
    }

    pub fn set_location(&mut self, location: LocationSelection) -> Result<(), PortalError> {
        self.ensure_editable()?;
        self.location = location;
        Ok(())
    }

    /// Add files, keeping only the first `max_files` of existing + new.
    ///
    /// Returns how many files were dropped.
    pub fn stage_files(&mut self, files: Vec<StagedFile>) -> Result<usize, PortalError> {
        self.ensure_editable()?;
        self.staged_files.extend(files);
        let dropped = self.staged_files.len().saturating_sub(self.max_files);
        if dropped > 0 {
            self.staged_files.truncate(self.max_files);
            tracing::warn!(
                dropped,
                max = self.max_files,
                "Staged files over the limit were dropped"
            );
        }
        Ok(dropped)
    }

    pub fn remove_file(&mut self, index: usize) -> Result<Option<StagedFile>, PortalError> {
        self.ensure_editable()?;
        Ok((index < self.staged_files.len()).then(|| self.staged_files.remove(index)))
    }

    /// Inline errors for the base fields.
    pub fn base_info_errors(&self) -> HashMap<String, String> {
        let mut errors = HashMap::new();
        if self.service_id.is_none() {
            errors.insert("serviceId".to_string(), "Service type is required".to_string());
        }
        if self.title.trim().is_empty() {
            errors.insert("title".to_string(), "Title is required".to_string());
        }
        if self.description.trim().is_empty() {
            errors.insert("description".to_string(), "Description is required".to_string());
        }
        errors
    }

    pub fn base_info_complete(&self) -> bool {
        self.base_info_errors().is_empty()
    }

    // ── Step 2: service-specific fields ─────────────────────────────

    fn field_def(&self, name: &str) -> Result<&FieldDefinition, PortalError> {
        let service = self
            .service()?
            .ok_or_else(|| PortalError::config("No service type selected"))?;
        service.field(name).ok_or_else(|| {
            PortalError::config(format!("Unknown field '{name}' for service {}", service.id))
        })
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), PortalError> {
        self.ensure_editable()?;
        self.field_def(name)?;
        self.extra_values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Write a QR decoder result into a QR field.
    pub fn apply_qr_scan(&mut self, name: &str, decoded: &str) -> Result<(), PortalError> {
        self.ensure_editable()?;
        if !self.field_def(name)?.kind.accepts_scan() {
            return Err(PortalError::config(format!("Field '{name}' does not accept QR scans")));
        }
        self.extra_values.insert(name.to_string(), decoded.trim().to_string());
        Ok(())
    }

    /// Fields to render right now, in schema order.
    pub fn visible_fields(&self) -> Vec<&FieldDefinition> {
        match self.service() {
            Ok(Some(service)) => evaluator::visible_fields(service, &self.extra_values),
            _ => Vec::new(),
        }
    }

    /// Inline errors for the visible extra fields.
    pub fn field_errors(&self) -> HashMap<String, String> {
        match self.service() {
            Ok(Some(service)) => evaluator::validate(service, &self.extra_values)
                .err()
                .map(|e| e.field_errors)
                .unwrap_or_default(),
            _ => HashMap::new(),
        }
    }

    pub fn is_submittable(&self) -> bool {
        match self.service() {
            Ok(Some(service)) => {
                self.base_info_complete() && evaluator::is_submittable(service, &self.extra_values)
            }
            _ => false,
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// "Continue": move to the service step, or hand back a snapshot to submit.
    pub fn advance(&mut self) -> Result<Advance, PortalError> {
        match self.step {
            DraftStep::BaseInfo => {
                let errors = self.base_info_errors();
                if !errors.is_empty() {
                    return Err(PortalError::validation("Missing required information", errors));
                }
                if self.service_has_fields()? {
                    self.step = DraftStep::ServiceFields;
                    Ok(Advance::ServiceFields)
                } else {
                    self.begin_submit()
                }
            }
            DraftStep::ServiceFields => {
                if let Some(service) = self.service()? {
                    evaluator::validate(service, &self.extra_values)?;
                }
                self.begin_submit()
            }
            _ => Err(self.ensure_editable().err().unwrap_or_else(|| {
                PortalError::validation("Nothing to continue", HashMap::new())
            })),
        }
    }

    /// "Back" from the service step.
    pub fn back(&mut self) -> Result<(), PortalError> {
        if self.step == DraftStep::ServiceFields {
            self.step = DraftStep::BaseInfo;
        }
        Ok(())
    }

    fn service_has_fields(&self) -> Result<bool, PortalError> {
        Ok(self.service()?.is_some_and(|s| s.has_extra_fields()))
    }

    fn begin_submit(&mut self) -> Result<Advance, PortalError> {
        let snapshot = self.snapshot()?;
        self.last_error = None;
        self.step = DraftStep::Submitting;
        Ok(Advance::Submit(snapshot))
    }

    fn snapshot(&self) -> Result<DraftSnapshot, PortalError> {
        let service = self
            .service()?
            .ok_or_else(|| PortalError::config("No service type selected"))?;
        let extra_values = evaluator::visible_fields(service, &self.extra_values)
            .into_iter()
            .filter(|f| evaluator::value_present(&self.extra_values, &f.name))
            .filter_map(|f| {
                self.extra_values
                    .get(&f.name)
                    .map(|v| (f.name.clone(), v.trim().to_string()))
            })
            .collect();

        Ok(DraftSnapshot {
            service_id: service.id.clone(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            location: self.location.clone(),
            priority: self.priority,
            staged_files: self.staged_files.clone(),
            extra_values,
        })
    }

    /// Record the outcome of the submission started by `advance`.
    pub fn complete_submission(&mut self, result: Result<SubmissionReceipt, PortalError>) {
        if self.step != DraftStep::Submitting {
            tracing::warn!(step = ?self.step, "Submission result for a draft that is not submitting");
            return;
        }
        match result {
            Ok(receipt) => {
                self.step = DraftStep::Submitted(receipt);
            }
            Err(e) => {
                self.step = match self.service_has_fields() {
                    Ok(true) => DraftStep::ServiceFields,
                    _ => DraftStep::BaseInfo,
                };
                self.last_error = Some(e);
            }
        }
    }
}
