use tracing::{debug, info};

use crate::designer::cancel::{cancel_pair, CancelHandle, CancelSignal};
use crate::designer::form::{FormState, InputMode, SubjectCategory, VisualStyle};
use crate::designer::render::{render, View};
use crate::designer::result::ResultState;
use crate::designer::workflow::{RequestContext, SubmitError, WorkflowOutcome};
use crate::llm::media::MediaFile;

/// Identifies one file handed to `begin_ingest`; stale previews are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTicket(u64);

/// One user's form plus the result of their latest submission.
#[derive(Debug, Default)]
pub struct RoomDesigner {
    form: FormState,
    result: ResultState,
    submission_id: u64,
    file_revision: u64,
    in_flight: Option<CancelHandle>,
}

impl RoomDesigner {
    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn result(&self) -> &ResultState {
        &self.result
    }

    pub fn view(&self) -> View {
        render(&self.result, &self.form)
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.form.set_input_mode(mode);
    }

    pub fn set_description_text(&mut self, text: impl Into<String>) {
        self.form.set_description_text(text);
    }

    pub fn set_subject_category(&mut self, value: SubjectCategory) {
        self.form.set_subject_category(value);
    }

    pub fn set_visual_style(&mut self, value: VisualStyle) {
        self.form.set_visual_style(value);
    }

    /// Stores the file now; its preview is attached later by `finish_ingest`.
    pub fn begin_ingest(&mut self, file: MediaFile) -> IngestTicket {
        self.file_revision += 1;
        self.form.set_file(file);
        IngestTicket(self.file_revision)
    }

    /// Returns false when another file (or a reset) replaced this one meanwhile.
    pub fn finish_ingest(&mut self, ticket: IngestTicket, preview_data_uri: String) -> bool {
        if ticket.0 != self.file_revision || self.form.selected_file.is_none() {
            debug!("Dropping stale preview for file revision {}", ticket.0);
            return false;
        }
        self.form.set_preview(preview_data_uri);
        true
    }

    /// Validates and snapshots the form, entering the loading state.
    ///
    /// A submission already in flight yields `Busy` without touching any
    /// state. Missing input records the validation error and yields
    /// `MissingInput`; no request context is produced.
    pub fn begin_submission(&mut self) -> Result<(RequestContext, CancelSignal), SubmitError> {
        if self.result.is_loading {
            return Err(SubmitError::Busy);
        }

        let ctx = match RequestContext::from_form(self.submission_id + 1, &self.form) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.result.error_message = Some(err.user_message());
                return Err(err);
            }
        };

        self.submission_id = ctx.submission_id;
        self.result.start_loading();
        let (handle, signal) = cancel_pair();
        self.in_flight = Some(handle);
        Ok((ctx, signal))
    }

    /// Commits a finished run. Returns false when the run was cancelled or
    /// superseded, in which case the current state is left untouched.
    pub fn finish_submission(&mut self, submission_id: u64, outcome: WorkflowOutcome) -> bool {
        if submission_id != self.submission_id || !self.result.is_loading || outcome.is_cancelled()
        {
            debug!(
                submission_id,
                current = self.submission_id,
                "Discarding outcome of a superseded submission"
            );
            return false;
        }

        self.in_flight = None;
        let (decoration_tips, baby_essentials) = match outcome.advice {
            Some(advice) => (Some(advice.decoration_tips), Some(advice.baby_essentials)),
            None => (None, None),
        };
        self.result = ResultState {
            before_image_data_uri: outcome.before_image_data_uri,
            generated_image_data_uri: outcome.generated_image_data_uri,
            decoration_tips,
            baby_essentials,
            error_message: outcome.error.map(|err| err.user_message()),
            is_loading: false,
        };
        true
    }

    /// Releases a submission that will never be run to completion, for
    /// example when its task failed before starting the workflow. Returns
    /// false when the submission already finished or was superseded.
    pub fn abandon_submission(&mut self, submission_id: u64) -> bool {
        if submission_id != self.submission_id || !self.result.is_loading {
            return false;
        }
        if let Some(handle) = self.in_flight.take() {
            handle.cancel();
        }
        self.result.clear();
        true
    }

    /// Clears results and captured input, cancelling any in-flight run.
    /// Input mode and both style selectors survive.
    pub fn reset(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            info!(
                submission_id = self.submission_id,
                "Cancelling in-flight submission on reset"
            );
            handle.cancel();
        }
        self.submission_id += 1;
        self.file_revision += 1;
        self.result.clear();
        self.form.clear_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::designer::prompts::Advice;
    use crate::designer::result::SubmissionPhase;

    fn described() -> RoomDesigner {
        let mut designer = RoomDesigner::default();
        designer.set_input_mode(InputMode::Description);
        designer.set_description_text("square room, one window");
        designer
    }

    fn success_outcome() -> WorkflowOutcome {
        WorkflowOutcome {
            generated_image_data_uri: Some("data:image/png;base64,AA==".to_string()),
            advice: Some(Advice {
                decoration_tips: "Tip A".to_string(),
                baby_essentials: "Essential B".to_string(),
            }),
            ..WorkflowOutcome::default()
        }
    }

    #[test]
    fn empty_form_sets_validation_error_without_loading() {
        let mut designer = RoomDesigner::default();
        let err = designer.begin_submission().unwrap_err();
        assert!(matches!(err, SubmitError::MissingInput));
        assert!(!designer.result().is_loading);
        assert_eq!(
            designer.result().error_message.as_deref(),
            Some("Please upload a photo or describe the room.")
        );
    }

    #[test]
    fn second_begin_is_rejected_while_loading() {
        let mut designer = described();
        let (ctx, _signal) = designer.begin_submission().unwrap();
        assert!(matches!(
            designer.begin_submission(),
            Err(SubmitError::Busy)
        ));
        assert!(designer.result().is_loading);
        assert!(designer.finish_submission(ctx.submission_id, success_outcome()));
    }

    #[test]
    fn finishing_applies_outcome_and_clears_loading() {
        let mut designer = described();
        let (ctx, _signal) = designer.begin_submission().unwrap();
        assert_eq!(designer.result().phase(), SubmissionPhase::Submitting);

        assert!(designer.finish_submission(ctx.submission_id, success_outcome()));

        let result = designer.result();
        assert!(!result.is_loading);
        assert_eq!(result.decoration_tips.as_deref(), Some("Tip A"));
        assert_eq!(result.baby_essentials.as_deref(), Some("Essential B"));
        assert!(result.error_message.is_none());
        assert_eq!(designer.result().phase(), SubmissionPhase::Success);
    }

    #[test]
    fn failure_clears_loading_and_records_message() {
        let mut designer = described();
        let (ctx, _signal) = designer.begin_submission().unwrap();
        let outcome = WorkflowOutcome {
            error: Some(SubmitError::GenerationFailed),
            ..WorkflowOutcome::default()
        };
        assert!(designer.finish_submission(ctx.submission_id, outcome));
        assert!(!designer.result().is_loading);
        assert_eq!(designer.result().phase(), SubmissionPhase::Failed);
    }

    #[test]
    fn reset_cancels_in_flight_and_discards_its_outcome() {
        let mut designer = described();
        let (ctx, signal) = designer.begin_submission().unwrap();

        designer.reset();

        assert!(signal.is_cancelled());
        assert!(!designer.finish_submission(ctx.submission_id, success_outcome()));
        assert_eq!(designer.result(), &ResultState::default());
        assert_eq!(designer.result().phase(), SubmissionPhase::Idle);
    }

    #[test]
    fn abandoning_releases_loading_once() {
        let mut designer = described();
        let (ctx, signal) = designer.begin_submission().unwrap();

        assert!(designer.abandon_submission(ctx.submission_id));

        assert!(signal.is_cancelled());
        assert_eq!(designer.result(), &ResultState::default());
        assert!(!designer.abandon_submission(ctx.submission_id));
        assert!(!designer.finish_submission(ctx.submission_id, success_outcome()));
        assert!(designer.begin_submission().is_ok());
    }

    #[test]
    fn abandoning_a_finished_submission_keeps_its_result() {
        let mut designer = described();
        let (ctx, _signal) = designer.begin_submission().unwrap();
        designer.finish_submission(ctx.submission_id, success_outcome());

        assert!(!designer.abandon_submission(ctx.submission_id));
        assert_eq!(designer.result().decoration_tips.as_deref(), Some("Tip A"));
    }

    #[test]
    fn reset_after_success_keeps_style_selectors() {
        let mut designer = described();
        designer.set_subject_category(SubjectCategory::Neutral);
        designer.set_visual_style(VisualStyle::Colorful);
        let (ctx, _signal) = designer.begin_submission().unwrap();
        designer.finish_submission(ctx.submission_id, success_outcome());

        designer.reset();

        assert_eq!(designer.result(), &ResultState::default());
        assert!(designer.form().description_text.is_empty());
        assert!(designer.form().selected_file.is_none());
        assert_eq!(designer.form().subject_category, SubjectCategory::Neutral);
        assert_eq!(designer.form().visual_style, VisualStyle::Colorful);

        designer.set_description_text("another room");
        let (ctx, _signal) = designer.begin_submission().unwrap();
        assert_eq!(ctx.subject_category, SubjectCategory::Neutral);
        assert_eq!(ctx.visual_style, VisualStyle::Colorful);
    }

    #[test]
    fn stale_preview_is_dropped() {
        let mut designer = RoomDesigner::default();
        let first = designer.begin_ingest(MediaFile::new(vec![1], Some("image/png".into()), None));
        let second = designer.begin_ingest(MediaFile::new(vec![2], Some("image/png".into()), None));

        assert!(!designer.finish_ingest(first, "data:image/png;base64,AQ==".to_string()));
        assert!(designer.finish_ingest(second, "data:image/png;base64,Ag==".to_string()));
        assert_eq!(
            designer.form().preview_data_uri.as_deref(),
            Some("data:image/png;base64,Ag==")
        );

        let third = designer.begin_ingest(MediaFile::new(vec![3], Some("image/png".into()), None));
        designer.reset();
        assert!(!designer.finish_ingest(third, "data:image/png;base64,Aw==".to_string()));
        assert!(designer.form().preview_data_uri.is_none());
    }
}
