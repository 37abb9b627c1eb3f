use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::designer::cancel::CancelSignal;
use crate::designer::form::{FormState, InputMode, SubjectCategory, VisualStyle};
use crate::designer::prompts::{self, Advice};
use crate::llm::media::encode_inline;
use crate::llm::service::{GenerativeService, ServiceError};
use crate::llm::types::{GenerationRequest, InlineData, Modality};

const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while generating ideas. Please try again.";

#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("Please upload a photo or describe the room.")]
    MissingInput,
    #[error("Could not generate the image. Please try again.")]
    GenerationFailed,
    #[error("The advice reply was missing one of its sections. Please try again.")]
    MalformedAdvice,
    #[error("A design is already being generated.")]
    Busy,
    #[error("The submission was cancelled.")]
    Cancelled,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SubmitError {
    /// Text placed in the result's error field.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Service(ServiceError::MissingApiKey) => {
                "The image service is not configured (missing API key).".to_string()
            }
            SubmitError::Service(err) => err
                .service_message()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            other => other.to_string(),
        }
    }
}

/// Snapshot of the form taken when a submission starts.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub submission_id: u64,
    pub input_mode: InputMode,
    pub attachment: Option<InlineData>,
    pub description: String,
    pub subject_category: SubjectCategory,
    pub visual_style: VisualStyle,
}

impl RequestContext {
    pub fn from_form(submission_id: u64, form: &FormState) -> Result<Self, SubmitError> {
        if !form.has_input() {
            return Err(SubmitError::MissingInput);
        }
        Ok(Self {
            submission_id,
            input_mode: form.input_mode,
            attachment: form.selected_file.as_ref().map(encode_inline),
            description: form.description_text.trim().to_string(),
            subject_category: form.subject_category,
            visual_style: form.visual_style,
        })
    }
}

/// What a finished run produced. An image can coexist with an error when
/// the advice step fails after the image step succeeded.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutcome {
    pub before_image_data_uri: Option<String>,
    pub generated_image_data_uri: Option<String>,
    pub advice: Option<Advice>,
    pub error: Option<SubmitError>,
}

impl WorkflowOutcome {
    fn failed(error: SubmitError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(SubmitError::Cancelled))
    }
}

/// Runs the image call and then the advice call for one submission.
pub struct SubmissionWorkflow {
    service: Arc<dyn GenerativeService>,
    image_model: String,
    text_model: String,
    response_language: Option<String>,
}

impl SubmissionWorkflow {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        image_model: impl Into<String>,
        text_model: impl Into<String>,
        response_language: Option<String>,
    ) -> Self {
        Self {
            service,
            image_model: image_model.into(),
            text_model: text_model.into(),
            response_language,
        }
    }

    pub fn from_config(service: Arc<dyn GenerativeService>, config: &Config) -> Self {
        Self::new(
            service,
            config.gemini_image_model.clone(),
            config.gemini_text_model.clone(),
            config.response_language.clone(),
        )
    }

    pub async fn run(&self, ctx: &RequestContext, cancel: &CancelSignal) -> WorkflowOutcome {
        info!(
            submission_id = ctx.submission_id,
            mode = ctx.input_mode.as_str(),
            subject = ctx.subject_category.as_str(),
            style = ctx.visual_style.as_str(),
            attachment = ctx.attachment.is_some(),
            "Starting nursery design submission"
        );

        let image_prompt = prompts::image_prompt(
            ctx.input_mode,
            &ctx.description,
            ctx.subject_category,
            ctx.visual_style,
        );
        let image_request =
            GenerationRequest::new(&self.image_model, ctx.attachment.as_ref(), &image_prompt)
                .with_modalities(&[Modality::Image]);

        let image_response =
            match guarded(cancel, self.service.generate_image(image_request)).await {
                Ok(response) => response,
                Err(err) => return self.finish(ctx, WorkflowOutcome::failed(err)),
            };

        let Some(image) = image_response.first_inline_image() else {
            warn!(
                submission_id = ctx.submission_id,
                parts = image_response.parts.len(),
                "Image response carried no inline image"
            );
            return self.finish(ctx, WorkflowOutcome::failed(SubmitError::GenerationFailed));
        };

        let before_image_data_uri = match ctx.input_mode {
            InputMode::Photo => ctx.attachment.as_ref().map(InlineData::to_data_uri),
            InputMode::Description => None,
        };
        let mut outcome = WorkflowOutcome {
            before_image_data_uri,
            generated_image_data_uri: Some(image.to_data_uri()),
            ..WorkflowOutcome::default()
        };

        let advice_prompt = prompts::advice_prompt(
            ctx.input_mode,
            &ctx.description,
            ctx.subject_category,
            ctx.visual_style,
            self.response_language.as_deref(),
        );
        let advice_request =
            GenerationRequest::new(&self.text_model, ctx.attachment.as_ref(), &advice_prompt);

        match guarded(cancel, self.service.generate_text(advice_request)).await {
            Ok(text) => match prompts::split_advice(&text) {
                Some(advice) => outcome.advice = Some(advice),
                None => outcome.error = Some(SubmitError::MalformedAdvice),
            },
            Err(err) => outcome.error = Some(err),
        }

        self.finish(ctx, outcome)
    }

    fn finish(&self, ctx: &RequestContext, outcome: WorkflowOutcome) -> WorkflowOutcome {
        match &outcome.error {
            None => info!(submission_id = ctx.submission_id, "Nursery design completed"),
            Some(SubmitError::Cancelled) => {
                info!(submission_id = ctx.submission_id, "Nursery design cancelled")
            }
            Some(err) => warn!(
                submission_id = ctx.submission_id,
                image = outcome.generated_image_data_uri.is_some(),
                "Nursery design failed: {err}"
            ),
        }
        outcome
    }
}

async fn guarded<T, F>(cancel: &CancelSignal, call: F) -> Result<T, SubmitError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    if cancel.is_cancelled() {
        return Err(SubmitError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SubmitError::Cancelled),
        result = call => result.map_err(SubmitError::from),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::llm::service::{GenerativeService, ServiceError};
    use crate::llm::types::{ContentPart, GenerationRequest, GenerationResponse, InlineData};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CallKind {
        Image,
        Text,
    }

    /// In-memory service that replays queued replies and records requests.
    #[derive(Default)]
    pub struct ScriptedService {
        image_replies: Mutex<VecDeque<Result<GenerationResponse, ServiceError>>>,
        text_replies: Mutex<VecDeque<Result<String, ServiceError>>>,
        pub calls: Mutex<Vec<(CallKind, GenerationRequest)>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedService {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn push_image(&self, reply: Result<GenerationResponse, ServiceError>) {
            self.image_replies.lock().push_back(reply);
        }

        pub fn push_text(&self, reply: Result<String, ServiceError>) {
            self.text_replies.lock().push_back(reply);
        }

        pub fn push_success(&self, text: &str) {
            self.push_image(Ok(image_response()));
            self.push_text(Ok(text.to_string()));
        }

        pub fn kinds(&self) -> Vec<CallKind> {
            self.calls.lock().iter().map(|(kind, _)| *kind).collect()
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    pub fn image_response() -> GenerationResponse {
        GenerationResponse {
            parts: vec![
                ContentPart::Text("Here is your nursery".to_string()),
                ContentPart::Inline(InlineData {
                    mime_type: "image/png".to_string(),
                    data: "R0VO".to_string(),
                }),
            ],
        }
    }

    #[async_trait]
    impl GenerativeService for ScriptedService {
        async fn generate_image(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, ServiceError> {
            self.calls.lock().push((CallKind::Image, request));
            self.pause().await;
            self.image_replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(GenerationResponse::default()))
        }

        async fn generate_text(&self, request: GenerationRequest) -> Result<String, ServiceError> {
            self.calls.lock().push((CallKind::Text, request));
            self.pause().await;
            self.text_replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }
}
