#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Submitting,
    Success,
    Failed,
}

/// Output of the most recent submission, as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultState {
    /// The photo the result was generated from, captured at submission time.
    pub before_image_data_uri: Option<String>,
    pub generated_image_data_uri: Option<String>,
    pub decoration_tips: Option<String>,
    pub baby_essentials: Option<String>,
    pub error_message: Option<String>,
    pub is_loading: bool,
}

impl ResultState {
    /// Enters the loading state with every prior result and error dropped.
    pub fn start_loading(&mut self) {
        *self = ResultState {
            is_loading: true,
            ..ResultState::default()
        };
    }

    pub fn clear(&mut self) {
        *self = ResultState::default();
    }

    pub fn phase(&self) -> SubmissionPhase {
        if self.is_loading {
            SubmissionPhase::Submitting
        } else if self.error_message.is_some() {
            SubmissionPhase::Failed
        } else if self.generated_image_data_uri.is_some() {
            SubmissionPhase::Success
        } else {
            SubmissionPhase::Idle
        }
    }
}
