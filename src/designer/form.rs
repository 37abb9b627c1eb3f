use std::fmt;
use std::str::FromStr;

use crate::llm::media::{self, MediaFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Photo,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubjectCategory {
    #[default]
    Boy,
    Girl,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualStyle {
    Colorful,
    Elegant,
    #[default]
    Cozy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
}

impl InputMode {
    pub const ALL: [InputMode; 2] = [InputMode::Photo, InputMode::Description];

    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Photo => "photo",
            InputMode::Description => "description",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputMode::Photo => "Upload photo",
            InputMode::Description => "Describe room",
        }
    }
}

impl SubjectCategory {
    pub const ALL: [SubjectCategory; 3] = [
        SubjectCategory::Boy,
        SubjectCategory::Girl,
        SubjectCategory::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectCategory::Boy => "boy",
            SubjectCategory::Girl => "girl",
            SubjectCategory::Neutral => "neutral",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubjectCategory::Boy => "Boy",
            SubjectCategory::Girl => "Girl",
            SubjectCategory::Neutral => "Neutral",
        }
    }

    /// Noun phrase used inside prompts, e.g. "baby nursery for a girl".
    pub fn nursery_phrase(self) -> &'static str {
        match self {
            SubjectCategory::Boy => "baby nursery for a boy",
            SubjectCategory::Girl => "baby nursery for a girl",
            SubjectCategory::Neutral => "gender-neutral baby nursery",
        }
    }
}

impl VisualStyle {
    pub const ALL: [VisualStyle; 3] = [VisualStyle::Colorful, VisualStyle::Elegant, VisualStyle::Cozy];

    pub fn as_str(self) -> &'static str {
        match self {
            VisualStyle::Colorful => "colorful",
            VisualStyle::Elegant => "elegant",
            VisualStyle::Cozy => "cozy",
        }
    }

    /// Style phrase used inside prompts, e.g. "an elegant style".
    pub fn style_phrase(self) -> &'static str {
        match self {
            VisualStyle::Colorful => "a colorful style",
            VisualStyle::Elegant => "an elegant style",
            VisualStyle::Cozy => "a cozy style",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VisualStyle::Colorful => "Colorful",
            VisualStyle::Elegant => "Elegant",
            VisualStyle::Cozy => "Cozy",
        }
    }
}

macro_rules! impl_option_parsing {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = ParseOptionError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim().to_lowercase();
                <$ty>::ALL
                    .into_iter()
                    .find(|option| option.as_str() == wanted)
                    .ok_or_else(|| ParseOptionError {
                        kind: $kind,
                        value: value.trim().to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_option_parsing!(InputMode, "input mode");
impl_option_parsing!(SubjectCategory, "subject category");
impl_option_parsing!(VisualStyle, "visual style");

/// Everything the user has entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub input_mode: InputMode,
    pub selected_file: Option<MediaFile>,
    pub preview_data_uri: Option<String>,
    pub description_text: String,
    pub subject_category: SubjectCategory,
    pub visual_style: VisualStyle,
}

impl FormState {
    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.input_mode = mode;
    }

    /// Stores the file and drops any preview left from a previous file; the
    /// new preview arrives through `set_preview`.
    pub fn set_file(&mut self, file: MediaFile) {
        self.selected_file = Some(file);
        self.preview_data_uri = None;
    }

    pub fn set_preview(&mut self, data_uri: String) {
        self.preview_data_uri = Some(data_uri);
    }

    pub fn set_description_text(&mut self, text: impl Into<String>) {
        self.description_text = text.into();
    }

    pub fn set_subject_category(&mut self, value: SubjectCategory) {
        self.subject_category = value;
    }

    pub fn set_visual_style(&mut self, value: VisualStyle) {
        self.visual_style = value;
    }

    pub fn has_description(&self) -> bool {
        !self.description_text.trim().is_empty()
    }

    pub fn has_input(&self) -> bool {
        self.selected_file.is_some() || self.has_description()
    }

    /// Clears captured input; mode and both selectors are kept.
    pub fn clear_input(&mut self) {
        self.selected_file = None;
        self.preview_data_uri = None;
        self.description_text.clear();
    }
}

/// Decodes a file into its preview data URI off the async executor thread.
pub async fn decode_preview(file: MediaFile) -> String {
    match tokio::task::spawn_blocking(move || media::to_data_uri(&file)).await {
        Ok(uri) => uri,
        Err(err) => {
            tracing::warn!("Preview encoding task failed: {err}");
            String::new()
        }
    }
}
