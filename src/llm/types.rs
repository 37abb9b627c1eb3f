//! Provider-neutral request/response shapes for the generative service.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Image,
}

impl Modality {
    pub fn wire_name(self) -> &'static str {
        match self {
            Modality::Image => "IMAGE",
        }
    }
}

/// Base64 payload plus the mime type it decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Inline(InlineData),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    /// Empty means the service picks its default output modality.
    pub response_modalities: Vec<Modality>,
}

impl GenerationRequest {
    /// Builds the ordered parts: optional inline attachment first, prompt last.
    pub fn new(model: &str, attachment: Option<&InlineData>, prompt: &str) -> Self {
        let mut parts = Vec::with_capacity(2);
        if let Some(inline) = attachment {
            parts.push(ContentPart::Inline(inline.clone()));
        }
        parts.push(ContentPart::Text(prompt.to_string()));
        Self {
            model: model.to_string(),
            parts,
            response_modalities: Vec::new(),
        }
    }

    pub fn with_modalities(mut self, modalities: &[Modality]) -> Self {
        self.response_modalities = modalities.to_vec();
        self
    }

    #[cfg(test)]
    pub fn prompt_text(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            ContentPart::Inline(_) => None,
        })
    }

    pub fn has_attachment(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::Inline(_)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub parts: Vec<ContentPart>,
}

impl GenerationResponse {
    pub fn first_inline_image(&self) -> Option<&InlineData> {
        self.parts.iter().find_map(|part| match part {
            ContentPart::Inline(inline) if inline.is_image() => Some(inline),
            _ => None,
        })
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Inline(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
