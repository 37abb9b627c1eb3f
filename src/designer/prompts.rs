use tracing::warn;

use crate::designer::form::{InputMode, SubjectCategory, VisualStyle};

pub const ADVICE_DELIMITER: &str = "---SPLIT---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub decoration_tips: String,
    pub baby_essentials: String,
}

pub fn image_prompt(
    mode: InputMode,
    description: &str,
    subject: SubjectCategory,
    style: VisualStyle,
) -> String {
    let nursery = subject.nursery_phrase();
    let style = style.style_phrase();
    match mode {
        InputMode::Photo => format!(
            "Based on the provided image, generate a new photorealistic image showing it \
             transformed into a {nursery} with {style} that is beautiful and functional. \
             The design must show an ideal and safe placement for a crib. Preserve the original \
             architecture of the room: the size, shape and position of every window and door \
             must be identical to the original image."
        ),
        InputMode::Description => format!(
            "Based on this description of a room: \"{description}\", generate a photorealistic \
             image of it transformed into a {nursery} with {style}. The image must show \
             an ideal placement for the crib and accurately reflect the described layout."
        ),
    }
}

pub fn advice_prompt(
    mode: InputMode,
    description: &str,
    subject: SubjectCategory,
    style: VisualStyle,
    language: Option<&str>,
) -> String {
    let nursery = subject.nursery_phrase();
    let style = style.style_phrase();
    let room = match mode {
        InputMode::Photo => "For the provided room".to_string(),
        InputMode::Description => format!("For the provided room described as \"{description}\""),
    };
    let mut prompt = format!(
        "{room}, give practical decoration advice and a list of essential items for a {nursery} \
         with {style}. Separate the two sections with the exact string \
         '{ADVICE_DELIMITER}'. Do not use markdown or asterisks. Keep the texts short."
    );
    if let Some(language) = language.map(str::trim).filter(|value| !value.is_empty()) {
        prompt.push_str(&format!(" Reply in {language}."));
    }
    prompt
}

/// Splits the combined advice reply into its two sections.
///
/// Returns `None` when the delimiter is missing. Extra delimiters are
/// tolerated: only the first two sections are kept.
pub fn split_advice(text: &str) -> Option<Advice> {
    let mut sections = text.split(ADVICE_DELIMITER);
    let decoration_tips = sections.next()?.trim().to_string();
    let baby_essentials = sections.next()?.trim().to_string();
    let extra = sections.count();
    if extra > 0 {
        warn!("Advice reply contained {} extra section(s); ignoring them", extra);
    }
    Some(Advice {
        decoration_tips,
        baby_essentials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims_both_sections() {
        let advice = split_advice("Tip A\n---SPLIT---\nEssential B").expect("delimiter present");
        assert_eq!(advice.decoration_tips, "Tip A");
        assert_eq!(advice.baby_essentials, "Essential B");
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        assert!(split_advice("Just some tips without sections").is_none());
    }

    #[test]
    fn extra_sections_are_ignored() {
        let advice = split_advice("a ---SPLIT--- b ---SPLIT--- c").unwrap();
        assert_eq!(advice.decoration_tips, "a");
        assert_eq!(advice.baby_essentials, "b");
    }

    #[test]
    fn photo_prompt_preserves_architecture() {
        let prompt = image_prompt(
            InputMode::Photo,
            "ignored",
            SubjectCategory::Girl,
            VisualStyle::Elegant,
        );
        assert!(prompt.contains("baby nursery for a girl"));
        assert!(prompt.contains("with an elegant style"));
        assert!(prompt.contains("window and door"));
        assert!(prompt.contains("crib"));
        assert!(!prompt.contains("ignored"));
    }

    #[test]
    fn description_prompt_quotes_the_description() {
        let prompt = image_prompt(
            InputMode::Description,
            "3m x 4m, door in the corner",
            SubjectCategory::Neutral,
            VisualStyle::Colorful,
        );
        assert!(prompt.contains("\"3m x 4m, door in the corner\""));
        assert!(prompt.contains("gender-neutral baby nursery"));
        assert!(prompt.contains("with a colorful style"));
    }

    #[test]
    fn advice_prompt_names_delimiter_and_language() {
        let prompt = advice_prompt(
            InputMode::Description,
            "attic room",
            SubjectCategory::Boy,
            VisualStyle::Cozy,
            Some("Portuguese"),
        );
        assert!(prompt.contains("'---SPLIT---'"));
        assert!(prompt.contains("described as \"attic room\""));
        assert!(prompt.ends_with("Reply in Portuguese."));

        let photo = advice_prompt(
            InputMode::Photo,
            "attic room",
            SubjectCategory::Boy,
            VisualStyle::Cozy,
            Some("  "),
        );
        assert!(!photo.contains("attic room"));
        assert!(!photo.contains("Reply in"));
    }
}
