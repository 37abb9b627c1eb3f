use crate::designer::form::FormState;
use crate::designer::result::ResultState;

pub const LOADING_TEXT: &str = "Designing the nursery of your dreams...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    DecorationTips,
    BabyEssentials,
}

impl PanelKind {
    pub fn title(self) -> &'static str {
        match self {
            PanelKind::DecorationTips => "Decoration tips",
            PanelKind::BabyEssentials => "Baby essentials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvicePanel {
    pub kind: PanelKind,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsView {
    pub before_data_uri: Option<String>,
    pub after_data_uri: String,
    pub after_label: &'static str,
    pub panels: Vec<AdvicePanel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Generate { enabled: bool },
    Generating,
    GenerateAgain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub loading: bool,
    pub alert: Option<String>,
    pub results: Option<ResultsView>,
    pub action: PrimaryAction,
}

pub fn render(result: &ResultState, form: &FormState) -> View {
    let results = if result.is_loading {
        None
    } else {
        result
            .generated_image_data_uri
            .as_ref()
            .map(|after| render_results(result, after))
    };

    let action = if result.is_loading {
        PrimaryAction::Generating
    } else if result.generated_image_data_uri.is_some() {
        PrimaryAction::GenerateAgain
    } else {
        PrimaryAction::Generate {
            enabled: form.has_input(),
        }
    };

    View {
        loading: result.is_loading,
        alert: result.error_message.clone(),
        results,
        action,
    }
}

/// The before image comes from the submission that produced `after`, so
/// later edits to the form never relabel an older result.
fn render_results(result: &ResultState, after: &str) -> ResultsView {
    let before_data_uri = result
        .before_image_data_uri
        .clone()
        .filter(|uri| !uri.is_empty());
    let after_label = if before_data_uri.is_some() {
        "After"
    } else {
        "Suggestion"
    };

    let panels = [
        (PanelKind::DecorationTips, &result.decoration_tips),
        (PanelKind::BabyEssentials, &result.baby_essentials),
    ]
    .into_iter()
    .filter_map(|(kind, text)| {
        text.as_deref()
            .filter(|body| !body.trim().is_empty())
            .map(|body| AdvicePanel {
                kind,
                body: body.to_string(),
            })
    })
    .collect();

    ResultsView {
        before_data_uri,
        after_data_uri: after.to_string(),
        after_label,
        panels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AFTER: &str = "data:image/png;base64,QUZURVI=";
    const BEFORE: &str = "data:image/jpeg;base64,QkVGT1JF";

    fn success() -> ResultState {
        ResultState {
            generated_image_data_uri: Some(AFTER.to_string()),
            decoration_tips: Some("Soft lighting".to_string()),
            baby_essentials: Some("Crib, changing table".to_string()),
            ..ResultState::default()
        }
    }

    #[test]
    fn loading_hides_results() {
        let result = ResultState {
            is_loading: true,
            ..ResultState::default()
        };
        let view = render(&result, &FormState::default());
        assert!(view.loading);
        assert!(view.results.is_none());
        assert_eq!(view.action, PrimaryAction::Generating);
    }

    #[test]
    fn photo_submission_shows_before_and_after() {
        let result = ResultState {
            before_image_data_uri: Some(BEFORE.to_string()),
            ..success()
        };
        let view = render(&result, &FormState::default());
        let results = view.results.expect("results");
        assert_eq!(results.before_data_uri.as_deref(), Some(BEFORE));
        assert_eq!(results.after_label, "After");
        assert_eq!(results.panels.len(), 2);
        assert_eq!(results.panels[0].kind, PanelKind::DecorationTips);
        assert_eq!(view.action, PrimaryAction::GenerateAgain);
    }

    #[test]
    fn description_submission_omits_before_image() {
        let mut form = FormState::default();
        form.set_preview(BEFORE.to_string());
        let results = render(&success(), &form).results.expect("results");
        assert!(results.before_data_uri.is_none());
        assert_eq!(results.after_label, "Suggestion");
    }

    #[test]
    fn later_form_edits_do_not_change_the_before_image() {
        let result = ResultState {
            before_image_data_uri: Some(BEFORE.to_string()),
            ..success()
        };
        let mut form = FormState::default();
        form.set_preview("data:image/png;base64,TkVX".to_string());
        form.set_input_mode(crate::designer::form::InputMode::Description);

        let results = render(&result, &form).results.expect("results");

        assert_eq!(results.before_data_uri.as_deref(), Some(BEFORE));
        assert_eq!(results.after_label, "After");
    }

    #[test]
    fn empty_panels_are_skipped() {
        let mut result = success();
        result.decoration_tips = Some("  ".to_string());
        result.baby_essentials = None;
        let results = render(&result, &FormState::default())
            .results
            .expect("results");
        assert!(results.panels.is_empty());
    }

    #[test]
    fn partial_failure_shows_image_and_alert() {
        let result = ResultState {
            generated_image_data_uri: Some(AFTER.to_string()),
            error_message: Some("advice failed".to_string()),
            ..ResultState::default()
        };
        let view = render(&result, &FormState::default());
        assert_eq!(view.alert.as_deref(), Some("advice failed"));
        assert!(view.results.is_some());
    }

    #[test]
    fn generate_is_disabled_without_input() {
        let view = render(&ResultState::default(), &FormState::default());
        assert_eq!(view.action, PrimaryAction::Generate { enabled: false });

        let mut form = FormState::default();
        form.set_description_text("a room");
        let view = render(&ResultState::default(), &form);
        assert_eq!(view.action, PrimaryAction::Generate { enabled: true });
    }
}
