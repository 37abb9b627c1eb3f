use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use tracing::{error, info, warn};

use crate::config::CONFIG;
use crate::designer::render::LOADING_TEXT;
use crate::designer::result::SubmissionPhase;
use crate::designer::{
    FormState, InputMode, PrimaryAction, SubjectCategory, SubmitError, View, VisualStyle,
};
use crate::handlers::responses::{delete_quietly, deliver_view, send_message_with_retry};
use crate::llm::media::{download_media, MediaFile};
use crate::state::AppState;
use crate::utils::telegram::start_chat_action_heartbeat;
use crate::utils::timing::CommandTimer;

pub const FORM_CALLBACK_PREFIX: &str = "designer:";
const DESCRIPTION_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Mode(InputMode),
    Subject(SubjectCategory),
    Style(VisualStyle),
    Generate,
    Again,
    Noop,
}

impl FormAction {
    pub fn callback_data(self) -> String {
        let suffix = match self {
            FormAction::Mode(mode) => format!("mode:{mode}"),
            FormAction::Subject(subject) => format!("subject:{subject}"),
            FormAction::Style(style) => format!("style:{style}"),
            FormAction::Generate => "generate".to_string(),
            FormAction::Again => "again".to_string(),
            FormAction::Noop => "noop".to_string(),
        };
        format!("{FORM_CALLBACK_PREFIX}{suffix}")
    }

    pub fn parse(data: &str) -> Option<Self> {
        let payload = data.strip_prefix(FORM_CALLBACK_PREFIX)?;
        let (kind, value) = payload.split_once(':').unwrap_or((payload, ""));
        match kind {
            "mode" => value.parse().ok().map(FormAction::Mode),
            "subject" => value.parse().ok().map(FormAction::Subject),
            "style" => value.parse().ok().map(FormAction::Style),
            "generate" => Some(FormAction::Generate),
            "again" => Some(FormAction::Again),
            "noop" => Some(FormAction::Noop),
            _ => None,
        }
    }
}

fn option_button(label: &str, active: bool, action: FormAction) -> InlineKeyboardButton {
    let text = if active {
        format!("✅ {label}")
    } else {
        label.to_string()
    };
    InlineKeyboardButton::callback(text, action.callback_data())
}

pub fn build_form_keyboard(form: &FormState, view: &View) -> InlineKeyboardMarkup {
    let modes = InputMode::ALL
        .iter()
        .map(|mode| option_button(mode.label(), form.input_mode == *mode, FormAction::Mode(*mode)))
        .collect::<Vec<_>>();
    let subjects = SubjectCategory::ALL
        .iter()
        .map(|subject| {
            option_button(
                subject.label(),
                form.subject_category == *subject,
                FormAction::Subject(*subject),
            )
        })
        .collect::<Vec<_>>();
    let styles = VisualStyle::ALL
        .iter()
        .map(|style| {
            option_button(
                style.label(),
                form.visual_style == *style,
                FormAction::Style(*style),
            )
        })
        .collect::<Vec<_>>();
    let action = match view.action {
        PrimaryAction::Generating => {
            InlineKeyboardButton::callback("Generating...", FormAction::Noop.callback_data())
        }
        PrimaryAction::GenerateAgain => {
            InlineKeyboardButton::callback("Generate again", FormAction::Again.callback_data())
        }
        PrimaryAction::Generate { .. } => {
            InlineKeyboardButton::callback("Generate ideas", FormAction::Generate.callback_data())
        }
    };

    InlineKeyboardMarkup::new(vec![modes, subjects, styles, vec![action]])
}

fn preview_text(text: &str) -> String {
    let trimmed = text.trim();
    let mut preview: String = trimmed.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

pub fn form_summary(form: &FormState, view: &View) -> String {
    let mut lines = vec!["AI nursery designer".to_string(), String::new()];
    lines.push(format!("Input: {}", form.input_mode.label()));
    match form.input_mode {
        InputMode::Photo => lines.push(format!(
            "Photo: {}",
            if form.selected_file.is_some() {
                "received"
            } else {
                "send a photo of the room"
            }
        )),
        InputMode::Description => lines.push(format!(
            "Description: {}",
            if form.has_description() {
                format!("\"{}\"", preview_text(&form.description_text))
            } else {
                "send a message describing the room".to_string()
            }
        )),
    }
    lines.push(format!(
        "Subject: {} | Style: {}",
        form.subject_category.label(),
        form.visual_style.label()
    ));
    if view.loading {
        lines.push(String::new());
        lines.push(LOADING_TEXT.to_string());
    } else if let PrimaryAction::Generate { enabled: false } = view.action {
        lines.push(String::new());
        lines.push("Upload a photo or describe the room to get started.".to_string());
    }
    lines.join("\n")
}

fn panel_for(state: &AppState, chat_id: ChatId) -> (String, InlineKeyboardMarkup) {
    state.with_session(chat_id.0, |session| {
        let view = session.view();
        (
            form_summary(session.form(), &view),
            build_form_keyboard(session.form(), &view),
        )
    })
}

pub async fn send_form_panel(bot: &Bot, state: &AppState, chat_id: ChatId) -> Result<()> {
    let (text, keyboard) = panel_for(state, chat_id);
    bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    Ok(())
}

async fn refresh_form_panel(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<()> {
    let (text, keyboard) = panel_for(state, chat_id);
    if let Err(err) = bot
        .edit_message_text(chat_id, message_id, text)
        .reply_markup(keyboard)
        .await
    {
        // Telegram rejects edits that change nothing.
        warn!("Failed to refresh form panel: {err}");
    }
    Ok(())
}

pub async fn start_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "Hello! I turn any room into a baby nursery. Send a photo or describe your space, \
         pick a subject and style, then tap Generate ideas. Use /help to see commands.",
    )
    .await?;
    send_form_panel(&bot, &state, message.chat.id).await
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    let help_text = "
AI nursery designer commands

/form - Show the design form with its current choices
/photo - Use an uploaded photo of the room (then send the photo)
/describe [text] - Describe the room instead of sending a photo
/subject boy|girl|neutral - Pick the nursery subject
/style colorful|elegant|cozy - Pick the visual style
/generate - Generate the design and advice
/again - Clear the results and input to start over (keeps subject and style)
/help - Show this help message

Sending a photo switches to photo input; sending plain text switches to description input.
";
    bot.send_message(message.chat.id, help_text).await?;
    Ok(())
}

pub async fn form_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    send_form_panel(&bot, &state, message.chat.id).await
}

pub async fn mode_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    mode: InputMode,
    description: Option<String>,
) -> Result<()> {
    state.with_session(message.chat.id.0, |session| {
        session.set_input_mode(mode);
        if let Some(text) = description {
            session.set_description_text(text);
        }
    });
    send_form_panel(&bot, &state, message.chat.id).await
}

pub async fn subject_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: String,
) -> Result<()> {
    match arg.parse::<SubjectCategory>() {
        Ok(subject) => {
            state.with_session(message.chat.id.0, |session| {
                session.set_subject_category(subject)
            });
            send_form_panel(&bot, &state, message.chat.id).await
        }
        Err(err) => {
            bot.send_message(message.chat.id, format!("{err}. Use boy, girl or neutral."))
                .await?;
            Ok(())
        }
    }
}

pub async fn style_handler(bot: Bot, state: AppState, message: Message, arg: String) -> Result<()> {
    match arg.parse::<VisualStyle>() {
        Ok(style) => {
            state.with_session(message.chat.id.0, |session| session.set_visual_style(style));
            send_form_panel(&bot, &state, message.chat.id).await
        }
        Err(err) => {
            bot.send_message(
                message.chat.id,
                format!("{err}. Use colorful, elegant or cozy."),
            )
            .await?;
            Ok(())
        }
    }
}

pub async fn again_handler(bot: Bot, state: AppState, chat_id: ChatId) -> Result<()> {
    state.reset(chat_id.0);
    bot.send_message(chat_id, "Ready for a new room.").await?;
    send_form_panel(&bot, &state, chat_id).await
}

/// Runs one submission for the chat and delivers its view.
pub async fn generate_handler(
    bot: Bot,
    state: AppState,
    chat_id: ChatId,
    user_id: Option<i64>,
) -> Result<()> {
    let mut timer = CommandTimer::start("generate", chat_id.0, user_id);

    let pending = match state.begin_submission(chat_id.0) {
        Ok(pending) => pending,
        Err(SubmitError::Busy) => {
            timer.finish("rejected", Some("busy"));
            send_message_with_retry(&bot, chat_id, &SubmitError::Busy.to_string()).await?;
            return Ok(());
        }
        Err(err) => {
            timer.finish("rejected", Some(&err.to_string()));
            let view = state.with_session(chat_id.0, |session| session.view());
            deliver_view(&bot, chat_id, &view, CONFIG.telegram_max_length).await?;
            return Ok(());
        }
    };

    // Any early return from here drops `pending`, which releases the session.
    let submission_id = pending.context.submission_id;
    let loading = send_message_with_retry(&bot, chat_id, LOADING_TEXT).await?;
    let heartbeat = start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);

    let outcome = state.run_submission(pending).await;
    heartbeat.stop();
    delete_quietly(&bot, chat_id, loading.id).await;

    match outcome {
        Ok(result) => {
            let status = match result.phase() {
                SubmissionPhase::Failed => "error",
                _ => "success",
            };
            timer.finish(status, result.error_message.as_deref());
            info!(submission_id, status, "Delivering nursery design");
            let view = state.with_session(chat_id.0, |session| session.view());
            deliver_view(&bot, chat_id, &view, CONFIG.telegram_max_length).await?;
            send_form_panel(&bot, &state, chat_id).await?;
        }
        Err(err) => {
            timer.finish("cancelled", Some(&err.to_string()));
            info!(submission_id, "Submission result discarded: {err}");
        }
    }
    Ok(())
}

pub fn spawn_generate(bot: Bot, state: AppState, chat_id: ChatId, user_id: Option<i64>) {
    tokio::spawn(async move {
        if let Err(err) = generate_handler(bot, state, chat_id, user_id).await {
            error!("generate handler failed: {err}");
        }
    });
}

async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

struct IncomingImage {
    file_id: FileId,
    mime_type: Option<String>,
    display_name: Option<String>,
}

fn incoming_image(message: &Message) -> Option<IncomingImage> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some(IncomingImage {
            file_id: photo.file.id.clone(),
            mime_type: None,
            display_name: None,
        });
    }
    let document = message.document()?;
    let mime_type = document.mime_type.as_ref().map(|mime| mime.to_string());
    if !mime_type.as_deref().unwrap_or("").starts_with("image/") {
        return None;
    }
    Some(IncomingImage {
        file_id: document.file.id.clone(),
        mime_type,
        display_name: document.file_name.clone(),
    })
}

pub fn message_has_image(message: &Message) -> bool {
    incoming_image(message).is_some()
}

/// Photo messages become the selected file and switch to photo input.
pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(image) = incoming_image(&message) else {
        return Ok(());
    };
    let chat_id = message.chat.id;

    let url = get_file_url(&bot, &image.file_id).await?;
    let Some(bytes) = download_media(&url).await else {
        bot.send_message(chat_id, "I couldn't download that photo. Please try again.")
            .await?;
        return Ok(());
    };

    let file = MediaFile::new(bytes, image.mime_type, image.display_name);
    info!(
        chat_id = chat_id.0,
        mime = %file.mime_type,
        name = file.display_name.as_deref().unwrap_or("photo"),
        bytes = file.bytes.len(),
        "Room photo received"
    );
    state.with_session(chat_id.0, |session| session.set_input_mode(InputMode::Photo));
    if !state.ingest_file(chat_id.0, file).await {
        return Ok(());
    }
    send_form_panel(&bot, &state, chat_id).await
}

/// Plain text becomes the room description and switches to description input.
pub async fn description_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(text) = message.text() else {
        return Ok(());
    };
    state.with_session(message.chat.id.0, |session| {
        session.set_input_mode(InputMode::Description);
        session.set_description_text(text);
    });
    send_form_panel(&bot, &state, message.chat.id).await
}

pub async fn form_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    if let Err(err) = bot.answer_callback_query(query.id.clone()).await {
        warn!("Failed to answer callback query: {err}");
    }
    let Some(action) = query.data.as_deref().and_then(FormAction::parse) else {
        return Ok(());
    };
    let Some(message) = &query.message else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let panel_id = message.id();
    let user_id = i64::try_from(query.from.id.0).ok();

    match action {
        FormAction::Mode(mode) => {
            state.with_session(chat_id.0, |session| session.set_input_mode(mode));
            refresh_form_panel(&bot, &state, chat_id, panel_id).await
        }
        FormAction::Subject(subject) => {
            state.with_session(chat_id.0, |session| session.set_subject_category(subject));
            refresh_form_panel(&bot, &state, chat_id, panel_id).await
        }
        FormAction::Style(style) => {
            state.with_session(chat_id.0, |session| session.set_visual_style(style));
            refresh_form_panel(&bot, &state, chat_id, panel_id).await
        }
        FormAction::Generate => {
            spawn_generate(bot, state, chat_id, user_id);
            Ok(())
        }
        FormAction::Again => again_handler(bot, state, chat_id).await,
        FormAction::Noop => Ok(()),
    }
}
