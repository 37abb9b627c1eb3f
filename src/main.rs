use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod config;
mod designer;
mod handlers;
mod llm;
mod state;
mod utils;

use config::CONFIG;
use designer::{InputMode, SubmissionWorkflow};
use handlers::designer as designer_handlers;
use handlers::designer::FORM_CALLBACK_PREFIX;
use llm::GeminiClient;
use state::{spawn_session_sweeper, AppState};
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
    Form,
    Photo,
    Describe(String),
    Subject(String),
    Style(String),
    Generate,
    Again,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

fn optional_arg(arg: String) -> Option<String> {
    if arg.trim().is_empty() {
        None
    } else {
        Some(arg)
    }
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required".into());
    }
    if CONFIG.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; generation requests will fail");
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!(
        image_model = %CONFIG.gemini_image_model,
        text_model = %CONFIG.gemini_text_model,
        "Starting nursery designer bot"
    );

    let client = GeminiClient::from_config(&CONFIG);
    let workflow = SubmissionWorkflow::from_config(Arc::new(client), &CONFIG);
    let state = AppState::new(workflow);
    if CONFIG.session_idle_minutes > 0 {
        spawn_session_sweeper(
            state.clone(),
            Duration::from_secs(CONFIG.session_idle_minutes * 60),
        );
    }

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| designer_handlers::message_has_image(&msg))
                .endpoint(handle_photo_message),
        )
        .branch(
            dptree::filter(|msg: Message| {
                msg.text()
                    .map(|text| !text.trim_start().starts_with('/'))
                    .unwrap_or(false)
            })
            .endpoint(handle_text_message),
        )
        .endpoint(ignore_message);

    let callback_state = state.clone();
    let callback_handler =
        Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
            let state = callback_state.clone();
            async move { handle_callback_query(bot, state, query).await }
        });

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => designer_handlers::start_handler(bot, state, message).await?,
        Command::Help => designer_handlers::help_handler(bot, message).await?,
        Command::Form => designer_handlers::form_handler(bot, state, message).await?,
        Command::Photo => {
            designer_handlers::mode_handler(bot, state, message, InputMode::Photo, None).await?
        }
        Command::Describe(arg) => {
            designer_handlers::mode_handler(
                bot,
                state,
                message,
                InputMode::Description,
                optional_arg(arg),
            )
            .await?
        }
        Command::Subject(arg) => {
            designer_handlers::subject_handler(bot, state, message, arg).await?
        }
        Command::Style(arg) => designer_handlers::style_handler(bot, state, message, arg).await?,
        Command::Generate => {
            let user_id = message
                .from
                .as_ref()
                .and_then(|user| i64::try_from(user.id.0).ok());
            designer_handlers::spawn_generate(bot, state, message.chat.id, user_id);
        }
        Command::Again => designer_handlers::again_handler(bot, state, message.chat.id).await?,
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    if data.starts_with(FORM_CALLBACK_PREFIX) {
        designer_handlers::form_callback(bot, state, query).await?;
    }
    Ok(())
}

async fn handle_photo_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = designer_handlers::photo_handler(bot, state, message).await {
            error!("photo handler failed: {err}");
        }
    });
    Ok(())
}

async fn handle_text_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    designer_handlers::description_handler(bot, state, message).await?;
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
