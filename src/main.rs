pub mod structs;
pub mod api;
pub mod config;
pub mod geo;
pub mod map;
pub mod animation;
pub mod view;

use structs::*;
use api::*;
use config::*;
use geo::*;
use map::*;
use view::*;

use dptree::{case, deps};
use std::{
    collections::HashMap,
    error::Error,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use teloxide::{
    dispatching::{dialogue, dialogue::InMemStorage},
    dptree::endpoint,
    filter_command,
    prelude::*,
    types::{
        ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
        KeyboardRemove,
    },
    utils::command::BotCommands,
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type MyDialogue = Dialogue<State, InMemStorage<State>>;
type Finder = StopFinder<BackendClient, Scene>;
/// One view per chat.
type Sessions = Arc<Mutex<HashMap<ChatId, Arc<Finder>>>>;

const REFRESH_DATA: &str = "refresh";
const STOP_DATA_PREFIX: &str = "stop:";

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "Estes comandos são suportados:"
)]
enum Command {
    #[command(description = "Mostra a lista de comandos")]
    Help,
    #[command(description = "Apresentação")]
    Start,
    #[command(description = "Procura paragens próximas, opcionalmente de uma linha (/find 2718)")]
    Find(String),
    #[command(description = "Muda o filtro de linha usado nas chegadas (/line 2718)")]
    Line(String),
    #[command(description = "Atualiza a chegada à paragem escolhida")]
    Refresh,
    #[command(description = "Mostra o mapa atual")]
    Map,
    #[command(description = "Pára a animação e esquece a paragem")]
    Cancel,
}

#[derive(Clone, Default)]
enum State {
    #[default]
    Start,
    ReceiveLocation,
    Browsing,
}

/// Locks `m`, carrying on with the data of a poisoned lock.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    pretty_env_logger::init();
    log::info!("Starting stop finder BOT against {} ...", config.backend_url);

    let bot = Bot::from_env();
    let client = BackendClient::new(&config.backend_url);

    let command_handler = filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(help))
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Find(line)].endpoint(find))
        .branch(case![Command::Line(line)].endpoint(change_line))
        .branch(case![Command::Refresh].endpoint(refresh))
        .branch(case![Command::Map].endpoint(show_map))
        .branch(case![Command::Cancel].endpoint(cancel));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![State::ReceiveLocation].endpoint(receive_location))
        .branch(endpoint(invalid_state));

    let callback_query_handler = Update::filter_callback_query().endpoint(receive_choice);

    let dial = dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_query_handler);

    let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));

    Dispatcher::builder(bot, dial)
        .dependencies(deps![InMemStorage::<State>::new(), sessions, client, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

fn session(sessions: &Sessions, chat_id: ChatId, client: &BackendClient, config: &Config) -> Arc<Finder> {
    let mut s = lock(sessions);
    s.entry(chat_id)
        .or_insert_with(|| {
            log::debug!("New view for chat {:?}", chat_id);
            Arc::new(StopFinder::new(client.clone(), Scene::new(), config.frame_interval))
        })
        .clone()
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "🚏 Olá! Encontro as paragens perto de ti e mostro quando chega o próximo autocarro.\n\n\
Usa /find para começar, ou /find <linha> para filtrar por linha.",
    )
    .await?;
    Ok(())
}

async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Não percebi a mensagem. Escreve /help para ver os comandos.",
    )
    .await?;
    Ok(())
}

//////////////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////////////
async fn find(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    line: String,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    let finder = session(&sessions, msg.chat.id, &client, &config);
    finder.set_line(&line);

    let line = line.trim();
    let prompt = if line.is_empty() {
        "📍 Partilha a tua localização para procurar paragens próximas.".to_string()
    } else {
        format!("📍 Partilha a tua localização para procurar paragens da linha {}.", line)
    };

    bot.send_message(msg.chat.id, prompt)
        .reply_markup(make_location_keyboard())
        .await?;
    dialogue.update(State::ReceiveLocation).await?;
    Ok(())
}

async fn receive_location(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    let finder = session(&sessions, msg.chat.id, &client, &config);
    let shared = SharedLocation(
        msg.location()
            .map(|l| LatLon::new(l.latitude, l.longitude)),
    );

    let outcome = finder.find_stops(&shared).await;
    let status = finder.with_state(|s| s.status.clone());

    match outcome {
        SearchOutcome::Superseded => {}
        SearchOutcome::Found(stops) => {
            bot.send_message(msg.chat.id, status)
                .reply_markup(KeyboardRemove::new())
                .await?;

            let entries = stops
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, render_stop(s)))
                .collect::<Vec<String>>()
                .join("\n");
            let buttons = stops
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("{}. {}", i + 1, s.name), format!("{}{}", STOP_DATA_PREFIX, s.id)))
                .collect::<Vec<(String, String)>>();

            bot.send_message(msg.chat.id, format!("{}\n\nEscolhe uma paragem:", entries))
                .reply_markup(make_inline_keyboard(buttons, 1))
                .await?;
            dialogue.update(State::Browsing).await?;
        }
        SearchOutcome::Empty | SearchOutcome::Failed => {
            bot.send_message(msg.chat.id, status)
                .reply_markup(KeyboardRemove::new())
                .await?;
            dialogue.update(State::Start).await?;
        }
    }
    Ok(())
}

async fn receive_choice(
    bot: Bot,
    q: CallbackQuery,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let chat_id = match q.message.as_ref() {
        Some(m) => m.chat.id,
        None => return Ok(()),
    };
    let finder = session(&sessions, chat_id, &client, &config);

    match q.data.as_deref() {
        Some(REFRESH_DATA) => {
            let outcome = finder.fetch_arrival().await;
            send_arrival(&bot, chat_id, outcome).await?;
        }
        Some(data) if data.starts_with(STOP_DATA_PREFIX) => {
            let stop_id = &data[STOP_DATA_PREFIX.len()..];
            match finder.choose_stop_by_id(stop_id).await {
                Some(outcome) => {
                    if let Some(stop) = finder.with_state(|s| s.chosen.clone()) {
                        bot.send_message(chat_id, format!("🚏 {}", render_stop(&stop)))
                            .await?;
                        bot.send_location(chat_id, stop.lat, stop.lon).await?;
                    }
                    send_arrival(&bot, chat_id, outcome).await?;
                }
                None => {
                    bot.send_message(chat_id, "Essa paragem já não está na lista. Usa /find de novo.")
                        .await?;
                }
            }
        }
        other => log::debug!("Ignoring callback data {:?}", other),
    }
    Ok(())
}

async fn refresh(
    bot: Bot,
    msg: Message,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    let finder = session(&sessions, msg.chat.id, &client, &config);
    let outcome = finder.fetch_arrival().await;
    send_arrival(&bot, msg.chat.id, outcome).await
}

async fn change_line(
    bot: Bot,
    msg: Message,
    line: String,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    let finder = session(&sessions, msg.chat.id, &client, &config);
    finder.set_line(&line);

    let text = match line.trim() {
        "" => "Filtro de linha removido.".to_string(),
        l => format!("Filtro de linha: {}", l),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn show_map(
    bot: Bot,
    msg: Message,
    sessions: Sessions,
    client: BackendClient,
    config: Config,
) -> HandlerResult {
    let finder = session(&sessions, msg.chat.id, &client, &config);
    let text = lock(finder.map()).describe();
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn cancel(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    sessions: Sessions,
) -> HandlerResult {
    let finder = lock(&sessions).get(&msg.chat.id).cloned();
    if let Some(finder) = finder {
        finder.cancel();
    }
    bot.send_message(msg.chat.id, "🚫 Cancelado! Podes recomeçar com /find.")
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn send_arrival(bot: &Bot, chat_id: ChatId, outcome: ArrivalOutcome) -> HandlerResult {
    match outcome {
        ArrivalOutcome::Superseded => {}
        ArrivalOutcome::NoStopChosen => {
            bot.send_message(chat_id, "Ainda não escolheste uma paragem. Usa /find.")
                .await?;
        }
        ArrivalOutcome::Shown(panel) => {
            let mut text = panel.text();
            if let Some(at) = panel.updated_at {
                text = format!("{}\n\n⏱ Atualizado às {}", text, at.format("%H:%M:%S"));
            }
            let kb = make_inline_keyboard(
                vec![("🔄 Atualizar".to_string(), REFRESH_DATA.to_string())],
                1,
            );
            bot.send_message(chat_id, text).reply_markup(kb).await?;
        }
    }
    Ok(())
}

//////////////////////////////////////////////////////////
// Keyboards
//////////////////////////////////////////////////////////
/// Creates an inline keyboard from (label, callback data) pairs, `chunks` per row.
fn make_inline_keyboard(list: Vec<(String, String)>, chunks: usize) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = vec![];

    for values in list.chunks(chunks) {
        let row = values
            .iter()
            .map(|(label, data)| InlineKeyboardButton::callback(label.to_owned(), data.to_owned()))
            .collect();

        keyboard.push(row);
    }

    InlineKeyboardMarkup::new(keyboard)
}

/// Reply keyboard asking the user for their position.
fn make_location_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![KeyboardButton::new("📍 Partilhar localização").request(ButtonRequest::Location)],
        vec![KeyboardButton::new("Cancelar")],
    ];

    KeyboardMarkup::new(keyboard)
        .resize_keyboard(true)
        .one_time_keyboard(true)
}
