#[macro_use]
extern crate log;

use arena::{
    client::{ClientConfig, MemoryTokenStore, Notice, Session},
    shared::models::{UserIdentity, GLOBAL_CHANNEL},
};
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::{sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let config = ClientConfig::from_env()?;
    let access_token = std::env::var("ARENA_ACCESS_TOKEN")?;
    let refresh_token = std::env::var("ARENA_REFRESH_TOKEN").unwrap_or_default();
    let tokens = Arc::new(MemoryTokenStore::with_tokens(&access_token, &refresh_token));

    let nickname = std::env::var("ARENA_NICKNAME").unwrap_or_else(|_| "demo".to_string());
    let identity = UserIdentity {
        user_id: std::env::var("ARENA_USER_ID").unwrap_or_else(|_| nickname.clone()),
        nickname,
    };

    let session = Arc::new(Session::new(config, tokens));
    session.start(identity).await?;

    tokio::spawn(print_notices(session.clone()));
    tokio::spawn(print_chat(session.clone()));

    let forced_logouts = session.forced_logouts();
    tokio::select! {
        _ = random_chat_loop(session.clone()) => {}
        logout = forced_logouts.recv() => {
            if let Ok(logout) = logout {
                warn!("token rejected by {}, exiting", logout.path);
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    session.logout().await;
    Ok(())
}

async fn random_chat_loop(session: Arc<Session>) {
    loop {
        let message = {
            let mut rng = thread_rng();
            ["hi", "hello", "hola", "howdy"]
                .choose(&mut rng)
                .copied()
                .unwrap_or("hi")
        };
        if !session
            .dispatcher()
            .send_chat_message(GLOBAL_CHANNEL, message)
            .await
        {
            trace!("not connected yet, skipping");
        }

        let sleep_time = thread_rng().gen_range(500..2000);
        trace!("Sleeping for {} before sending next message", sleep_time);
        tokio::time::sleep(Duration::from_millis(sleep_time)).await
    }
}

async fn print_chat(session: Arc<Session>) {
    let mut last_printed: Option<String> = None;
    loop {
        {
            let chat = session.chat().read().await;
            let messages = chat.messages(GLOBAL_CHANNEL);
            let start = last_printed
                .as_ref()
                .and_then(|id| messages.iter().position(|message| &message.id == id))
                .map(|index| index + 1)
                .unwrap_or(0);
            for message in &messages[start..] {
                println!("{}: {}", message.sender, message.content);
            }
            if let Some(message) = messages.last() {
                last_printed = Some(message.id.clone());
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn print_notices(session: Arc<Session>) {
    let notices = session.dispatcher().notices();
    while let Ok(notice) = notices.recv().await {
        match notice {
            Notice::ServerError(err) => error!("server error {}: {}", err.code, err.message),
            Notice::Kicked(kicked) => info!("kicked from {}", kicked.room_id),
            Notice::Lobby(event) => debug!("lobby: {:?}", event),
        }
    }
}
