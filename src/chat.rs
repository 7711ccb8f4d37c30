//! Chat client abstraction and its `irc`-crate binding (spec §6 "wire surface").
//!
//! Spec.md treats the protocol client as external; a concrete binding still has
//! to exist for the binary to run, so this module keeps that binding as a thin,
//! swappable trait (`ChatClient`) the Supervisor and Channel Poster depend on,
//! never the concrete `irc::client::Client` directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::prelude::*;
use irc::client::prelude::{Client as IrcClientTrait, Command, Config as IrcConfig};
use irc::client::Client;
use irc::proto::Message;

/// The closed set of inbound wire events the Supervisor dispatches on
/// (SPEC_FULL.md §3 "ChatEvent").
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Joined { scope: String },
    Privmsg { from: String, target: String, text: String },
    Notice { from: String, text: String },
    Topic { scope: String, topic: String },
    NickChanged { new_nick: String },
    ModeChanged { target: String, modes: String },
    LoggedIn { identity: String },
    NickInUse,
    NickServError { text: String },
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn msg(&self, target: &str, text: &str) -> Result<()>;
    async fn quote(&self, command: Command) -> Result<()>;
    fn connected(&self) -> bool;
    fn current_nickname(&self) -> String;
}

pub struct IrcChatClient {
    sender: irc::client::Sender,
    connected: Arc<AtomicBool>,
}

impl IrcChatClient {
    /// Connects, identifies, and spawns the background event-pump task that
    /// forwards every inbound `Message` to `on_event` as a [`ChatEvent`].
    pub async fn connect(
        host: String,
        port: u16,
        nick: String,
        nick_password: Option<String>,
        use_tls: bool,
        channels: Vec<String>,
        on_event: impl Fn(ChatEvent) + Send + Sync + 'static,
    ) -> Result<Arc<Self>> {
        let irc_config = IrcConfig {
            nickname: Some(nick.clone()),
            server: Some(host),
            port: Some(port),
            use_tls: Some(use_tls),
            channels,
            nick_password,
            ..IrcConfig::default()
        };

        let mut client = Client::from_config(irc_config).await.context("connecting to IRC server")?;
        client.identify().context("sending IRC identify sequence")?;

        let sender = client.sender();
        let connected = Arc::new(AtomicBool::new(true));
        let chat_client = Arc::new(Self { sender, connected: connected.clone() });

        let mut stream = client.stream().context("acquiring IRC message stream")?;
        tokio::spawn(async move {
            // The client must be kept alive for as long as the stream is polled.
            let _client = client;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(message) => {
                        if let Some(event) = translate(&message) {
                            on_event(event);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "IRC stream error");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
        });

        Ok(chat_client)
    }
}

#[async_trait]
impl ChatClient for IrcChatClient {
    async fn msg(&self, target: &str, text: &str) -> Result<()> {
        self.sender.send_privmsg(target, text).with_context(|| format!("sending PRIVMSG to {target}"))
    }

    async fn quote(&self, command: Command) -> Result<()> {
        self.sender.send(command).context("sending raw IRC command")
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_nickname(&self) -> String {
        self.sender.current_nickname().to_string()
    }
}

fn translate(message: &Message) -> Option<ChatEvent> {
    let prefix = message.prefix.as_ref().map(|p| p.to_string()).unwrap_or_default();
    match &message.command {
        Command::JOIN(channel, _, _) => Some(ChatEvent::Joined { scope: channel.clone() }),
        Command::PRIVMSG(target, text) => Some(ChatEvent::Privmsg { from: prefix, target: target.clone(), text: text.clone() }),
        Command::NOTICE(_, text) => {
            if text.to_ascii_lowercase().contains("nickserv") {
                Some(ChatEvent::NickServError { text: text.clone() })
            } else {
                Some(ChatEvent::Notice { from: prefix, text: text.clone() })
            }
        }
        Command::TOPIC(channel, Some(topic)) => Some(ChatEvent::Topic { scope: channel.clone(), topic: topic.clone() }),
        Command::NICK(new_nick) => Some(ChatEvent::NickChanged { new_nick: new_nick.clone() }),
        Command::ChannelMODE(target, modes) => {
            Some(ChatEvent::ModeChanged { target: target.clone(), modes: modes.iter().map(|m| format!("{m:?}")).collect() })
        }
        Command::UserMODE(target, modes) => {
            Some(ChatEvent::ModeChanged { target: target.clone(), modes: modes.iter().map(|m| format!("{m:?}")).collect() })
        }
        Command::Response(irc::proto::Response::RPL_TOPIC, args) => {
            args.get(1).map(|channel| ChatEvent::Topic { scope: channel.clone(), topic: args.get(2).cloned().unwrap_or_default() })
        }
        Command::Response(irc::proto::Response::RPL_LOGGEDIN, args) => {
            args.get(1).map(|identity| ChatEvent::LoggedIn { identity: identity.clone() })
        }
        Command::Response(irc::proto::Response::ERR_NICKNAMEINUSE, _) => Some(ChatEvent::NickInUse),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irc::proto::Prefix;

    #[test]
    fn translates_privmsg() {
        let message = Message {
            tags: None,
            prefix: Some(Prefix::new_from_str("nick!user@host")),
            command: Command::PRIVMSG("#chan".to_string(), "hello".to_string()),
        };
        match translate(&message) {
            Some(ChatEvent::Privmsg { target, text, .. }) => {
                assert_eq!(target, "#chan");
                assert_eq!(text, "hello");
            }
            other => panic!("expected Privmsg, got {other:?}"),
        }
    }

    #[test]
    fn translates_nickname_in_use() {
        let message = Message {
            tags: None,
            prefix: None,
            command: Command::Response(irc::proto::Response::ERR_NICKNAMEINUSE, vec![]),
        };
        assert!(matches!(translate(&message), Some(ChatEvent::NickInUse)));
    }
}
