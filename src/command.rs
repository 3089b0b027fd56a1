//! Interactive command grammar
//!
//! ```text
//! login                  connect, discover schemas, start keep-alive
//! logout                 close the session
//! get PATH               read config and state data
//! get-config PATH        read config data from the current datastore
//! set PATH VALUE...      edit a leaf in the current datastore
//! datastore [NAME]       show or change the datastore
//! help
//! quit
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::client::NetconfClient;
use crate::datastore::Datastore;
use crate::error::{NetconfError, Result};
use crate::transport::Connector;

pub const HELP: &str = "\
commands:
    login
    logout
    get <path>
    get-config <path>
    set <path> <value>
    datastore [running|candidate|startup]
    help
    quit";

/// Quote pairs recognized when splitting `set` arguments
const QUOTES: [(char, char); 12] = [
    ('"', '"'),
    ('\'', '\''),
    ('\u{201c}', '\u{201d}'),
    ('\u{201e}', '\u{201c}'),
    ('\u{2018}', '\u{2019}'),
    ('\u{201a}', '\u{2018}'),
    ('\u{ab}', '\u{bb}'),
    ('\u{2039}', '\u{203a}'),
    ('\u{300c}', '\u{300d}'),
    ('\u{300e}', '\u{300f}'),
    ('\u{ff02}', '\u{ff02}'),
    ('\u{ff07}', '\u{ff07}'),
];

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login,
    Logout,
    Get(String),
    GetConfig(String),
    Set { path: String, value: String },
    /// `None` shows the current datastore
    Datastore(Option<Datastore>),
    Help,
    Quit,
}

impl Command {
    /// Parse a line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        let command = match keyword {
            "login" => Command::Login,
            "logout" => Command::Logout,
            "get" => Command::Get(required(rest, "get <path>")?),
            "get-config" => Command::GetConfig(required(rest, "get-config <path>")?),
            "set" => {
                let mut tokens = split_quoted(rest).into_iter();
                let path = tokens.next().ok_or_else(|| usage("set <path> <value>"))?;
                let value = tokens.collect::<Vec<_>>().join(" ");
                if value.is_empty() {
                    return Err(usage("set <path> <value>"));
                }
                Command::Set { path, value }
            }
            "datastore" if rest.is_empty() => Command::Datastore(None),
            "datastore" => Command::Datastore(Some(rest.parse()?)),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => {
                return Err(NetconfError::InvalidInput(format!(
                    "unknown command: {} (try help)",
                    other
                )));
            }
        };
        Ok(Some(command))
    }
}

fn required(rest: &str, form: &str) -> Result<String> {
    if rest.is_empty() {
        Err(usage(form))
    } else {
        Ok(rest.to_string())
    }
}

fn usage(form: &str) -> NetconfError {
    NetconfError::InvalidInput(format!("usage: {}", form))
}

fn closing_quote(open: char) -> Option<char> {
    QUOTES
        .iter()
        .find(|(o, _)| *o == open)
        .map(|(_, close)| *close)
}

/// Split on whitespace outside quotes; a quote pair wrapping a whole token
/// is removed
pub fn split_quoted(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut awaiting: Option<char> = None;

    for c in input.chars() {
        match awaiting {
            Some(close) => {
                current.push(c);
                if c == close {
                    awaiting = None;
                }
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => {
                awaiting = closing_quote(c);
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens.iter().map(|t| strip_quotes(t)).collect()
}

fn strip_quotes(token: &str) -> String {
    let mut chars = token.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if closing_quote(first) == Some(last) => chars.as_str().to_string(),
        _ => token.to_string(),
    }
}

/// What the caller should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading; print the text if any
    Continue(Option<String>),
    Quit,
}

/// Runs commands against one client
pub struct Shell {
    client: NetconfClient,
    connector: Arc<dyn Connector>,
}

impl Shell {
    pub fn new(client: NetconfClient, connector: Arc<dyn Connector>) -> Self {
        Self { client, connector }
    }

    pub fn client(&self) -> &NetconfClient {
        &self.client
    }

    /// Parse and run one input line
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        match Command::parse(line)? {
            Some(command) => self.run(command).await,
            None => Ok(Flow::Continue(None)),
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<Flow> {
        debug!(?command, "running command");
        if matches!(
            command,
            Command::Get(_) | Command::GetConfig(_) | Command::Set { .. }
        ) && !self.client.is_logged_in()
        {
            return Err(NetconfError::NotLoggedIn);
        }

        let output = match command {
            Command::Login => {
                if self.client.is_logged_in() {
                    return Err(NetconfError::AlreadyLoggedIn);
                }
                let session = self.connector.connect().await?;
                self.client.login(session).await?;
                None
            }
            Command::Logout => {
                self.client.logout().await;
                None
            }
            Command::Get(path) => Some(self.client.get(&path).await?.to_string()),
            Command::GetConfig(path) => Some(self.client.get_config(&path).await?.to_string()),
            Command::Set { path, value } => {
                self.client.set(&path, &value).await?;
                None
            }
            Command::Datastore(Some(datastore)) => {
                self.client.set_datastore(datastore);
                None
            }
            Command::Datastore(None) => Some(format!("datastore: {}", self.client.datastore())),
            Command::Help => Some(HELP.to_string()),
            Command::Quit => return Ok(Flow::Quit),
        };
        Ok(Flow::Continue(output))
    }

    /// Log out if needed
    pub async fn shutdown(&mut self) {
        self.client.logout().await;
    }
}
