//! Shell Commands
//!
//! Parses lines like `join 'Public'` or `send 'hello there'` into
//! [`Command`] values. Quotes around the argument are optional.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List registered clients.
    List,
    /// Join the public room, or request a private chat with a user.
    Join { target: String },
    /// Accept a private chat request.
    Accept { initiator: String },
    /// Send to the public room or the private peer.
    Send { message: String },
    /// Leave the public room or end the private chat.
    Leave,
    Exit,
    Help,
    /// Blank line.
    Empty,
    Unknown { input: String },
    InvalidArgs { command: String, usage: String },
}

pub const HELP: &str = "\
Commands:
  list               - Show connected clients
  join 'Public'      - Join the public chat room
  join '<username>'  - Ask a user for a private chat
  accept '<username>'- Accept a private chat request
  send '<message>'   - Send a message to your current room
  leave              - Leave the current room
  exit               - Leave the server";

/// Parse one line of user input.
pub fn parse(input: &str) -> Command {
    let input = input.trim();
    if input.is_empty() {
        return Command::Empty;
    }

    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, unquote(rest.trim())),
        None => (input, ""),
    };

    match command.to_lowercase().as_str() {
        "list" | "users" => Command::List,
        "join" => with_arg(command, rest, "join '<room or username>'", |target| {
            Command::Join { target }
        }),
        "accept" => with_arg(command, rest, "accept '<username>'", |initiator| {
            Command::Accept { initiator }
        }),
        "send" => with_arg(command, rest, "send '<message>'", |message| Command::Send {
            message,
        }),
        "leave" => Command::Leave,
        "exit" | "quit" => Command::Exit,
        "help" | "?" => Command::Help,
        _ => Command::Unknown {
            input: input.to_string(),
        },
    }
}

fn with_arg(command: &str, arg: &str, usage: &str, build: impl FnOnce(String) -> Command) -> Command {
    if arg.is_empty() {
        Command::InvalidArgs {
            command: command.to_lowercase(),
            usage: format!("Usage: {}", usage),
        }
    } else {
        build(arg.to_string())
    }
}

fn unquote(arg: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = arg
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    arg
}
