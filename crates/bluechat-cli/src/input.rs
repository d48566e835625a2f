//! Parsing of lines typed at the chat prompt
//!
//! Lines starting with `/` are commands; anything else is sent as a message.

pub const HELP: &str = "\
Commands:
  /scan              start discovering nearby devices
  /stop              stop discovering
  /paired            list paired devices
  /devices           list paired and discovered devices with their index
  /listen            wait for one peer to connect
  /connect <target>  connect to a device by index, address or name
  /send <text>       send a message (same as typing the text)
  /disconnect        close the current connection
  /status            show the connection status
  /history           show this session's messages
  /help              show this help
  /quit              leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Scan,
    StopScan,
    Paired,
    Devices,
    Listen,
    Connect(String),
    Send(String),
    Disconnect,
    Status,
    History,
    Help,
    Quit,
}

impl Input {
    /// Parse one line; `Ok(None)` for blank lines, `Err` with a usage hint
    pub fn parse(line: &str) -> Result<Option<Input>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(Input::Send(line.to_string())));
        };

        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (command, ""),
        };

        let input = match name.to_ascii_lowercase().as_str() {
            "scan" => Input::Scan,
            "stop" => Input::StopScan,
            "paired" => Input::Paired,
            "devices" => Input::Devices,
            "listen" => Input::Listen,
            "connect" if argument.is_empty() => {
                return Err("usage: /connect <index|address|name>".to_string())
            }
            "connect" => Input::Connect(argument.to_string()),
            "send" if argument.is_empty() => return Err("usage: /send <text>".to_string()),
            "send" => Input::Send(argument.to_string()),
            "disconnect" => Input::Disconnect,
            "status" => Input::Status,
            "history" => Input::History,
            "help" | "?" => Input::Help,
            "quit" | "exit" => Input::Quit,
            other => return Err(format!("unknown command '/{}', try /help", other)),
        };
        Ok(Some(input))
    }
}
