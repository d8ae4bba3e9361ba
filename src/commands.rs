/// Out-of-band messages the worker understands

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
  /// Take over immediately instead of waiting for existing clients to close
  SkipWaiting,
  /// Fetch every manifest resource not yet cached
  DownloadOffline,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub message: Message,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All recognized messages
pub const COMMANDS: &[Command] = &[
  Command {
    message: Message::SkipWaiting,
    name: "skipWaiting",
    aliases: &["skip-waiting", "takeover"],
    description: "Activate the waiting worker immediately",
  },
  Command {
    message: Message::DownloadOffline,
    name: "downloadOffline",
    aliases: &["download-offline", "prefetch"],
    description: "Download every resource missing from the cache",
  },
];

/// Resolve a raw message payload. Unknown payloads are `None` and ignored
/// by the worker.
pub fn parse(input: &str) -> Option<Message> {
  let input = input.trim();

  // Exact match on name first; names are case-sensitive on the wire
  if let Some(cmd) = COMMANDS.iter().find(|cmd| cmd.name == input) {
    return Some(cmd.message);
  }

  let input_lower = input.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.aliases.contains(&input_lower.as_str()))
    .map(|cmd| cmd.message)
}
