pub mod admin;
pub mod guest;

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Wedding RSVP bot commands:")]
pub enum Command {
    #[command(description = "Display this help message")]
    Help,
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Tell us your name, e.g. /name Jane Doe")]
    Name(String),
    #[command(description = "Let us know whether you are coming")]
    Rsvp,
    #[command(description = "Show the event details")]
    Info,
    #[command(description = "Show the main menu")]
    Menu,
    #[command(description = "Admin: send a message to every guest")]
    Broadcast(String),
    #[command(description = "Admin: send a message plus event info to guests who replied")]
    Enhanced(String),
    #[command(description = "Admin: retry failed deliveries of a broadcast")]
    Retry(String),
    #[command(description = "Admin: show who an enhanced broadcast would reach")]
    Audience,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "/help",
            Command::Start => "/start",
            Command::Name(_) => "/name",
            Command::Rsvp => "/rsvp",
            Command::Info => "/info",
            Command::Menu => "/menu",
            Command::Broadcast(_) => "/broadcast",
            Command::Enhanced(_) => "/enhanced",
            Command::Retry(_) => "/retry",
            Command::Audience => "/audience",
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Broadcast(_) | Command::Enhanced(_) | Command::Retry(_) | Command::Audience
        )
    }
}
