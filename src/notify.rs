//! Reminder prompts and the deep links they hand back.

use tracing::info;

use crate::fix::SavedLocation;

/// Query parameter carrying the chosen action.
pub const ACTION_PARAM: &str = "action";

/// What the user picked from a reminder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeepLinkAction {
    /// Start guiding back to the car.
    Find,
    /// Save a fresh location over the old one.
    Update,
    /// Forget the saved location.
    Clear,
}

impl DeepLinkAction {
    pub fn as_str(&self) -> &str {
        match self {
            DeepLinkAction::Find => "find",
            DeepLinkAction::Update => "update",
            DeepLinkAction::Clear => "clear",
        }
    }

    /// Link that relaunches the app with this action.
    pub fn link(&self) -> String {
        format!("?{}={}", ACTION_PARAM, self.as_str())
    }

    /// Pull the action out of a link such as `car-finder://open?action=find`
    /// or a bare `action=find` query. Unknown actions are ignored.
    pub fn parse(link: &str) -> Option<Self> {
        let query = link.split_once('?').map_or(link, |(_, q)| q);
        let query = query.split('#').next().unwrap_or_default();

        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == ACTION_PARAM)
            .and_then(|(_, value)| match value {
                "find" => Some(DeepLinkAction::Find),
                "update" => Some(DeepLinkAction::Update),
                "clear" => Some(DeepLinkAction::Clear),
                _ => None,
            })
    }
}

/// A prompt shown once a location has been saved.
#[derive(Clone, Debug, PartialEq)]
pub struct Reminder {
    pub title: String,
    pub body: String,
    pub actions: Vec<(String, DeepLinkAction)>,
}

impl Reminder {
    pub fn for_location(location: &SavedLocation) -> Self {
        let body = match location.accuracy {
            Some(accuracy) => format!(
                "Parked at {} (±{:.0}m). Tap to find your way back.",
                location.coordinate(),
                accuracy
            ),
            None => format!(
                "Parked at {}. Tap to find your way back.",
                location.coordinate()
            ),
        };

        Self {
            title: "Car location saved".to_string(),
            body,
            actions: vec![
                ("Find my car".to_string(), DeepLinkAction::Find),
                ("Update location".to_string(), DeepLinkAction::Update),
            ],
        }
    }
}

/// Somewhere to present reminders.
pub trait Notifier {
    /// Returns false when the reminder could not be shown.
    fn notify(&self, location: &SavedLocation) -> bool;
}

/// Writes reminders to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, location: &SavedLocation) -> bool {
        let reminder = Reminder::for_location(location);
        info!("{}: {}", reminder.title, reminder.body);
        for (label, action) in &reminder.actions {
            info!("  {} -> {}", label, action.link());
        }
        true
    }
}
