use serde::{Deserialize, Serialize};

use crate::capabilities::permissions::PermissionKind;
use crate::error::AppError;
use crate::model::DispatchChannel;

/// User-visible alerts raised by the core. The only ones the SOS path
/// ever raises are the permission advisory and the dispatch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    SosDispatched { channel: DispatchChannel },
    DispatchFailed { error: AppError },
    PermissionRequired { kind: PermissionKind, error: AppError },
    LocationShared { channel: DispatchChannel },
}

impl Notice {
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Notice::SosDispatched { .. } => "SOS ACTIVATED",
            Notice::DispatchFailed { .. } => "SOS Error",
            Notice::PermissionRequired { .. } => "Permission Required",
            Notice::LocationShared { .. } => "Location Sent",
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Notice::SosDispatched { channel } => match channel {
                DispatchChannel::Backend => {
                    "Emergency alert sent with your location and audio recording.".into()
                }
                DispatchChannel::ChatApp => "Emergency message opened in your chat app.".into(),
                DispatchChannel::Sms => "Emergency message opened in your SMS app.".into(),
            },
            Notice::DispatchFailed { error } | Notice::PermissionRequired { error, .. } => {
                error.user_facing_message()
            }
            Notice::LocationShared { .. } => "Your location has been shared.".into(),
        }
    }
}

/// Shows notices to the user. Must not block: implementations queue the
/// notice for the UI and return immediately.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Drops every notice, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _notice: Notice) {}
}
