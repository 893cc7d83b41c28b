use serde::Serialize;

use crate::model::SosState;

/// Banner shown over the home screen while SOS is active or recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SosStatusView {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub is_sos_active: bool,
    pub is_recording: bool,
}

/// `None` when there is nothing to show.
#[must_use]
pub fn sos_status_view(state: SosState, is_recording: bool) -> Option<SosStatusView> {
    let is_sos_active = state.is_active();
    let (title, subtitle) = match (is_sos_active, is_recording) {
        (true, _) => ("SOS ACTIVE", "Emergency services notified with location & audio"),
        (false, true) => ("Recording...", "Audio recording in progress"),
        (false, false) => return None,
    };
    Some(SosStatusView {
        title,
        subtitle,
        is_sos_active,
        is_recording,
    })
}
